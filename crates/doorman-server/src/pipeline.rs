//! The access pipeline: validate, record, give feedback.
//!
//! ```text
//! ScanRequest ──> CredentialValidator ──> SessionTracker ──> ScanOutcome ──> FeedbackDispatcher
//!                       │ denial                │ denial           ▲
//!                       └───────────────────────┴──────────────────┘
//! ```
//!
//! Denials end the scan with a denial outcome. Storage failures become
//! `denied-server-error`. Feedback failures are logged by the dispatcher and
//! never change what was recorded.

use doorman_core::{Credential, DeviceRole, Direction, MacAddress, OutcomeReason, ScanOutcome};
use doorman_network::{FeedbackDispatcher, RejectedScan, ScanHandler, ScanRequest};
use doorman_storage::{CredentialValidator, SessionTracker, StorageError};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info};

pub struct AccessPipeline {
    validator: CredentialValidator,
    tracker: SessionTracker,
    dispatcher: Arc<FeedbackDispatcher>,
}

impl AccessPipeline {
    pub fn new(pool: SqlitePool, dispatcher: Arc<FeedbackDispatcher>) -> Self {
        Self {
            validator: CredentialValidator::new(pool.clone()),
            tracker: SessionTracker::new(pool),
            dispatcher,
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Decide a scan and record it if granted.
    pub async fn decide(&self, credential: &Credential, direction: Direction) -> ScanOutcome {
        let validated = match self.validator.validate(credential).await {
            Ok(validated) => validated,
            Err(e) => return Self::deny(credential, direction, &e, None),
        };

        match self
            .tracker
            .record(credential, direction, Some(&validated.display_name))
            .await
        {
            Ok(event) => {
                info!(
                    credential = %credential,
                    direction = %direction,
                    seq = event.seq,
                    holder = %validated.display_name,
                    "Access granted"
                );
                ScanOutcome::granted(direction, validated.display_name)
            }
            Err(e) => Self::deny(credential, direction, &e, Some(validated.display_name)),
        }
    }

    /// Decide a scan and push the outcome to the scanning device.
    pub async fn process(&self, request: &ScanRequest) -> ScanOutcome {
        let outcome = self
            .decide(&request.payload.credential, request.direction)
            .await;
        self.dispatcher.notify(request.device, &outcome).await;
        outcome
    }

    /// Show a denial for a payload that never became a credential.
    ///
    /// Nothing is recorded.
    pub async fn reject(&self, rejection: &RejectedScan) -> ScanOutcome {
        let outcome = ScanOutcome::from_error(&rejection.error, None);
        info!(
            device = %rejection.device,
            role = %rejection.role,
            peer = %rejection.peer,
            error = %rejection.error,
            reason = %outcome.reason,
            "Unreadable scan denied"
        );
        self.dispatcher.notify(rejection.device, &outcome).await;
        outcome
    }

    fn deny(
        credential: &Credential,
        direction: Direction,
        error: &StorageError,
        display_name: Option<String>,
    ) -> ScanOutcome {
        match error.denial() {
            Some(denial) => {
                let outcome = ScanOutcome::from_error(denial, display_name);
                info!(
                    credential = %credential,
                    direction = %direction,
                    reason = %outcome.reason,
                    "Access denied"
                );
                outcome
            }
            None => {
                error!(
                    credential = %credential,
                    direction = %direction,
                    error = %error,
                    "Access pipeline failed"
                );
                ScanOutcome::denied(OutcomeReason::DeniedServerError, display_name)
            }
        }
    }
}

impl ScanHandler for AccessPipeline {
    async fn handle(&self, request: ScanRequest) {
        self.process(&request).await;
    }

    async fn reject(&self, rejection: RejectedScan) {
        AccessPipeline::reject(self, &rejection).await;
    }

    async fn device_announced(&self, device: MacAddress, role: DeviceRole) {
        if self.dispatcher.announce_idle(device).await {
            info!(device = %device, role = %role, "Idle screen sent to new device");
        }
    }
}
