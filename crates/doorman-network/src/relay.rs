//! In-process relay of display messages through open ingress sessions.
//!
//! Some scanners cannot serve HTTP; they keep their scan connection open
//! after the acknowledgment and print whatever arrives on it. The listener
//! opens a [`RelaySession`] for such a connection and the feedback
//! dispatcher drops messages into its mailbox via [`RelayHub::deliver`].

use doorman_core::{Error, MacAddress, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Pending messages a session can hold before delivery fails.
const MAILBOX_CAPACITY: usize = 4;

struct Mailbox {
    session_id: u64,
    tx: mpsc::Sender<String>,
}

/// Registry of open relay sessions, one per device.
#[derive(Default)]
pub struct RelayHub {
    mailboxes: Mutex<HashMap<MacAddress, Mailbox>>,
    next_id: AtomicU64,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `mac`, replacing any older one.
    pub fn open(self: &Arc<Self>, mac: MacAddress) -> RelaySession {
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

        if self
            .mailboxes
            .lock()
            .insert(mac, Mailbox { session_id, tx })
            .is_some()
        {
            debug!(mac = %mac, "Relay session superseded");
        }
        trace!(mac = %mac, session_id, "Relay session opened");

        RelaySession {
            mac,
            session_id,
            rx,
            hub: Arc::clone(self),
        }
    }

    /// Queue `text` for the session currently open for `mac`.
    ///
    /// # Errors
    ///
    /// `Error::DeviceUnreachable` if no session is open or its mailbox is
    /// full or closed.
    pub fn deliver(&self, mac: MacAddress, text: impl Into<String>) -> Result<()> {
        let mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.get(&mac).ok_or_else(|| Error::DeviceUnreachable {
            device: mac.to_string(),
            reason: "no open relay session".to_string(),
        })?;

        mailbox
            .tx
            .try_send(text.into())
            .map_err(|e| Error::DeviceUnreachable {
                device: mac.to_string(),
                reason: format!("relay mailbox rejected message: {e}"),
            })
    }

    pub fn is_open(&self, mac: MacAddress) -> bool {
        self.mailboxes.lock().contains_key(&mac)
    }

    fn close(&self, mac: MacAddress, session_id: u64) {
        let mut mailboxes = self.mailboxes.lock();
        if mailboxes
            .get(&mac)
            .is_some_and(|m| m.session_id == session_id)
        {
            mailboxes.remove(&mac);
            trace!(mac = %mac, session_id, "Relay session closed");
        }
    }
}

/// Receiving end of a relay mailbox. Unregisters itself on drop.
pub struct RelaySession {
    mac: MacAddress,
    session_id: u64,
    rx: mpsc::Receiver<String>,
    hub: Arc<RelayHub>,
}

impl RelaySession {
    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Next relayed message; `None` once superseded by a newer session.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.hub.close(self.mac, self.session_id);
    }
}
