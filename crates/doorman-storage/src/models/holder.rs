use chrono::{DateTime, Utc};
use doorman_core::Credential;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry status of a credential holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolderStatus {
    Active,
    Inactive,
}

impl HolderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HolderStatus::Active => "active",
            HolderStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for HolderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HolderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(HolderStatus::Active),
            "inactive" => Ok(HolderStatus::Inactive),
            other => Err(format!("Unknown holder status: {other}")),
        }
    }
}

/// A registered credential holder.
///
/// Maps to the `holders` table. The `credential` column always holds the
/// normalized form, so lookups compare like with like.
///
/// # Examples
///
/// ```
/// use doorman_core::Credential;
/// use doorman_storage::models::CredentialHolder;
///
/// let credential = Credential::new("abc-12345").unwrap();
/// let holder = CredentialHolder::new("Arun Kumar", &credential);
///
/// assert_eq!(holder.credential, "ABC12345");
/// assert!(holder.is_active());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CredentialHolder {
    /// Auto-increment primary key
    pub id: i64,

    /// Display name shown on the scanner
    pub name: String,

    /// Normalized credential
    pub credential: String,

    pub email: Option<String>,

    pub phone: Option<String>,

    /// `"active"` or `"inactive"`
    pub status: String,

    pub created_at: DateTime<Utc>,
}

impl CredentialHolder {
    /// Build an active holder that has not been persisted yet.
    pub fn new(name: impl Into<String>, credential: &Credential) -> Self {
        Self {
            id: 0,
            name: name.into(),
            credential: credential.as_str().to_string(),
            email: None,
            phone: None,
            status: HolderStatus::Active.as_str().to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_status(mut self, status: HolderStatus) -> Self {
        self.status = status.as_str().to_string();
        self
    }

    /// Parsed status. Unrecognized values are treated as inactive.
    pub fn status(&self) -> HolderStatus {
        self.status.parse().unwrap_or(HolderStatus::Inactive)
    }

    pub fn is_active(&self) -> bool {
        self.status() == HolderStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("active", HolderStatus::Active)]
    #[case("ACTIVE", HolderStatus::Active)]
    #[case("inactive", HolderStatus::Inactive)]
    #[case("suspended", HolderStatus::Inactive)]
    #[case("", HolderStatus::Inactive)]
    fn test_status_parsing(#[case] raw: &str, #[case] expected: HolderStatus) {
        let mut holder = CredentialHolder::new("Test User", &Credential::new("ABC12345").unwrap());
        holder.status = raw.to_string();
        assert_eq!(holder.status(), expected);
    }

    #[test]
    fn test_builder() {
        let holder = CredentialHolder::new("Keerthana", &Credential::new("0009334653").unwrap())
            .with_email("keerthana@example.com")
            .with_phone("+91 98400 00000")
            .with_status(HolderStatus::Inactive);

        assert_eq!(holder.email.as_deref(), Some("keerthana@example.com"));
        assert!(holder.phone.is_some());
        assert!(!holder.is_active());
    }
}
