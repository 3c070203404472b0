//! Error taxonomy for the token lifecycle manager.
//!
//! Mirrors the error taxonomy in spec: `CredentialMissing` and
//! `WrongAccount` are non-retriable — the Gateway exits and a supervisor
//! must restart it (or the operator must re-consent); `RefreshFailed` and
//! `PersistFailed` are likewise fatal to the calling attempt but are logged
//! with enough detail to diagnose a transient network blip vs. a revoked
//! grant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("credential document at {path} is missing or lacks an access_token")]
    CredentialMissing { path: String },

    #[error("credential belongs to `{got}`, expected `{expected}`; re-consent required")]
    WrongAccount { expected: String, got: String },

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("failed to persist refreshed credential: {0}")]
    PersistFailed(String),

    #[error("credential document is not valid JSON: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_account_message_names_both_logins() {
        let err = TokenError::WrongAccount {
            expected: "mybot".to_string(),
            got: "otherbot".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mybot"));
        assert!(msg.contains("otherbot"));
    }
}
