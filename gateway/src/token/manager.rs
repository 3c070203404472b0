//! Token lifecycle manager: validate/refresh/persist (spec §4.A).
//!
//! Grounded on the original `twitch_gateway/token_manager.py`'s
//! `get_valid_access_token` state machine for the decision ordering, and on
//! `server/src/data/secrets/file.rs`'s `atomic_write` (temp file + rename)
//! for persistence.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::bundle::TokenBundle;
use super::error::TokenError;

const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";
const REFRESH_URL: &str = "https://id.twitch.tv/oauth2/token";

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    login: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    scope: Option<Vec<String>>,
    token_type: Option<String>,
    expires_in: Option<i64>,
}

/// What to do with the currently-on-file token, given a validate result.
/// Split out from [`TokenManager::get_valid_access_token`] so the ordering
/// in spec §4.A steps 3–6 is testable without a network call.
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    ReturnCurrent,
    Refresh,
    WrongAccount { got: String },
}

fn decide(validated: Option<&ValidateResponse>, expected_login: &str, min_ttl_sec: i64) -> Decision {
    let Some(validated) = validated else {
        return Decision::Refresh;
    };
    if let Some(login) = &validated.login
        && !login.eq_ignore_ascii_case(expected_login)
    {
        return Decision::WrongAccount { got: login.clone() };
    }
    if validated.expires_in <= min_ttl_sec {
        Decision::Refresh
    } else {
        Decision::ReturnCurrent
    }
}

/// Keeps the on-disk chat credential valid, refreshing it via the platform's
/// OAuth2 rotating-refresh-token flow when it is missing, invalid, or about
/// to expire.
pub struct TokenManager {
    path: PathBuf,
    client_id: String,
    client_secret: String,
    expected_login: String,
    min_ttl_sec: i64,
    http: reqwest::Client,
}

impl TokenManager {
    pub fn new(
        path: PathBuf,
        client_id: String,
        client_secret: String,
        expected_login: String,
        min_ttl_sec: i64,
    ) -> Self {
        Self {
            path,
            client_id,
            client_secret,
            expected_login,
            min_ttl_sec,
            http: reqwest::Client::new(),
        }
    }

    /// Spec §4.A `get_valid_credential`.
    pub async fn get_valid_access_token(&self, force_refresh: bool) -> Result<TokenBundle, TokenError> {
        let bundle = self.read_file().await?;

        if force_refresh {
            return self.refresh(&bundle).await;
        }

        let validated = self.validate(&bundle.access_token).await;
        match decide(validated.as_ref(), &self.expected_login, self.min_ttl_sec) {
            Decision::ReturnCurrent => Ok(bundle),
            Decision::Refresh => self.refresh(&bundle).await,
            Decision::WrongAccount { got } => Err(TokenError::WrongAccount {
                expected: self.expected_login.clone(),
                got,
            }),
        }
    }

    async fn read_file(&self) -> Result<TokenBundle, TokenError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|_| {
            TokenError::CredentialMissing {
                path: self.path.display().to_string(),
            }
        })?;
        let bundle: TokenBundle =
            serde_json::from_str(&content).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if bundle.access_token.is_empty() {
            return Err(TokenError::CredentialMissing {
                path: self.path.display().to_string(),
            });
        }
        Ok(bundle)
    }

    async fn validate(&self, access_token: &str) -> Option<ValidateResponse> {
        let response = self
            .http
            .get(VALIDATE_URL)
            .header("Authorization", format!("OAuth {access_token}"))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        response.json::<ValidateResponse>().await.ok()
    }

    async fn refresh(&self, current: &TokenBundle) -> Result<TokenBundle, TokenError> {
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| TokenError::RefreshFailed("no refresh_token on file".to_string()))?;

        let response = self
            .http
            .post(REFRESH_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TokenError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::RefreshFailed(format!("{status}: {body}")));
        }

        let payload: RefreshResponse = response
            .json()
            .await
            .map_err(|e| TokenError::RefreshFailed(e.to_string()))?;

        let mut updated = current.clone();
        updated.access_token = payload.access_token;
        // The platform rotates the refresh token on use; retain the old one
        // only if the response omitted a new one.
        updated.refresh_token = payload.refresh_token.or_else(|| current.refresh_token.clone());
        if let Some(scope) = payload.scope {
            updated.scope = Some(scope);
        }
        if let Some(token_type) = payload.token_type {
            updated.token_type = Some(token_type);
        }
        if let Some(expires_in) = payload.expires_in {
            updated.expires_in = Some(expires_in);
        }
        updated.obtained_at = chrono::Utc::now().timestamp();

        self.persist(&updated).await?;
        Ok(updated)
    }

    async fn persist(&self, bundle: &TokenBundle) -> Result<(), TokenError> {
        let json = serde_json::to_string_pretty(bundle)
            .map_err(|e| TokenError::PersistFailed(e.to_string()))?;
        atomic_write(&self.path, &json)
            .await
            .map_err(|e| TokenError::PersistFailed(e.to_string()))
    }
}

async fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(access_token: &str, refresh_token: Option<&str>) -> TokenBundle {
        TokenBundle {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            scope: None,
            token_type: None,
            expires_in: None,
            obtained_at: 0,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn decide_returns_current_when_fresh_and_matching_login() {
        let validated = ValidateResponse {
            login: Some("mybot".to_string()),
            expires_in: 3600,
        };
        assert_eq!(decide(Some(&validated), "mybot", 120), Decision::ReturnCurrent);
    }

    #[test]
    fn decide_refreshes_when_ttl_at_or_below_minimum() {
        let validated = ValidateResponse {
            login: Some("mybot".to_string()),
            expires_in: 120,
        };
        assert_eq!(decide(Some(&validated), "mybot", 120), Decision::Refresh);
    }

    #[test]
    fn decide_refreshes_when_validate_failed() {
        assert_eq!(decide(None, "mybot", 120), Decision::Refresh);
    }

    #[test]
    fn decide_flags_wrong_account_without_refreshing() {
        let validated = ValidateResponse {
            login: Some("otherbot".to_string()),
            expires_in: 3600,
        };
        assert_eq!(
            decide(Some(&validated), "mybot", 120),
            Decision::WrongAccount {
                got: "otherbot".to_string()
            }
        );
    }

    #[test]
    fn decide_is_case_insensitive_on_login() {
        let validated = ValidateResponse {
            login: Some("MyBot".to_string()),
            expires_in: 3600,
        };
        assert_eq!(decide(Some(&validated), "mybot", 120), Decision::ReturnCurrent);
    }

    #[tokio::test]
    async fn read_file_missing_is_credential_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TokenManager::new(
            dir.path().join("token.json"),
            "id".to_string(),
            "secret".to_string(),
            "mybot".to_string(),
            120,
        );
        let err = manager.read_file().await.unwrap_err();
        assert!(matches!(err, TokenError::CredentialMissing { .. }));
    }

    #[tokio::test]
    async fn persist_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let manager = TokenManager::new(
            path.clone(),
            "id".to_string(),
            "secret".to_string(),
            "mybot".to_string(),
            120,
        );

        manager
            .persist(&bundle("abc123", Some("refresh1")))
            .await
            .unwrap();

        let reloaded = manager.read_file().await.unwrap();
        assert_eq!(reloaded.access_token, "abc123");
        assert_eq!(reloaded.refresh_token.as_deref(), Some("refresh1"));
        assert!(!dir.path().join("token.json.tmp").exists());
    }
}
