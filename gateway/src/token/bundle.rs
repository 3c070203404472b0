//! The on-disk credential document (spec §3 `TokenBundle`, §6 token document).

use serde::{Deserialize, Serialize};

/// Persisted as a single JSON document; written atomically via
/// temp-file-plus-rename by [`super::manager::TokenManager`].
///
/// `extra` captures any fields this process doesn't know about (e.g. a
/// future platform addition) so a refresh-and-persist cycle never drops
/// them — `#[serde(flatten)]` round-trips unrecognized keys for free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    pub obtained_at: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenBundle {
    /// The literal string written to the IRC `PASS` line: `oauth:<token>`,
    /// prefixed only if the stored token doesn't already carry it.
    pub fn irc_pass(&self) -> String {
        if self.access_token.starts_with("oauth:") {
            self.access_token.clone()
        } else {
            format!("oauth:{}", self.access_token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irc_pass_adds_prefix_once() {
        let bundle = TokenBundle {
            access_token: "abc123".to_string(),
            refresh_token: None,
            scope: None,
            token_type: None,
            expires_in: None,
            obtained_at: 0,
            extra: serde_json::Map::new(),
        };
        assert_eq!(bundle.irc_pass(), "oauth:abc123");
    }

    #[test]
    fn irc_pass_does_not_double_prefix() {
        let bundle = TokenBundle {
            access_token: "oauth:abc123".to_string(),
            refresh_token: None,
            scope: None,
            token_type: None,
            expires_in: None,
            obtained_at: 0,
            extra: serde_json::Map::new(),
        };
        assert_eq!(bundle.irc_pass(), "oauth:abc123");
    }

    #[test]
    fn unknown_fields_round_trip() {
        let json = r#"{"access_token":"t","obtained_at":1,"client_id":"abc"}"#;
        let bundle: TokenBundle = serde_json::from_str(json).unwrap();
        assert_eq!(
            bundle.extra.get("client_id").and_then(|v| v.as_str()),
            Some("abc")
        );
        let reserialized = serde_json::to_string(&bundle).unwrap();
        assert!(reserialized.contains("client_id"));
    }
}
