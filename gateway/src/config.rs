//! Gateway configuration (spec §6, §9 "ad-hoc configuration objects" note).
//!
//! One immutable struct loaded once at startup, in the style of the
//! teacher's `core/cli.rs` (`clap` derive with `env` on every field) feeding
//! a validated, immutable config record — minus subcommands, since this is
//! a daemon with no CLI surface of its own.

use clap::Parser;

/// Raw CLI/env surface; validated and narrowed into [`GatewayConfig`] by
/// [`GatewayConfig::load`].
#[derive(Debug, Parser)]
#[command(name = "twitch-gateway", about = "Persistent Twitch chat IRC gateway")]
struct Cli {
    #[arg(long, env = "TWITCH_NICK")]
    twitch_nick: String,

    #[arg(long, env = "TWITCH_OAUTH")]
    twitch_oauth: Option<String>,

    #[arg(long, env = "TWITCH_TOKEN_FILE")]
    twitch_token_file: Option<String>,

    #[arg(long, env = "TWITCH_APP_CLIENT_ID")]
    twitch_app_client_id: Option<String>,

    #[arg(long, env = "TWITCH_APP_CLIENT_SECRET")]
    twitch_app_client_secret: Option<String>,

    #[arg(long, env = "TWITCH_TOKEN_MIN_TTL_SEC", default_value_t = 120)]
    twitch_token_min_ttl_sec: i64,

    #[arg(long, env = "TWITCH_CHANNELS")]
    twitch_channels: String,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    #[arg(long, env = "REDIS_STREAM_IN", default_value = "chat:in")]
    redis_stream_in: String,

    #[arg(long, env = "REDIS_STREAM_OUT", default_value = "chat:out")]
    redis_stream_out: String,

    #[arg(long, env = "REDIS_CONSUMER_GROUP", default_value = "gateway")]
    redis_consumer_group: String,

    #[arg(long, env = "REDIS_CONSUMER_NAME", default_value = "gateway-1")]
    redis_consumer_name: String,

    #[arg(long, env = "RATE_LIMIT_COUNT", default_value_t = 20)]
    rate_limit_count: u32,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SEC", default_value_t = 30)]
    rate_limit_window_sec: u32,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

/// `LOG_LEVEL`, falling back to `RUST_LOG`, then a hardcoded default —
/// matching `sideseat-sideseat/server/src/app.rs::init_logging`.
fn resolve_log_filter(log_level: Option<String>) -> String {
    log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info,twitch_gateway=debug".to_string())
}

/// How the chat credential is sourced, mirroring the original's
/// `TWITCH_OAUTH` vs `TWITCH_TOKEN_FILE` either-or.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// A static, never-refreshed token.
    Static { oauth: String },
    /// A token file kept fresh by the [`crate::token::TokenManager`].
    Managed {
        token_file: String,
        client_id: String,
        client_secret: String,
        min_ttl_sec: i64,
    },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub nick: String,
    pub credential: CredentialSource,
    pub channels: Vec<String>,
    pub redis_url: String,
    pub redis_stream_in: String,
    pub redis_stream_out: String,
    pub redis_consumer_group: String,
    pub redis_consumer_name: String,
    pub rate_limit_count: u32,
    pub rate_limit_window_sec: u32,
    pub log_level: String,
}

impl GatewayConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let credential = match (cli.twitch_oauth, cli.twitch_token_file) {
            (Some(oauth), None) => CredentialSource::Static { oauth },
            (None, Some(token_file)) => {
                let client_id = cli.twitch_app_client_id.ok_or_else(|| {
                    anyhow::anyhow!("TWITCH_APP_CLIENT_ID is required when using TWITCH_TOKEN_FILE")
                })?;
                let client_secret = cli.twitch_app_client_secret.ok_or_else(|| {
                    anyhow::anyhow!(
                        "TWITCH_APP_CLIENT_SECRET is required when using TWITCH_TOKEN_FILE"
                    )
                })?;
                CredentialSource::Managed {
                    token_file,
                    client_id,
                    client_secret,
                    min_ttl_sec: cli.twitch_token_min_ttl_sec,
                }
            }
            (Some(_), Some(_)) => {
                anyhow::bail!("set exactly one of TWITCH_OAUTH or TWITCH_TOKEN_FILE, not both")
            }
            (None, None) => {
                anyhow::bail!("one of TWITCH_OAUTH or TWITCH_TOKEN_FILE is required")
            }
        };

        let channels: Vec<String> = cli
            .twitch_channels
            .split(',')
            .map(|c| c.trim().trim_start_matches('#').to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if channels.is_empty() {
            anyhow::bail!("TWITCH_CHANNELS must list at least one channel");
        }

        Ok(GatewayConfig {
            nick: cli.twitch_nick.to_lowercase(),
            credential,
            channels,
            redis_url: cli.redis_url,
            redis_stream_in: cli.redis_stream_in,
            redis_stream_out: cli.redis_stream_out,
            redis_consumer_group: cli.redis_consumer_group,
            redis_consumer_name: cli.redis_consumer_name,
            rate_limit_count: cli.rate_limit_count,
            rate_limit_window_sec: cli.rate_limit_window_sec,
            log_level: resolve_log_filter(cli.log_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_from(args: &[&str]) -> Cli {
        let mut full = vec!["twitch-gateway"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn static_oauth_credential_is_accepted() {
        let cli = cli_from(&[
            "--twitch-nick",
            "MyBot",
            "--twitch-oauth",
            "abc",
            "--twitch-channels",
            "Demo, Other",
        ]);
        let config = GatewayConfig::from_cli(cli).unwrap();
        assert_eq!(config.nick, "mybot");
        assert!(matches!(config.credential, CredentialSource::Static { .. }));
        assert_eq!(config.channels, vec!["demo".to_string(), "other".to_string()]);
    }

    #[test]
    fn token_file_requires_client_id_and_secret() {
        let cli = cli_from(&[
            "--twitch-nick",
            "mybot",
            "--twitch-token-file",
            "/tmp/token.json",
            "--twitch-channels",
            "demo",
        ]);
        let err = GatewayConfig::from_cli(cli).unwrap_err();
        assert!(err.to_string().contains("TWITCH_APP_CLIENT_ID"));
    }

    #[test]
    fn neither_credential_source_is_an_error() {
        let cli = cli_from(&["--twitch-nick", "mybot", "--twitch-channels", "demo"]);
        assert!(GatewayConfig::from_cli(cli).is_err());
    }

    #[test]
    fn both_credential_sources_is_an_error() {
        let cli = cli_from(&[
            "--twitch-nick",
            "mybot",
            "--twitch-oauth",
            "abc",
            "--twitch-token-file",
            "/tmp/token.json",
            "--twitch-channels",
            "demo",
        ]);
        assert!(GatewayConfig::from_cli(cli).is_err());
    }

    #[test]
    fn empty_channel_list_is_an_error() {
        let cli = cli_from(&[
            "--twitch-nick",
            "mybot",
            "--twitch-oauth",
            "abc",
            "--twitch-channels",
            "  ",
        ]);
        assert!(GatewayConfig::from_cli(cli).is_err());
    }
}
