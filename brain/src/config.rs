//! Brain configuration (spec §6), following the same `clap` derive + `env`
//! pattern as the Gateway's config, feeding one validated, immutable struct.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "chat-brain", about = "Consumes chat, decides when to speak")]
struct Cli {
    #[arg(long, env = "BOT_NICK")]
    bot_nick: String,

    #[arg(long, env = "CHANNEL_ALLOWLIST")]
    channel_allowlist: String,

    #[arg(long, env = "BANWORDS", default_value = "")]
    banwords: String,

    #[arg(long, env = "MIN_TEXT_LEN", default_value_t = 3)]
    min_text_len: usize,

    #[arg(long, env = "WINDOW_SEC", default_value_t = 120)]
    window_sec: i64,

    #[arg(long, env = "MAX_ITEMS", default_value_t = 300)]
    max_items: usize,

    #[arg(long, env = "MAX_CONTEXT_MSGS", default_value_t = 30)]
    max_context_msgs: usize,

    #[arg(long, env = "BATCH_SEC", default_value_t = 2)]
    batch_sec: u64,

    #[arg(long, env = "QUIET_AFTER_SEC", default_value_t = 120)]
    quiet_after_sec: i64,

    #[arg(long, env = "BUSY_CHAT_MSGS_10S", default_value_t = 3)]
    busy_chat_msgs_10s: usize,

    #[arg(long, env = "SPEAK_EVERY_SEC", default_value_t = 300)]
    speak_every_sec: i64,

    #[arg(long, env = "TOPIC_COOLDOWN_SEC", default_value_t = 60)]
    topic_cooldown_sec: i64,

    #[arg(long, env = "MENTION_COOLDOWN_SEC", default_value_t = 20)]
    mention_cooldown_sec: i64,

    #[arg(long, env = "AI_COOLDOWN_SEC", default_value_t = 15)]
    ai_cooldown_sec: i64,

    #[arg(long, env = "MAX_OUT_LEN", default_value_t = 450)]
    max_out_len: usize,

    #[arg(long, env = "AUTO_SPEAK_ENABLED", default_value_t = true)]
    auto_speak_enabled: bool,

    #[arg(long, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3")]
    ollama_model: String,

    #[arg(long, env = "OLLAMA_TEMPERATURE", default_value_t = 0.7)]
    ollama_temperature: f64,

    #[arg(long, env = "OLLAMA_NUM_CTX", default_value_t = 4096)]
    ollama_num_ctx: u32,

    #[arg(long, env = "OLLAMA_NUM_PREDICT", default_value_t = 160)]
    ollama_num_predict: u32,

    #[arg(long, env = "OLLAMA_TOP_P", default_value_t = 0.9)]
    ollama_top_p: f64,

    #[arg(long, env = "OLLAMA_REPEAT_PENALTY", default_value_t = 1.1)]
    ollama_repeat_penalty: f64,

    #[arg(long, env = "OLLAMA_TIMEOUT_SEC", default_value_t = 30)]
    ollama_timeout_sec: u64,

    #[arg(long, env = "OLLAMA_THINK", default_value_t = false)]
    ollama_think: bool,

    #[arg(long, env = "OLLAMA_FORCE_RU", default_value_t = false)]
    ollama_force_ru: bool,

    #[arg(long, env = "OLLAMA_RETRY_NON_RU", default_value_t = true)]
    ollama_retry_non_ru: bool,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    #[arg(long, env = "REDIS_STREAM_IN", default_value = "chat:in")]
    redis_stream_in: String,

    #[arg(long, env = "REDIS_STREAM_OUT", default_value = "chat:out")]
    redis_stream_out: String,

    #[arg(long, env = "REDIS_CONSUMER_GROUP", default_value = "brain")]
    redis_consumer_group: String,

    #[arg(long, env = "REDIS_CONSUMER_NAME", default_value = "brain-1")]
    redis_consumer_name: String,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

/// `LOG_LEVEL`, falling back to `RUST_LOG`, then a hardcoded default —
/// matching the Gateway's `resolve_log_filter`.
fn resolve_log_filter(log_level: Option<String>) -> String {
    log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info,chat_brain=debug".to_string())
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub num_ctx: u32,
    pub num_predict: u32,
    pub top_p: f64,
    pub repeat_penalty: f64,
    pub timeout_sec: u64,
    pub think: bool,
    pub force_ru: bool,
    pub retry_non_ru: bool,
}

#[derive(Debug, Clone)]
pub struct BrainConfig {
    pub bot_nick: String,
    pub channel_allowlist: Vec<String>,
    pub banwords: Vec<String>,
    pub min_text_len: usize,
    pub window_sec: i64,
    pub max_items: usize,
    pub max_context_msgs: usize,
    pub batch_sec: u64,
    pub quiet_after_sec: i64,
    pub busy_chat_msgs_10s: usize,
    pub speak_every_sec: i64,
    pub topic_cooldown_sec: i64,
    pub mention_cooldown_sec: i64,
    pub ai_cooldown_sec: i64,
    pub max_out_len: usize,
    pub auto_speak_enabled: bool,
    pub ollama: Option<OllamaConfig>,
    pub redis_url: String,
    pub redis_stream_in: String,
    pub redis_stream_out: String,
    pub redis_consumer_group: String,
    pub redis_consumer_name: String,
    pub log_level: String,
}

impl BrainConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let channel_allowlist: Vec<String> = cli
            .channel_allowlist
            .split(',')
            .map(|c| c.trim().trim_start_matches('#').to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if channel_allowlist.is_empty() {
            anyhow::bail!("CHANNEL_ALLOWLIST must list at least one channel");
        }

        let banwords: Vec<String> = cli
            .banwords
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();

        let ollama = cli.ollama_url.map(|base_url| OllamaConfig {
            base_url,
            model: cli.ollama_model,
            temperature: cli.ollama_temperature,
            num_ctx: cli.ollama_num_ctx,
            num_predict: cli.ollama_num_predict,
            top_p: cli.ollama_top_p,
            repeat_penalty: cli.ollama_repeat_penalty,
            timeout_sec: cli.ollama_timeout_sec,
            think: cli.ollama_think,
            force_ru: cli.ollama_force_ru,
            retry_non_ru: cli.ollama_retry_non_ru,
        });

        Ok(BrainConfig {
            bot_nick: cli.bot_nick.to_lowercase(),
            channel_allowlist,
            banwords,
            min_text_len: cli.min_text_len,
            window_sec: cli.window_sec,
            max_items: cli.max_items,
            max_context_msgs: cli.max_context_msgs,
            batch_sec: cli.batch_sec,
            quiet_after_sec: cli.quiet_after_sec,
            busy_chat_msgs_10s: cli.busy_chat_msgs_10s,
            speak_every_sec: cli.speak_every_sec,
            topic_cooldown_sec: cli.topic_cooldown_sec,
            mention_cooldown_sec: cli.mention_cooldown_sec,
            ai_cooldown_sec: cli.ai_cooldown_sec,
            max_out_len: cli.max_out_len,
            auto_speak_enabled: cli.auto_speak_enabled,
            ollama,
            redis_url: cli.redis_url,
            redis_stream_in: cli.redis_stream_in,
            redis_stream_out: cli.redis_stream_out,
            redis_consumer_group: cli.redis_consumer_group,
            redis_consumer_name: cli.redis_consumer_name,
            log_level: resolve_log_filter(cli.log_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_from(args: &[&str]) -> Cli {
        let mut full = vec!["chat-brain"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let cli = cli_from(&["--bot-nick", "MyBot", "--channel-allowlist", "Demo, Other"]);
        let config = BrainConfig::from_cli(cli).unwrap();
        assert_eq!(config.bot_nick, "mybot");
        assert_eq!(config.channel_allowlist, vec!["demo".to_string(), "other".to_string()]);
        assert!(config.ollama.is_none());
    }

    #[test]
    fn empty_allowlist_is_rejected() {
        let cli = cli_from(&["--bot-nick", "mybot", "--channel-allowlist", "  "]);
        assert!(BrainConfig::from_cli(cli).is_err());
    }

    #[test]
    fn banwords_are_split_and_trimmed() {
        let cli = cli_from(&[
            "--bot-nick",
            "mybot",
            "--channel-allowlist",
            "demo",
            "--banwords",
            " foo , bar ,,baz",
        ]);
        let config = BrainConfig::from_cli(cli).unwrap();
        assert_eq!(config.banwords, vec!["foo".to_string(), "bar".to_string(), "baz".to_string()]);
    }

    #[test]
    fn ollama_url_enables_llm_backend() {
        let cli = cli_from(&[
            "--bot-nick",
            "mybot",
            "--channel-allowlist",
            "demo",
            "--ollama-url",
            "http://localhost:11434",
        ]);
        let config = BrainConfig::from_cli(cli).unwrap();
        assert!(config.ollama.is_some());
        assert_eq!(config.ollama.unwrap().model, "llama3");
    }
}
