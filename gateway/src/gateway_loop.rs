//! The Gateway's connect/auth/join/reconnect state machine (spec §4.E).
//!
//! Conceptually: `Disconnected -> Connecting -> Authenticating -> Joined ->
//! Running -> Closing -> Disconnected`. Reader and Sender only run during
//! `Running`; either task failing tears down both and returns to
//! `Disconnected`, which re-enters the reconnect loop below. Grounded on the
//! original `twitch_gateway/main.py::irc_loop`/`outgoing_sender` for the
//! backoff-with-jitter and claim-then-read cadence.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chat_bus::{BusClient, ChatMessage, OutboundMessage, ReadFrom, StreamEntry};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinError;

use crate::config::{CredentialSource, GatewayConfig};
use crate::irc::{self, codec::WireMessage, IrcReader, IrcSender};
use crate::rate_limit::TokenBucket;
use crate::token::TokenManager;

const CLAIM_INTERVAL: StdDuration = StdDuration::from_secs(15);
const CLAIM_MIN_IDLE_MS: u64 = 60_000;
const MAX_BACKOFF_SEC: f64 = 60.0;
const OUT_READ_COUNT: usize = 10;
const OUT_READ_BLOCK_MS: u64 = 5_000;
const OUT_CLAIM_COUNT: usize = 10;

/// Runs until `shutdown` is signalled, or a fatal credential error occurs.
/// Transient connection failures are absorbed by the reconnect loop and
/// never returned to the caller.
pub async fn run(
    config: GatewayConfig,
    token_manager: Option<Arc<TokenManager>>,
    bus: Arc<BusClient>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    bus.ensure_group(&config.redis_stream_out, &config.redis_consumer_group)
        .await?;

    let bucket = Arc::new(TokenBucket::new(
        config.rate_limit_count,
        config.rate_limit_window_sec,
    ));
    let mut backoff = 1.0f64;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let pass = match credential_pass(&config, token_manager.as_deref()).await {
            Ok(pass) => pass,
            Err(e) => {
                tracing::error!(error = %e, "fatal credential error, exiting gateway");
                return Err(e);
            }
        };

        let (reader, sender) = match irc::connect(&config.nick, &pass, &config.channels).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "connection attempt failed, backing off");
                sleep_backoff(&mut backoff).await;
                continue;
            }
        };

        tracing::info!(channels = ?config.channels, "joined all channels");
        backoff = 1.0;

        match run_session(&config, &bus, &bucket, reader, sender, &mut shutdown).await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                sleep_backoff(&mut backoff).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "session ended with error, reconnecting");
                sleep_backoff(&mut backoff).await;
            }
        }
    }
}

async fn sleep_backoff(backoff: &mut f64) {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    tokio::time::sleep(StdDuration::from_secs_f64(*backoff + jitter)).await;
    *backoff = (*backoff * 2.0).min(MAX_BACKOFF_SEC);
}

async fn credential_pass(
    config: &GatewayConfig,
    token_manager: Option<&TokenManager>,
) -> anyhow::Result<String> {
    match &config.credential {
        CredentialSource::Static { oauth } => Ok(prefix_oauth(oauth)),
        CredentialSource::Managed { .. } => {
            let manager = token_manager
                .expect("a managed credential source always carries a configured TokenManager");
            let bundle = manager.get_valid_access_token(false).await?;
            Ok(bundle.irc_pass())
        }
    }
}

fn prefix_oauth(token: &str) -> String {
    if token.starts_with("oauth:") {
        token.to_string()
    } else {
        format!("oauth:{token}")
    }
}

/// Runs Reader and Sender concurrently until one ends or shutdown fires.
/// Returns `Ok(true)` on graceful shutdown, `Ok(false)`/`Err` when the
/// session should be retried after a reconnect backoff.
async fn run_session(
    config: &GatewayConfig,
    bus: &Arc<BusClient>,
    bucket: &Arc<TokenBucket>,
    reader: IrcReader,
    sender: IrcSender,
    shutdown: &mut watch::Receiver<bool>,
) -> anyhow::Result<bool> {
    let mut reader_handle = tokio::spawn(reader_loop(
        config.redis_stream_in.clone(),
        bus.clone(),
        reader,
    ));
    let mut sender_handle = tokio::spawn(sender_loop(
        config.redis_stream_out.clone(),
        config.redis_consumer_group.clone(),
        config.redis_consumer_name.clone(),
        bus.clone(),
        bucket.clone(),
        sender,
    ));

    tokio::select! {
        r = &mut reader_handle => {
            sender_handle.abort();
            flatten_join(r)?;
            Ok(false)
        }
        r = &mut sender_handle => {
            reader_handle.abort();
            flatten_join(r)?;
            Ok(false)
        }
        _ = shutdown.changed() => {
            reader_handle.abort();
            sender_handle.abort();
            Ok(true)
        }
    }
}

fn flatten_join(result: Result<anyhow::Result<()>, JoinError>) -> anyhow::Result<()> {
    match result {
        Ok(inner) => inner,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn reader_loop(stream_in: String, bus: Arc<BusClient>, mut reader: IrcReader) -> anyhow::Result<()> {
    loop {
        let Some(message) = reader.next_message().await? else {
            anyhow::bail!("connection closed by peer (EOF)");
        };

        if message.command != "PRIVMSG" {
            tracing::debug!(command = %message.command, "dropping non-PRIVMSG line");
            continue;
        }

        let Some(chat_message) = build_chat_message(&message) else {
            tracing::debug!(raw = %message.raw, "dropping malformed PRIVMSG");
            continue;
        };

        if let Err(e) = bus.xadd(&stream_in, &chat_message.to_fields()).await {
            tracing::warn!(error = %e, "failed to append chat message to bus");
        }
    }
}

fn build_chat_message(message: &WireMessage) -> Option<ChatMessage> {
    let channel = message.params.first()?.trim_start_matches('#').to_lowercase();
    let text = message.trailing.clone()?;
    let user = message.prefix_nick().unwrap_or("").to_string();

    Some(ChatMessage {
        ts: chrono::Utc::now().timestamp(),
        channel,
        user,
        text,
        msg_id: message.msg_id().unwrap_or_default().to_string(),
        user_id: message.tags.get("user-id").cloned().unwrap_or_default(),
        display_name: message.tags.get("display-name").cloned().unwrap_or_default(),
        badges: message.tags.get("badges").cloned().unwrap_or_default(),
        is_mod: message.tags.get("mod").is_some_and(|v| v == "1"),
        subscriber: message.tags.get("subscriber").is_some_and(|v| v == "1"),
        vip: message.tags.get("vip").is_some_and(|v| v == "1"),
        raw: message.raw.clone(),
    })
}

async fn sender_loop(
    stream_out: String,
    group: String,
    consumer: String,
    bus: Arc<BusClient>,
    bucket: Arc<TokenBucket>,
    sender: IrcSender,
) -> anyhow::Result<()> {
    // Force an immediate first reclamation sweep on entering a fresh session.
    let mut last_claim = tokio::time::Instant::now() - CLAIM_INTERVAL;

    loop {
        if last_claim.elapsed() >= CLAIM_INTERVAL {
            match bus
                .autoclaim(&stream_out, &group, &consumer, CLAIM_MIN_IDLE_MS, OUT_CLAIM_COUNT)
                .await
            {
                Ok(entries) => {
                    for entry in entries {
                        process_out_entry(&stream_out, &group, &bus, &bucket, &sender, entry).await?;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "stale-pending reclamation failed"),
            }
            last_claim = tokio::time::Instant::now();
        }

        match bus
            .read(
                &stream_out,
                &group,
                &consumer,
                ReadFrom::New,
                OUT_READ_COUNT,
                OUT_READ_BLOCK_MS,
            )
            .await
        {
            Ok(entries) => {
                for entry in entries {
                    process_out_entry(&stream_out, &group, &bus, &bucket, &sender, entry).await?;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read OUT stream, pausing");
                tokio::time::sleep(StdDuration::from_secs(1)).await;
            }
        }
    }
}

/// Validates, rate-limits, sends, and acks a single OUT entry. A socket
/// write failure propagates so the caller tears down the session and
/// reconnects; the unacked id is then recovered by a future claim sweep.
async fn process_out_entry(
    stream_out: &str,
    group: &str,
    bus: &Arc<BusClient>,
    bucket: &Arc<TokenBucket>,
    sender: &IrcSender,
    entry: StreamEntry,
) -> anyhow::Result<()> {
    let outbound = match OutboundMessage::from_fields(&entry.fields) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(id = %entry.id, error = %e, "malformed outbound record, dropping");
            ack_best_effort(bus, stream_out, group, &entry.id).await;
            return Ok(());
        }
    };

    if outbound.channel.trim().is_empty() || outbound.text.trim().is_empty() {
        tracing::warn!(id = %entry.id, "outbound message missing channel or text, dropping");
        ack_best_effort(bus, stream_out, group, &entry.id).await;
        return Ok(());
    }

    bucket.acquire(1.0).await;
    sender
        .privmsg(&outbound.channel, &outbound.text, outbound.reply_to.as_deref())
        .await?;
    ack_best_effort(bus, stream_out, group, &entry.id).await;
    Ok(())
}

async fn ack_best_effort(bus: &Arc<BusClient>, stream: &str, group: &str, id: &str) {
    let ids = vec![id.to_string()];
    if let Err(e) = bus.ack(stream, group, &ids).await {
        tracing::warn!(error = %e, id, "failed to ack OUT entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn wire_message(command: &str, params: Vec<&str>, trailing: Option<&str>, prefix: Option<&str>) -> WireMessage {
        WireMessage {
            raw: "irrelevant".to_string(),
            tags: HashMap::new(),
            prefix: prefix.map(str::to_string),
            command: command.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
            trailing: trailing.map(str::to_string),
        }
    }

    #[test]
    fn build_chat_message_lowercases_channel_and_extracts_nick() {
        let msg = wire_message(
            "PRIVMSG",
            vec!["#Demo"],
            Some("hello"),
            Some("alice!alice@alice.tmi.twitch.tv"),
        );
        let chat = build_chat_message(&msg).unwrap();
        assert_eq!(chat.channel, "demo");
        assert_eq!(chat.user, "alice");
        assert_eq!(chat.text, "hello");
    }

    #[test]
    fn build_chat_message_requires_trailing_text() {
        let msg = wire_message("PRIVMSG", vec!["#demo"], None, Some("alice!x"));
        assert!(build_chat_message(&msg).is_none());
    }

    #[test]
    fn prefix_oauth_adds_once() {
        assert_eq!(prefix_oauth("abc"), "oauth:abc");
        assert_eq!(prefix_oauth("oauth:abc"), "oauth:abc");
    }
}
