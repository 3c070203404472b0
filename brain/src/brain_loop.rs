//! The Brain's main loop (spec §4.K): drain the IN stream, update
//! per-channel state, decide whether to reply, and append anything it
//! decides to say onto the OUT stream.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chat_bus::{BusClient, ChatMessage, ReadFrom, CHAT_MESSAGE_TYPE};
use tokio::sync::watch;

use crate::config::BrainConfig;
use crate::filters::TextFilters;
use crate::generator::{GenerationRequest, Generator, LlmConfig, LlmGenerator, Purpose, RuleBasedGenerator};
use crate::policy::{self, PolicyState};
use crate::session_buffer::{ChatItem, ChatState};
use crate::summarizer;

const READ_COUNT: usize = 50;
const READ_BLOCK_MS: u64 = 1000;
const READ_ERROR_BACKOFF_SEC: u64 = 1;

pub async fn run(
    config: BrainConfig,
    bus: Arc<BusClient>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let filters = TextFilters::new(&config.bot_nick, config.min_text_len, &config.banwords);
    let mut chat_state = ChatState::new(config.window_sec, config.max_items);
    let mut policies: HashMap<String, PolicyState> = HashMap::new();
    let allowlist: HashSet<String> = config.channel_allowlist.iter().cloned().collect();
    let generator = build_generator(&config);
    let mention_token = format!("@{}", config.bot_nick);

    let mut read_from = ReadFrom::Pending;
    let mut ticker = tokio::time::interval(Duration::from_secs(config.batch_sec.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                autospeak_tick(&config, &bus, &mut chat_state, &mut policies, &generator).await;
            }
            result = bus.read(
                &config.redis_stream_in,
                &config.redis_consumer_group,
                &config.redis_consumer_name,
                read_from,
                READ_COUNT,
                READ_BLOCK_MS,
            ) => {
                match result {
                    Ok(entries) => {
                        if entries.is_empty() {
                            if matches!(read_from, ReadFrom::Pending) {
                                read_from = ReadFrom::New;
                            }
                            continue;
                        }

                        let mut acked = Vec::with_capacity(entries.len());
                        for entry in &entries {
                            if entry.kind() != Some(CHAT_MESSAGE_TYPE) {
                                acked.push(entry.id.clone());
                                continue;
                            }
                            match ChatMessage::from_fields(&entry.fields) {
                                Ok(msg) => {
                                    process_message(
                                        &config,
                                        &bus,
                                        &filters,
                                        &mut chat_state,
                                        &mut policies,
                                        &generator,
                                        &allowlist,
                                        &mention_token,
                                        &msg,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "dropping malformed chat message");
                                }
                            }
                            acked.push(entry.id.clone());
                        }

                        if let Err(e) = bus
                            .ack(&config.redis_stream_in, &config.redis_consumer_group, &acked)
                            .await
                        {
                            tracing::warn!(error = %e, "failed to ack processed entries");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "bus read failed, retrying after a pause");
                        tokio::time::sleep(Duration::from_secs(READ_ERROR_BACKOFF_SEC)).await;
                    }
                }
            }
        }
    }

    tracing::info!("brain loop shutting down");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn process_message(
    config: &BrainConfig,
    bus: &BusClient,
    filters: &TextFilters,
    chat_state: &mut ChatState,
    policies: &mut HashMap<String, PolicyState>,
    generator: &Generator,
    allowlist: &HashSet<String>,
    mention_token: &str,
    msg: &ChatMessage,
) {
    if !allowlist.contains(&msg.channel) {
        return;
    }
    let now = msg.ts;
    let policy = policies.entry(msg.channel.clone()).or_default();

    match decide_dispatch(
        filters,
        policy,
        config.ai_cooldown_sec,
        config.mention_cooldown_sec,
        mention_token,
        &msg.text,
        now,
    ) {
        Dispatch::AnswerAi(prompt) => {
            let (recent, summary) = summarize_channel(chat_state, &msg.channel, now, config.max_context_msgs);
            let req = GenerationRequest {
                purpose: Purpose::AnswerAi,
                channel: &msg.channel,
                user: Some(&msg.user),
                prompt: Some(&prompt),
                summary: &summary,
                recent: &recent,
                max_len: config.max_out_len,
            };
            let text = generator.generate(&req).await;
            emit(bus, config, &msg.channel, &text, Some(msg.msg_id.clone())).await;
            policy.mark_ai_reply(now);
        }
        Dispatch::Mention => {
            index_if_admitted(filters, chat_state, &msg.channel, &msg.user, &msg.text, now);

            let (recent, summary) = summarize_channel(chat_state, &msg.channel, now, config.max_context_msgs);
            let req = GenerationRequest {
                purpose: Purpose::Mention,
                channel: &msg.channel,
                user: Some(&msg.user),
                prompt: Some(&msg.text),
                summary: &summary,
                recent: &recent,
                max_len: config.max_out_len,
            };
            let text = generator.generate(&req).await;
            emit(bus, config, &msg.channel, &text, Some(msg.msg_id.clone())).await;
            policy.mark_mention_reply(now);
        }
        Dispatch::IndexOnly => {
            index_if_admitted(filters, chat_state, &msg.channel, &msg.user, &msg.text, now);
        }
    }
}

/// What a single inbound message triggers, in priority order (spec.md
/// §4.I/§4.K): an explicit `!ai` command fires regardless of whether the
/// text would itself pass `should_index`; a bot mention indexes the
/// triggering message (if admitted) before replying; anything else is
/// just indexed. Kept pure and separate from the I/O in [`process_message`]
/// so the dispatch order is independently testable.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Dispatch {
    AnswerAi(String),
    Mention,
    IndexOnly,
}

fn decide_dispatch(
    filters: &TextFilters,
    policy: &PolicyState,
    ai_cooldown_sec: i64,
    mention_cooldown_sec: i64,
    mention_token: &str,
    text: &str,
    now: i64,
) -> Dispatch {
    if let Some(prompt) = filters.parse_ai_command(text) {
        if policy::should_reply_ai(policy, now, ai_cooldown_sec) {
            return Dispatch::AnswerAi(prompt);
        }
    }

    if text.to_lowercase().contains(mention_token.to_lowercase().as_str())
        && policy::should_reply_mention(policy, now, mention_cooldown_sec)
    {
        return Dispatch::Mention;
    }

    Dispatch::IndexOnly
}

fn index_if_admitted(
    filters: &TextFilters,
    chat_state: &mut ChatState,
    channel: &str,
    user: &str,
    text: &str,
    now: i64,
) {
    let normalized = filters.normalize(text);
    let (ok, reason) = filters.should_index(user, &normalized);
    if ok {
        chat_state
            .buffer_mut(channel)
            .add(ChatItem { ts: now, user: user.to_string(), text: normalized }, now);
    } else {
        tracing::debug!(channel, reason = reason.as_str(), "message not indexed");
    }
}

async fn autospeak_tick(
    config: &BrainConfig,
    bus: &BusClient,
    chat_state: &mut ChatState,
    policies: &mut HashMap<String, PolicyState>,
    generator: &Generator,
) {
    let now = chrono::Utc::now().timestamp();
    let channels: Vec<String> = chat_state.channels().map(str::to_string).collect();

    for channel in channels {
        let buffer = chat_state.buffer_mut(&channel);
        let stats = buffer.stats(now);
        let items = buffer.snapshot(now, Some(config.max_context_msgs));
        let summary = summarizer::summarize(&items, now);

        let policy = policies.entry(channel.clone()).or_default();
        let reason = policy::decide_autospeak(
            policy,
            now,
            config.auto_speak_enabled,
            summary.is_empty(),
            stats.msgs_last_10s,
            config.busy_chat_msgs_10s,
            stats.last_message_ts.map(|ts| now - ts).unwrap_or(i64::MAX),
            config.quiet_after_sec,
            config.speak_every_sec,
            config.topic_cooldown_sec,
            &summary.topic_fingerprint,
        );

        if reason.is_some() {
            let req = GenerationRequest {
                purpose: Purpose::Initiate,
                channel: &channel,
                user: None,
                prompt: None,
                summary: &summary,
                recent: &items,
                max_len: config.max_out_len,
            };
            let text = generator.generate(&req).await;
            emit(bus, config, &channel, &text, None).await;
            policy.mark_autospeak(now, &summary.topic_fingerprint);
        }
    }
}

fn summarize_channel(
    chat_state: &mut ChatState,
    channel: &str,
    now: i64,
    max_context_msgs: usize,
) -> (Vec<ChatItem>, summarizer::Summary) {
    let items = chat_state.buffer_mut(channel).snapshot(now, Some(max_context_msgs));
    let summary = summarizer::summarize(&items, now);
    (items, summary)
}

async fn emit(bus: &BusClient, config: &BrainConfig, channel: &str, text: &str, reply_to: Option<String>) {
    if text.trim().is_empty() {
        return;
    }
    let out = chat_bus::OutboundMessage {
        ts: chrono::Utc::now().timestamp(),
        channel: channel.to_string(),
        text: text.to_string(),
        reply_to,
    };
    if let Err(e) = bus.xadd(&config.redis_stream_out, &out.to_fields()).await {
        tracing::warn!(error = %e, channel = %channel, "failed to publish outbound message");
    }
}


fn build_generator(config: &BrainConfig) -> Generator {
    match &config.ollama {
        Some(ollama) => Generator::LlmBacked(LlmGenerator::new(LlmConfig {
            base_url: ollama.base_url.clone(),
            model: ollama.model.clone(),
            temperature: ollama.temperature,
            num_ctx: ollama.num_ctx,
            num_predict: ollama.num_predict,
            top_p: ollama.top_p,
            repeat_penalty: ollama.repeat_penalty,
            timeout_sec: ollama.timeout_sec,
            think: ollama.think,
            force_ru: ollama.force_ru,
            retry_non_ru: ollama.retry_non_ru,
            max_context_msgs: config.max_context_msgs,
        })),
        None => Generator::RuleBased(RuleBasedGenerator),
    }
}
