//! Ollama-backed generator (`<base_url>/api/chat`), with the exact retry
//! ladder the original bot applies: an empty/truncated reply gets one
//! retry with tighter sampling, and if the bot is configured to force
//! Russian output a drifted-language reply gets one more retry with an
//! explicit language directive.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{GenerationRequest, Purpose};
use crate::session_buffer::ChatItem;

const MIN_RETRY_TEMPERATURE: f64 = 0.2;
const MIN_RETRY_NUM_PREDICT: u32 = 192;
const RETRY_DIRECTIVE: &str = "Keep it short and finish your sentence.";
const RUSSIAN_DIRECTIVE: &str = "Respond in Russian only.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to ollama failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("ollama returned an empty response after retries")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
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
    pub max_context_msgs: usize,
}

pub struct LlmGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmGenerator {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .expect("reqwest client builds with a fixed timeout");
        LlmGenerator { client, config }
    }

    pub async fn generate(&self, req: &GenerationRequest<'_>) -> Result<String, LlmError> {
        let system_prompt = build_system_prompt(self.config.force_ru);
        let user_prompt = build_user_prompt(req, self.config.max_context_msgs);

        let mut options = ChatOptions {
            temperature: self.config.temperature,
            num_ctx: self.config.num_ctx,
            num_predict: self.config.num_predict,
            top_p: self.config.top_p,
            repeat_penalty: self.config.repeat_penalty,
        };
        let mut think = self.config.think;
        let mut extra_directive: Option<&str> = None;

        let mut reply = self
            .call(&system_prompt, &user_prompt, think, &options, extra_directive)
            .await?;

        if looks_truncated_or_empty(&reply, options.num_predict) {
            think = false;
            options.temperature = options.temperature.min(MIN_RETRY_TEMPERATURE);
            options.num_predict = options.num_predict.max(MIN_RETRY_NUM_PREDICT);
            extra_directive = Some(RETRY_DIRECTIVE);
            reply = self
                .call(&system_prompt, &user_prompt, think, &options, extra_directive)
                .await?;
        }

        if self.config.force_ru && self.config.retry_non_ru && !looks_russian(&reply) {
            extra_directive = Some(RUSSIAN_DIRECTIVE);
            reply = self
                .call(&system_prompt, &user_prompt, think, &options, extra_directive)
                .await?;
        }

        if reply.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(truncate(&reply, req.max_len))
    }

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        think: bool,
        options: &ChatOptions,
        extra_directive: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut system = system_prompt.to_string();
        if let Some(directive) = extra_directive {
            system.push(' ');
            system.push_str(directive);
        }

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user_prompt.to_string() },
            ],
            stream: false,
            think,
            options: options.clone(),
        };

        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let response: ChatResponse = self.client.post(url).json(&body).send().await?.json().await?;
        Ok(response.message.content)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatOptions {
    temperature: f64,
    num_ctx: u32,
    num_predict: u32,
    top_p: f64,
    repeat_penalty: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    think: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

const BASE_SYSTEM_PROMPT: &str = "You are a participant in a Twitch chat. Write ONE short message \
(1-2 sentences), no walls of text, no links, no toxicity. Don't spam emoji. Don't repeat yourself. \
If you're missing context, ask one clarifying question. DO NOT write your reasoning or \
chain-of-thought. Output only the final reply.";

const FORCE_RU_DIRECTIVE: &str = " IMPORTANT: reply ONLY in Russian. Chinese and English are not \
allowed. If you started in another language, rewrite the reply in Russian.";

/// Persistent per spec.md §4.J: when the bot is configured Russian-only,
/// that constraint lives in the base system prompt on every call, not just
/// injected as a one-shot retry addendum.
fn build_system_prompt(force_ru: bool) -> String {
    let mut prompt = BASE_SYSTEM_PROMPT.to_string();
    if force_ru {
        prompt.push_str(FORCE_RU_DIRECTIVE);
    }
    prompt
}

fn format_recent(recent: &[ChatItem], max_n: usize) -> String {
    let start = recent.len().saturating_sub(max_n);
    recent[start..]
        .iter()
        .map(|item| format!("{}: {}", item.user, item.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_user_prompt(req: &GenerationRequest<'_>, max_context_msgs: usize) -> String {
    let s = req.summary;
    let recent_txt = format_recent(req.recent, max_context_msgs);
    let keywords = if s.keywords.is_empty() { String::new() } else { s.keywords.iter().take(8).cloned().collect::<Vec<_>>().join(", ") };
    let questions = if s.questions.is_empty() { String::new() } else { s.questions.iter().take(3).cloned().collect::<Vec<_>>().join(" | ") };

    match req.purpose {
        Purpose::Initiate => format!(
            "Current chat topic: {}\nKeywords: {}\nQuestions in chat: {}\n\nRecent messages:\n{}\n\n\
            Write a fitting remark to keep the conversation going.",
            s.topic, keywords, questions, recent_txt
        ),
        Purpose::Mention => format!(
            "You were mentioned in chat. User: {}\nTheir message: {}\n\nContext/topic: {}\nRecent messages:\n{}\n\n\
            Reply briefly and to the point (one message).",
            req.user.unwrap_or(""),
            req.prompt.unwrap_or(""),
            s.topic,
            recent_txt
        ),
        Purpose::AnswerAi => format!(
            "A user is asking a question via !ai. User: {}\nQuestion: {}\n\nChat topic: {}\nRecent messages:\n{}\n\n\
            Give a short, useful answer (1-2 sentences).",
            req.user.unwrap_or(""),
            req.prompt.unwrap_or(""),
            s.topic,
            recent_txt
        ),
    }
}

fn looks_truncated_or_empty(text: &str, num_predict: u32) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    let approx_tokens = text.split_whitespace().count() as u32;
    approx_tokens >= num_predict && !matches!(text.trim_end().chars().last(), Some('.') | Some('!') | Some('?'))
}

/// No CJK characters, and either no letters at all or Cyrillic letters
/// outnumber Latin ones at least 2-to-1.
fn looks_russian(text: &str) -> bool {
    let mut cyrillic = 0u32;
    let mut latin = 0u32;
    let mut cjk = false;

    for c in text.chars() {
        if is_cjk(c) {
            cjk = true;
        } else if ('\u{0400}'..='\u{04FF}').contains(&c) {
            cyrillic += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }

    if cjk {
        return false;
    }
    if cyrillic == 0 && latin == 0 {
        return true;
    }
    cyrillic >= std::cmp::max(1, 2 * latin)
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0xAC00..=0xD7A3)
}

/// Truncates on a word boundary and appends an ellipsis, matching the
/// original bot's `text[:max_len].rsplit(" ", 1)[0] + "…"`.
fn truncate(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_len).collect();
    let head = match clipped.rsplit_once(' ') {
        Some((head, _)) if !head.is_empty() => head,
        _ => clipped.as_str(),
    };
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_russian_detects_cyrillic_majority() {
        assert!(looks_russian("привет как дела"));
        assert!(!looks_russian("hello there friend"));
    }

    #[test]
    fn looks_russian_true_when_no_letters_at_all() {
        assert!(looks_russian("1234 !!!"));
    }

    #[test]
    fn looks_russian_false_when_cjk_present() {
        assert!(!looks_russian("привет 你好"));
    }

    #[test]
    fn truncated_detection_requires_terminal_punctuation() {
        assert!(looks_truncated_or_empty("", 100));
        assert!(looks_truncated_or_empty(&"word ".repeat(50), 10));
        assert!(!looks_truncated_or_empty("a short reply.", 100));
    }

    #[test]
    fn truncate_cuts_on_a_word_boundary_and_appends_an_ellipsis() {
        assert_eq!(truncate("short reply", 100), "short reply");
        assert_eq!(truncate("one two three four", 9), "one two…");
    }

    #[test]
    fn force_ru_directive_is_baked_into_the_base_system_prompt() {
        let plain = build_system_prompt(false);
        let forced = build_system_prompt(true);
        assert!(!plain.contains("Russian"));
        assert!(forced.contains("Russian"));
    }

    #[test]
    fn format_recent_keeps_only_the_last_n_messages_in_order() {
        let items = vec![
            ChatItem { ts: 0, user: "a".to_string(), text: "one".to_string() },
            ChatItem { ts: 1, user: "b".to_string(), text: "two".to_string() },
            ChatItem { ts: 2, user: "c".to_string(), text: "three".to_string() },
        ];
        let text = format_recent(&items, 2);
        assert_eq!(text, "b: two\nc: three");
    }

    #[test]
    fn build_user_prompt_surfaces_questions_and_recent_messages() {
        use crate::summarizer::Summary;
        let summary = Summary {
            topic: "rust".to_string(),
            keywords: vec!["rust".to_string()],
            questions: vec!["is it fast?".to_string()],
            topic_fingerprint: "rust".to_string(),
            msgs_last_10s: 1,
            msgs_last_60s: 1,
            last_message_age_sec: 0,
            bullets: Vec::new(),
        };
        let items = vec![ChatItem { ts: 0, user: "a".to_string(), text: "is it fast?".to_string() }];
        let req = GenerationRequest {
            purpose: Purpose::Initiate,
            channel: "demo",
            user: None,
            prompt: None,
            summary: &summary,
            recent: &items,
            max_len: 500,
        };
        let prompt = build_user_prompt(&req, 15);
        assert!(prompt.contains("is it fast?"));
        assert!(prompt.contains("a: is it fast?"));
    }
}
