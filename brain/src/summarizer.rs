//! Derives a per-channel [`Summary`] from a buffer snapshot (spec §4.G).
//!
//! Tokenization, stopword set, and topic/fingerprint construction follow
//! the original `ai_chat_brain/summarizer.py` + `config.py`'s `WORD_RE`/
//! `STOP` constants exactly.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::session_buffer::ChatItem;

const TOPIC_KEYWORDS: usize = 3;
const FINGERPRINT_KEYWORDS: usize = 5;
const MAX_KEYWORDS: usize = 8;
const MAX_QUESTIONS: usize = 3;
const DEFAULT_TOPIC: &str = "чат";

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-zА-Яа-я0-9_]{3,}").expect("WORD_RE is a valid regex"));

static STOP_WORDS: LazyLock<std::collections::HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "the", "and", "that", "this", "with", "have", "you", "your", "but", "not", "are", "for",
        "was",
        // Russian
        "что", "это", "как", "так", "там", "тут", "его", "ее", "они", "она", "оно", "да", "нет",
        "или", "уже", "ещё", "ещe", "кто", "где", "когда", "почему",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub topic: String,
    pub keywords: Vec<String>,
    pub questions: Vec<String>,
    pub topic_fingerprint: String,
    pub msgs_last_10s: usize,
    pub msgs_last_60s: usize,
    pub last_message_age_sec: i64,
    pub bullets: Vec<String>,
}

impl Summary {
    fn empty() -> Self {
        Summary {
            topic: DEFAULT_TOPIC.to_string(),
            keywords: Vec::new(),
            questions: Vec::new(),
            topic_fingerprint: String::new(),
            msgs_last_10s: 0,
            msgs_last_60s: 0,
            last_message_age_sec: i64::MAX,
            bullets: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.questions.is_empty()
    }
}

pub fn summarize(items: &[ChatItem], now: i64) -> Summary {
    if items.is_empty() {
        return Summary::empty();
    }

    let keywords = extract_keywords(items);
    let questions = extract_questions(items);

    let topic = if keywords.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        keywords
            .iter()
            .take(TOPIC_KEYWORDS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    // When there are no keywords but the channel is non-empty, fall back to
    // the topic itself so a quiet chat with only stopwords still gets a
    // non-empty fingerprint (original `summarizer.py`'s `topic_fp` fallback).
    let topic_fingerprint = if keywords.is_empty() {
        topic.clone()
    } else {
        keywords
            .iter()
            .take(FINGERPRINT_KEYWORDS)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    };

    let msgs_last_10s = items.iter().filter(|i| i.ts >= now - 10).count();
    let msgs_last_60s = items.iter().filter(|i| i.ts >= now - 60).count();
    let last_message_age_sec = items.last().map(|i| now - i.ts).unwrap_or(i64::MAX);

    let mut bullets = vec![format!("topic: {topic}"), format!("messages (60s): {msgs_last_60s}")];
    for question in &questions {
        bullets.push(format!("question: {question}"));
    }

    Summary {
        topic,
        keywords,
        questions,
        topic_fingerprint,
        msgs_last_10s,
        msgs_last_60s,
        last_message_age_sec,
        bullets,
    }
}

fn extract_keywords(items: &[ChatItem]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for item in items {
        for token in WORD_RE.find_iter(&item.text) {
            let word = token.as_str().to_lowercase();
            if STOP_WORDS.contains(word.as_str()) {
                continue;
            }
            if !counts.contains_key(&word) {
                order.push(word.clone());
            }
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    // Stable sort by descending frequency; ties keep first-seen order.
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.truncate(MAX_KEYWORDS);
    order
}

fn extract_questions(items: &[ChatItem]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut questions = Vec::new();

    for item in items {
        if !item.text.contains('?') {
            continue;
        }
        let key = item.text.to_lowercase();
        if seen.insert(key) {
            questions.push(item.text.clone());
            if questions.len() >= MAX_QUESTIONS {
                break;
            }
        }
    }

    questions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(ts: i64, text: &str) -> ChatItem {
        ChatItem {
            ts,
            user: "u".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn empty_input_yields_empty_sentinel() {
        let summary = summarize(&[], 100);
        assert!(summary.is_empty());
        assert_eq!(summary.topic, DEFAULT_TOPIC);
        assert_eq!(summary.topic_fingerprint, "");
    }

    #[test]
    fn keywords_are_ranked_by_frequency_with_stopwords_removed() {
        let items = vec![
            item(0, "rust is great, rust is fast"),
            item(1, "i love rust and memory safety"),
        ];
        let summary = summarize(&items, 2);
        assert_eq!(summary.keywords.first().map(String::as_str), Some("rust"));
        assert!(!summary.keywords.contains(&"and".to_string()));
    }

    #[test]
    fn topic_joins_first_three_keywords() {
        let items = vec![item(0, "rust gc memory allocator performance tuning today")];
        let summary = summarize(&items, 1);
        let parts: Vec<&str> = summary.topic.split(", ").collect();
        assert_eq!(parts.len(), TOPIC_KEYWORDS.min(summary.keywords.len()));
    }

    #[test]
    fn topic_fingerprint_uses_first_five_keywords_space_joined() {
        let items = vec![item(0, "alpha beta gamma delta epsilon zeta eta")];
        let summary = summarize(&items, 1);
        assert!(!summary.topic_fingerprint.contains(','));
        assert_eq!(
            summary.topic_fingerprint.split(' ').count(),
            FINGERPRINT_KEYWORDS.min(summary.keywords.len())
        );
    }

    #[test]
    fn topic_fingerprint_falls_back_to_topic_when_no_keywords_survive() {
        let items = vec![item(0, "the and but"), item(1, "that this with")];
        let summary = summarize(&items, 2);
        assert!(summary.keywords.is_empty());
        assert_eq!(summary.topic, DEFAULT_TOPIC);
        assert_eq!(summary.topic_fingerprint, DEFAULT_TOPIC);
    }

    #[test]
    fn questions_are_deduplicated_case_insensitively_and_capped() {
        let items = vec![
            item(0, "what is rust?"),
            item(1, "What is rust?"),
            item(2, "why is it fast?"),
            item(3, "how does it compile?"),
            item(4, "is it safe?"),
        ];
        let summary = summarize(&items, 5);
        assert_eq!(summary.questions.len(), MAX_QUESTIONS);
        assert_eq!(summary.questions[0], "what is rust?");
    }

    #[test]
    fn activity_counters_reflect_now() {
        let items = vec![item(0, "one"), item(5, "two"), item(50, "three")];
        let summary = summarize(&items, 55);
        assert_eq!(summary.msgs_last_10s, 1);
        assert_eq!(summary.msgs_last_60s, 3);
        assert_eq!(summary.last_message_age_sec, 5);
    }

    #[test]
    fn cyrillic_tokens_are_recognized() {
        let items = vec![item(0, "расскажи про раст и память")];
        let summary = summarize(&items, 1);
        assert!(summary.keywords.iter().any(|k| k == "расскажи"));
    }
}
