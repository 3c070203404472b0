//! Deterministic, dependency-free reply templates. Always available as the
//! fallback path when no LLM is configured or the LLM call fails.

use super::{GenerationRequest, Purpose};

pub struct RuleBasedGenerator;

impl RuleBasedGenerator {
    pub fn generate(&self, req: &GenerationRequest<'_>) -> String {
        let text = match req.purpose {
            Purpose::AnswerAi => answer_ai(req),
            Purpose::Mention => mention(req),
            Purpose::Initiate => initiate(req),
        };
        truncate(&text, req.max_len)
    }
}

fn answer_ai(req: &GenerationRequest<'_>) -> String {
    let topic = &req.summary.topic;
    match req.prompt {
        Some(prompt) => format!("понял вопрос про {topic} ({prompt}) — дайте мне минутку подумать"),
        None => format!("не понял вопрос про {topic}, повтори?"),
    }
}

fn mention(req: &GenerationRequest<'_>) -> String {
    let topic = &req.summary.topic;
    match req.user {
        Some(user) => format!("привет, {user}! про {topic} — что именно обсудить?"),
        None => format!("привет! про {topic} — что именно обсудить?"),
    }
}

fn initiate(req: &GenerationRequest<'_>) -> String {
    if req.summary.is_empty() {
        "что тут у вас происходит?".to_string()
    } else {
        format!("смотрю, тут обсуждают {}", req.summary.topic)
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    text.chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::Summary;

    fn empty_summary() -> Summary {
        Summary {
            topic: "чат".to_string(),
            keywords: Vec::new(),
            questions: Vec::new(),
            topic_fingerprint: String::new(),
            msgs_last_10s: 0,
            msgs_last_60s: 0,
            last_message_age_sec: 0,
            bullets: Vec::new(),
        }
    }

    #[test]
    fn answer_ai_echoes_the_prompt_and_the_topic() {
        let mut summary = empty_summary();
        summary.topic = "rust, async".to_string();
        let req = GenerationRequest {
            purpose: Purpose::AnswerAi,
            channel: "demo",
            user: Some("alice"),
            prompt: Some("how fast is rust"),
            summary: &summary,
            recent: &[],
            max_len: 500,
        };
        let reply = RuleBasedGenerator.generate(&req);
        assert!(reply.contains("how fast is rust"));
        assert!(reply.contains("rust, async"));
    }

    #[test]
    fn mention_greets_the_user_and_references_the_topic() {
        let mut summary = empty_summary();
        summary.topic = "rust, async".to_string();
        let req = GenerationRequest {
            purpose: Purpose::Mention,
            channel: "demo",
            user: Some("bob"),
            prompt: None,
            summary: &summary,
            recent: &[],
            max_len: 500,
        };
        let reply = RuleBasedGenerator.generate(&req);
        assert!(reply.contains("bob"));
        assert!(reply.contains("rust, async"));
    }

    #[test]
    fn replies_are_truncated_to_max_len() {
        let summary = empty_summary();
        let req = GenerationRequest {
            purpose: Purpose::Mention,
            channel: "demo",
            user: Some("averyveryverylongusername"),
            prompt: None,
            summary: &summary,
            recent: &[],
            max_len: 5,
        };
        let reply = RuleBasedGenerator.generate(&req);
        assert_eq!(reply.chars().count(), 5);
    }

    #[test]
    fn initiate_references_the_topic_when_present() {
        let mut summary = empty_summary();
        summary.topic = "rust, async".to_string();
        let req = GenerationRequest {
            purpose: Purpose::Initiate,
            channel: "demo",
            user: None,
            prompt: None,
            summary: &summary,
            recent: &[],
            max_len: 500,
        };
        let reply = RuleBasedGenerator.generate(&req);
        assert!(reply.contains("rust, async"));
    }
}
