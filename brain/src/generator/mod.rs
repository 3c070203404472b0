//! Reply generation (spec §4.J): a rule-based fallback and an optional
//! LLM-backed generator, selected at startup and composed so the LLM path
//! always degrades to the rule-based one on failure.

mod llm;
mod rule_based;

pub use llm::{LlmConfig, LlmGenerator};
pub use rule_based::RuleBasedGenerator;

use crate::session_buffer::ChatItem;
use crate::summarizer::Summary;

/// What the caller is asking the generator to produce a reply for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    AnswerAi,
    Mention,
    Initiate,
}

pub struct GenerationRequest<'a> {
    pub purpose: Purpose,
    pub channel: &'a str,
    pub user: Option<&'a str>,
    /// The `!ai <prompt>` text for [`Purpose::AnswerAi`], or the triggering
    /// message's text for [`Purpose::Mention`]; `None` for `Initiate`.
    pub prompt: Option<&'a str>,
    pub summary: &'a Summary,
    /// The buffer snapshot the summary was derived from, newest last. The
    /// LLM generator includes the last `max_context_msgs` of these as
    /// conversational context (spec.md §4.J).
    pub recent: &'a [ChatItem],
    pub max_len: usize,
}

pub enum Generator {
    RuleBased(RuleBasedGenerator),
    LlmBacked(LlmGenerator),
}

impl Generator {
    pub async fn generate(&self, req: &GenerationRequest<'_>) -> String {
        match self {
            Generator::RuleBased(g) => g.generate(req),
            Generator::LlmBacked(g) => match g.generate(req).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "LLM generation failed, falling back to rule-based");
                    RuleBasedGenerator.generate(req)
                }
            },
        }
    }
}
