//! When the Brain is allowed to speak (spec §4.I, extended version per
//! the Open Questions resolution in the grounding ledger).
//!
//! All decisions are pure functions of an explicit `now` and a
//! [`PolicyState`] snapshot, kept separate from I/O and from the
//! summarizer/generator so each rule is independently unit-testable.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutospeakReason {
    Silence,
    TopicShift,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyState {
    pub last_speak_ts: Option<i64>,
    pub last_topic_fp: Option<String>,
    pub last_topic_ts: Option<i64>,
    pub last_mention_reply_ts: Option<i64>,
    pub last_ai_reply_ts: Option<i64>,
}

impl PolicyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_spoke(&mut self, now: i64) {
        self.last_speak_ts = Some(now);
    }

    pub fn mark_ai_reply(&mut self, now: i64) {
        self.last_ai_reply_ts = Some(now);
        self.mark_spoke(now);
    }

    pub fn mark_mention_reply(&mut self, now: i64) {
        self.last_mention_reply_ts = Some(now);
        self.mark_spoke(now);
    }

    pub fn mark_autospeak(&mut self, now: i64, topic_fp: &str) {
        self.last_topic_fp = Some(topic_fp.to_string());
        self.last_topic_ts = Some(now);
        self.mark_spoke(now);
    }
}

/// `!ai` commands bypass the autospeak cooldowns but still rate-limit
/// against each other.
pub fn should_reply_ai(state: &PolicyState, now: i64, cooldown_sec: i64) -> bool {
    match state.last_ai_reply_ts {
        None => true,
        Some(last) => now - last >= cooldown_sec,
    }
}

/// `@botnick` mentions have their own independent cooldown.
pub fn should_reply_mention(state: &PolicyState, now: i64, cooldown_sec: i64) -> bool {
    match state.last_mention_reply_ts {
        None => true,
        Some(last) => now - last >= cooldown_sec,
    }
}

/// Six-step autospeak decision (spec.md §4.I):
/// 1. Disabled, or the summary is empty -> never.
/// 2. Global speak cadence: `now - last_speak_ts < speak_every_sec` -> null.
/// 3. Too busy to interrupt: `msgs_last_10s > busy_threshold` -> null.
/// 4. Gone quiet: `last_message_age_sec >= quiet_after_sec` -> `SILENCE`.
/// 5. Topic shifted: fingerprint nonempty, differs from `last_topic_fp`, and
///    the per-topic cooldown has elapsed -> `TOPIC_SHIFT`.
/// 6. Otherwise null.
#[allow(clippy::too_many_arguments)]
pub fn decide_autospeak(
    state: &PolicyState,
    now: i64,
    enabled: bool,
    summary_is_empty: bool,
    msgs_last_10s: usize,
    busy_threshold: usize,
    last_message_age_sec: i64,
    quiet_after_sec: i64,
    speak_every_sec: i64,
    topic_cooldown_sec: i64,
    topic_fingerprint: &str,
) -> Option<AutospeakReason> {
    if !enabled || summary_is_empty {
        return None;
    }
    if let Some(last_speak) = state.last_speak_ts {
        if now - last_speak < speak_every_sec {
            return None;
        }
    }
    if msgs_last_10s > busy_threshold {
        return None;
    }
    if last_message_age_sec >= quiet_after_sec {
        return Some(AutospeakReason::Silence);
    }

    let topic_shifted = !topic_fingerprint.is_empty()
        && state.last_topic_fp.as_deref() != Some(topic_fingerprint)
        && state
            .last_topic_ts
            .map(|last| now - last >= topic_cooldown_sec)
            .unwrap_or(true);

    if topic_shifted {
        return Some(AutospeakReason::TopicShift);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_cooldown_blocks_rapid_repeats() {
        let mut state = PolicyState::new();
        assert!(should_reply_ai(&state, 0, 30));
        state.mark_ai_reply(0);
        assert!(!should_reply_ai(&state, 10, 30));
        assert!(should_reply_ai(&state, 30, 30));
    }

    #[test]
    fn mention_cooldown_is_independent_of_ai_cooldown() {
        let mut state = PolicyState::new();
        state.mark_ai_reply(0);
        assert!(should_reply_mention(&state, 1, 30));
    }

    #[test]
    fn autospeak_disabled_never_fires() {
        let state = PolicyState::new();
        let result = decide_autospeak(&state, 100, false, false, 10, 3, 1, 120, 300, 60, "a b c");
        assert_eq!(result, None);
    }

    #[test]
    fn autospeak_skipped_when_summary_is_empty() {
        let state = PolicyState::new();
        let result = decide_autospeak(&state, 100, true, true, 10, 3, 1, 120, 300, 60, "a b c");
        assert_eq!(result, None);
    }

    #[test]
    fn autospeak_respects_global_cadence() {
        let mut state = PolicyState::new();
        state.mark_spoke(90);
        let result = decide_autospeak(&state, 100, true, false, 10, 3, 1, 120, 300, 60, "a b c");
        assert_eq!(result, None);
    }

    #[test]
    fn autospeak_suppressed_when_chat_is_too_busy() {
        let state = PolicyState::new();
        let result = decide_autospeak(&state, 100, true, false, 10, 3, 1, 120, 300, 60, "a b c");
        assert_eq!(result, None);
    }

    #[test]
    fn autospeak_silence_fires_when_channel_gone_quiet() {
        let state = PolicyState::new();
        let result = decide_autospeak(&state, 100, true, false, 1, 3, 200, 120, 300, 60, "a b c");
        assert_eq!(result, Some(AutospeakReason::Silence));
    }

    #[test]
    fn autospeak_fires_on_topic_shift_once_cooldown_elapsed() {
        let mut state = PolicyState::new();
        state.mark_autospeak(0, "old topic");
        let result = decide_autospeak(&state, 100, true, false, 1, 3, 1, 120, 300, 60, "new topic");
        assert_eq!(result, Some(AutospeakReason::TopicShift));
    }

    #[test]
    fn autospeak_topic_shift_blocked_within_topic_cooldown() {
        let mut state = PolicyState::new();
        state.mark_autospeak(90, "old topic");
        let result = decide_autospeak(&state, 100, true, false, 1, 3, 1, 120, 300, 60, "new topic");
        assert_eq!(result, None);
    }

    #[test]
    fn autospeak_empty_fingerprint_never_counts_as_a_topic_shift() {
        let mut state = PolicyState::new();
        state.mark_autospeak(0, "some topic");
        let result = decide_autospeak(&state, 100, true, false, 1, 3, 1, 120, 300, 60, "");
        assert_eq!(result, None);
    }

    #[test]
    fn autospeak_unchanged_topic_after_cooldown_stays_silent_not_shifted() {
        let mut state = PolicyState::new();
        state.mark_autospeak(0, "same topic");
        let result = decide_autospeak(&state, 100, true, false, 1, 3, 1, 120, 300, 60, "same topic");
        assert_eq!(result, None);
    }
}
