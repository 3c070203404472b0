//! Per-channel rolling message window (spec §4.F).
//!
//! `now` is always passed in explicitly rather than read from the wall
//! clock inside these types, so every invariant in spec §8 ("for all
//! sequences of add/snapshot...") is directly unit-testable without mocking
//! time.

use std::collections::{HashMap, VecDeque};

/// A single buffered chat message, already filtered/normalized by the
/// caller before it reaches the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatItem {
    pub ts: i64,
    pub user: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferStats {
    pub msgs_last_10s: usize,
    pub msgs_last_60s: usize,
    pub last_message_ts: Option<i64>,
}

/// Ordered deque of [`ChatItem`]s bounded by both a time window `W` and a
/// hard item cap `M`. Trimmed on every observation so stats are never stale
/// with respect to the clock.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    items: VecDeque<ChatItem>,
    window_sec: i64,
    max_items: usize,
}

impl ChannelBuffer {
    pub fn new(window_sec: i64, max_items: usize) -> Self {
        Self {
            items: VecDeque::new(),
            window_sec,
            max_items,
        }
    }

    /// Append, then evict from the front: first anything older than `now -
    /// window_sec`, then anything beyond `max_items`.
    pub fn add(&mut self, item: ChatItem, now: i64) {
        self.items.push_back(item);
        self.trim(now);
    }

    /// Trim, then return a copy of the buffer — optionally only the last
    /// `last_n` items.
    pub fn snapshot(&mut self, now: i64, last_n: Option<usize>) -> Vec<ChatItem> {
        self.trim(now);
        match last_n {
            Some(n) if n < self.items.len() => {
                self.items.iter().skip(self.items.len() - n).cloned().collect()
            }
            _ => self.items.iter().cloned().collect(),
        }
    }

    pub fn stats(&mut self, now: i64) -> BufferStats {
        self.trim(now);
        BufferStats {
            msgs_last_10s: self.items.iter().filter(|i| i.ts >= now - 10).count(),
            msgs_last_60s: self.items.iter().filter(|i| i.ts >= now - 60).count(),
            last_message_ts: self.items.back().map(|i| i.ts),
        }
    }

    fn trim(&mut self, now: i64) {
        let cutoff = now - self.window_sec;
        while matches!(self.items.front(), Some(front) if front.ts < cutoff) {
            self.items.pop_front();
        }
        while self.items.len() > self.max_items {
            self.items.pop_front();
        }
    }
}

/// `channel -> ChannelBuffer`, created lazily on first message. Not shared
/// across threads by this type itself — the Brain loop is single-threaded
/// cooperative, so no internal locking is needed (spec §5).
#[derive(Debug, Default)]
pub struct ChatState {
    buffers: HashMap<String, ChannelBuffer>,
    window_sec: i64,
    max_items: usize,
}

impl ChatState {
    pub fn new(window_sec: i64, max_items: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            window_sec,
            max_items,
        }
    }

    pub fn buffer_mut(&mut self, channel: &str) -> &mut ChannelBuffer {
        let window_sec = self.window_sec;
        let max_items = self.max_items;
        self.buffers
            .entry(channel.to_string())
            .or_insert_with(|| ChannelBuffer::new(window_sec, max_items))
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }
}
