//! Token bucket rate limiter (spec §4.B).
//!
//! Ports the original `twitch_gateway/rate_limit.py::TokenBucket` continuous
//! refill algorithm onto a `tokio::sync::Mutex` and `tokio::time::sleep`.

use std::sync::Mutex;
use std::time::Instant;

use tokio::time::Duration;

const MIN_WAIT: Duration = Duration::from_millis(10);

struct State {
    tokens: f64,
    updated_at: Instant,
}

/// Governs outbound send rate: `capacity` tokens refilling continuously over
/// `window_sec` seconds (rate = `capacity / window_sec` tokens/sec).
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(capacity: u32, window_sec: u32) -> Self {
        let capacity = capacity.max(1) as f64;
        let window_sec = window_sec.max(1) as f64;
        Self {
            capacity,
            refill_rate: capacity / window_sec,
            state: Mutex::new(State {
                tokens: capacity,
                updated_at: Instant::now(),
            }),
        }
    }

    /// Blocks (cooperatively) until `amount` tokens are available, then
    /// deducts them. Safe under concurrent callers; a waiter only proceeds
    /// once its own recomputed wait has elapsed, so no caller starves
    /// indefinitely as long as the bucket keeps refilling.
    pub async fn acquire(&self, amount: f64) {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("token bucket mutex poisoned");
                self.refill(&mut state);
                if state.tokens >= amount {
                    state.tokens -= amount;
                    return;
                }
                let need = amount - state.tokens;
                Duration::from_secs_f64((need / self.refill_rate).max(MIN_WAIT.as_secs_f64()))
            };
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.updated_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.updated_at = now;
    }
}
