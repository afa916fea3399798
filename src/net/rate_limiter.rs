//! Input and message rate limiting
//!
//! Steering input is limited per player to a minimum interval. Connections
//! are limited to a number of messages per one-second window. Both take the
//! current instant as an argument.

use std::time::{Duration, Instant};

/// Violations from rate limiting
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitViolation {
    #[error("Input too soon: {elapsed_ms}ms since last (min {min_ms}ms)")]
    InputTooSoon { elapsed_ms: u64, min_ms: u64 },
    #[error("Message rate exceeded: {0} messages this second")]
    MessageRateExceeded(u32),
}

/// Accept an input at `now` if at least `min_interval` passed since `last`
pub fn check_input_interval(
    last: Option<Instant>,
    now: Instant,
    min_interval: Duration,
) -> Result<(), RateLimitViolation> {
    let Some(last) = last else {
        return Ok(());
    };
    let elapsed = now.saturating_duration_since(last);
    if elapsed < min_interval {
        return Err(RateLimitViolation::InputTooSoon {
            elapsed_ms: elapsed.as_millis() as u64,
            min_ms: min_interval.as_millis() as u64,
        });
    }
    Ok(())
}

/// Fixed one-second window message counter for one connection
#[derive(Debug)]
pub struct MessageRateLimit {
    max_per_second: u32,
    count: u32,
    window_start: Instant,
    violations: u32,
}

impl MessageRateLimit {
    pub fn new(max_per_second: u32, now: Instant) -> Self {
        Self {
            max_per_second,
            count: 0,
            window_start: now,
            violations: 0,
        }
    }

    /// Count one message received at `now`
    pub fn check(&mut self, now: Instant) -> Result<(), RateLimitViolation> {
        if now.saturating_duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.count = 0;
        }

        self.count += 1;
        if self.count > self.max_per_second {
            self.violations += 1;
            return Err(RateLimitViolation::MessageRateExceeded(self.count));
        }
        Ok(())
    }

    /// Total rejected messages over the connection's lifetime
    pub fn violations(&self) -> u32 {
        self.violations
    }
}
