use reqwest::StatusCode;
use std::time::Duration;

/// Policy parameters for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay used for the first retry attempt.
    pub base_delay: Duration,
    /// Number of retries allowed after the initial attempt.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Creates a new [`RetryPolicy`].
    pub const fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    /// Total number of attempts a unit may consume: the initial one plus retries.
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Computes the wait before retry `retry_index` (zero-based).
    ///
    /// The first wait is the base delay. Every later wait grows from the
    /// `previous` one by a factor of 2, or 3 when the failure that triggered it
    /// was a rate limit. A rate limit on the first failure triples the base.
    pub fn next_delay(&self, retry_index: u32, previous: Duration, rate_limited: bool) -> Duration {
        let multiplier = if rate_limited { 3 } else { 2 };
        if retry_index == 0 {
            if rate_limited {
                return self.base_delay.saturating_mul(multiplier);
            }
            return self.base_delay;
        }

        previous.saturating_mul(multiplier)
    }
}

/// Error classes that influence retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429 from the service.
    RateLimited,
    /// Any other non-OK HTTP status.
    Status(StatusCode),
    /// Transport level failure without a status code.
    Network,
    /// OK status but the body was unusable.
    InvalidResponse,
}

impl FailureKind {
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            FailureKind::RateLimited
        } else {
            FailureKind::Status(status)
        }
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, FailureKind::RateLimited)
    }
}

/// Decision made after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Suspend for `delay`, then send attempt `next_attempt` (one-based).
    Retry { next_attempt: u32, delay: Duration },
    /// No attempts left; `attempts` were made in total.
    Exhausted { attempts: u32 },
}

/// Per-unit retry bookkeeping.
///
/// Lives for exactly one unit: `Pending` until the first [`begin_attempt`],
/// `Sending` while an attempt is in flight, and then either terminal
/// (success is decided by the caller, exhaustion by [`record_failure`]) or
/// `RetryScheduled` until the next [`begin_attempt`].
///
/// [`begin_attempt`]: RetryState::begin_attempt
/// [`record_failure`]: RetryState::record_failure
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    attempts: u32,
    current_delay: Duration,
    last_failure: Option<FailureKind>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a new attempt as in flight and returns its one-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn last_failure(&self) -> Option<FailureKind> {
        self.last_failure
    }

    /// Records the failure of the attempt in flight and decides what happens next.
    pub fn record_failure(&mut self, kind: FailureKind, policy: &RetryPolicy) -> RetryDecision {
        self.last_failure = Some(kind);

        if self.attempts >= policy.max_attempts() {
            return RetryDecision::Exhausted {
                attempts: self.attempts,
            };
        }

        let retry_index = self.attempts.saturating_sub(1);
        let delay = policy.next_delay(retry_index, self.current_delay, kind.is_rate_limited());
        self.current_delay = delay;

        RetryDecision::Retry {
            next_attempt: self.attempts + 1,
            delay,
        }
    }
}
