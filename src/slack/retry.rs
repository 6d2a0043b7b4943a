//! Retry policy, failure classification and the shared rate gate

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use super::transport::RawFailure;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_JITTER: f64 = 0.2;
/// Wait used when Slack rate-limits without a Retry-After header.
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 60;

const AUTH_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "token_revoked",
    "token_expired",
    "account_inactive",
];

const RATE_LIMIT_CODES: &[&str] = &["ratelimited", "rate_limited"];

const TRANSIENT_CODES: &[&str] = &[
    "internal_error",
    "fatal_error",
    "service_unavailable",
    "request_timeout",
];

/// Where a raw failure sits in the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    RateLimited(Option<Duration>),
    Transient,
    Permanent,
}

pub fn classify(failure: &RawFailure) -> FailureKind {
    match failure {
        RawFailure::Network { .. } => FailureKind::Transient,
        RawFailure::Http {
            status,
            retry_after,
            ..
        } => match status {
            401 => FailureKind::Auth,
            429 => FailureKind::RateLimited(*retry_after),
            408 | 500..=599 => FailureKind::Transient,
            _ => FailureKind::Permanent,
        },
        RawFailure::Api { code, retry_after } => {
            let code = code.as_str();
            if AUTH_CODES.contains(&code) {
                FailureKind::Auth
            } else if RATE_LIMIT_CODES.contains(&code) {
                FailureKind::RateLimited(*retry_after)
            } else if TRANSIENT_CODES.contains(&code) {
                FailureKind::Transient
            } else {
                FailureKind::Permanent
            }
        }
    }
}

/// Backoff parameters for transient failures and rate limits.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts for a transient failure, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomly added or removed, 0.0 to disable.
    pub jitter: f64,
    pub rate_limit_fallback: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: DEFAULT_JITTER,
            rate_limit_fallback: Duration::from_secs(DEFAULT_RATE_LIMIT_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before retrying after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter <= 0.0 {
            return delay;
        }

        let jitter = self.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor).min(self.max_delay)
    }

    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.rate_limit_fallback)
    }
}

/// Pacing and rate-limit state shared by every worker using one client.
///
/// Calls start no closer together than `min_interval`, and a rate-limit
/// response holds every caller back until the mandated wait has passed.
pub struct RateGate {
    next_slot: Mutex<Instant>,
    min_interval: Duration,
    calls: AtomicU64,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            next_slot: Mutex::new(Instant::now()),
            min_interval,
            calls: AtomicU64::new(0),
        }
    }

    /// Wait for this caller's turn and count the call.
    pub async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if *next_slot > Instant::now() {
            sleep_until(*next_slot).await;
        }
        *next_slot = Instant::now() + self.min_interval;
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Block all callers for at least `wait` from now.
    pub async fn hold_for(&self, wait: Duration) {
        let mut next_slot = self.next_slot.lock().await;
        let until = Instant::now() + wait;
        if until > *next_slot {
            *next_slot = until;
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}
