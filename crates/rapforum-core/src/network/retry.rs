//! Retry policy for timeouts and connectivity failures.
//!
//! Retries use a fixed backoff. The counter lives in a [`RetryState`] owned by
//! the request loop, so a request is resubmitted by iterating rather than by
//! re-entering itself.

use crate::config::NetworkConfig;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: NetworkConfig::MAX_RETRIES,
            delay: NetworkConfig::RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total attempts a request may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Per-request retry counter.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    retries: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// Retries performed so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Attempts made so far, counting the one in progress.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    pub fn can_retry(&self) -> bool {
        self.retries < self.policy.max_retries
    }

    /// Consume one retry. Returns the delay to wait, or `None` once the cap is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }
        self.retries += 1;
        Some(self.policy.delay)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
