// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Resilient Executor
//!
//! Exponential-backoff retry around a fallible async operation.
//!
//! Every attempt's error is classified through [`Classify`]:
//!
//! - **Transient** errors are retried after a growing, jittered wait until the
//!   policy's maximum elapsed time is used up. The last transient error is
//!   returned only once that deadline has passed.
//! - **Permanent** errors (conflicts, missing rows) and **fatal** errors
//!   (cancellation, corruption) are returned immediately.
//!
//! Cancellation of the caller's token aborts both a running attempt and a
//! pending wait, and surfaces as `E::cancelled()` rather than the last error.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default upper bound on total retry time for a single store call.
pub const DEFAULT_MAX_ELAPSED_TIME: Duration = Duration::from_secs(5);

/// Outcome class of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt (I/O hiccup, busy backend).
    Transient,
    /// Retrying cannot change the answer (conflict, not found).
    Permanent,
    /// Stop everything (cancellation, corruption).
    Fatal,
}

/// Errors the executor knows how to classify.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    /// The value returned when the caller's cancellation token fires.
    fn cancelled() -> Self;
}

/// Backoff shape plus total time budget, supplied per call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Jitter applied to each wait, as a fraction of the interval (0.0 disables).
    pub randomization_factor: f64,
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            randomization_factor: 0.5,
            max_elapsed_time: DEFAULT_MAX_ELAPSED_TIME,
        }
    }
}

impl RetryPolicy {
    /// A policy with no retry budget: the operation runs exactly once.
    pub fn none() -> Self {
        Self {
            max_elapsed_time: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Override the total time budget.
    pub fn with_max_elapsed_time(mut self, max_elapsed_time: Duration) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    /// Override the first wait.
    pub fn with_initial_interval(mut self, initial_interval: Duration) -> Self {
        self.initial_interval = initial_interval;
        self
    }

    /// Disable jitter, mostly useful for deterministic tests.
    pub fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max_interval)
    }

    fn jittered(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 || interval.is_zero() {
            return interval;
        }
        let delta = interval.as_secs_f64() * self.randomization_factor.min(1.0);
        let low = interval.as_secs_f64() - delta;
        let high = interval.as_secs_f64() + delta;
        Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
    }
}

/// Run `op` under `policy`, retrying transient failures.
///
/// The operation is always attempted at least once, even with a zero budget.
pub async fn retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let mut interval = policy.initial_interval;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(E::cancelled());
        }
        attempt += 1;

        let err = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(E::cancelled()),
            result = op() => match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            },
        };

        if err.class() != ErrorClass::Transient {
            return Err(err);
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.max_elapsed_time {
            tracing::warn!(attempts = attempt, error = %err, "retry budget exhausted");
            return Err(err);
        }

        let remaining = policy.max_elapsed_time - elapsed;
        let wait = policy.jittered(interval).min(remaining);
        tracing::debug!(
            attempt,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "transient failure, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(E::cancelled()),
            _ = tokio::time::sleep(wait) => {}
        }
        interval = policy.next_interval(interval);
    }
}
