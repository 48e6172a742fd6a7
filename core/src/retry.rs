// recap/src/retry.rs

//! Bounded retry with exponential backoff and jitter for transient failures.
//!
//! The retry budget (attempt count and cumulative time) is enforced on its
//! own, independently of the run deadline. A backoff that would end past the
//! run deadline is not slept; the call fails with `DeadlineExceeded` instead.

use crate::error::{ErrorKind, StepFailure, StepResult};
use rand_core::{OsRng, RngCore};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{event, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
  /// Sleep exactly the computed backoff.
  None,
  /// Sleep a random duration in `[backoff / 2, backoff]`.
  Equal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Total attempts, the first one included.
  pub max_attempts: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
  pub multiplier: f64,
  /// Cumulative time budget across all attempts of one call.
  pub max_elapsed: Duration,
  pub jitter: Jitter,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 4,
      initial_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
      multiplier: 2.0,
      max_elapsed: Duration::from_secs(5 * 60),
      jitter: Jitter::Equal,
    }
  }
}

impl RetryPolicy {
  /// Policy for call sites that are not marked retryable.
  pub fn no_retry() -> Self {
    Self {
      max_attempts: 1,
      ..Self::default()
    }
  }

  /// Backoff before retry number `retry_index` (0 for the first retry), before jitter.
  pub fn backoff(&self, retry_index: u32) -> Duration {
    let factor = self.multiplier.max(1.0).powi(i32::try_from(retry_index).unwrap_or(i32::MAX));
    let millis = self.initial_delay.as_millis() as f64 * factor;
    let capped = millis.min(self.max_delay.as_millis() as f64);
    Duration::from_millis(capped as u64)
  }

  pub fn delay_for(&self, retry_index: u32) -> Duration {
    let backoff = self.backoff(retry_index);
    match self.jitter {
      Jitter::None => backoff,
      Jitter::Equal => {
        let half = backoff / 2;
        let spread = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
        if spread == 0 {
          return backoff;
        }
        half + Duration::from_millis(OsRng.next_u64() % (spread + 1))
      }
    }
  }
}

/// A failed attempt that is about to be retried.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
  pub attempt: u32,
  pub failure: StepFailure,
  pub delay: Duration,
}

/// Runs `op` until it succeeds, fails non-transiently, or the retry budget
/// or the run `deadline` runs out. `op` receives the 1-based attempt number.
/// `on_retry` is told about every attempt that will be retried.
pub async fn retry_transient<T, F, Fut>(
  policy: &RetryPolicy,
  deadline: Instant,
  mut on_retry: impl FnMut(&RetryAttempt),
  mut op: F,
) -> StepResult<T>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = StepResult<T>>,
{
  let started = Instant::now();
  let mut attempt: u32 = 1;
  loop {
    let failure = match op(attempt).await {
      Ok(value) => return Ok(value),
      Err(failure) if !failure.is_retryable() => return Err(failure),
      Err(failure) => failure,
    };

    if attempt >= policy.max_attempts {
      event!(Level::WARN, attempt, error = %failure, "Retry attempts exhausted.");
      return Err(StepFailure::new(
        failure.kind,
        format!("{} (gave up after {} attempts)", failure.message, attempt),
      ));
    }

    let delay = policy.delay_for(attempt - 1);
    let wake_at = Instant::now().checked_add(delay).unwrap_or(deadline);
    if wake_at.duration_since(started) > policy.max_elapsed {
      event!(Level::WARN, attempt, error = %failure, "Retry time budget exhausted.");
      return Err(StepFailure::new(
        failure.kind,
        format!("{} (retry budget of {:?} exhausted)", failure.message, policy.max_elapsed),
      ));
    }
    if wake_at >= deadline {
      event!(Level::WARN, attempt, error = %failure, "Backoff would outlast the run deadline.");
      return Err(StepFailure::new(
        ErrorKind::DeadlineExceeded,
        format!("run deadline reached while retrying: {}", failure.message),
      ));
    }

    let retry = RetryAttempt {
      attempt,
      failure,
      delay,
    };
    event!(Level::INFO, attempt, delay_ms = delay.as_millis() as u64, error = %retry.failure, "Transient failure, retrying.");
    on_retry(&retry);
    sleep_until(wake_at).await;
    attempt += 1;
  }
}
