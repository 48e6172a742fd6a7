// recap/src/core/run.rs

//! The `PipelineRun` record: one execution for one arrived recording.

use crate::core::context::RunContext;
use crate::core::control::Signal;
use crate::core::state::PipelineState;
use crate::error::{ErrorKind, RecapError, RecapResult, StepFailure};
use crate::units::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Longest time budget a run may carry. Larger budgets are clamped to it.
pub const MAX_RUN_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Absolute deadline `budget` from now, clamped to `MAX_RUN_TIMEOUT`.
pub(crate) fn deadline_after(budget: Duration) -> Instant {
  Instant::now() + budget.min(MAX_RUN_TIMEOUT)
}

/// Identifies the recording a run works on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocator {
  pub bucket: String,
  pub key: String,
  /// Arrival time of the object; the date-qualified file name is built from it.
  pub event_time: DateTime<Utc>,
}

impl SourceLocator {
  pub fn new(bucket: impl Into<String>, key: impl Into<String>, event_time: DateTime<Utc>) -> Self {
    Self {
      bucket: bucket.into(),
      key: key.into(),
      event_time,
    }
  }

  pub fn media_uri(&self) -> String {
    format!("s3://{}/{}", self.bucket, self.key)
  }
}

impl fmt::Display for SourceLocator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.bucket, self.key)
  }
}

/// The external transcription job as last observed by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionJobHandle {
  pub job_name: String,
  pub status: JobStatus,
  /// Only meaningful once `status` is `Completed`.
  pub output_locator: Option<String>,
  pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
  pub from: PipelineState,
  pub to: PipelineState,
  pub signal: String,
  pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecord {
  pub state: PipelineState,
  /// 1-based number of the attempt that failed.
  pub attempt: u32,
  pub kind: ErrorKind,
  pub message: String,
  #[serde(with = "duration_millis")]
  pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
  pub run_id: String,
  pub source: SourceLocator,
  pub current_state: PipelineState,
  pub context: RunContext,
  pub job: Option<TranscriptionJobHandle>,
  pub started_at: DateTime<Utc>,
  pub deadline: Instant,
  pub history: Vec<TransitionRecord>,
  pub retries: Vec<RetryRecord>,
  pub poll_cycles: u32,
  /// Proximate cause, set when the run is routed to `Failure`.
  pub failure: Option<StepFailure>,
  /// Set once the failure notification was attempted.
  pub notified: bool,
}

impl PipelineRun {
  /// A fresh run in the initial state whose deadline is `timeout` from now.
  pub fn new(run_id: impl Into<String>, source: SourceLocator, timeout: Duration) -> Self {
    Self {
      run_id: run_id.into(),
      source,
      current_state: PipelineState::INITIAL,
      context: RunContext::new(),
      job: None,
      started_at: Utc::now(),
      deadline: deadline_after(timeout),
      history: Vec::new(),
      retries: Vec::new(),
      poll_cycles: 0,
      failure: None,
      notified: false,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.current_state.is_terminal()
  }

  pub fn is_past_deadline(&self) -> bool {
    Instant::now() >= self.deadline
  }

  pub fn remaining(&self) -> Duration {
    self.deadline.saturating_duration_since(Instant::now())
  }

  /// Moves the run to `to`. A terminal run never moves again.
  pub fn transition(&mut self, to: PipelineState, signal: &Signal) -> RecapResult<()> {
    if self.current_state.is_terminal() {
      return Err(RecapError::RunAlreadyTerminal {
        run_id: self.run_id.clone(),
        state: self.current_state,
      });
    }
    self.history.push(TransitionRecord {
      from: self.current_state,
      to,
      signal: signal.label(),
      at: Utc::now(),
    });
    self.current_state = to;
    Ok(())
  }

  /// Number of times the run entered `state`, counting the initial state.
  pub fn visits(&self, state: PipelineState) -> usize {
    let initial = usize::from(state == PipelineState::INITIAL);
    initial + self.history.iter().filter(|t| t.to == state).count()
  }

  pub fn retries_in(&self, state: PipelineState) -> usize {
    self.retries.iter().filter(|r| r.state == state).count()
  }

  /// Sequence of states visited, starting with the initial state.
  pub fn path(&self) -> Vec<PipelineState> {
    let mut path = Vec::with_capacity(self.history.len() + 1);
    path.push(self.history.first().map_or(self.current_state, |t| t.from));
    path.extend(self.history.iter().map(|t| t.to));
    path
  }
}

pub(crate) mod duration_millis {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(deserializer)?))
  }
}
