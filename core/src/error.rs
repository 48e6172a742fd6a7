// recap/src/error.rs
use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::state::PipelineState;

/// Framework-level faults. These describe a broken orchestrator setup or a
/// misuse of its API, never the failure of a recording's pipeline run (those
/// are `StepFailure` values and always end in the `Failure` state).
#[derive(Debug, Error)]
pub enum RecapError {
  #[error("Configuration error for '{field}': {message}")]
  Configuration { field: String, message: String },

  #[error("No transition from state {from} for signal '{signal}'")]
  NoTransition { from: PipelineState, signal: String },

  #[error("Context key '{key}' was already written by {owner}; {attempted_by} may not overwrite it")]
  ContextKeyConflict {
    key: String,
    owner: PipelineState,
    attempted_by: PipelineState,
  },

  #[error("Context key '{key}' is missing (required by {state})")]
  ContextKeyMissing { key: String, state: PipelineState },

  #[error("Run {run_id} already reached terminal state {state} and cannot be resumed")]
  RunAlreadyTerminal { run_id: String, state: PipelineState },

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Internal recap error: {0}")]
  Internal(String),
}

pub type RecapResult<T, E = RecapError> = std::result::Result<T, E>;

/// Classification of a failed step. The orchestrator is the only place that
/// reads this to decide between retrying and escalating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
  /// Malformed input to a step unit.
  Validation,
  /// Throttling, 5xx or a timed-out call.
  TransientService,
  /// The transcription job itself reported failure.
  JobFailed,
  /// The model returned a non-success status.
  ModelRejected,
  /// The run exhausted its absolute time budget.
  DeadlineExceeded,
  /// Delivery of the summary or of a notification failed.
  Delivery,
  /// Anything a collaborator did not classify, including panics.
  Unclassified,
}

impl ErrorKind {
  pub fn is_retryable(self) -> bool {
    matches!(self, ErrorKind::TransientService)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ErrorKind::Validation => "ValidationError",
      ErrorKind::TransientService => "TransientServiceError",
      ErrorKind::JobFailed => "JobFailedError",
      ErrorKind::ModelRejected => "ModelRejectedError",
      ErrorKind::DeadlineExceeded => "DeadlineExceededError",
      ErrorKind::Delivery => "DeliveryError",
      ErrorKind::Unclassified => "UnclassifiedError",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The `{ok: false, errorKind, message}` half of a step result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepFailure {
  pub kind: ErrorKind,
  pub message: String,
}

impl StepFailure {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Validation, message)
  }

  pub fn transient(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::TransientService, message)
  }

  pub fn delivery(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Delivery, message)
  }

  pub fn deadline(state: PipelineState) -> Self {
    Self::new(
      ErrorKind::DeadlineExceeded,
      format!("run deadline exceeded while in {state}"),
    )
  }

  pub fn is_retryable(&self) -> bool {
    self.kind.is_retryable()
  }
}

// Errors nobody classified fail closed.
impl From<AnyhowError> for StepFailure {
  fn from(err: AnyhowError) -> Self {
    if let Some(step_failure) = err.downcast_ref::<StepFailure>() {
      return step_failure.clone();
    }
    StepFailure::new(ErrorKind::Unclassified, format!("{err:#}"))
  }
}

// A framework fault inside a state (a missing or conflicting context key)
// ends the run like any other unclassified failure.
impl From<RecapError> for StepFailure {
  fn from(err: RecapError) -> Self {
    StepFailure::new(ErrorKind::Unclassified, err.to_string())
  }
}

/// Result shape returned by every step unit and client call.
pub type StepResult<T> = std::result::Result<T, StepFailure>;
