// recap/src/core/control.rs

//! Signals produced by evaluating a state, and the outcome of a whole run.

use crate::error::StepFailure;
use crate::units::{JobStatus, ModelStatus};
use std::fmt;

/// What a state evaluation reports back to the transition table.
///
/// Routing depends only on the current state and this value, so the same
/// `(state, signal)` pair always leads to the same next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
  /// The state's work finished successfully.
  Completed,
  /// The state's work failed; the failure becomes the run's cause if the
  /// table routes to `Failure`.
  Failed(StepFailure),
  /// Result of a job status poll.
  Job(JobStatus),
  /// Status field of the model's result.
  Model(ModelStatus),
}

impl Signal {
  /// Short label used in transition records and logs.
  pub fn label(&self) -> String {
    match self {
      Signal::Completed => "completed".to_string(),
      Signal::Failed(failure) => format!("failed:{}", failure.kind),
      Signal::Job(status) => format!("job:{status}"),
      Signal::Model(status) => format!("model:{status}"),
    }
  }
}

impl fmt::Display for Signal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.label())
  }
}

/// Terminal outcome of a run. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
  Succeeded,
  Failed(StepFailure),
}

impl RunOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, RunOutcome::Succeeded)
  }

  pub fn failure(&self) -> Option<&StepFailure> {
    match self {
      RunOutcome::Succeeded => None,
      RunOutcome::Failed(failure) => Some(failure),
    }
  }
}
