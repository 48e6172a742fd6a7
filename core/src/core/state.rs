// recap/src/core/state.rs

//! The fixed set of states a recording's pipeline run moves through.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineState {
  PrepareInput,
  SubmitJob,
  WaitBeforePoll,
  PollJobStatus,
  FormatTranscript,
  InvokeModel,
  CheckModelStatus,
  DeliverResult,
  Success,
  Failure,
}

impl PipelineState {
  pub const INITIAL: PipelineState = PipelineState::PrepareInput;

  /// Every state, in pipeline order.
  pub const ALL: [PipelineState; 10] = [
    PipelineState::PrepareInput,
    PipelineState::SubmitJob,
    PipelineState::WaitBeforePoll,
    PipelineState::PollJobStatus,
    PipelineState::FormatTranscript,
    PipelineState::InvokeModel,
    PipelineState::CheckModelStatus,
    PipelineState::DeliverResult,
    PipelineState::Success,
    PipelineState::Failure,
  ];

  pub fn is_terminal(self) -> bool {
    matches!(self, PipelineState::Success | PipelineState::Failure)
  }

  pub fn name(self) -> &'static str {
    match self {
      PipelineState::PrepareInput => "PrepareInput",
      PipelineState::SubmitJob => "SubmitJob",
      PipelineState::WaitBeforePoll => "WaitBeforePoll",
      PipelineState::PollJobStatus => "PollJobStatus",
      PipelineState::FormatTranscript => "FormatTranscript",
      PipelineState::InvokeModel => "InvokeModel",
      PipelineState::CheckModelStatus => "CheckModelStatus",
      PipelineState::DeliverResult => "DeliverResult",
      PipelineState::Success => "Success",
      PipelineState::Failure => "Failure",
    }
  }
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
