// recap/src/pipeline/definition.rs

//! The fixed pipeline topology as an explicit transition table.
//!
//! Every edge is `(from, guard, to)`. Edges leaving a state are tried in
//! order and the first guard that matches the evaluation's `Signal` wins.

use crate::core::control::Signal;
use crate::core::state::PipelineState;
use crate::error::{RecapError, RecapResult};
use crate::units::{JobStatus, ModelStatus};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

use crate::core::state::PipelineState::*;

/// Predicate over the signal a state evaluation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
  /// The state's work succeeded.
  Completed,
  /// The state's work failed, whatever the kind.
  AnyFailure,
  JobCompleted,
  JobFailed,
  /// Submitted, in progress, or a status code nobody recognises.
  JobPending,
  ModelSucceeded,
  ModelNotSucceeded,
}

impl Guard {
  pub fn matches(self, signal: &Signal) -> bool {
    match (self, signal) {
      (Guard::Completed, Signal::Completed) => true,
      (Guard::AnyFailure, Signal::Failed(_)) => true,
      (Guard::JobCompleted, Signal::Job(JobStatus::Completed)) => true,
      (Guard::JobFailed, Signal::Job(JobStatus::Failed)) => true,
      (Guard::JobPending, Signal::Job(status)) => !status.is_finished(),
      (Guard::ModelSucceeded, Signal::Model(ModelStatus::Succeeded)) => true,
      (Guard::ModelNotSucceeded, Signal::Model(status)) => *status != ModelStatus::Succeeded,
      _ => false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub from: PipelineState,
  pub guard: Guard,
  pub to: PipelineState,
}

impl Transition {
  pub const fn new(from: PipelineState, guard: Guard, to: PipelineState) -> Self {
    Self { from, guard, to }
  }
}

impl fmt::Display for Transition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} --[{:?}]--> {}", self.from, self.guard, self.to)
  }
}

/// The one pipeline topology this crate runs.
pub const PIPELINE_TRANSITIONS: &[Transition] = &[
  Transition::new(PrepareInput, Guard::Completed, SubmitJob),
  Transition::new(PrepareInput, Guard::AnyFailure, Failure),
  Transition::new(SubmitJob, Guard::Completed, WaitBeforePoll),
  Transition::new(SubmitJob, Guard::AnyFailure, Failure),
  Transition::new(WaitBeforePoll, Guard::Completed, PollJobStatus),
  Transition::new(WaitBeforePoll, Guard::AnyFailure, Failure),
  Transition::new(PollJobStatus, Guard::JobCompleted, FormatTranscript),
  Transition::new(PollJobStatus, Guard::JobFailed, Failure),
  Transition::new(PollJobStatus, Guard::JobPending, WaitBeforePoll),
  Transition::new(PollJobStatus, Guard::AnyFailure, Failure),
  Transition::new(FormatTranscript, Guard::Completed, InvokeModel),
  Transition::new(FormatTranscript, Guard::AnyFailure, Failure),
  Transition::new(InvokeModel, Guard::Completed, CheckModelStatus),
  Transition::new(InvokeModel, Guard::AnyFailure, Failure),
  Transition::new(CheckModelStatus, Guard::ModelSucceeded, DeliverResult),
  Transition::new(CheckModelStatus, Guard::ModelNotSucceeded, Failure),
  Transition::new(CheckModelStatus, Guard::AnyFailure, Failure),
  Transition::new(DeliverResult, Guard::Completed, Success),
  Transition::new(DeliverResult, Guard::AnyFailure, Failure),
];

/// Immutable once built; shared by every run of an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
  transitions: Vec<Transition>,
}

impl TransitionTable {
  /// The fixed pipeline table.
  pub fn pipeline() -> Self {
    Self {
      transitions: PIPELINE_TRANSITIONS.to_vec(),
    }
  }

  /// A table from arbitrary edges. Call `validate` before running with it.
  pub fn from_transitions(transitions: Vec<Transition>) -> Self {
    Self { transitions }
  }

  pub fn transitions(&self) -> &[Transition] {
    &self.transitions
  }

  pub fn edges_from(&self, state: PipelineState) -> impl Iterator<Item = &Transition> {
    self.transitions.iter().filter(move |t| t.from == state)
  }

  /// Next state for `signal` evaluated in `from`.
  pub fn next(&self, from: PipelineState, signal: &Signal) -> RecapResult<PipelineState> {
    self
      .edges_from(from)
      .find(|t| t.guard.matches(signal))
      .map(|t| t.to)
      .ok_or_else(|| RecapError::NoTransition {
        from,
        signal: signal.label(),
      })
  }

  /// Checks the structural rules every table must satisfy:
  /// terminal states have no outgoing edges, every other state has an edge
  /// and a failure edge into `Failure`, no state repeats a guard, and both
  /// terminal states are reachable from the initial state.
  pub fn validate(&self) -> RecapResult<()> {
    let invalid = |message: String| RecapError::Configuration {
      field: "transition_table".to_string(),
      message,
    };

    for state in PipelineState::ALL {
      let edges: Vec<&Transition> = self.edges_from(state).collect();
      if state.is_terminal() {
        if let Some(edge) = edges.first() {
          return Err(invalid(format!("terminal state has an outgoing edge: {edge}")));
        }
        continue;
      }
      if edges.is_empty() {
        return Err(invalid(format!("{state} has no outgoing edges")));
      }
      if !edges.iter().any(|t| t.guard == Guard::AnyFailure && t.to == Failure) {
        return Err(invalid(format!("{state} has no failure edge into Failure")));
      }
      let mut guards = HashSet::new();
      for edge in &edges {
        if !guards.insert(edge.guard) {
          return Err(invalid(format!("{state} repeats guard {:?}", edge.guard)));
        }
      }
    }

    let reachable = self.reachable_from(PipelineState::INITIAL);
    for terminal in [Success, Failure] {
      if !reachable.contains(&terminal) {
        return Err(invalid(format!("{terminal} is not reachable from {}", PipelineState::INITIAL)));
      }
    }
    Ok(())
  }

  pub fn reachable_from(&self, start: PipelineState) -> BTreeSet<PipelineState> {
    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(state) = queue.pop_front() {
      for edge in self.edges_from(state) {
        if seen.insert(edge.to) {
          queue.push_back(edge.to);
        }
      }
    }
    seen
  }
}

impl Default for TransitionTable {
  fn default() -> Self {
    Self::pipeline()
  }
}
