// recap/src/journal.rs

//! Run-scoped persistence: a snapshot after every transition, enough to audit
//! the transition history and to resume one in-flight run.

use crate::core::context::RunContext;
use crate::core::run::{deadline_after, duration_millis, PipelineRun, RetryRecord, SourceLocator, TranscriptionJobHandle, TransitionRecord};
use crate::core::state::PipelineState;
use crate::error::{RecapResult, StepFailure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Serializable image of a `PipelineRun`.
///
/// The deadline is stored as the budget left at capture time, since a
/// monotonic instant means nothing to another process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
  pub run_id: String,
  pub source: SourceLocator,
  pub current_state: PipelineState,
  pub context: RunContext,
  pub job: Option<TranscriptionJobHandle>,
  pub started_at: DateTime<Utc>,
  #[serde(with = "duration_millis")]
  pub remaining: Duration,
  pub history: Vec<TransitionRecord>,
  pub retries: Vec<RetryRecord>,
  pub poll_cycles: u32,
  pub failure: Option<StepFailure>,
  pub notified: bool,
}

impl RunSnapshot {
  pub fn capture(run: &PipelineRun) -> Self {
    Self {
      run_id: run.run_id.clone(),
      source: run.source.clone(),
      current_state: run.current_state,
      context: run.context.clone(),
      job: run.job.clone(),
      started_at: run.started_at,
      remaining: run.remaining(),
      history: run.history.clone(),
      retries: run.retries.clone(),
      poll_cycles: run.poll_cycles,
      failure: run.failure.clone(),
      notified: run.notified,
    }
  }

  /// Rebuilds the run with its deadline `remaining` from now.
  pub fn into_run(self) -> PipelineRun {
    PipelineRun {
      run_id: self.run_id,
      source: self.source,
      current_state: self.current_state,
      context: self.context,
      job: self.job,
      started_at: self.started_at,
      deadline: deadline_after(self.remaining),
      history: self.history,
      retries: self.retries,
      poll_cycles: self.poll_cycles,
      failure: self.failure,
      notified: self.notified,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.current_state.is_terminal()
  }

  pub fn to_json(&self) -> RecapResult<String> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn from_json(raw: &str) -> RecapResult<Self> {
    Ok(serde_json::from_str(raw)?)
  }
}

/// Receives a snapshot after every transition of every run.
#[async_trait]
pub trait RunJournal: Send + Sync {
  async fn record(&self, snapshot: &RunSnapshot) -> RecapResult<()>;
}

/// Keeps the latest snapshot of each run in memory.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
  runs: Mutex<HashMap<String, RunSnapshot>>,
}

impl InMemoryJournal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn latest(&self, run_id: &str) -> Option<RunSnapshot> {
    self.runs.lock().get(run_id).cloned()
  }

  pub fn transitions(&self, run_id: &str) -> Vec<TransitionRecord> {
    self.runs.lock().get(run_id).map(|s| s.history.clone()).unwrap_or_default()
  }

  pub fn run_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.runs.lock().keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Runs whose latest snapshot is not terminal, i.e. candidates for resume.
  pub fn in_flight(&self) -> Vec<RunSnapshot> {
    self.runs.lock().values().filter(|s| !s.is_terminal()).cloned().collect()
  }
}

#[async_trait]
impl RunJournal for InMemoryJournal {
  async fn record(&self, snapshot: &RunSnapshot) -> RecapResult<()> {
    self.runs.lock().insert(snapshot.run_id.clone(), snapshot.clone());
    Ok(())
  }
}
