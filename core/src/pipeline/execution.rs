// recap/src/pipeline/execution.rs

//! Contains the `Orchestrator` and its run loop: evaluate the current state,
//! route the resulting signal through the transition table, record the move,
//! and repeat until a terminal state is reached.

use crate::config::OrchestratorConfig;
use crate::core::context::keys;
use crate::core::control::{RunOutcome, Signal};
use crate::core::run::{PipelineRun, SourceLocator};
use crate::core::shared_run::SharedRun;
use crate::core::state::PipelineState;
use crate::error::{ErrorKind, RecapError, RecapResult, StepFailure};
use crate::journal::{RunJournal, RunSnapshot};
use crate::pipeline::definition::TransitionTable;
use crate::units::{Collaborators, FailureReport, JobStatus, ModelSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{event, instrument, span, Instrument, Level};

/// Upper bound on a single failure notification attempt. The run deadline has
/// usually passed by then, so the notifier gets its own budget.
const FAILURE_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives pipeline runs through the transition table.
///
/// One orchestrator is shared by every run it drives; each run owns its own
/// `SharedRun` record and nothing else is mutated across runs.
pub struct Orchestrator {
  pub(crate) config: Arc<OrchestratorConfig>,
  table: TransitionTable,
  pub(crate) units: Collaborators,
  journal: Option<Arc<dyn RunJournal>>,
}

impl Orchestrator {
  /// Validates `config` and the fixed pipeline table.
  pub fn new(config: OrchestratorConfig, units: Collaborators) -> RecapResult<Self> {
    Self::with_table(config, units, TransitionTable::pipeline())
  }

  /// Same as `new` with a caller-provided table, which must pass `validate`.
  pub fn with_table(config: OrchestratorConfig, units: Collaborators, table: TransitionTable) -> RecapResult<Self> {
    config.validate()?;
    table.validate()?;
    event!(Level::DEBUG, transitions = table.transitions().len(), "Orchestrator created.");
    Ok(Self {
      config: Arc::new(config),
      table,
      units,
      journal: None,
    })
  }

  /// Records a snapshot into `journal` after every transition.
  pub fn with_journal(mut self, journal: Arc<dyn RunJournal>) -> Self {
    self.journal = Some(journal);
    self
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  pub fn table(&self) -> &TransitionTable {
    &self.table
  }

  /// A fresh run record for `source`, with the deadline starting now.
  pub fn new_run(&self, run_id: impl Into<String>, source: SourceLocator) -> SharedRun {
    SharedRun::new(PipelineRun::new(run_id, source, self.config.run_timeout))
  }

  /// Creates a run for `source` and drives it to completion.
  pub async fn start(&self, run_id: impl Into<String>, source: SourceLocator) -> (SharedRun, RunOutcome) {
    let run = self.new_run(run_id, source);
    let outcome = self.run(run.clone()).await;
    (run, outcome)
  }

  /// Continues a journaled run from its recorded state.
  ///
  /// The run keeps its context, history and retry records, and gets the
  /// time budget that was left when the snapshot was taken.
  pub async fn resume(&self, snapshot: RunSnapshot) -> RecapResult<(SharedRun, RunOutcome)> {
    if snapshot.is_terminal() {
      return Err(RecapError::RunAlreadyTerminal {
        run_id: snapshot.run_id,
        state: snapshot.current_state,
      });
    }
    event!(Level::INFO, run_id = %snapshot.run_id, state = %snapshot.current_state, "Resuming run.");
    let run = SharedRun::new(snapshot.into_run());
    let outcome = self.run(run.clone()).await;
    Ok((run, outcome))
  }

  /// Drives `run` from its current state until it is terminal.
  ///
  /// Never returns early: every failure a state produces is routed to the
  /// `Failure` state, escalated, and reported through the outcome.
  #[instrument(
    name = "Orchestrator::run",
    skip_all,
    fields(run_id = %run.run_id())
  )]
  pub async fn run(&self, run: SharedRun) -> RunOutcome {
    {
      let guard = run.read();
      event!(Level::INFO, source = %guard.source, state = %guard.current_state, "Pipeline run starting.");
    }
    self.journal(&run).await;

    loop {
      let (state, deadline) = {
        let guard = run.read();
        (guard.current_state, guard.deadline)
      };

      match state {
        PipelineState::Success => {
          event!(Level::INFO, "Pipeline run succeeded.");
          return RunOutcome::Succeeded;
        }
        PipelineState::Failure => {
          let failure = self.escalate(&run).await;
          return RunOutcome::Failed(failure);
        }
        _ => {}
      }

      let state_span = span!(Level::INFO, "pipeline_state", state = state.name());
      let signal = async {
        event!(Level::DEBUG, "Evaluating state.");
        if Instant::now() >= deadline {
          return Signal::Failed(StepFailure::deadline(state));
        }
        match timeout_at(deadline, self.evaluate(state, &run)).await {
          Ok(signal) => signal,
          Err(_) => {
            event!(Level::WARN, "Run deadline reached during state evaluation.");
            Signal::Failed(StepFailure::deadline(state))
          }
        }
      }
      .instrument(state_span)
      .await;

      self.advance(&run, state, signal).await;
    }
  }

  /// Applies the table to `signal` and records the transition.
  async fn advance(&self, run: &SharedRun, from: PipelineState, signal: Signal) {
    let (next, unrouted) = match self.table.next(from, &signal) {
      Ok(next) => (next, None),
      Err(e) => {
        event!(Level::ERROR, error = %e, "Signal has no transition; failing the run.");
        (PipelineState::Failure, Some(StepFailure::from(e)))
      }
    };

    {
      let mut guard = run.write();
      if next == PipelineState::Failure && guard.failure.is_none() {
        let cause = unrouted.unwrap_or_else(|| failure_cause(&guard, from, &signal));
        event!(Level::WARN, kind = %cause.kind, error = %cause.message, "Run routed to Failure.");
        guard.failure = Some(cause);
      }
      if let Err(e) = guard.transition(next, &signal) {
        event!(Level::ERROR, error = %e, "Transition rejected.");
        return;
      }
    }
    event!(Level::INFO, %from, to = %next, signal = %signal, "Transition.");
    self.journal(run).await;
  }

  /// Runs once per run on entering `Failure`: builds the failure report and
  /// sends it through the notifier unless that was already attempted.
  async fn escalate(&self, run: &SharedRun) -> StepFailure {
    let (failure, report, already_notified) = {
      let mut guard = run.write();
      let failure = guard
        .failure
        .clone()
        .unwrap_or_else(|| StepFailure::new(ErrorKind::Unclassified, "run failed without a recorded cause"));
      let failed_state = guard.history.last().map_or(guard.current_state, |t| t.from);
      let report = FailureReport {
        run_id: guard.run_id.clone(),
        error_kind: failure.kind,
        error_detail: failure.message.clone(),
        failed_state,
        link_to_run_history: self.config.run_history_link(&guard.run_id),
      };
      if !guard.context.contains(keys::FAILURE_REPORT) {
        if let Err(e) = guard.context.insert(keys::FAILURE_REPORT, PipelineState::Failure, &report) {
          event!(Level::ERROR, error = %e, "Could not record the failure report.");
        }
      }
      let already_notified = guard.notified;
      guard.notified = true;
      (failure, report, already_notified)
    };

    if already_notified {
      event!(Level::DEBUG, "Failure notification already attempted; not sending again.");
    } else {
      let message = report.to_message();
      let subject = report.subject();
      let sent = timeout(
        FAILURE_NOTIFICATION_TIMEOUT,
        super::handlers::guarded(self.units.notifier.send(&message, Some(&subject))),
      )
      .await;
      match sent {
        Ok(Ok(receipt)) => {
          event!(Level::INFO, message_id = %receipt.message_id, "Failure notification sent.");
        }
        Ok(Err(e)) => {
          event!(Level::ERROR, kind = %ErrorKind::Delivery, error = %e, "Failure notification could not be delivered.");
        }
        Err(_) => {
          event!(Level::ERROR, kind = %ErrorKind::Delivery, "Failure notification timed out.");
        }
      }
    }

    self.journal(run).await;
    event!(Level::WARN, kind = %failure.kind, error = %failure.message, failed_state = %report.failed_state, "Pipeline run failed.");
    failure
  }

  async fn journal(&self, run: &SharedRun) {
    let Some(journal) = &self.journal else {
      return;
    };
    let snapshot = RunSnapshot::capture(&run.read());
    if let Err(e) = journal.record(&snapshot).await {
      event!(Level::ERROR, error = %e, "Could not journal run snapshot.");
    }
  }
}

/// Proximate cause of a move into `Failure`.
fn failure_cause(run: &PipelineRun, from: PipelineState, signal: &Signal) -> StepFailure {
  match signal {
    Signal::Failed(failure) => failure.clone(),
    Signal::Job(JobStatus::Failed) => {
      let reason = run.job.as_ref().and_then(|job| job.failure_reason.clone());
      let job_name = run.job.as_ref().map_or("<unknown>", |job| job.job_name.as_str());
      StepFailure::new(
        ErrorKind::JobFailed,
        reason.unwrap_or_else(|| format!("transcription job {job_name} reported FAILED")),
      )
    }
    Signal::Model(status) => {
      let error = run
        .context
        .get::<ModelSummary>(keys::SUMMARY)
        .ok()
        .flatten()
        .and_then(|summary| summary.error);
      StepFailure::new(
        ErrorKind::ModelRejected,
        error.unwrap_or_else(|| format!("model returned status {status}")),
      )
    }
    other => StepFailure::new(
      ErrorKind::Unclassified,
      format!("{from} routed signal '{other}' to Failure"),
    ),
  }
}
