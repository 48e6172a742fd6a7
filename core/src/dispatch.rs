// recap/src/dispatch.rs

//! Turns object-arrival events into independent pipeline runs.
//!
//! Every accepted event gets a fresh run id and its own tokio task; runs
//! share the `Orchestrator` read-only and nothing else.

use crate::core::control::RunOutcome;
use crate::core::run::SourceLocator;
use crate::core::shared_run::SharedRun;
use crate::error::{RecapError, RecapResult};
use crate::pipeline::execution::Orchestrator;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{event, instrument, Level};
use uuid::Uuid;

/// A new object in the watched store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
  pub bucket: String,
  pub key: String,
  pub event_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Notification {
  detail: NotificationDetail,
  time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct NotificationDetail {
  bucket: NamedBucket,
  object: NamedObject,
}

#[derive(Deserialize)]
struct NamedBucket {
  name: String,
}

#[derive(Deserialize)]
struct NamedObject {
  key: String,
}

impl TriggerEvent {
  pub fn new(bucket: impl Into<String>, key: impl Into<String>, event_time: DateTime<Utc>) -> Self {
    Self {
      bucket: bucket.into(),
      key: key.into(),
      event_time,
    }
  }

  /// Parses an "Object Created" notification:
  /// `{"time": ..., "detail": {"bucket": {"name": ...}, "object": {"key": ...}}}`.
  /// A missing `time` means the event arrived now.
  pub fn from_notification_json(raw: &str) -> RecapResult<Self> {
    let notification: Notification = serde_json::from_str(raw)?;
    Ok(Self {
      bucket: notification.detail.bucket.name,
      key: notification.detail.object.key,
      event_time: notification.time.unwrap_or_else(Utc::now),
    })
  }

  pub fn source(&self) -> SourceLocator {
    SourceLocator::new(self.bucket.clone(), self.key.clone(), self.event_time)
  }
}

/// A run started by the dispatcher.
#[derive(Debug)]
pub struct RunHandle {
  pub run_id: String,
  /// Live view of the run while it executes.
  pub run: SharedRun,
  join: JoinHandle<RunOutcome>,
}

impl RunHandle {
  /// Waits for the run to reach a terminal state.
  pub async fn outcome(self) -> RecapResult<RunOutcome> {
    self
      .join
      .await
      .map_err(|e| RecapError::Internal(format!("run task {} did not complete: {e}", self.run_id)))
  }
}

/// Removes a run from the active map when its task ends, however it ends.
struct ActiveEntry {
  active: Arc<Mutex<HashMap<String, SharedRun>>>,
  run_id: String,
}

impl Drop for ActiveEntry {
  fn drop(&mut self) {
    self.active.lock().remove(&self.run_id);
  }
}

/// Starts one run per accepted trigger event.
pub struct Dispatcher {
  orchestrator: Arc<Orchestrator>,
  active: Arc<Mutex<HashMap<String, SharedRun>>>,
}

impl Dispatcher {
  pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
    Self {
      orchestrator,
      active: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn orchestrator(&self) -> &Arc<Orchestrator> {
    &self.orchestrator
  }

  /// Objects outside the trigger prefix, and folder placeholders, are ignored.
  pub fn accepts(&self, event: &TriggerEvent) -> bool {
    event.key.starts_with(&self.orchestrator.config().trigger_prefix) && !event.key.ends_with('/')
  }

  /// Spawns a run for `event` on the current tokio runtime.
  /// Returns `None` if the event is filtered out.
  #[instrument(name = "Dispatcher::dispatch", skip_all, fields(bucket = %event.bucket, key = %event.key))]
  pub fn dispatch(&self, event: TriggerEvent) -> Option<RunHandle> {
    if !self.accepts(&event) {
      event!(Level::DEBUG, "Event outside the trigger prefix; ignored.");
      return None;
    }

    let run_id = Uuid::new_v4().to_string();
    let run = self.orchestrator.new_run(run_id.clone(), event.source());
    self.active.lock().insert(run_id.clone(), run.clone());
    event!(Level::INFO, %run_id, "Dispatching pipeline run.");

    let orchestrator = Arc::clone(&self.orchestrator);
    let entry = ActiveEntry {
      active: Arc::clone(&self.active),
      run_id: run_id.clone(),
    };
    let task_run = run.clone();
    let join = tokio::spawn(async move {
      let _entry = entry;
      orchestrator.run(task_run).await
    });

    Some(RunHandle { run_id, run, join })
  }

  /// Ids of runs that have not reached a terminal state yet.
  pub fn active_runs(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.active.lock().keys().cloned().collect();
    ids.sort();
    ids
  }

  pub fn active_run(&self, run_id: &str) -> Option<SharedRun> {
    self.active.lock().get(run_id).cloned()
  }
}
