// demos/summary_worker/src/main.rs

// Declare modules for the application
mod config;
mod errors;
mod services;

use crate::config::AppConfig;
use crate::errors::{AppError, Result as AppResult};
use crate::services::{MockModel, MockNotifier, MockTranscribeService, MockTranscriptFormatter};

use chrono::Utc;
use futures_util::future::join_all;
use recap::{Collaborators, Dispatcher, InMemoryJournal, Orchestrator, RunHandle, RunOutcome, TriggerEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan; // For span events in tracing

/// One line of the worker's stdout, written when a run ends.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
  run_id: String,
  source: String,
  outcome: &'static str,
  error_kind: Option<String>,
  error: Option<String>,
  path: Vec<String>,
}

// Main function
#[tokio::main]
async fn main() -> AppResult<()> {
  dotenvy::dotenv().ok();

  // Initialize tracing subscriber for logging (RUST_LOG overrides the level)
  let subscriber = tracing_subscriber::fmt()
    .with_max_level(Level::INFO) // Default level
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE) // Log when spans close, showing duration
    .with_writer(std::io::stderr); // stdout carries the run reports
  if config::json_logs_requested() {
    subscriber.json().init();
  } else {
    subscriber.init();
  }

  tracing::info!("Starting recording summary worker...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(e);
    }
  };

  let units = Collaborators::with_defaults(
    MockTranscribeService::new(app_config.mock_job_polls, app_config.mock_throttle_percent),
    MockTranscriptFormatter,
    MockModel,
    MockNotifier {
      recipient: app_config.notify_recipient.clone(),
    },
  );
  let journal = Arc::new(InMemoryJournal::new());
  let orchestrator = Orchestrator::new(app_config.orchestrator.clone(), units)?.with_journal(journal.clone());
  let dispatcher = Dispatcher::new(Arc::new(orchestrator));
  tracing::info!(
    prefix = %app_config.orchestrator.trigger_prefix,
    "Reading object notifications (JSON) or object keys from stdin, one per line."
  );

  let mut handles: Vec<RunHandle> = Vec::new();
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines.next_line().await? {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let event = match parse_event(line, &app_config.default_bucket) {
      Ok(event) => event,
      Err(e) => {
        tracing::warn!(error = %e, "Skipping unreadable input line.");
        continue;
      }
    };
    match dispatcher.dispatch(event) {
      Some(handle) => handles.push(handle),
      None => tracing::info!(input = %line, "Object ignored by the trigger filter."),
    }
  }

  tracing::info!(runs = handles.len(), "Input closed; waiting for in-flight runs.");
  let mut failed = 0usize;
  for report in join_all(handles.into_iter().map(finish)).await {
    let report = report?;
    if report.outcome != "Succeeded" {
      failed += 1;
    }
    println!("{}", serde_json::to_string(&report).map_err(|e| AppError::Internal(e.to_string()))?);
  }

  tracing::info!(failed, journaled = journal.run_ids().len(), "All runs finished.");
  Ok(())
}

fn parse_event(line: &str, default_bucket: &str) -> AppResult<TriggerEvent> {
  if line.starts_with('{') {
    TriggerEvent::from_notification_json(line).map_err(|e| AppError::InvalidEvent(e.to_string()))
  } else {
    Ok(TriggerEvent::new(default_bucket, line, Utc::now()))
  }
}

async fn finish(handle: RunHandle) -> AppResult<RunReport> {
  let run = handle.run.clone();
  let outcome = handle.outcome().await?;
  let record = run.cloned();
  let path = record.path().iter().map(|s| s.to_string()).collect();
  let (error_kind, error) = match &outcome {
    RunOutcome::Succeeded => (None, None),
    RunOutcome::Failed(failure) => (Some(failure.kind.to_string()), Some(failure.message.clone())),
  };
  Ok(RunReport {
    run_id: record.run_id,
    source: record.source.to_string(),
    outcome: if outcome.is_success() { "Succeeded" } else { "Failed" },
    error_kind,
    error,
    path,
  })
}
