// recap/src/core/context.rs

//! Append-only key/value store accumulated by a run.
//!
//! Each completed state writes its results under its own keys. A key, once
//! written, is never replaced, so any later state can read the result of
//! every earlier state and know which state produced it.

use crate::core::state::PipelineState;
use crate::error::{RecapError, RecapResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known keys, one owner each.
pub mod keys {
  /// `PreparedInput`, written by PrepareInput.
  pub const SOURCE: &str = "source";
  /// The deterministic job name, written by PrepareInput.
  pub const JOB_NAME: &str = "job_name";
  /// `SubmittedJob`, written by SubmitJob.
  pub const SUBMISSION: &str = "submission";
  /// Output locator of the completed job, written by PollJobStatus.
  pub const TRANSCRIPTION_OUTPUT: &str = "transcription_output";
  /// `FormattedTranscript`, written by FormatTranscript.
  pub const TRANSCRIPT: &str = "transcript";
  /// `ModelSummary`, written by InvokeModel.
  pub const SUMMARY: &str = "summary";
  /// `DeliveryReceipt`, written by DeliverResult.
  pub const DELIVERY: &str = "delivery";
  /// `FailureReport`, written by Failure.
  pub const FAILURE_REPORT: &str = "failure_report";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
  pub written_by: PipelineState,
  pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
  entries: BTreeMap<String, ContextEntry>,
}

impl RunContext {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds `key`. Fails if any state already wrote it, including `writer`.
  pub fn insert<T: Serialize>(&mut self, key: &str, writer: PipelineState, value: &T) -> RecapResult<()> {
    if let Some(existing) = self.entries.get(key) {
      return Err(RecapError::ContextKeyConflict {
        key: key.to_string(),
        owner: existing.written_by,
        attempted_by: writer,
      });
    }
    let value = serde_json::to_value(value)?;
    self.entries.insert(
      key.to_string(),
      ContextEntry {
        written_by: writer,
        value,
      },
    );
    Ok(())
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.contains_key(key)
  }

  pub fn entry(&self, key: &str) -> Option<&ContextEntry> {
    self.entries.get(key)
  }

  pub fn owner_of(&self, key: &str) -> Option<PipelineState> {
    self.entries.get(key).map(|e| e.written_by)
  }

  /// Typed read. `Ok(None)` when the key was never written.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> RecapResult<Option<T>> {
    match self.entries.get(key) {
      Some(entry) => Ok(Some(serde_json::from_value(entry.value.clone())?)),
      None => Ok(None),
    }
  }

  /// Typed read of a key that `state` cannot run without.
  pub fn require<T: DeserializeOwned>(&self, key: &str, state: PipelineState) -> RecapResult<T> {
    self.get(key)?.ok_or_else(|| RecapError::ContextKeyMissing {
      key: key.to_string(),
      state,
    })
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
