// recap/src/units/prepare.rs

//! Default Prepare-Input unit and the deterministic job naming built on it.

use crate::config::OrchestratorConfig;
use crate::core::run::SourceLocator;
use crate::error::{StepFailure, StepResult};
use crate::units::{PrepareInput, PreparedInput, SubmitJobRequest};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{event, Level};
use uuid::Uuid;

/// Upper bound the job service places on job names.
pub const MAX_JOB_NAME_LEN: usize = 200;

const JOB_NAME_HASH_LEN: usize = 12;

/// Longest prefix that still leaves room for the separators and the hash.
pub const MAX_JOB_NAME_PREFIX_LEN: usize = MAX_JOB_NAME_LEN - JOB_NAME_HASH_LEN - 2;

/// Splits a locator into the names later states build on. Pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourcePreparer;

impl SourcePreparer {
  pub fn prepare_sync(source: &SourceLocator) -> StepResult<PreparedInput> {
    if source.bucket.trim().is_empty() {
      return Err(StepFailure::validation("source bucket is empty"));
    }
    let file_name = source
      .key
      .rsplit('/')
      .next()
      .filter(|name| !name.is_empty())
      .ok_or_else(|| StepFailure::validation(format!("object key '{}' has no file name", source.key)))?;

    // "standup.2024.mp4" -> "standup.2024"
    let stem = match file_name.rfind('.') {
      Some(idx) if idx > 0 => &file_name[..idx],
      _ => file_name,
    };

    Ok(PreparedInput {
      source_bucket: source.bucket.clone(),
      source_key: source.key.clone(),
      source_file_name: stem.to_string(),
      source_file_name_with_date: format!("{}_{}", stem, source.event_time.format("%Y-%m-%d-%H-%M-%S")),
    })
  }
}

#[async_trait]
impl PrepareInput for SourcePreparer {
  async fn prepare(&self, source: &SourceLocator) -> StepResult<PreparedInput> {
    let prepared = Self::prepare_sync(source)?;
    event!(Level::DEBUG, source = %source, file_name = %prepared.source_file_name, "Prepared source input.");
    Ok(prepared)
  }
}

/// Job name for a prepared source.
///
/// `<prefix>-<date-qualified name>-<hash>`, where the hash is taken over the
/// bucket and key, so two distinct objects never share a name even if their
/// file names and arrival times match. Restricted to `[0-9A-Za-z._-]`.
pub fn derive_job_name(prefix: &str, prepared: &PreparedInput) -> String {
  let object_id = format!("s3://{}/{}", prepared.source_bucket, prepared.source_key);
  let hash = Uuid::new_v5(&Uuid::NAMESPACE_URL, object_id.as_bytes()).simple().to_string();
  let hash = &hash[..JOB_NAME_HASH_LEN];

  // The hash is never cut; the prefix and name give way instead.
  let mut prefix = sanitize(prefix);
  prefix.truncate(MAX_JOB_NAME_PREFIX_LEN);
  let mut name_part = sanitize(&prepared.source_file_name_with_date);
  let budget = MAX_JOB_NAME_LEN.saturating_sub(prefix.len() + JOB_NAME_HASH_LEN + 2);
  name_part.truncate(budget);

  if name_part.is_empty() {
    format!("{prefix}-{hash}")
  } else {
    format!("{prefix}-{name_part}-{hash}")
  }
}

fn sanitize(raw: &str) -> String {
  raw
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
    .collect()
}

/// The submission the SubmitJob state sends for `prepared`.
pub fn submit_request_for(config: &OrchestratorConfig, prepared: &PreparedInput, job_name: &str) -> SubmitJobRequest {
  let mut tags = BTreeMap::new();
  tags.insert("SourceBucketName".to_string(), prepared.source_bucket.clone());
  tags.insert("SourceKeyName".to_string(), prepared.source_key.clone());
  tags.insert("SourceFileName".to_string(), prepared.source_file_name.clone());

  SubmitJobRequest {
    job_name: job_name.to_string(),
    media_uri: format!("s3://{}/{}", prepared.source_bucket, prepared.source_key),
    output_bucket: prepared.source_bucket.clone(),
    output_key: format!("{}{}.json", config.output_prefix, prepared.source_file_name),
    language_code: config.language_code.clone(),
    diarization: config.diarization,
    tags,
  }
}
