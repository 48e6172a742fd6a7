// demos/summary_worker/src/services/formatter_mock.rs
use async_trait::async_trait;
use recap::{FormatTranscript, FormattedTranscript, StepFailure, StepResult, TranscriptFormatRequest};
use tracing::info;

/// Pretends to turn raw job output into a speaker-labelled transcript.
pub struct MockTranscriptFormatter;

#[async_trait]
impl FormatTranscript for MockTranscriptFormatter {
  async fn format(&self, request: &TranscriptFormatRequest) -> StepResult<FormattedTranscript> {
    tokio::time::sleep(std::time::Duration::from_millis(15)).await;

    let (bucket, _key) = request
      .transcription_output
      .strip_prefix("s3://")
      .and_then(|rest| rest.split_once('/'))
      .ok_or_else(|| StepFailure::validation(format!("unexpected output location '{}'", request.transcription_output)))?;

    let formatted = FormattedTranscript {
      bucket_name: bucket.to_string(),
      speaker_transcription_key_name: format!("transcriptions/{}_speaker.txt", request.source_file_name),
    };
    info!("Mock transcript formatted: {}", formatted.locator());
    Ok(formatted)
  }
}
