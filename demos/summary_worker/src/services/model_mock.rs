// demos/summary_worker/src/services/model_mock.rs
use async_trait::async_trait;
use recap::{InferenceClient, ModelSummary, StepResult, SummarizeRequest};
use tracing::{info, warn};

/// Canned generative model. Recordings named "*blocked*" trip the guardrail.
pub struct MockModel;

#[async_trait]
impl InferenceClient for MockModel {
  async fn summarize(&self, request: &SummarizeRequest) -> StepResult<ModelSummary> {
    info!(
      "Simulating model invocation: Model='{}', Guardrail={:?}, Transcript='{}'",
      request.model_id,
      request.guardrail_id,
      request.transcript.locator()
    );
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    if request.source_file_name.contains("blocked") {
      warn!("Simulated guardrail intervention for '{}'", request.source_file_name);
      return Ok(ModelSummary::failed("The guardrail blocked the generated content."));
    }

    let summary = format!(
      "# {name}\n\n## Key Stakeholders\n- Host\n\n## Key Discussion Points\n- Review of {name}\n\n## Decisions\n- None recorded\n\n## Action Items\n- Share these notes",
      name = request.source_file_name
    );
    let mut result = ModelSummary::succeeded(summary);
    result.summary_key_name = Some(format!("summaries/{}.md", request.source_file_name));
    Ok(result)
  }
}
