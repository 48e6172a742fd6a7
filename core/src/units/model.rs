// recap/src/units/model.rs

//! Default Invoke-Model unit over an `InferenceClient`.

use crate::error::{ErrorKind, StepResult};
use crate::units::{InferenceClient, InvokeModel, ModelStatus, ModelSummary, SummarizeRequest};
use async_trait::async_trait;
use tracing::{event, instrument, Level};

/// Forwards the request to the inference client.
///
/// A definitive client error becomes a `FAILED` summary carrying the error
/// text, which the CheckModelStatus branch then routes to `Failure`.
/// Transient errors are returned as errors so the call site can retry them.
pub struct ModelInvoker<C: InferenceClient> {
  client: C,
}

impl<C: InferenceClient> ModelInvoker<C> {
  pub fn new(client: C) -> Self {
    Self { client }
  }
}

#[async_trait]
impl<C: InferenceClient> InvokeModel for ModelInvoker<C> {
  #[instrument(
    name = "ModelInvoker::invoke",
    skip_all,
    fields(model_id = %request.model_id, guardrail = request.guardrail_id.is_some())
  )]
  async fn invoke(&self, request: &SummarizeRequest) -> StepResult<ModelSummary> {
    event!(Level::DEBUG, transcript = %request.transcript.locator(), "Invoking model.");
    match self.client.summarize(request).await {
      Ok(summary) if summary.status == ModelStatus::Succeeded && summary.summary_text.is_none() => {
        event!(Level::WARN, "Model reported success without summary text.");
        Ok(ModelSummary::failed("model returned no summary text"))
      }
      Ok(summary) => Ok(summary),
      Err(failure) if failure.kind == ErrorKind::TransientService => Err(failure),
      Err(failure) => {
        event!(Level::WARN, error = %failure, "Inference call failed; reporting FAILED status.");
        Ok(ModelSummary::failed(failure.message))
      }
    }
  }
}
