// demos/summary_worker/src/services/mod.rs

pub mod formatter_mock;
pub mod model_mock;
pub mod notifier_mock;
pub mod transcribe_mock;

pub use formatter_mock::MockTranscriptFormatter;
pub use model_mock::MockModel;
pub use notifier_mock::MockNotifier;
pub use transcribe_mock::MockTranscribeService;
