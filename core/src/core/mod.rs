// recap/src/core/mod.rs

pub mod context;
pub mod control;
pub mod run;
pub mod shared_run;
pub mod state;

pub use context::{ContextEntry, RunContext};
pub use control::{RunOutcome, Signal};
pub use run::{PipelineRun, RetryRecord, SourceLocator, TranscriptionJobHandle, TransitionRecord};
pub use shared_run::SharedRun;
pub use state::PipelineState;
