// recap/src/pipeline/mod.rs

//! The transition table and the orchestrator that runs pipelines through it.

pub mod definition;
pub mod execution;
mod handlers;

pub use definition::{Guard, Transition, TransitionTable, PIPELINE_TRANSITIONS};
pub use execution::Orchestrator;
