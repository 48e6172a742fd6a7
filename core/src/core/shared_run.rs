// recap/src/core/shared_run.rs
use crate::core::run::PipelineRun;
use crate::core::state::PipelineState;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared handle to a single run's record.
///
/// The orchestrator is the only writer; dispatch handles, journals and tests
/// read through clones of the same handle.
///
/// IMPORTANT: guards are blocking and MUST be dropped before any `.await`.
#[derive(Debug)]
pub struct SharedRun(Arc<RwLock<PipelineRun>>);

impl SharedRun {
  pub fn new(run: PipelineRun) -> Self {
    SharedRun(Arc::new(RwLock::new(run)))
  }

  pub fn read(&self) -> RwLockReadGuard<'_, PipelineRun> {
    self.0.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, PipelineRun> {
    self.0.write()
  }

  /// Guard over one part of the run, e.g. `run.map_read(|r| &r.context)`.
  pub fn map_read<F, U: ?Sized>(&self, f: F) -> MappedRwLockReadGuard<'_, U>
  where
    F: FnOnce(&PipelineRun) -> &U,
  {
    RwLockReadGuard::map(self.read(), f)
  }

  pub fn run_id(&self) -> String {
    self.read().run_id.clone()
  }

  pub fn current_state(&self) -> PipelineState {
    self.read().current_state
  }

  /// Owned copy of the record, for reports and assertions.
  pub fn cloned(&self) -> PipelineRun {
    self.read().clone()
  }
}

impl Clone for SharedRun {
  fn clone(&self) -> Self {
    SharedRun(Arc::clone(&self.0))
  }
}
