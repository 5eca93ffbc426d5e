//! State owned by one synchronisation run.

use core_library::{MediaRepository, Result as LibraryResult};
use std::collections::HashMap;

use crate::hierarchy::HierarchyCache;

/// Mutable state of one run, handed by reference into every handler call
/// and dropped when the run ends.
#[derive(Debug)]
pub struct SyncContext {
    run_id: String,
    /// Shows by title, for seasons and episodes
    pub shows: HierarchyCache,
    /// Movie sets by title, for movies
    pub sets: HierarchyCache,
    source_path_ids: HashMap<String, i64>,
}

impl SyncContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            shows: HierarchyCache::new(),
            sets: HierarchyCache::new(),
            source_path_ids: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path identity of a source location, registered on first use.
    pub async fn source_path_id(
        &mut self,
        repository: &dyn MediaRepository,
        source_path: &str,
    ) -> LibraryResult<i64> {
        if let Some(id) = self.source_path_ids.get(source_path) {
            return Ok(*id);
        }
        let id = repository.add_path(source_path).await?;
        self.source_path_ids.insert(source_path.to_string(), id);
        Ok(id)
    }
}
