//! Behaviour shared by every import handler.

use core_library::{
    ChildCounts, Field, ItemFilter, MediaImport, MediaItem, MediaRepository, MediaType,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::changeset::ComparisonRules;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::handlers::CleanupStats;
use crate::hierarchy::HierarchyCache;
use crate::matcher::MatchKey;

/// Type-specific configuration of a handler
#[derive(Debug, Clone, Copy)]
pub struct HandlerPolicy {
    pub media_type: MediaType,
    pub grouped_types: &'static [MediaType],
    pub required_types: &'static [MediaType],
    pub ignored_fields: &'static [Field],
    pub parent_artwork_prefixes: &'static [&'static str],
    pub match_key: MatchKey,
}

impl HandlerPolicy {
    pub fn comparison_rules(&self) -> ComparisonRules {
        ComparisonRules {
            media_type: self.media_type,
            ignored_fields: self.ignored_fields,
            parent_artwork_prefixes: self.parent_artwork_prefixes,
        }
    }
}

pub struct HandlerBase {
    policy: HandlerPolicy,
    repository: Arc<dyn MediaRepository>,
}

impl HandlerBase {
    pub fn new(policy: HandlerPolicy, repository: Arc<dyn MediaRepository>) -> Self {
        Self { policy, repository }
    }

    pub fn policy(&self) -> &HandlerPolicy {
        &self.policy
    }

    pub fn repository(&self) -> &dyn MediaRepository {
        self.repository.as_ref()
    }

    pub async fn local_items(&self, import: &MediaImport) -> Result<Vec<MediaItem>> {
        let filter = ItemFilter::new(self.policy.media_type).imported_from(import);
        Ok(self.repository.get_items(&filter).await?)
    }

    /// Stamps provenance on an incoming item: source, base path, the source
    /// path identity and, for playable items, the file identity.
    pub async fn prepare_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        let source = import.source_id();
        item.source = Some(source.to_string());
        if item.base_path.is_none() {
            item.base_path = Some(source.to_string());
        }
        item.parent_path_id = ctx.source_path_id(self.repository(), source).await?;

        if !item.is_folder() {
            item.file_id = self.repository.add_file(&item.path).await?;
        }
        Ok(())
    }

    /// Persists a new item and links it to `import`.
    pub async fn insert_item(&self, import: &MediaImport, item: &mut MediaItem) -> Result<i64> {
        let id = self.repository.save_item(item).await?;
        if id <= 0 {
            return Err(SyncError::invalid_item(
                item.title(),
                format!("store returned identity {}", id),
            ));
        }
        item.id = id;
        self.link(import, item).await?;
        Ok(id)
    }

    pub async fn link(&self, import: &MediaImport, item: &MediaItem) -> Result<()> {
        self.repository
            .set_import_for_item(item.media_type, item.id, import, &item.path)
            .await?;
        Ok(())
    }

    /// Stores the playback state reported by the source for a playable item.
    pub async fn store_playback(&self, item: &MediaItem, reset: bool) -> Result<()> {
        if item.file_id > 0 {
            self.repository
                .set_playback_state(item.file_id, item.playback(), reset)
                .await?;
        }
        Ok(())
    }

    /// Writes the changed details of an already imported item.
    pub async fn update_item(&self, import: &MediaImport, item: &MediaItem) -> Result<()> {
        if !item.is_persisted() {
            return Err(SyncError::invalid_item(item.title(), "update without identity"));
        }

        let id = self.repository.save_item(item).await?;
        if id != item.id {
            return Err(SyncError::invalid_item(
                item.title(),
                format!("update stored identity {} instead of {}", id, item.id),
            ));
        }

        let mirror_playback = import
            .settings
            .update_playback_metadata_from_source()
            .unwrap_or(true);
        if mirror_playback
            && matches!(
                item.media_type,
                MediaType::Movie | MediaType::Episode | MediaType::MusicVideo
            )
        {
            self.store_playback(item, true).await?;
        }
        Ok(())
    }

    /// Deletes a leaf item together with its file record.
    pub async fn remove_leaf(&self, _import: &MediaImport, item: &MediaItem) -> Result<()> {
        if !item.is_persisted() {
            return Err(SyncError::invalid_item(item.title(), "remove without identity"));
        }
        self.repository.delete_item(item.media_type, item.id).await?;
        if item.file_id > 0 {
            self.repository.delete_file(item.file_id).await?;
        }
        Ok(())
    }

    /// Removes a parent entity on behalf of `import`.
    ///
    /// A parent that still has children, from any source, only loses the
    /// link to `import`; an empty parent is deleted.
    pub async fn remove_parent(
        &self,
        import: &MediaImport,
        item: &MediaItem,
    ) -> Result<ParentRemoval> {
        if !item.is_persisted() {
            return Err(SyncError::invalid_item(item.title(), "remove without identity"));
        }
        let counts = self
            .repository
            .count_children(item.media_type, item.id, import)
            .await?;
        self.apply_parent_removal(import, item, counts).await
    }

    /// Unlinks `item` from `import` while it has children, deletes it
    /// otherwise.
    pub async fn apply_parent_removal(
        &self,
        import: &MediaImport,
        item: &MediaItem,
        counts: ChildCounts,
    ) -> Result<ParentRemoval> {
        if counts.total > 0 {
            debug!(
                media_type = %item.media_type,
                item = %item.title(),
                children = counts.total,
                "Parent still has children, unlinking import"
            );
            self.repository
                .remove_import_from_item(item.media_type, item.id, import)
                .await?;
            Ok(ParentRemoval::Unlinked)
        } else {
            debug!(
                media_type = %item.media_type,
                item = %item.title(),
                "Parent has no children left, deleting"
            );
            self.repository.delete_item(item.media_type, item.id).await?;
            Ok(ParentRemoval::Deleted)
        }
    }

    /// Parents of `import` left without children of `import`, with their
    /// child counts.
    ///
    /// A count failure leaves that parent out and is tallied in the
    /// returned number of skipped parents.
    pub async fn orphaned_parents(
        &self,
        import: &MediaImport,
    ) -> Result<(Vec<(MediaItem, ChildCounts)>, u64)> {
        let mut orphans = Vec::new();
        let mut skipped = 0;

        for parent in self.local_items(import).await? {
            let counts = match self
                .repository
                .count_children(parent.media_type, parent.id, import)
                .await
            {
                Ok(counts) => counts,
                Err(e) => {
                    warn!(
                        media_type = %parent.media_type,
                        item = %parent.title(),
                        import = %import,
                        error = %e,
                        "Failed to count children, leaving item untouched"
                    );
                    skipped += 1;
                    continue;
                }
            };
            if counts.imported == 0 {
                orphans.push((parent, counts));
            }
        }
        Ok((orphans, skipped))
    }

    /// Collapses parents of `import` left without children of `import`.
    pub async fn cleanup_parents(&self, import: &MediaImport) -> Result<CleanupStats> {
        let (orphans, skipped) = self.orphaned_parents(import).await?;
        let mut stats = CleanupStats {
            skipped,
            ..CleanupStats::default()
        };
        for (parent, counts) in orphans {
            stats.record(self.apply_parent_removal(import, &parent, counts).await?);
        }
        self.log_cleanup(import, &stats);
        Ok(stats)
    }

    pub fn log_cleanup(&self, import: &MediaImport, stats: &CleanupStats) {
        if stats.deleted > 0 || stats.unlinked > 0 {
            info!(
                media_type = %self.policy.media_type,
                import = %import,
                deleted = stats.deleted,
                unlinked = stats.unlinked,
                "Cleaned up imported items"
            );
        }
    }

    /// Removes every parent of this type imported by `import`, honouring
    /// children of other sources.
    pub async fn remove_parents(&self, import: &MediaImport) -> Result<u64> {
        let mut removed = 0;
        for parent in self.local_items(import).await? {
            self.remove_parent(import, &parent).await?;
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn delete_all(&self, import: &MediaImport) -> Result<u64> {
        Ok(self
            .repository
            .delete_items_from_import(import, self.policy.media_type)
            .await?)
    }

    pub async fn set_enabled(&self, import: &MediaImport, enable: bool) -> Result<()> {
        self.repository
            .set_import_items_enabled(enable, self.policy.media_type, import)
            .await?;
        Ok(())
    }

    /// Fills `cache` with the parents of `parent_type` imported by `import`,
    /// once per run.
    pub async fn load_parents(
        &self,
        import: &MediaImport,
        parent_type: MediaType,
        cache: &mut HierarchyCache,
    ) -> Result<()> {
        if cache.is_loaded() {
            return Ok(());
        }
        let filter = ItemFilter::new(parent_type).imported_from(import);
        let parents = self.repository.get_items(&filter).await?;
        debug!(
            parent_type = %parent_type,
            count = parents.len(),
            "Loaded parent cache"
        );
        cache.populate(parents);
        Ok(())
    }
}

/// What happened to a removed parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRemoval {
    Deleted,
    Unlinked,
}
