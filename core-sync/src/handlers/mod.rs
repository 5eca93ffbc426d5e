//! # Import Handlers
//!
//! One handler per media type implements [`ImportHandler`]. Shared behaviour
//! (provenance stamping, playback persistence, parent removal and cleanup)
//! lives in [`HandlerBase`]; every handler composes one and declares its
//! [`HandlerPolicy`]. Handlers that create parents of another media type
//! receive the [`HandlerRegistry`](crate::registry::HandlerRegistry) at
//! construction and go through the parent type's handler.

use async_trait::async_trait;
use core_library::{GroupedMediaTypes, MediaImport, MediaItem, MediaType};

use crate::changeset::{classify, ChangesetType, ClassifyOptions};
use crate::context::SyncContext;
use crate::error::Result;
use crate::matcher::find_matching_local_item;

mod base;
mod episode;
mod movie;
mod movie_set;
mod music_video;
mod season;
mod tvshow;

pub use base::{HandlerBase, HandlerPolicy, ParentRemoval};
pub use episode::EpisodeImportHandler;
pub use movie::MovieImportHandler;
pub use movie_set::MovieSetImportHandler;
pub use music_video::MusicVideoImportHandler;
pub use season::SeasonImportHandler;
pub use tvshow::TvShowImportHandler;

/// Per-media-type import contract
///
/// Write operations report per-item problems as non-structural
/// [`SyncError`](crate::SyncError)s; the orchestrator skips the item and
/// carries on.
#[async_trait]
pub trait ImportHandler: Send + Sync {
    fn base(&self) -> &HandlerBase;

    fn media_type(&self) -> MediaType {
        self.base().policy().media_type
    }

    /// Media types synchronised together with this one
    fn grouped_media_types(&self) -> GroupedMediaTypes {
        GroupedMediaTypes::new(self.base().policy().grouped_types.iter().copied())
    }

    /// Media types an import must contain for this handler to run
    fn required_media_types(&self) -> &'static [MediaType] {
        self.base().policy().required_types
    }

    /// Human readable label used in diagnostics
    fn item_label(&self, item: &MediaItem) -> String {
        item.title().to_string()
    }

    /// Items previously imported by `import` for this media type
    async fn local_items(&self, import: &MediaImport) -> Result<Vec<MediaItem>> {
        self.base().local_items(import).await
    }

    async fn start_synchronisation(
        &self,
        _import: &MediaImport,
        _ctx: &mut SyncContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn finish_synchronisation(
        &self,
        _import: &MediaImport,
        _ctx: &mut SyncContext,
    ) -> Result<()> {
        Ok(())
    }

    fn find_matching_local_item<'a>(
        &self,
        item: &MediaItem,
        local_items: &'a [MediaItem],
    ) -> Option<&'a MediaItem> {
        find_matching_local_item(self.base().policy().match_key, item, local_items)
    }

    fn determine_changeset(
        &self,
        import: &MediaImport,
        local: &MediaItem,
        incoming: &MediaItem,
    ) -> ChangesetType {
        let settings = &import.settings;
        let options = ClassifyOptions {
            update_all_metadata: settings.update_imported_items().unwrap_or(true),
            update_playback_metadata: settings
                .update_playback_metadata_from_source()
                .unwrap_or(true),
        };
        classify(&self.base().policy().comparison_rules(), local, incoming, options)
    }

    /// Copies the database linkage of the matched local item onto `item`
    /// so an update targets the right rows. Unless the import mirrors
    /// playback from the source, the local playback state is kept as well.
    fn prepare_imported_item(&self, import: &MediaImport, item: &mut MediaItem, local: &MediaItem) {
        if !import
            .settings
            .update_playback_metadata_from_source()
            .unwrap_or(true)
        {
            item.details.playback = local.details.playback.clone();
        }
        item.id = local.id;
        item.file_id = local.file_id;
        item.show_id = local.show_id;
        item.season_id = local.season_id;
        item.set_id = local.set_id;
        item.source = local.source.clone();
        item.base_path = local.base_path.clone();
        item.parent_path_id = local.parent_path_id;
    }

    async fn add_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()>;

    async fn update_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        _ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base().update_item(import, item).await
    }

    async fn remove_imported_item(
        &self,
        import: &MediaImport,
        item: &MediaItem,
        _ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base().remove_leaf(import, item).await
    }

    /// Removes or unlinks local items of this type left over by the run.
    ///
    /// Leaf types have nothing to clean up; their removals happen during
    /// the run itself.
    async fn cleanup_imported_items(&self, _import: &MediaImport) -> Result<CleanupStats> {
        Ok(CleanupStats::default())
    }

    /// Removes every item of this type imported by `import`.
    async fn remove_imported_items(&self, import: &MediaImport) -> Result<u64> {
        self.base().delete_all(import).await
    }

    async fn set_imported_items_enabled(&self, import: &MediaImport, enable: bool) -> Result<()> {
        self.base().set_enabled(import, enable).await
    }
}

/// Outcome of a cleanup pass over one media type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub deleted: u64,
    pub unlinked: u64,
    /// Items left alone because their children could not be counted
    pub skipped: u64,
}

impl CleanupStats {
    pub fn record(&mut self, removal: ParentRemoval) {
        match removal {
            ParentRemoval::Deleted => self.deleted += 1,
            ParentRemoval::Unlinked => self.unlinked += 1,
        }
    }
}

/// Label of a show child: `"Show: Title"`.
pub(crate) fn show_child_label(item: &MediaItem) -> String {
    match item.details.show_title.as_deref() {
        Some(show) if !show.is_empty() => format!("{}: {}", show, item.title()),
        _ => item.title().to_string(),
    }
}
