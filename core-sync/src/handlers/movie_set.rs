use async_trait::async_trait;
use core_library::{Field, ItemFilter, MediaImport, MediaItem, MediaRepository, MediaType};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{CleanupStats, HandlerBase, HandlerPolicy, ImportHandler};
use crate::context::SyncContext;
use crate::error::Result;
use crate::matcher::MatchKey;

const IGNORED_FIELDS: &[Field] = &[
    Field::Actor,
    Field::AirDate,
    Field::Album,
    Field::Artist,
    Field::Country,
    Field::Director,
    Field::EpisodeNumber,
    Field::EpisodeNumberSpecialSort,
    Field::Filename,
    Field::Genre,
    Field::InProgress,
    Field::LastPlayed,
    Field::Mpaa,
    Field::OriginalTitle,
    Field::Path,
    Field::Playcount,
    Field::PlotOutline,
    Field::ProductionCode,
    Field::Rating,
    Field::Season,
    Field::SeasonSpecialSort,
    Field::Set,
    Field::SortTitle,
    Field::Studio,
    Field::Tag,
    Field::Tagline,
    Field::Time,
    Field::Top250,
    Field::TrackNumber,
    Field::Trailer,
    Field::TvShowStatus,
    Field::TvShowTitle,
    Field::UniqueId,
    Field::UserRating,
    Field::Writer,
];

pub const POLICY: HandlerPolicy = HandlerPolicy {
    media_type: MediaType::MovieSet,
    grouped_types: &[MediaType::Movie, MediaType::MovieSet],
    required_types: &[MediaType::Movie],
    ignored_fields: IGNORED_FIELDS,
    parent_artwork_prefixes: &[],
    match_key: MatchKey::Title,
};

pub struct MovieSetImportHandler {
    base: HandlerBase,
}

impl MovieSetImportHandler {
    pub fn new(repository: Arc<dyn MediaRepository>) -> Self {
        Self {
            base: HandlerBase::new(POLICY, repository),
        }
    }
}

#[async_trait]
impl ImportHandler for MovieSetImportHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    async fn start_synchronisation(&self, import: &MediaImport, ctx: &mut SyncContext) -> Result<()> {
        self.base
            .load_parents(import, MediaType::MovieSet, &mut ctx.sets)
            .await
    }

    /// Sets are shared by name: an existing set with the same title is
    /// linked instead of creating a second one.
    #[instrument(skip_all, fields(set = %item.title()))]
    async fn add_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base.prepare_item(import, item, ctx).await?;

        let filter = ItemFilter::new(MediaType::MovieSet).title(item.title());
        let existing = self.base.repository().get_items(&filter).await?;
        match existing.first() {
            Some(set) => {
                debug!(set_id = set.id, "Linking existing movie set");
                item.id = set.id;
                self.base.repository().save_item(item).await?;
                self.base.link(import, item).await?;
            }
            None => {
                self.base.insert_item(import, item).await?;
            }
        }

        ctx.sets.insert(item.clone());
        Ok(())
    }

    async fn remove_imported_item(
        &self,
        import: &MediaImport,
        item: &MediaItem,
        _ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base.remove_parent(import, item).await?;
        Ok(())
    }

    async fn cleanup_imported_items(&self, import: &MediaImport) -> Result<CleanupStats> {
        self.base.cleanup_parents(import).await
    }

    async fn remove_imported_items(&self, import: &MediaImport) -> Result<u64> {
        self.base.remove_parents(import).await
    }
}
