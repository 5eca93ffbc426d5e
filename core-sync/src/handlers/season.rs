use async_trait::async_trait;
use core_library::{Field, ItemFilter, MediaImport, MediaItem, MediaRepository, MediaType};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::tvshow::resolve_show;
use super::{show_child_label, CleanupStats, HandlerBase, HandlerPolicy, ImportHandler};
use crate::context::SyncContext;
use crate::error::Result;
use crate::matcher::MatchKey;
use crate::registry::HandlerRegistry;

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
    Field::Plot,
    Field::PlotOutline,
    Field::ProductionCode,
    Field::Rating,
    Field::SeasonSpecialSort,
    Field::Set,
    Field::SortTitle,
    Field::Studio,
    Field::Tag,
    Field::Tagline,
    Field::Time,
    Field::Title,
    Field::Top250,
    Field::TrackNumber,
    Field::Trailer,
    Field::TvShowStatus,
    Field::UniqueId,
    Field::UserRating,
    Field::Writer,
];

pub const POLICY: HandlerPolicy = HandlerPolicy {
    media_type: MediaType::Season,
    grouped_types: &[MediaType::TvShow, MediaType::Season, MediaType::Episode],
    required_types: &[MediaType::Episode],
    ignored_fields: IGNORED_FIELDS,
    parent_artwork_prefixes: &["tvshow", "season"],
    match_key: MatchKey::SeasonOfShow,
};

pub struct SeasonImportHandler {
    base: HandlerBase,
    registry: Arc<HandlerRegistry>,
}

impl SeasonImportHandler {
    pub fn new(repository: Arc<dyn MediaRepository>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            base: HandlerBase::new(POLICY, repository),
            registry,
        }
    }
}

#[async_trait]
impl ImportHandler for SeasonImportHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn item_label(&self, item: &MediaItem) -> String {
        show_child_label(item)
    }

    async fn start_synchronisation(&self, import: &MediaImport, ctx: &mut SyncContext) -> Result<()> {
        self.base
            .load_parents(import, MediaType::TvShow, &mut ctx.shows)
            .await
    }

    /// Seasons live one folder below their show. A season row the library
    /// already holds for the show is reused and linked.
    #[instrument(skip_all, fields(season = %show_child_label(item)))]
    async fn add_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base.prepare_item(import, item, ctx).await?;
        item.show_id = resolve_show(&self.base, &self.registry, import, item, 1, ctx).await?;

        let existing = match item.details.season {
            Some(number) => {
                let filter = ItemFilter::new(MediaType::Season)
                    .show_id(item.show_id)
                    .season(number);
                self.base.repository().get_items(&filter).await?.into_iter().next()
            }
            None => None,
        };

        match existing {
            Some(season) => {
                debug!(season_id = season.id, "Reusing existing season");
                item.id = season.id;
                self.base.repository().save_item(item).await?;
                self.base.link(import, item).await?;
            }
            None => {
                self.base.insert_item(import, item).await?;
            }
        }
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
