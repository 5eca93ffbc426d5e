use async_trait::async_trait;
use core_library::{
    paths, Field, ItemFilter, MediaImport, MediaItem, MediaRepository, MediaType, UNPERSISTED_ID,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::tvshow::resolve_show;
use super::{show_child_label, HandlerBase, HandlerPolicy, ImportHandler};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::matcher::MatchKey;
use crate::registry::HandlerRegistry;

const IGNORED_FIELDS: &[Field] = &[
    Field::Actor,
    Field::Album,
    Field::Artist,
    Field::Country,
    Field::Genre,
    Field::Mpaa,
    Field::PlotOutline,
    Field::Set,
    Field::SortTitle,
    Field::Studio,
    Field::Tag,
    Field::Tagline,
    Field::Top250,
    Field::TrackNumber,
    Field::Trailer,
    Field::TvShowStatus,
    Field::TvShowTitle,
];

pub const POLICY: HandlerPolicy = HandlerPolicy {
    media_type: MediaType::Episode,
    grouped_types: &[MediaType::TvShow, MediaType::Season, MediaType::Episode],
    required_types: &[],
    ignored_fields: IGNORED_FIELDS,
    parent_artwork_prefixes: &["tvshow", "season"],
    match_key: MatchKey::Path,
};

pub struct EpisodeImportHandler {
    base: HandlerBase,
    registry: Arc<HandlerRegistry>,
}

impl EpisodeImportHandler {
    pub fn new(repository: Arc<dyn MediaRepository>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            base: HandlerBase::new(POLICY, repository),
            registry,
        }
    }

    /// Identity of the season row for the episode, writing a bare season
    /// when the show has none with that number yet.
    async fn ensure_season(&self, item: &MediaItem) -> Result<i64> {
        let Some(number) = item.details.season else {
            return Ok(UNPERSISTED_ID);
        };

        let filter = ItemFilter::new(MediaType::Season)
            .show_id(item.show_id)
            .season(number);
        if let Some(season) = self.base.repository().get_items(&filter).await?.first() {
            return Ok(season.id);
        }

        let mut season = MediaItem::new(MediaType::Season, paths::parent_path(&item.path))
            .with_title(format!("Season {}", number));
        season.details.season = Some(number);
        season.details.show_title = item.details.show_title.clone();
        season.show_id = item.show_id;
        season.source = item.source.clone();
        season.base_path = item.base_path.clone();
        season.parent_path_id = item.parent_path_id;

        let id = self.base.repository().save_item(&season).await?;
        if id <= 0 {
            return Err(SyncError::invalid_item(
                show_child_label(item),
                format!("season {} stored with identity {}", number, id),
            ));
        }
        debug!(season_id = id, season = number, "Created season");
        Ok(id)
    }
}

#[async_trait]
impl ImportHandler for EpisodeImportHandler {
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

    /// The owning show is resolved (or created) before anything of the
    /// episode is written, so an episode never lands without a show.
    #[instrument(skip_all, fields(episode = %show_child_label(item)))]
    async fn add_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base.prepare_item(import, item, ctx).await?;
        item.show_id = resolve_show(&self.base, &self.registry, import, item, 2, ctx).await?;
        item.season_id = self.ensure_season(item).await?;

        let id = self.base.repository().save_item(item).await?;
        if id <= 0 {
            return Err(SyncError::invalid_item(
                show_child_label(item),
                format!("store returned identity {}", id),
            ));
        }
        item.id = id;

        self.base.store_playback(item, false).await?;
        self.base.link(import, item).await
    }
}
