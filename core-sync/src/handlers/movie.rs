use async_trait::async_trait;
use core_library::{Field, MediaImport, MediaItem, MediaRepository, MediaType, UNPERSISTED_ID};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{HandlerBase, HandlerPolicy, ImportHandler};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::matcher::MatchKey;
use crate::registry::HandlerRegistry;

const IGNORED_FIELDS: &[Field] = &[
    Field::Album,
    Field::Artist,
    Field::EpisodeNumber,
    Field::EpisodeNumberSpecialSort,
    Field::ProductionCode,
    Field::Season,
    Field::SeasonSpecialSort,
    Field::TrackNumber,
    Field::TvShowStatus,
    Field::TvShowTitle,
];

pub const POLICY: HandlerPolicy = HandlerPolicy {
    media_type: MediaType::Movie,
    grouped_types: &[MediaType::Movie, MediaType::MovieSet],
    required_types: &[],
    ignored_fields: IGNORED_FIELDS,
    parent_artwork_prefixes: &["set"],
    match_key: MatchKey::Path,
};

pub struct MovieImportHandler {
    base: HandlerBase,
    registry: Arc<HandlerRegistry>,
}

impl MovieImportHandler {
    pub fn new(repository: Arc<dyn MediaRepository>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            base: HandlerBase::new(POLICY, repository),
            registry,
        }
    }

    /// Identity of the set named by `item`, creating the set on first use.
    async fn resolve_set(
        &self,
        import: &MediaImport,
        item: &MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<i64> {
        let Some(name) = item.details.set_name.as_deref().filter(|name| !name.is_empty()) else {
            return Ok(UNPERSISTED_ID);
        };
        if let Some(set) = ctx.sets.first(name) {
            return Ok(set.id);
        }

        let mut set = MediaItem::new(MediaType::MovieSet, "").with_title(name);
        set.base_path = item.base_path.clone();

        match self.registry.get_handler_for_type(MediaType::MovieSet) {
            Some(handler) => {
                handler
                    .add_imported_item(import, &mut set, ctx)
                    .await
                    .map_err(|e| {
                        if e.is_structural() {
                            e
                        } else {
                            SyncError::ParentUnresolved {
                                parent: MediaType::MovieSet,
                                child: item.title().to_string(),
                                reason: e.to_string(),
                            }
                        }
                    })?;
            }
            None => {
                debug!(set = %name, "No movie set handler registered, writing set directly");
                set.source = item.source.clone();
                set.parent_path_id = item.parent_path_id;
                self.base
                    .insert_item(import, &mut set)
                    .await
                    .map_err(|e| SyncError::ParentCreation {
                        parent: MediaType::MovieSet,
                        child: item.title().to_string(),
                        reason: e.to_string(),
                    })?;
                ctx.sets.insert(set.clone());
            }
        }

        debug!(set = %name, set_id = set.id, "Created movie set");
        Ok(set.id)
    }
}

#[async_trait]
impl ImportHandler for MovieImportHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    async fn start_synchronisation(&self, import: &MediaImport, ctx: &mut SyncContext) -> Result<()> {
        self.base
            .load_parents(import, MediaType::MovieSet, &mut ctx.sets)
            .await
    }

    #[instrument(skip_all, fields(movie = %item.title()))]
    async fn add_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base.prepare_item(import, item, ctx).await?;
        item.set_id = self.resolve_set(import, item, ctx).await?;
        self.base.insert_item(import, item).await?;
        self.base.store_playback(item, false).await
    }

    /// Follows a set rename or removal reported by the source.
    async fn update_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        item.set_id = self.resolve_set(import, item, ctx).await?;
        self.base.update_item(import, item).await
    }
}
