use async_trait::async_trait;
use core_library::{Field, MediaImport, MediaItem, MediaRepository, MediaType};
use std::sync::Arc;
use tracing::instrument;

use super::{HandlerBase, HandlerPolicy, ImportHandler};
use crate::context::SyncContext;
use crate::error::Result;
use crate::matcher::MatchKey;

const IGNORED_FIELDS: &[Field] = &[
    Field::Actor,
    Field::Country,
    Field::EpisodeNumber,
    Field::EpisodeNumberSpecialSort,
    Field::Mpaa,
    Field::OriginalTitle,
    Field::PlotOutline,
    Field::ProductionCode,
    Field::Season,
    Field::SeasonSpecialSort,
    Field::Set,
    Field::SortTitle,
    Field::Tagline,
    Field::Top250,
    Field::TrackNumber,
    Field::Trailer,
    Field::TvShowStatus,
    Field::TvShowTitle,
    Field::Writer,
];

pub const POLICY: HandlerPolicy = HandlerPolicy {
    media_type: MediaType::MusicVideo,
    grouped_types: &[MediaType::MusicVideo],
    required_types: &[],
    ignored_fields: IGNORED_FIELDS,
    parent_artwork_prefixes: &[],
    match_key: MatchKey::Path,
};

pub struct MusicVideoImportHandler {
    base: HandlerBase,
}

impl MusicVideoImportHandler {
    pub fn new(repository: Arc<dyn MediaRepository>) -> Self {
        Self {
            base: HandlerBase::new(POLICY, repository),
        }
    }
}

#[async_trait]
impl ImportHandler for MusicVideoImportHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    #[instrument(skip_all, fields(item = %item.title()))]
    async fn add_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base.prepare_item(import, item, ctx).await?;
        self.base.insert_item(import, item).await?;
        self.base.store_playback(item, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::{GroupedMediaTypes, ImportSource, InMemoryMediaRepository, ItemFilter};

    #[tokio::test]
    async fn test_add_and_remove_music_video() {
        let repository = Arc::new(InMemoryMediaRepository::new());
        let handler = MusicVideoImportHandler::new(repository.clone());
        let import = MediaImport::new(
            ImportSource::new("upnp://srv/", "Server"),
            GroupedMediaTypes::new([MediaType::MusicVideo]),
        );
        let mut ctx = SyncContext::new("run");

        let mut item = MediaItem::new(MediaType::MusicVideo, "upnp://srv/mv/thriller.mkv")
            .with_title("Thriller");
        item.details.playback.playcount = 3;
        handler.add_imported_item(&import, &mut item, &mut ctx).await.unwrap();

        assert!(item.is_persisted());
        assert!(item.file_id > 0);
        let playback = repository.get_playback_state(item.file_id).await.unwrap();
        assert_eq!(playback.map(|p| p.playcount), Some(3));

        let local = handler.local_items(&import).await.unwrap();
        assert_eq!(local.len(), 1);

        handler
            .remove_imported_item(&import, &local[0], &mut ctx)
            .await
            .unwrap();
        let remaining = repository
            .count_items(&ItemFilter::new(MediaType::MusicVideo))
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(repository.get_playback_state(item.file_id).await.unwrap().is_none());
    }
}
