use async_trait::async_trait;
use core_library::{
    paths, ChildCounts, Field, ItemFilter, MediaImport, MediaItem, MediaRepository, MediaType,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{CleanupStats, HandlerBase, HandlerPolicy, ImportHandler, ParentRemoval};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::matcher::MatchKey;
use crate::registry::HandlerRegistry;

const IGNORED_FIELDS: &[Field] = &[
    Field::Album,
    Field::Artist,
    Field::Country,
    Field::Director,
    Field::EpisodeNumber,
    Field::EpisodeNumberSpecialSort,
    Field::Filename,
    Field::InProgress,
    Field::LastPlayed,
    Field::Playcount,
    Field::PlotOutline,
    Field::ProductionCode,
    Field::Season,
    Field::SeasonSpecialSort,
    Field::Set,
    Field::Tagline,
    Field::Time,
    Field::Top250,
    Field::TrackNumber,
    Field::TvShowTitle,
    Field::Writer,
];

pub const POLICY: HandlerPolicy = HandlerPolicy {
    media_type: MediaType::TvShow,
    grouped_types: &[MediaType::TvShow, MediaType::Season, MediaType::Episode],
    required_types: &[MediaType::Episode],
    ignored_fields: IGNORED_FIELDS,
    parent_artwork_prefixes: &[],
    match_key: MatchKey::ShowTitle,
};

pub struct TvShowImportHandler {
    base: HandlerBase,
}

impl TvShowImportHandler {
    pub fn new(repository: Arc<dyn MediaRepository>) -> Self {
        Self {
            base: HandlerBase::new(POLICY, repository),
        }
    }

    /// Local show the incoming show stands for, if any.
    ///
    /// Shows are first narrowed down by title. A shared unique id or an
    /// equal year then decides; an incoming show with neither takes the
    /// first title match.
    async fn find_local_show(&self, item: &MediaItem) -> Result<Option<MediaItem>> {
        let filter = ItemFilter::new(MediaType::TvShow).title(item.title());
        let mut candidates = self.base.repository().get_items(&filter).await?;

        let details = &item.details;
        if details.unique_ids.is_empty() && details.year.is_none() {
            return Ok(candidates.into_iter().next());
        }

        let position = candidates.iter().position(|candidate| {
            let shares_unique_id = details
                .unique_ids
                .iter()
                .any(|(kind, value)| candidate.details.unique_ids.get(kind) == Some(value));
            shares_unique_id || (details.year.is_some() && candidate.details.year == details.year)
        });
        Ok(position.map(|idx| candidates.swap_remove(idx)))
    }

    /// Detaches the location of `import` from the show. The show itself is
    /// only removed once no location is left.
    async fn remove_show(&self, import: &MediaImport, item: &MediaItem) -> Result<ParentRemoval> {
        if !item.is_persisted() {
            return Err(SyncError::invalid_item(item.title(), "remove without identity"));
        }
        let counts = self
            .base
            .repository()
            .count_children(MediaType::TvShow, item.id, import)
            .await?;
        self.detach_show(import, item, counts).await
    }

    async fn detach_show(
        &self,
        import: &MediaImport,
        item: &MediaItem,
        counts: ChildCounts,
    ) -> Result<ParentRemoval> {
        let repository = self.base.repository();
        if let Some(path) = repository
            .path_for_imported_item(MediaType::TvShow, item.id, import)
            .await?
        {
            repository.remove_path_from_tvshow(item.id, &path).await?;
        }

        if repository.tvshow_paths(item.id).await?.is_empty() {
            self.base.apply_parent_removal(import, item, counts).await
        } else {
            repository
                .remove_import_from_item(MediaType::TvShow, item.id, import)
                .await?;
            Ok(ParentRemoval::Unlinked)
        }
    }
}

#[async_trait]
impl ImportHandler for TvShowImportHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    async fn start_synchronisation(&self, import: &MediaImport, ctx: &mut SyncContext) -> Result<()> {
        self.base
            .load_parents(import, MediaType::TvShow, &mut ctx.shows)
            .await
    }

    #[instrument(skip_all, fields(show = %item.title()))]
    async fn add_imported_item(
        &self,
        import: &MediaImport,
        item: &mut MediaItem,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        self.base.prepare_item(import, item, ctx).await?;

        match self.find_local_show(item).await? {
            Some(show) => {
                debug!(show_id = show.id, path = %item.path, "Adding path to existing show");
                self.base
                    .repository()
                    .add_path_to_tvshow(show.id, &item.path)
                    .await?;
                item.id = show.id;
                self.base.link(import, item).await?;
            }
            None => {
                self.base.insert_item(import, item).await?;
            }
        }

        ctx.shows.insert(item.clone());
        Ok(())
    }

    async fn remove_imported_item(
        &self,
        import: &MediaImport,
        item: &MediaItem,
        _ctx: &mut SyncContext,
    ) -> Result<()> {
        self.remove_show(import, item).await.map(|_| ())
    }

    async fn cleanup_imported_items(&self, import: &MediaImport) -> Result<CleanupStats> {
        let (orphans, skipped) = self.base.orphaned_parents(import).await?;
        let mut stats = CleanupStats {
            skipped,
            ..CleanupStats::default()
        };
        for (show, counts) in orphans {
            stats.record(self.detach_show(import, &show, counts).await?);
        }
        self.base.log_cleanup(import, &stats);
        Ok(stats)
    }

    async fn remove_imported_items(&self, import: &MediaImport) -> Result<u64> {
        let shows = self.base.local_items(import).await?;
        for show in &shows {
            self.remove_show(import, show).await?;
        }
        Ok(shows.len() as u64)
    }
}

/// Identity of the show owning `child`, creating a minimal show when the
/// run has none cached.
///
/// The show location is taken `levels` folders above the child, without
/// leaving the child's base path. Creation goes through the registered
/// show handler so the show-level dedup applies; without one the show is
/// written directly.
pub(crate) async fn resolve_show(
    base: &HandlerBase,
    registry: &Arc<HandlerRegistry>,
    import: &MediaImport,
    child: &MediaItem,
    levels: usize,
    ctx: &mut SyncContext,
) -> Result<i64> {
    if let Some(show) = ctx
        .shows
        .resolve(child.details.show_title.as_deref(), &child.path)
    {
        return Ok(show.id);
    }

    let label = super::show_child_label(child);
    let Some(title) = child.details.show_title.as_deref().filter(|t| !t.is_empty()) else {
        return Err(SyncError::ParentUnresolved {
            parent: MediaType::TvShow,
            child: label,
            reason: "item carries no show title".to_string(),
        });
    };

    let mut show = minimal_show(child, title, levels);
    match registry.get_handler_for_type(MediaType::TvShow) {
        Some(handler) => {
            handler
                .add_imported_item(import, &mut show, ctx)
                .await
                .map_err(|e| {
                    if e.is_structural() {
                        e
                    } else {
                        SyncError::ParentUnresolved {
                            parent: MediaType::TvShow,
                            child: label.clone(),
                            reason: e.to_string(),
                        }
                    }
                })?;
        }
        None => {
            debug!(show = %title, "No show handler registered, writing show directly");
            show.source = child.source.clone();
            base.insert_item(import, &mut show)
                .await
                .map_err(|e| SyncError::ParentCreation {
                    parent: MediaType::TvShow,
                    child: label.clone(),
                    reason: e.to_string(),
                })?;
            ctx.shows.insert(show.clone());
        }
    }

    if !show.is_persisted() {
        return Err(SyncError::ParentUnresolved {
            parent: MediaType::TvShow,
            child: label,
            reason: "show was not persisted".to_string(),
        });
    }
    debug!(show = %title, show_id = show.id, "Created show for {}", label);
    Ok(show.id)
}

/// Show carrying the descriptive fields a season or episode shares with it.
fn minimal_show(child: &MediaItem, title: &str, levels: usize) -> MediaItem {
    let path = paths::ancestor_within(&child.path, levels, child.base_path.as_deref());
    let mut show = MediaItem::new(MediaType::TvShow, path).with_title(title);
    show.base_path = child.base_path.clone();
    show.parent_path_id = child.parent_path_id;

    let from = &child.details;
    let details = &mut show.details;
    details.cast = from.cast.clone();
    details.countries = from.countries.clone();
    details.directors = from.directors.clone();
    details.genres = from.genres.clone();
    details.year = from.year;
    details.rating = from.rating;
    details.plot = from.plot.clone();
    details.premiered = from.premiered;
    details.mpaa = from.mpaa.clone();
    details.studios = from.studios.clone();
    details.writers = from.writers.clone();
    show
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::{GroupedMediaTypes, ImportSource, InMemoryMediaRepository};

    fn import(source: &str) -> MediaImport {
        MediaImport::new(
            ImportSource::new(source, "Server"),
            GroupedMediaTypes::new([MediaType::TvShow, MediaType::Season, MediaType::Episode]),
        )
    }

    #[tokio::test]
    async fn test_existing_local_show_gets_import_path() {
        let repository = Arc::new(InMemoryMediaRepository::new());
        let local_id = repository
            .save_item(
                &MediaItem::new(MediaType::TvShow, "smb://nas/tv/show-x/")
                    .with_title("Show X")
                    .with_year(2008),
            )
            .await
            .unwrap();

        let handler = TvShowImportHandler::new(repository.clone());
        let import = import("upnp://srv/");
        let mut ctx = SyncContext::new("run");
        let mut incoming = MediaItem::new(MediaType::TvShow, "upnp://srv/tv/show-x/")
            .with_title("Show X")
            .with_year(2008);

        handler.add_imported_item(&import, &mut incoming, &mut ctx).await.unwrap();

        assert_eq!(incoming.id, local_id);
        let paths = repository.tvshow_paths(local_id).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(ctx.shows.first("Show X").map(|s| s.id), Some(local_id));

        // Removing the import detaches its path but keeps the local show
        handler
            .remove_imported_item(&import, &incoming, &mut ctx)
            .await
            .unwrap();
        assert!(repository
            .get_item(MediaType::TvShow, local_id)
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            repository.tvshow_paths(local_id).await.unwrap(),
            vec!["smb://nas/tv/show-x/".to_string()]
        );
        assert!(handler.local_items(&import).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_detaches_import_path() {
        let repository = Arc::new(InMemoryMediaRepository::new());
        let local_id = repository
            .save_item(&MediaItem::new(MediaType::TvShow, "smb://nas/tv/show-x/").with_title("Show X"))
            .await
            .unwrap();

        let handler = TvShowImportHandler::new(repository.clone());
        let import = import("upnp://srv/");
        let mut ctx = SyncContext::new("run");
        let mut incoming =
            MediaItem::new(MediaType::TvShow, "upnp://srv/tv/show-x/").with_title("Show X");
        handler.add_imported_item(&import, &mut incoming, &mut ctx).await.unwrap();

        // no episode of the import left
        let stats = handler.cleanup_imported_items(&import).await.unwrap();

        assert_eq!(stats.unlinked, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(
            repository.tvshow_paths(local_id).await.unwrap(),
            vec!["smb://nas/tv/show-x/".to_string()]
        );
        assert!(handler.local_items(&import).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_different_year_creates_new_show() {
        let repository = Arc::new(InMemoryMediaRepository::new());
        let local_id = repository
            .save_item(
                &MediaItem::new(MediaType::TvShow, "smb://nas/tv/dw/")
                    .with_title("Doctor Who")
                    .with_year(1963),
            )
            .await
            .unwrap();

        let handler = TvShowImportHandler::new(repository.clone());
        let import = import("upnp://srv/");
        let mut ctx = SyncContext::new("run");
        let mut incoming = MediaItem::new(MediaType::TvShow, "upnp://srv/tv/dw/")
            .with_title("Doctor Who")
            .with_year(2005);

        handler.add_imported_item(&import, &mut incoming, &mut ctx).await.unwrap();
        assert!(incoming.is_persisted());
        assert_ne!(incoming.id, local_id);
    }

    #[tokio::test]
    async fn test_unique_id_beats_year() {
        let repository = Arc::new(InMemoryMediaRepository::new());
        let local_id = repository
            .save_item(
                &MediaItem::new(MediaType::TvShow, "smb://nas/tv/x/")
                    .with_title("Show X")
                    .with_year(2007)
                    .with_unique_id("tvdb", "80348"),
            )
            .await
            .unwrap();

        let handler = TvShowImportHandler::new(repository.clone());
        let import = import("upnp://srv/");
        let mut ctx = SyncContext::new("run");
        let mut incoming = MediaItem::new(MediaType::TvShow, "upnp://srv/tv/x/")
            .with_title("Show X")
            .with_year(2008)
            .with_unique_id("tvdb", "80348");

        handler.add_imported_item(&import, &mut incoming, &mut ctx).await.unwrap();
        assert_eq!(incoming.id, local_id);
    }

    #[test]
    fn test_minimal_show_copies_shared_fields() {
        let mut episode = MediaItem::new(MediaType::Episode, "upnp://srv/tv/x/season 1/e01.mkv")
            .with_title("Pilot")
            .with_show_title("Show X")
            .with_episode(1, 1)
            .with_year(2008);
        episode.base_path = Some("upnp://srv/".to_string());
        episode.details.genres = vec!["Drama".to_string()];
        episode.details.production_code = Some("101".to_string());

        let show = minimal_show(&episode, "Show X", 2);
        assert_eq!(show.path, "upnp://srv/tv/x/");
        assert_eq!(show.title(), "Show X");
        assert_eq!(show.details.year, Some(2008));
        assert_eq!(show.details.genres, vec!["Drama".to_string()]);
        assert_eq!(show.details.production_code, None);
        assert_eq!(show.details.season, None);
    }
}
