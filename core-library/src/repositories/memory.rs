//! In-memory media repository
//!
//! Keeps the whole library in ordered maps behind an async mutex. A
//! transaction snapshots the store at `begin_transaction` and restores the
//! snapshot on rollback. Iteration follows insertion order, so "first match"
//! lookups are deterministic.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{LibraryError, Result};
use crate::import::{ImportId, MediaImport};
use crate::models::{MediaItem, MediaType, PlaybackState};
use crate::repositories::{ChildCounts, ItemFilter, MediaRepository};

#[derive(Debug, Clone)]
struct ImportLink {
    import: ImportId,
    path: String,
    enabled: bool,
}

#[derive(Debug, Clone)]
struct FileRecord {
    path: String,
    playback: PlaybackState,
}

#[derive(Debug, Clone, Default)]
struct Store {
    last_id: i64,
    items: BTreeMap<i64, MediaItem>,
    paths: BTreeMap<String, i64>,
    files: BTreeMap<i64, FileRecord>,
    show_paths: BTreeMap<i64, BTreeSet<String>>,
    links: BTreeMap<i64, Vec<ImportLink>>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn is_linked_to(&self, id: i64, import: &ImportId) -> bool {
        self.links
            .get(&id)
            .map(|links| links.iter().any(|link| &link.import == import))
            .unwrap_or(false)
    }

    fn matches(&self, item: &MediaItem, filter: &ItemFilter) -> bool {
        if item.media_type != filter.media_type {
            return false;
        }

        let links = self.links.get(&item.id).map(Vec::as_slice).unwrap_or(&[]);
        if filter.imported_only && links.is_empty() {
            return false;
        }
        if let Some(import) = &filter.import {
            match links.iter().find(|link| &link.import == import) {
                Some(link) if filter.enabled_only && !link.enabled => return false,
                Some(_) => {}
                None => return false,
            }
        } else if filter.enabled_only && !links.is_empty() && !links.iter().any(|l| l.enabled) {
            return false;
        }

        filter.show_id.map_or(true, |id| item.show_id == id)
            && filter.season_id.map_or(true, |id| item.season_id == id)
            && filter.season.map_or(true, |s| item.details.season == Some(s))
            && filter.set_id.map_or(true, |id| item.set_id == id)
            && filter
                .title
                .as_deref()
                .map_or(true, |title| item.details.title == title)
    }

    fn remove_item(&mut self, id: i64) {
        self.items.remove(&id);
        self.links.remove(&id);
        self.show_paths.remove(&id);
    }

    fn children_of(&self, parent_type: MediaType, parent_id: i64) -> Vec<i64> {
        self.items
            .values()
            .filter(|item| match parent_type {
                MediaType::TvShow => item.media_type == MediaType::Episode && item.show_id == parent_id,
                MediaType::Season => {
                    item.media_type == MediaType::Episode && item.season_id == parent_id
                }
                MediaType::MovieSet => item.media_type == MediaType::Movie && item.set_id == parent_id,
                _ => false,
            })
            .map(|item| item.id)
            .collect()
    }
}

#[derive(Debug)]
struct Inner {
    store: Store,
    snapshot: Option<Store>,
    open_count: usize,
    available: bool,
    writes: u64,
}

/// Media repository holding its state in memory
#[derive(Debug)]
pub struct InMemoryMediaRepository {
    inner: Mutex<Inner>,
}

impl Default for InMemoryMediaRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMediaRepository {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: Store::default(),
                snapshot: None,
                open_count: 0,
                available: true,
                writes: 0,
            }),
        }
    }

    /// Number of write operations that changed the store since creation
    pub async fn write_count(&self) -> u64 {
        self.inner.lock().await.writes
    }

    /// Simulate the store going away: `open` and `begin_transaction` fail
    /// until it becomes available again.
    pub async fn set_available(&self, available: bool) {
        self.inner.lock().await.available = available;
    }

    pub async fn in_transaction(&self) -> bool {
        self.inner.lock().await.snapshot.is_some()
    }

    pub async fn open_count(&self) -> usize {
        self.inner.lock().await.open_count
    }
}

#[async_trait]
impl MediaRepository for InMemoryMediaRepository {
    async fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.available {
            return Err(LibraryError::Unavailable("in-memory store offline".to_string()));
        }
        inner.open_count += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.open_count = inner.open_count.saturating_sub(1);
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.available {
            return Err(LibraryError::Unavailable("in-memory store offline".to_string()));
        }
        if inner.snapshot.is_some() {
            return Err(LibraryError::Transaction(
                "transaction already active".to_string(),
            ));
        }
        inner.snapshot = Some(inner.store.clone());
        debug!("Began in-memory transaction");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.available {
            return Err(LibraryError::Unavailable("in-memory store offline".to_string()));
        }
        match inner.snapshot.take() {
            Some(_) => Ok(()),
            None => Err(LibraryError::Transaction("no active transaction".to_string())),
        }
    }

    async fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.snapshot.take() {
            Some(snapshot) => {
                inner.store = snapshot;
                debug!("Rolled back in-memory transaction");
                Ok(())
            }
            None => Err(LibraryError::Transaction("no active transaction".to_string())),
        }
    }

    async fn get_items(&self, filter: &ItemFilter) -> Result<Vec<MediaItem>> {
        let inner = self.inner.lock().await;
        let store = &inner.store;
        Ok(store
            .items
            .values()
            .filter(|item| store.matches(item, filter))
            .cloned()
            .collect())
    }

    async fn count_items(&self, filter: &ItemFilter) -> Result<u64> {
        let inner = self.inner.lock().await;
        let store = &inner.store;
        Ok(store
            .items
            .values()
            .filter(|item| store.matches(item, filter))
            .count() as u64)
    }

    async fn get_item(&self, media_type: MediaType, id: i64) -> Result<Option<MediaItem>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .store
            .items
            .get(&id)
            .filter(|item| item.media_type == media_type)
            .cloned())
    }

    async fn save_item(&self, item: &MediaItem) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let id = if item.id > 0 {
            match inner.store.items.get(&item.id) {
                Some(existing) if existing.media_type == item.media_type => item.id,
                _ => {
                    return Err(LibraryError::NotFound {
                        entity_type: item.media_type.to_string(),
                        id: item.id.to_string(),
                    })
                }
            }
        } else {
            inner.store.next_id()
        };

        let mut stored = item.clone();
        stored.id = id;
        if stored.media_type == MediaType::TvShow && !stored.path.is_empty() {
            inner
                .store
                .show_paths
                .entry(id)
                .or_default()
                .insert(stored.path.clone());
        }
        inner.store.items.insert(id, stored);
        inner.writes += 1;
        Ok(id)
    }

    async fn delete_item(&self, media_type: MediaType, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let store = &mut inner.store;
        if !store
            .items
            .get(&id)
            .is_some_and(|item| item.media_type == media_type)
        {
            return Err(LibraryError::NotFound {
                entity_type: media_type.to_string(),
                id: id.to_string(),
            });
        }

        match media_type {
            MediaType::TvShow => {
                let dependants: Vec<i64> = store
                    .items
                    .values()
                    .filter(|item| {
                        matches!(item.media_type, MediaType::Season | MediaType::Episode)
                            && item.show_id == id
                    })
                    .map(|item| item.id)
                    .collect();
                for dependant in dependants {
                    store.remove_item(dependant);
                }
            }
            MediaType::Season => {
                for episode in store.children_of(MediaType::Season, id) {
                    store.remove_item(episode);
                }
            }
            MediaType::MovieSet => {
                for movie in store.children_of(MediaType::MovieSet, id) {
                    if let Some(item) = store.items.get_mut(&movie) {
                        item.set_id = -1;
                        item.details.set_name = None;
                    }
                }
            }
            _ => {}
        }

        store.remove_item(id);
        inner.writes += 1;
        Ok(())
    }

    async fn add_path(&self, path: &str) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        if let Some(id) = inner.store.paths.get(path) {
            return Ok(*id);
        }
        let id = inner.store.next_id();
        inner.store.paths.insert(path.to_string(), id);
        inner.writes += 1;
        Ok(id)
    }

    async fn add_file(&self, path: &str) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        if let Some((id, _)) = inner.store.files.iter().find(|(_, file)| file.path == path) {
            return Ok(*id);
        }
        let id = inner.store.next_id();
        inner.store.files.insert(
            id,
            FileRecord {
                path: path.to_string(),
                playback: PlaybackState::default(),
            },
        );
        inner.writes += 1;
        Ok(id)
    }

    async fn delete_file(&self, file_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.store.files.remove(&file_id).is_some() {
            inner.writes += 1;
        }
        Ok(())
    }

    async fn set_playback_state(
        &self,
        file_id: i64,
        state: &PlaybackState,
        reset: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let file = inner
            .store
            .files
            .get_mut(&file_id)
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "file".to_string(),
                id: file_id.to_string(),
            })?;

        if reset {
            file.playback.resume = None;
        }
        file.playback.playcount = state.playcount;
        file.playback.last_played = state.last_played;
        if let Some(resume) = state.resume.filter(|resume| resume.is_part_way()) {
            file.playback.resume = Some(resume);
        }
        inner.writes += 1;
        Ok(())
    }

    async fn get_playback_state(&self, file_id: i64) -> Result<Option<PlaybackState>> {
        let inner = self.inner.lock().await;
        Ok(inner.store.files.get(&file_id).map(|file| file.playback.clone()))
    }

    async fn count_children(
        &self,
        parent_type: MediaType,
        parent_id: i64,
        import: &MediaImport,
    ) -> Result<ChildCounts> {
        let inner = self.inner.lock().await;
        let store = &inner.store;
        let import_id = import.id();
        let children = store.children_of(parent_type, parent_id);
        let imported = children
            .iter()
            .filter(|child| store.is_linked_to(**child, &import_id))
            .count();

        Ok(ChildCounts {
            total: children.len() as u64,
            imported: imported as u64,
        })
    }

    async fn set_import_for_item(
        &self,
        media_type: MediaType,
        id: i64,
        import: &MediaImport,
        path: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner
            .store
            .items
            .get(&id)
            .is_some_and(|item| item.media_type == media_type)
        {
            return Err(LibraryError::NotFound {
                entity_type: media_type.to_string(),
                id: id.to_string(),
            });
        }

        let import_id = import.id();
        let links = inner.store.links.entry(id).or_default();
        match links.iter_mut().find(|link| link.import == import_id) {
            Some(link) => link.path = path.to_string(),
            None => links.push(ImportLink {
                import: import_id,
                path: path.to_string(),
                enabled: true,
            }),
        }
        inner.writes += 1;
        Ok(())
    }

    async fn remove_import_from_item(
        &self,
        _media_type: MediaType,
        id: i64,
        import: &MediaImport,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let import_id = import.id();
        let mut removed = false;
        if let Some(links) = inner.store.links.get_mut(&id) {
            let before = links.len();
            links.retain(|link| link.import != import_id);
            removed = links.len() != before;
            if links.is_empty() {
                inner.store.links.remove(&id);
            }
        }
        if removed {
            inner.writes += 1;
        }
        Ok(())
    }

    async fn delete_items_from_import(
        &self,
        import: &MediaImport,
        media_type: MediaType,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let import_id = import.id();
        let store = &mut inner.store;
        let doomed: Vec<i64> = store
            .items
            .values()
            .filter(|item| item.media_type == media_type && store.is_linked_to(item.id, &import_id))
            .map(|item| item.id)
            .collect();

        for id in &doomed {
            if let Some(item) = store.items.get(id) {
                if item.file_id > 0 {
                    let file_id = item.file_id;
                    store.files.remove(&file_id);
                }
            }
            store.remove_item(*id);
        }

        if !doomed.is_empty() {
            inner.writes += 1;
        }
        Ok(doomed.len() as u64)
    }

    async fn path_for_imported_item(
        &self,
        _media_type: MediaType,
        id: i64,
        import: &MediaImport,
    ) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        let import_id = import.id();
        Ok(inner.store.links.get(&id).and_then(|links| {
            links
                .iter()
                .find(|link| link.import == import_id)
                .map(|link| link.path.clone())
        }))
    }

    async fn set_import_items_enabled(
        &self,
        enable: bool,
        media_type: MediaType,
        import: &MediaImport,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let import_id = import.id();
        let store = &mut inner.store;
        let mut changed = false;
        for (id, links) in store.links.iter_mut() {
            if !store
                .items
                .get(id)
                .is_some_and(|item| item.media_type == media_type)
            {
                continue;
            }
            for link in links.iter_mut().filter(|link| link.import == import_id) {
                if link.enabled != enable {
                    link.enabled = enable;
                    changed = true;
                }
            }
        }
        if changed {
            inner.writes += 1;
        }
        Ok(())
    }

    async fn add_path_to_tvshow(&self, show_id: i64, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .store
            .show_paths
            .entry(show_id)
            .or_default()
            .insert(path.to_string())
        {
            inner.writes += 1;
        }
        Ok(())
    }

    async fn remove_path_from_tvshow(&self, show_id: i64, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .store
            .show_paths
            .get_mut(&show_id)
            .is_some_and(|paths| paths.remove(path))
        {
            inner.writes += 1;
        }
        Ok(())
    }

    async fn tvshow_paths(&self, show_id: i64) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .store
            .show_paths
            .get(&show_id)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportSource;
    use crate::models::ResumePoint;

    fn test_import() -> MediaImport {
        MediaImport::new(
            ImportSource::new("upnp://server-1/", "Server"),
            "tvshow,season,episode".parse().unwrap(),
        )
    }

    async fn insert_show(repo: &InMemoryMediaRepository, title: &str) -> i64 {
        let show = MediaItem::new(MediaType::TvShow, format!("upnp://server-1/{}/", title))
            .with_title(title);
        repo.save_item(&show).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_assigns_positive_ids() {
        let repo = InMemoryMediaRepository::new();
        let id = insert_show(&repo, "Show X").await;

        assert!(id > 0);
        let stored = repo.get_item(MediaType::TvShow, id).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.title(), "Show X");
        assert!(repo.get_item(MediaType::Movie, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_of_unknown_item_fails() {
        let repo = InMemoryMediaRepository::new();
        let mut item = MediaItem::new(MediaType::Movie, "upnp://server-1/a.mkv");
        item.id = 99;

        assert!(matches!(
            repo.save_item(&item).await,
            Err(LibraryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let repo = InMemoryMediaRepository::new();
        let kept = insert_show(&repo, "Kept").await;

        repo.begin_transaction().await.unwrap();
        let discarded = insert_show(&repo, "Discarded").await;
        repo.delete_item(MediaType::TvShow, kept).await.unwrap();
        repo.rollback().await.unwrap();

        assert!(repo.get_item(MediaType::TvShow, kept).await.unwrap().is_some());
        assert!(repo
            .get_item(MediaType::TvShow, discarded)
            .await
            .unwrap()
            .is_none());
        assert!(!repo.in_transaction().await);
    }

    #[tokio::test]
    async fn test_nested_begin_is_rejected() {
        let repo = InMemoryMediaRepository::new();
        repo.begin_transaction().await.unwrap();
        assert!(repo.begin_transaction().await.is_err());
        repo.commit().await.unwrap();
        assert!(repo.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_store_refuses_open() {
        let repo = InMemoryMediaRepository::new();
        repo.set_available(false).await;
        assert!(matches!(
            repo.open().await,
            Err(LibraryError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_filters_by_import_and_parent() {
        let repo = InMemoryMediaRepository::new();
        let import = test_import();
        let show_id = insert_show(&repo, "Show X").await;

        let mut episode = MediaItem::new(MediaType::Episode, "upnp://server-1/x/e1.mkv")
            .with_episode(1, 1);
        episode.show_id = show_id;
        let imported = repo.save_item(&episode).await.unwrap();
        repo.set_import_for_item(MediaType::Episode, imported, &import, &episode.path)
            .await
            .unwrap();

        episode.id = -1;
        episode.path = "local://x/e2.mkv".to_string();
        repo.save_item(&episode).await.unwrap();

        let all = repo
            .get_items(&ItemFilter::new(MediaType::Episode).show_id(show_id))
            .await
            .unwrap();
        let from_import = repo
            .get_items(&ItemFilter::new(MediaType::Episode).imported_from(&import))
            .await
            .unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(from_import.len(), 1);
        assert_eq!(from_import[0].id, imported);
    }

    #[tokio::test]
    async fn test_count_children_distinguishes_imported() {
        let repo = InMemoryMediaRepository::new();
        let import = test_import();
        let show_id = insert_show(&repo, "Show X").await;

        for n in 1..=3 {
            let mut episode = MediaItem::new(MediaType::Episode, format!("upnp://x/e{}.mkv", n));
            episode.show_id = show_id;
            let id = repo.save_item(&episode).await.unwrap();
            if n == 1 {
                repo.set_import_for_item(MediaType::Episode, id, &import, &episode.path)
                    .await
                    .unwrap();
            }
        }

        let counts = repo
            .count_children(MediaType::TvShow, show_id, &import)
            .await
            .unwrap();
        assert_eq!(counts, ChildCounts { total: 3, imported: 1 });
        assert_eq!(counts.others(), 2);
    }

    #[tokio::test]
    async fn test_delete_show_cascades() {
        let repo = InMemoryMediaRepository::new();
        let show_id = insert_show(&repo, "Show X").await;
        let mut season = MediaItem::new(MediaType::Season, "upnp://x/s1/");
        season.show_id = show_id;
        let season_id = repo.save_item(&season).await.unwrap();

        repo.delete_item(MediaType::TvShow, show_id).await.unwrap();

        assert!(repo
            .get_item(MediaType::Season, season_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_playback_reset_clears_resume() {
        let repo = InMemoryMediaRepository::new();
        let file_id = repo.add_file("upnp://x/e1.mkv").await.unwrap();
        let watched = PlaybackState {
            playcount: 1,
            last_played: None,
            resume: Some(ResumePoint::new(10.0, 100.0)),
        };
        repo.set_playback_state(file_id, &watched, false).await.unwrap();

        let cleared = PlaybackState {
            playcount: 2,
            ..PlaybackState::default()
        };
        repo.set_playback_state(file_id, &cleared, true).await.unwrap();

        let stored = repo.get_playback_state(file_id).await.unwrap().unwrap();
        assert_eq!(stored.playcount, 2);
        assert!(stored.resume.is_none());
    }

    #[tokio::test]
    async fn test_idempotent_paths_do_not_count_as_writes() {
        let repo = InMemoryMediaRepository::new();
        let first = repo.add_path("upnp://server-1/").await.unwrap();
        let writes = repo.write_count().await;
        let second = repo.add_path("upnp://server-1/").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.write_count().await, writes);
    }
}
