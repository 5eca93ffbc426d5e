//! Run-scoped cache of parent entities keyed by title.
//!
//! Shows are resolved for seasons and episodes, sets for movies. The cache is
//! filled once when a run starts and grows as the run creates new parents.

use core_library::{paths, MediaItem};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct HierarchyCache {
    by_title: HashMap<String, Vec<MediaItem>>,
    loaded: bool,
}

impl HierarchyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached parents with `parents`.
    pub fn populate(&mut self, parents: impl IntoIterator<Item = MediaItem>) {
        self.by_title.clear();
        for parent in parents {
            self.insert(parent);
        }
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Adds a parent, replacing a cached entry with the same identity.
    pub fn insert(&mut self, parent: MediaItem) {
        let candidates = self.by_title.entry(parent.title().to_string()).or_default();
        match candidates.iter_mut().find(|cached| cached.id == parent.id) {
            Some(cached) => *cached = parent,
            None => candidates.push(parent),
        }
    }

    pub fn candidates(&self, title: &str) -> &[MediaItem] {
        self.by_title.get(title).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolves the parent titled `title` for a child located at `child_path`.
    ///
    /// A single candidate is taken as is. With several candidates only one
    /// whose location contains the child qualifies.
    pub fn resolve(&self, title: Option<&str>, child_path: &str) -> Option<&MediaItem> {
        let title = title.filter(|title| !title.is_empty())?;
        match self.candidates(title) {
            [] => None,
            [only] => Some(only),
            several => several
                .iter()
                .find(|candidate| paths::is_ancestor(&candidate.path, child_path)),
        }
    }

    /// First cached parent titled `title`, ignoring locations.
    pub fn first(&self, title: &str) -> Option<&MediaItem> {
        self.candidates(title).first()
    }

    pub fn len(&self) -> usize {
        self.by_title.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::MediaType;

    fn show(id: i64, title: &str, path: &str) -> MediaItem {
        let mut item = MediaItem::new(MediaType::TvShow, path).with_title(title);
        item.id = id;
        item
    }

    #[test]
    fn test_resolve_requires_title() {
        let mut cache = HierarchyCache::new();
        cache.populate(vec![show(1, "Show X", "upnp://srv/tv/x/")]);

        assert!(cache.resolve(None, "upnp://srv/tv/x/s01e01.mkv").is_none());
        assert!(cache.resolve(Some(""), "upnp://srv/tv/x/s01e01.mkv").is_none());
        assert!(cache.resolve(Some("Show Y"), "upnp://srv/tv/y/s01e01.mkv").is_none());
    }

    #[test]
    fn test_single_candidate_ignores_location() {
        let mut cache = HierarchyCache::new();
        cache.populate(vec![show(1, "Show X", "upnp://srv/tv/x/")]);

        let resolved = cache.resolve(Some("Show X"), "upnp://other/x/s01e01.mkv");
        assert_eq!(resolved.map(|item| item.id), Some(1));
    }

    #[test]
    fn test_several_candidates_disambiguated_by_location() {
        let mut cache = HierarchyCache::new();
        cache.populate(vec![
            show(1, "Doctor Who", "upnp://srv/tv/doctor-who-1963/"),
            show(2, "Doctor Who", "upnp://srv/tv/doctor-who-2005/"),
        ]);

        let resolved = cache.resolve(
            Some("Doctor Who"),
            "upnp://srv/tv/doctor-who-2005/season 1/rose.mkv",
        );
        assert_eq!(resolved.map(|item| item.id), Some(2));

        assert!(cache
            .resolve(Some("Doctor Who"), "upnp://srv/tv/misc/rose.mkv")
            .is_none());
    }

    #[test]
    fn test_insert_replaces_same_identity() {
        let mut cache = HierarchyCache::new();
        assert!(!cache.is_loaded());
        cache.insert(show(1, "Show X", "upnp://srv/tv/x/"));
        cache.insert(show(1, "Show X", "upnp://srv/tv/x2/"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.first("Show X").map(|s| s.path.as_str()), Some("upnp://srv/tv/x2/"));
    }
}
