//! # Changeset Classification
//!
//! Decides whether an incoming item changes its local counterpart.
//!
//! ## Algorithm
//!
//! 1. Without full metadata updates only playback state is compared.
//! 2. Artwork is compared next, since the generic field diff skips it.
//!    Artwork attached automatically by the library (placeholders, synthetic
//!    `image://` thumbnails, art inherited from a parent entity) is stripped
//!    from the local side before giving up on equality.
//! 3. The field diff is reduced by the playback fields (unless playback is
//!    mirrored from the source) and by the handler's ignore list.
//! 4. Cast differences are forgiven when the source omits the cast or only
//!    the cast thumbnails.

use core_library::{Actor, Field, MediaItem, MediaType, PlaybackState};
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// Artwork values the library attaches when an item has no art of its own.
const PLACEHOLDER_ARTWORK: [&str; 2] = ["DefaultVideo.png", "DefaultFolder.png"];

/// Prefix of thumbnails generated by the library's image loader.
const GENERATED_ARTWORK_SCHEME: &str = "image://";

/// Classification of an incoming item relative to its local counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangesetType {
    /// Identical for reconciliation purposes
    None,
    /// No local counterpart yet
    Added,
    Changed,
    /// Local item no longer reported by the source
    Removed,
}

impl ChangesetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangesetType::None => "none",
            ChangesetType::Added => "added",
            ChangesetType::Changed => "changed",
            ChangesetType::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangesetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the classifier takes into account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyOptions {
    /// Compare all metadata, not only playback state
    pub update_all_metadata: bool,
    /// Keep playback differences in the full comparison
    pub update_playback_metadata: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            update_all_metadata: true,
            update_playback_metadata: true,
        }
    }
}

/// Type-specific knowledge the classifier needs
#[derive(Debug, Clone, Copy)]
pub struct ComparisonRules {
    pub media_type: MediaType,
    /// Fields legitimately sourced elsewhere for this media type
    pub ignored_fields: &'static [Field],
    /// Artwork key prefixes inherited from parent entities
    pub parent_artwork_prefixes: &'static [&'static str],
}

/// Classifies `incoming` against the matched `local` item.
///
/// Only ever yields [`ChangesetType::None`] or [`ChangesetType::Changed`].
pub fn classify(
    rules: &ComparisonRules,
    local: &MediaItem,
    incoming: &MediaItem,
    options: ClassifyOptions,
) -> ChangesetType {
    if !options.update_all_metadata {
        return if same_playback(local.playback(), incoming.playback()) {
            ChangesetType::None
        } else {
            ChangesetType::Changed
        };
    }

    if !artwork_equivalent(rules, &local.art, &incoming.art) {
        return ChangesetType::Changed;
    }

    let mut differences = local.differences(incoming);
    if !options.update_playback_metadata {
        for field in Field::PLAYBACK {
            differences.remove(&field);
        }
    }
    for field in rules.ignored_fields {
        differences.remove(field);
    }

    if differences.contains(&Field::Actor)
        && cast_equivalent(&local.details.cast, &incoming.details.cast)
    {
        differences.remove(&Field::Actor);
    }

    if differences.is_empty() {
        ChangesetType::None
    } else {
        trace!(
            media_type = %rules.media_type,
            item = %local.title(),
            fields = ?differences,
            "Item differs from local counterpart"
        );
        ChangesetType::Changed
    }
}

/// Play count, last played and resume position. The runtime recorded with
/// the resume point does not count.
fn same_playback(local: &PlaybackState, incoming: &PlaybackState) -> bool {
    let position = |state: &PlaybackState| state.resume.as_ref().map_or(0.0, |r| r.position_secs);
    local.playcount == incoming.playcount
        && local.last_played == incoming.last_played
        && position(local) == position(incoming)
}

fn artwork_equivalent(
    rules: &ComparisonRules,
    local: &BTreeMap<String, String>,
    incoming: &BTreeMap<String, String>,
) -> bool {
    if local == incoming {
        return true;
    }
    // Same number of entries means the source really reports different art.
    if local.len() == incoming.len() {
        return false;
    }

    strip_automatic_artwork(local, rules.parent_artwork_prefixes) == *incoming
}

/// Removes artwork the library attached on its own: placeholder images,
/// generated `image://` thumbnails and art keyed under a parent prefix
/// (e.g. `set.poster`, `tvshow.fanart`).
pub fn strip_automatic_artwork(
    art: &BTreeMap<String, String>,
    parent_prefixes: &[&str],
) -> BTreeMap<String, String> {
    art.iter()
        .filter(|(kind, url)| {
            !PLACEHOLDER_ARTWORK.contains(&url.as_str())
                && !url.starts_with(GENERATED_ARTWORK_SCHEME)
                && !parent_prefixes.iter().any(|prefix| {
                    kind.strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('.'))
                })
        })
        .map(|(kind, url)| (kind.clone(), url.clone()))
        .collect()
}

/// True when two casts only differ in ways sources are known to drop.
///
/// An empty incoming cast never counts as a change. Otherwise names and roles
/// must line up one by one, and thumbnails are only compared when the
/// incoming entry carries one.
pub fn cast_equivalent(local: &[Actor], incoming: &[Actor]) -> bool {
    if incoming.is_empty() {
        return true;
    }
    if local.len() != incoming.len() {
        return false;
    }

    local.iter().zip(incoming).all(|(mine, theirs)| {
        mine.name == theirs.name
            && mine.role == theirs.role
            && theirs
                .thumb
                .as_ref()
                .map_or(true, |thumb| mine.thumb.as_ref() == Some(thumb))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::ResumePoint;

    const MOVIE_RULES: ComparisonRules = ComparisonRules {
        media_type: MediaType::Movie,
        ignored_fields: &[Field::Album, Field::Artist, Field::Season],
        parent_artwork_prefixes: &["set"],
    };

    fn movie() -> MediaItem {
        MediaItem::new(MediaType::Movie, "upnp://srv/movies/heat.mkv")
            .with_title("Heat")
            .with_year(1995)
            .with_art("poster", "http://srv/art/heat.jpg")
    }

    #[test]
    fn test_identical_items_are_unchanged() {
        let local = movie();
        let incoming = movie();
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, ClassifyOptions::default()),
            ChangesetType::None
        );
    }

    #[test]
    fn test_title_change_is_detected() {
        let local = movie();
        let incoming = movie().with_title("Heat (Director's Cut)");
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, ClassifyOptions::default()),
            ChangesetType::Changed
        );
    }

    #[test]
    fn test_playback_only_mode() {
        let options = ClassifyOptions {
            update_all_metadata: false,
            update_playback_metadata: true,
        };
        let local = movie();
        let mut incoming = movie().with_title("Renamed upstream");
        assert_eq!(classify(&MOVIE_RULES, &local, &incoming, options), ChangesetType::None);

        incoming.details.playback = PlaybackState {
            playcount: 2,
            last_played: None,
            resume: Some(ResumePoint::new(120.0, 6000.0)),
        };
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, options),
            ChangesetType::Changed
        );
    }

    #[test]
    fn test_playback_only_mode_ignores_resume_runtime() {
        let options = ClassifyOptions {
            update_all_metadata: false,
            update_playback_metadata: true,
        };
        let mut local = movie();
        local.details.playback.resume = Some(ResumePoint::new(120.0, 6000.0));
        let mut incoming = movie();
        incoming.details.playback.resume = Some(ResumePoint::new(120.0, 6120.0));
        assert_eq!(classify(&MOVIE_RULES, &local, &incoming, options), ChangesetType::None);

        incoming.details.playback.resume = Some(ResumePoint::new(300.0, 6120.0));
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, options),
            ChangesetType::Changed
        );
    }

    #[test]
    fn test_playback_fields_dropped_when_not_mirrored() {
        let options = ClassifyOptions {
            update_all_metadata: true,
            update_playback_metadata: false,
        };
        let local = movie();
        let mut incoming = movie();
        incoming.details.playback.playcount = 7;
        assert_eq!(classify(&MOVIE_RULES, &local, &incoming, options), ChangesetType::None);
    }

    #[test]
    fn test_ignored_fields_do_not_count() {
        let local = movie();
        let mut incoming = movie();
        incoming.details.album = Some("Soundtrack".to_string());
        incoming.details.season = Some(3);
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, ClassifyOptions::default()),
            ChangesetType::None
        );
    }

    #[test]
    fn test_same_size_artwork_difference_is_a_change() {
        let local = movie();
        let incoming = movie().with_art("poster", "http://srv/art/heat-new.jpg");
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, ClassifyOptions::default()),
            ChangesetType::Changed
        );
    }

    #[test]
    fn test_automatic_artwork_is_stripped() {
        let local = movie()
            .with_art("set.fanart", "http://srv/art/set.jpg")
            .with_art("thumb", "image://video@heat.mkv/")
            .with_art("icon", "DefaultVideo.png");
        let incoming = movie();
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, ClassifyOptions::default()),
            ChangesetType::None
        );
    }

    #[test]
    fn test_real_extra_artwork_is_a_change() {
        let local = movie().with_art("fanart", "http://srv/art/heat-fanart.jpg");
        let incoming = movie();
        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, ClassifyOptions::default()),
            ChangesetType::Changed
        );
    }

    #[test]
    fn test_strip_requires_prefix_separator() {
        let mut art = BTreeMap::new();
        art.insert("settings".to_string(), "http://srv/a.jpg".to_string());
        art.insert("set.poster".to_string(), "http://srv/b.jpg".to_string());
        let stripped = strip_automatic_artwork(&art, &["set"]);
        assert!(stripped.contains_key("settings"));
        assert!(!stripped.contains_key("set.poster"));
    }

    #[test]
    fn test_cast_without_thumbnails_is_equivalent() {
        let local = vec![
            Actor::new("Al Pacino", "Vincent Hanna").with_thumb("http://srv/pacino.jpg"),
            Actor::new("Robert De Niro", "Neil McCauley"),
        ];
        let incoming = vec![
            Actor::new("Al Pacino", "Vincent Hanna"),
            Actor::new("Robert De Niro", "Neil McCauley"),
        ];
        assert!(cast_equivalent(&local, &incoming));
        assert!(cast_equivalent(&local, &[]));
    }

    #[test]
    fn test_cast_differences() {
        let local = vec![Actor::new("Al Pacino", "Vincent Hanna")];
        let renamed = vec![Actor::new("Al Pacino", "Lt. Hanna")];
        let longer = vec![
            Actor::new("Al Pacino", "Vincent Hanna"),
            Actor::new("Val Kilmer", "Chris Shiherlis"),
        ];
        let new_thumb =
            vec![Actor::new("Al Pacino", "Vincent Hanna").with_thumb("http://srv/new.jpg")];

        assert!(!cast_equivalent(&local, &renamed));
        assert!(!cast_equivalent(&local, &longer));
        assert!(!cast_equivalent(&local, &new_thumb));
    }

    #[test]
    fn test_cast_without_thumbnails_classifies_unchanged() {
        let mut local = movie();
        local.details.cast =
            vec![Actor::new("Al Pacino", "Vincent Hanna").with_thumb("http://srv/pacino.jpg")];
        let mut incoming = movie();
        incoming.details.cast = vec![Actor::new("Al Pacino", "Vincent Hanna")];

        assert_eq!(
            classify(&MOVIE_RULES, &local, &incoming, ClassifyOptions::default()),
            ChangesetType::None
        );
    }
}
