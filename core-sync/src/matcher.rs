//! Finds the local counterpart of an incoming item.

use core_library::{paths, MediaItem};
use tracing::debug;

/// Identity key used to pair incoming and local items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    /// Same location at the source
    Path,
    /// Same show title, with compatible years
    ShowTitle,
    /// Same show title, compatible years and same season number
    SeasonOfShow,
    /// Same title
    Title,
}

impl MatchKey {
    pub fn matches(&self, incoming: &MediaItem, local: &MediaItem) -> bool {
        match self {
            MatchKey::Path => {
                paths::normalize_folder(&incoming.path) == paths::normalize_folder(&local.path)
            }
            MatchKey::ShowTitle => {
                incoming.title() == local.title()
                    && years_compatible(incoming.details.year, local.details.year)
            }
            MatchKey::SeasonOfShow => {
                incoming.details.show_title == local.details.show_title
                    && years_compatible(incoming.details.year, local.details.year)
                    && incoming.details.season == local.details.season
            }
            MatchKey::Title => incoming.title() == local.title(),
        }
    }
}

// A missing year on either side never rules out a match.
fn years_compatible(a: Option<i32>, b: Option<i32>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Returns the first local item matching `incoming` under `key`.
///
/// Several candidates are possible for weak keys (two shows with the same
/// title and no year); the earliest stored one wins and the ambiguity is
/// logged.
pub fn find_matching_local_item<'a>(
    key: MatchKey,
    incoming: &MediaItem,
    local_items: &'a [MediaItem],
) -> Option<&'a MediaItem> {
    let mut candidates = local_items.iter().filter(|local| key.matches(incoming, local));
    let first = candidates.next()?;

    let others = candidates.count();
    if others > 0 {
        debug!(
            item = %incoming.title(),
            media_type = %incoming.media_type,
            chosen_id = first.id,
            other_candidates = others,
            "Ambiguous local match, using first candidate"
        );
    }

    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::MediaType;

    fn show(id: i64, title: &str, year: Option<i32>) -> MediaItem {
        let mut item = MediaItem::new(MediaType::TvShow, format!("upnp://srv/tv/{}/", id));
        item.id = id;
        item.details.title = title.to_string();
        item.details.year = year;
        item
    }

    #[test]
    fn test_path_match_ignores_trailing_separator() {
        let mut local = MediaItem::new(MediaType::Movie, "upnp://srv/movies/heat/");
        local.id = 4;
        let incoming = MediaItem::new(MediaType::Movie, "upnp://srv/movies/heat");

        let locals = vec![local];
        let found = find_matching_local_item(MatchKey::Path, &incoming, &locals);
        assert_eq!(found.map(|item| item.id), Some(4));
    }

    #[test]
    fn test_show_match_tolerates_missing_year() {
        let locals = vec![show(1, "Show X", Some(2008)), show(2, "Show X", None)];

        let with_year = show(-1, "Show X", Some(2010));
        let found = find_matching_local_item(MatchKey::ShowTitle, &with_year, &locals);
        assert_eq!(found.map(|item| item.id), Some(2));

        let without_year = show(-1, "Show X", None);
        let found = find_matching_local_item(MatchKey::ShowTitle, &without_year, &locals);
        assert_eq!(found.map(|item| item.id), Some(1));
    }

    #[test]
    fn test_season_match_requires_season_number() {
        let mut local = MediaItem::new(MediaType::Season, "upnp://srv/tv/x/season1/")
            .with_show_title("Show X")
            .with_title("Season 1");
        local.id = 9;
        local.details.season = Some(1);

        let mut incoming = local.clone();
        incoming.id = -1;
        incoming.path = "upnp://srv/elsewhere/".to_string();

        let locals = vec![local];
        assert!(find_matching_local_item(MatchKey::SeasonOfShow, &incoming, &locals).is_some());

        incoming.details.season = Some(2);
        assert!(find_matching_local_item(MatchKey::SeasonOfShow, &incoming, &locals).is_none());
    }

    #[test]
    fn test_no_candidates() {
        let incoming = show(-1, "Unknown", None);
        assert!(find_matching_local_item(MatchKey::Title, &incoming, &[]).is_none());
    }
}
