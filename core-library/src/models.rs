//! Domain models for the media library
//!
//! Items are tagged by [`MediaType`] and share one shape: database identity,
//! provenance (source and base path), parent linkage, artwork and the
//! [`VideoDetails`] descriptive block that the changeset classifier diffs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::LibraryError;
use crate::paths;

/// Database identity of an item that has not been persisted yet.
pub const UNPERSISTED_ID: i64 = -1;

// =============================================================================
// Media Types
// =============================================================================

/// Kind of media record handled by the import engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    #[serde(rename = "set")]
    MovieSet,
    TvShow,
    Season,
    Episode,
    MusicVideo,
}

impl MediaType {
    pub const ALL: [MediaType; 6] = [
        MediaType::Movie,
        MediaType::MovieSet,
        MediaType::TvShow,
        MediaType::Season,
        MediaType::Episode,
        MediaType::MusicVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::MovieSet => "set",
            MediaType::TvShow => "tvshow",
            MediaType::Season => "season",
            MediaType::Episode => "episode",
            MediaType::MusicVideo => "musicvideo",
        }
    }

    /// Folder items are not backed by a playable file.
    pub fn is_folder(&self) -> bool {
        matches!(
            self,
            MediaType::MovieSet | MediaType::TvShow | MediaType::Season
        )
    }

    /// Parent entity this type hangs off, if any.
    pub fn parent_kind(&self) -> Option<MediaType> {
        match self {
            MediaType::Movie => Some(MediaType::MovieSet),
            MediaType::Season | MediaType::Episode => Some(MediaType::TvShow),
            _ => None,
        }
    }
}

impl FromStr for MediaType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "movie" => Ok(MediaType::Movie),
            "set" => Ok(MediaType::MovieSet),
            "tvshow" => Ok(MediaType::TvShow),
            "season" => Ok(MediaType::Season),
            "episode" => Ok(MediaType::Episode),
            "musicvideo" => Ok(MediaType::MusicVideo),
            other => Err(LibraryError::InvalidInput {
                field: "media_type".to_string(),
                message: format!("unknown media type '{}'", other),
            }),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free group of media types imported together.
///
/// The string form joins the members with commas, e.g. `tvshow,season,episode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GroupedMediaTypes(Vec<MediaType>);

impl GroupedMediaTypes {
    pub fn new(types: impl IntoIterator<Item = MediaType>) -> Self {
        let mut grouped = Vec::new();
        for media_type in types {
            if !grouped.contains(&media_type) {
                grouped.push(media_type);
            }
        }
        Self(grouped)
    }

    pub fn contains(&self, media_type: MediaType) -> bool {
        self.0.contains(&media_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = MediaType> + '_ {
        self.0.iter().copied()
    }

    /// True when every member of `other` is part of this group.
    pub fn contains_all(&self, other: &GroupedMediaTypes) -> bool {
        other.iter().all(|media_type| self.contains(media_type))
    }
}

impl FromIterator<MediaType> for GroupedMediaTypes {
    fn from_iter<T: IntoIterator<Item = MediaType>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl FromStr for GroupedMediaTypes {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(MediaType::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl fmt::Display for GroupedMediaTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|media_type| media_type.as_str())
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

// =============================================================================
// Item Details
// =============================================================================

/// Cast member credited on an item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: String,
    pub thumb: Option<String>,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            thumb: None,
        }
    }

    pub fn with_thumb(mut self, thumb: impl Into<String>) -> Self {
        self.thumb = Some(thumb.into());
        self
    }
}

/// Position at which playback stopped
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResumePoint {
    pub position_secs: f64,
    pub total_secs: f64,
}

impl ResumePoint {
    pub fn new(position_secs: f64, total_secs: f64) -> Self {
        Self {
            position_secs,
            total_secs,
        }
    }

    /// A resume point only counts when playback stopped somewhere inside the item.
    pub fn is_part_way(&self) -> bool {
        self.total_secs > 0.0 && self.position_secs > 0.0
    }
}

/// Playback-derived state of an item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub playcount: u32,
    pub last_played: Option<DateTime<Utc>>,
    pub resume: Option<ResumePoint>,
}

/// Descriptive metadata shared by every video media type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDetails {
    pub title: String,
    pub original_title: Option<String>,
    pub sort_title: Option<String>,
    /// Title of the owning show (seasons and episodes)
    pub show_title: Option<String>,
    /// Name of the owning movie set (movies)
    pub set_name: Option<String>,
    pub year: Option<i32>,
    pub premiered: Option<NaiveDate>,
    pub first_aired: Option<NaiveDate>,
    pub plot: Option<String>,
    pub plot_outline: Option<String>,
    pub tagline: Option<String>,
    pub rating: Option<f64>,
    pub user_rating: Option<i32>,
    pub top250: Option<i32>,
    pub mpaa: Option<String>,
    pub genres: Vec<String>,
    pub countries: Vec<String>,
    pub directors: Vec<String>,
    pub writers: Vec<String>,
    pub studios: Vec<String>,
    pub tags: Vec<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub cast: Vec<Actor>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub special_sort_season: Option<i32>,
    pub special_sort_episode: Option<i32>,
    pub production_code: Option<String>,
    pub track_number: Option<i32>,
    pub show_status: Option<String>,
    pub trailer: Option<String>,
    pub unique_ids: BTreeMap<String, String>,
    pub duration_secs: Option<u32>,
    pub playback: PlaybackState,
}

// =============================================================================
// Field Differences
// =============================================================================

/// Comparable detail field of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Title,
    OriginalTitle,
    SortTitle,
    TvShowTitle,
    Set,
    Year,
    Premiered,
    AirDate,
    Plot,
    PlotOutline,
    Tagline,
    Rating,
    UserRating,
    Top250,
    Mpaa,
    Genre,
    Country,
    Director,
    Writer,
    Studio,
    Tag,
    Artist,
    Album,
    Actor,
    Season,
    EpisodeNumber,
    SeasonSpecialSort,
    EpisodeNumberSpecialSort,
    ProductionCode,
    TrackNumber,
    TvShowStatus,
    Trailer,
    UniqueId,
    Time,
    Path,
    Filename,
    Playcount,
    LastPlayed,
    InProgress,
}

impl Field {
    /// Fields derived from playback rather than from descriptive metadata.
    pub const PLAYBACK: [Field; 3] = [Field::Playcount, Field::LastPlayed, Field::InProgress];
}

/// Named fields found to differ between two items.
pub type FieldDifferenceSet = BTreeSet<Field>;

// =============================================================================
// Media Item
// =============================================================================

/// A media record, either incoming from a source or loaded from the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Database identity, `<= 0` until persisted
    pub id: i64,
    pub media_type: MediaType,
    /// Location of the item as reported by its source
    pub path: String,
    /// Identifier of the source the item was imported from
    pub source: Option<String>,
    pub base_path: Option<String>,
    pub file_id: i64,
    pub parent_path_id: i64,
    /// Owning show for seasons and episodes
    pub show_id: i64,
    /// Owning season for episodes
    pub season_id: i64,
    /// Owning set for movies
    pub set_id: i64,
    /// Artwork type (e.g. `poster`, `set.fanart`) to URL
    pub art: BTreeMap<String, String>,
    pub details: VideoDetails,
}

impl MediaItem {
    pub fn new(media_type: MediaType, path: impl Into<String>) -> Self {
        Self {
            id: UNPERSISTED_ID,
            media_type,
            path: path.into(),
            source: None,
            base_path: None,
            file_id: UNPERSISTED_ID,
            parent_path_id: UNPERSISTED_ID,
            show_id: UNPERSISTED_ID,
            season_id: UNPERSISTED_ID,
            set_id: UNPERSISTED_ID,
            art: BTreeMap::new(),
            details: VideoDetails::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.details.title = title.into();
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.details.year = Some(year);
        self
    }

    pub fn with_show_title(mut self, show_title: impl Into<String>) -> Self {
        self.details.show_title = Some(show_title.into());
        self
    }

    pub fn with_set_name(mut self, set_name: impl Into<String>) -> Self {
        self.details.set_name = Some(set_name.into());
        self
    }

    pub fn with_episode(mut self, season: i32, episode: i32) -> Self {
        self.details.season = Some(season);
        self.details.episode = Some(episode);
        self
    }

    pub fn with_art(mut self, kind: impl Into<String>, url: impl Into<String>) -> Self {
        self.art.insert(kind.into(), url.into());
        self
    }

    pub fn with_unique_id(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.unique_ids.insert(kind.into(), value.into());
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    pub fn title(&self) -> &str {
        &self.details.title
    }

    pub fn is_folder(&self) -> bool {
        self.media_type.is_folder()
    }

    /// Last path component of the item location
    pub fn file_name(&self) -> &str {
        paths::file_name(&self.path)
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.details.playback
    }

    /// Compares the details of two items and returns every field that differs.
    ///
    /// Artwork and database linkage are not part of the comparison.
    pub fn differences(&self, other: &MediaItem) -> FieldDifferenceSet {
        let a = &self.details;
        let b = &other.details;
        let mut diff = FieldDifferenceSet::new();

        let mut check = |field: Field, differs: bool| {
            if differs {
                diff.insert(field);
            }
        };

        check(Field::Title, a.title != b.title);
        check(Field::OriginalTitle, a.original_title != b.original_title);
        check(Field::SortTitle, a.sort_title != b.sort_title);
        check(Field::TvShowTitle, a.show_title != b.show_title);
        check(Field::Set, a.set_name != b.set_name);
        check(Field::Year, a.year != b.year);
        check(Field::Premiered, a.premiered != b.premiered);
        check(Field::AirDate, a.first_aired != b.first_aired);
        check(Field::Plot, a.plot != b.plot);
        check(Field::PlotOutline, a.plot_outline != b.plot_outline);
        check(Field::Tagline, a.tagline != b.tagline);
        check(Field::Rating, a.rating != b.rating);
        check(Field::UserRating, a.user_rating != b.user_rating);
        check(Field::Top250, a.top250 != b.top250);
        check(Field::Mpaa, a.mpaa != b.mpaa);
        check(Field::Genre, a.genres != b.genres);
        check(Field::Country, a.countries != b.countries);
        check(Field::Director, a.directors != b.directors);
        check(Field::Writer, a.writers != b.writers);
        check(Field::Studio, a.studios != b.studios);
        check(Field::Tag, a.tags != b.tags);
        check(Field::Artist, a.artists != b.artists);
        check(Field::Album, a.album != b.album);
        check(Field::Actor, a.cast != b.cast);
        check(Field::Season, a.season != b.season);
        check(Field::EpisodeNumber, a.episode != b.episode);
        check(Field::SeasonSpecialSort, a.special_sort_season != b.special_sort_season);
        check(
            Field::EpisodeNumberSpecialSort,
            a.special_sort_episode != b.special_sort_episode,
        );
        check(Field::ProductionCode, a.production_code != b.production_code);
        check(Field::TrackNumber, a.track_number != b.track_number);
        check(Field::TvShowStatus, a.show_status != b.show_status);
        check(Field::Trailer, a.trailer != b.trailer);
        check(Field::UniqueId, a.unique_ids != b.unique_ids);
        check(Field::Time, a.duration_secs != b.duration_secs);
        check(Field::Path, self.path != other.path);
        check(Field::Filename, self.file_name() != other.file_name());
        check(Field::Playcount, a.playback.playcount != b.playback.playcount);
        check(Field::LastPlayed, a.playback.last_played != b.playback.last_played);
        check(Field::InProgress, a.playback.resume != b.playback.resume);

        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_round_trips_through_strings() {
        for media_type in MediaType::ALL {
            assert_eq!(media_type.as_str().parse::<MediaType>().unwrap(), media_type);
        }
        assert!("album".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_grouped_media_types_keeps_order_and_drops_duplicates() {
        let grouped: GroupedMediaTypes = "tvshow,season,episode,season".parse().unwrap();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped.to_string(), "tvshow,season,episode");
        assert!(grouped.contains(MediaType::Season));
        assert!(!grouped.contains(MediaType::Movie));
    }

    #[test]
    fn test_differences_of_identical_items_is_empty() {
        let item = MediaItem::new(MediaType::Movie, "upnp://server/movies/alien.mkv")
            .with_title("Alien")
            .with_year(1979);

        assert!(item.differences(&item.clone()).is_empty());
    }

    #[test]
    fn test_differences_ignore_artwork_and_identity() {
        let local = MediaItem::new(MediaType::Movie, "upnp://server/movies/alien.mkv")
            .with_title("Alien")
            .with_art("poster", "http://img/poster.jpg");
        let mut incoming = local.clone();
        incoming.id = 42;
        incoming.art.clear();

        assert!(local.differences(&incoming).is_empty());
    }

    #[test]
    fn test_differences_report_changed_fields() {
        let local = MediaItem::new(MediaType::Episode, "upnp://server/shows/x/s01e01.mkv")
            .with_title("Pilot")
            .with_episode(1, 1);
        let mut incoming = local.clone();
        incoming.details.title = "Pilot (Extended)".to_string();
        incoming.details.playback.playcount = 2;
        incoming.path = "upnp://server/shows/x/s01e01-extended.mkv".to_string();

        let diff = local.differences(&incoming);
        assert_eq!(
            diff.into_iter().collect::<Vec<_>>(),
            vec![Field::Title, Field::Path, Field::Filename, Field::Playcount]
        );
    }

    #[test]
    fn test_resume_point_part_way() {
        assert!(ResumePoint::new(30.0, 120.0).is_part_way());
        assert!(!ResumePoint::new(0.0, 120.0).is_part_way());
        assert!(!ResumePoint::default().is_part_way());
    }
}
