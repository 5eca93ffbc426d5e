//! Helpers for the URL-style item locations reported by sources.
//!
//! Paths are treated as opaque strings separated by `/`. Folder paths carry a
//! trailing separator, file paths do not.

/// Returns the last component of `path`, ignoring a trailing separator.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Returns the parent folder of `path` including its trailing separator, or
/// an empty string when `path` has no parent.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => String::new(),
    }
}

/// Walks `levels` folders up from `path`, never leaving `base_path`.
///
/// When the walk would cross the base path, the base path itself is returned.
pub fn ancestor_within(path: &str, levels: usize, base_path: Option<&str>) -> String {
    let mut current = path.to_string();
    for _ in 0..levels {
        if let Some(base) = base_path {
            if normalize_folder(&current) == normalize_folder(base) {
                break;
            }
        }
        let parent = parent_path(&current);
        if parent.is_empty() {
            break;
        }
        current = parent;
    }
    current
}

/// True when `ancestor` is a strict prefix folder of `path`.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        return false;
    }
    let folder = normalize_folder(ancestor);
    path.len() > folder.len() && path.starts_with(&folder)
}

/// Appends a trailing separator when missing.
pub fn normalize_folder(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("upnp://srv/shows/x/s01e01.mkv"), "s01e01.mkv");
        assert_eq!(file_name("upnp://srv/shows/x/"), "x");
        assert_eq!(file_name("plain"), "plain");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("upnp://srv/shows/x/s01e01.mkv"), "upnp://srv/shows/x/");
        assert_eq!(parent_path("upnp://srv/shows/x/"), "upnp://srv/shows/");
        assert_eq!(parent_path("plain"), "");
    }

    #[test]
    fn test_ancestor_within_stops_at_base_path() {
        let episode = "upnp://srv/shows/x/season 1/e01.mkv";
        assert_eq!(ancestor_within(episode, 2, None), "upnp://srv/shows/x/");
        assert_eq!(
            ancestor_within(episode, 3, Some("upnp://srv/shows/x/")),
            "upnp://srv/shows/x/"
        );
    }

    #[test]
    fn test_is_ancestor() {
        assert!(is_ancestor("upnp://srv/shows/x", "upnp://srv/shows/x/e01.mkv"));
        assert!(is_ancestor("upnp://srv/shows/x/", "upnp://srv/shows/x/e01.mkv"));
        assert!(!is_ancestor("upnp://srv/shows/xy/", "upnp://srv/shows/x/e01.mkv"));
        assert!(!is_ancestor("upnp://srv/shows/x/", "upnp://srv/shows/x/"));
        assert!(!is_ancestor("", "upnp://srv/shows/x/e01.mkv"));
    }
}
