//! SQLite media repository
//!
//! All statements of one repository run on a single pooled connection that is
//! acquired lazily and kept until the last `close`. Transactions are plain
//! `BEGIN`/`COMMIT`/`ROLLBACK` on that connection, so every write between
//! `begin_transaction` and `commit` lands atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{query, query_as, query_scalar, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{LibraryError, Result};
use crate::import::MediaImport;
use crate::models::{MediaItem, MediaType, PlaybackState, ResumePoint};
use crate::repositories::{ChildCounts, ItemFilter, MediaRepository};

#[derive(Default)]
struct ConnectionState {
    conn: Option<PoolConnection<Sqlite>>,
    open_count: usize,
    in_transaction: bool,
}

/// SQLite implementation of MediaRepository
pub struct SqliteMediaRepository {
    pool: SqlitePool,
    state: Mutex<ConnectionState>,
}

impl SqliteMediaRepository {
    /// Create a new SqliteMediaRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    async fn connection<'a>(
        &self,
        state: &'a mut ConnectionState,
    ) -> Result<&'a mut SqliteConnection> {
        if state.conn.is_none() {
            state.conn = Some(self.pool.acquire().await?);
        }
        state
            .conn
            .as_deref_mut()
            .ok_or_else(|| LibraryError::Unavailable("connection not acquired".to_string()))
    }

    fn release_if_idle(state: &mut ConnectionState) {
        if state.open_count == 0 && !state.in_transaction {
            state.conn = None;
        }
    }
}

/// Database row representation of a media item
#[derive(Debug, FromRow)]
struct MediaItemRow {
    id: i64,
    media_type: String,
    path: String,
    source: Option<String>,
    base_path: Option<String>,
    file_id: i64,
    parent_path_id: i64,
    show_id: i64,
    season_id: i64,
    set_id: i64,
    art: String,
    details: String,
}

impl TryFrom<MediaItemRow> for MediaItem {
    type Error = LibraryError;

    fn try_from(row: MediaItemRow) -> Result<Self> {
        Ok(MediaItem {
            id: row.id,
            media_type: row.media_type.parse()?,
            path: row.path,
            source: row.source,
            base_path: row.base_path,
            file_id: row.file_id,
            parent_path_id: row.parent_path_id,
            show_id: row.show_id,
            season_id: row.season_id,
            set_id: row.set_id,
            art: serde_json::from_str(&row.art)?,
            details: serde_json::from_str(&row.details)?,
        })
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ItemFilter) {
    builder.push(" WHERE i.media_type = ");
    builder.push_bind(filter.media_type.as_str());

    if let Some(import) = &filter.import {
        builder.push(
            " AND EXISTS (SELECT 1 FROM item_imports l WHERE l.item_id = i.id AND l.import_source = ",
        );
        builder.push_bind(import.source.clone());
        builder.push(" AND l.import_media_types = ");
        builder.push_bind(import.media_types.clone());
        if filter.enabled_only {
            builder.push(" AND l.enabled = 1");
        }
        builder.push(")");
    } else {
        if filter.imported_only {
            builder.push(" AND EXISTS (SELECT 1 FROM item_imports l WHERE l.item_id = i.id)");
        }
        if filter.enabled_only {
            builder.push(
                " AND (NOT EXISTS (SELECT 1 FROM item_imports l WHERE l.item_id = i.id) \
                 OR EXISTS (SELECT 1 FROM item_imports l WHERE l.item_id = i.id AND l.enabled = 1))",
            );
        }
    }

    if let Some(show_id) = filter.show_id {
        builder.push(" AND i.show_id = ");
        builder.push_bind(show_id);
    }
    if let Some(season_id) = filter.season_id {
        builder.push(" AND i.season_id = ");
        builder.push_bind(season_id);
    }
    if let Some(season) = filter.season {
        builder.push(" AND i.season = ");
        builder.push_bind(season);
    }
    if let Some(set_id) = filter.set_id {
        builder.push(" AND i.set_id = ");
        builder.push_bind(set_id);
    }
    if let Some(title) = &filter.title {
        builder.push(" AND i.title = ");
        builder.push_bind(title.clone());
    }
}

/// Child media type and linking column for a parent type
fn child_relation(parent_type: MediaType) -> Result<(MediaType, &'static str)> {
    match parent_type {
        MediaType::TvShow => Ok((MediaType::Episode, "show_id")),
        MediaType::Season => Ok((MediaType::Episode, "season_id")),
        MediaType::MovieSet => Ok((MediaType::Movie, "set_id")),
        other => Err(LibraryError::InvalidInput {
            field: "parent_type".to_string(),
            message: format!("{} has no children", other),
        }),
    }
}

async fn ensure_item_exists(
    conn: &mut SqliteConnection,
    media_type: MediaType,
    id: i64,
) -> Result<()> {
    let exists = query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM media_items WHERE id = ? AND media_type = ?",
    )
    .bind(id)
    .bind(media_type.as_str())
    .fetch_one(&mut *conn)
    .await?;

    if exists == 0 {
        return Err(LibraryError::NotFound {
            entity_type: media_type.to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

async fn delete_item_rows(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    query("DELETE FROM item_imports WHERE item_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    query("DELETE FROM tvshow_paths WHERE show_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    query("DELETE FROM media_items WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    async fn open(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.connection(&mut state).await?;
        state.open_count += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.open_count = state.open_count.saturating_sub(1);
        Self::release_if_idle(&mut state);
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.in_transaction {
            return Err(LibraryError::Transaction(
                "transaction already active".to_string(),
            ));
        }
        let conn = self.connection(&mut state).await?;
        query("BEGIN").execute(&mut *conn).await?;
        state.in_transaction = true;
        debug!("Began SQLite transaction");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.in_transaction {
            return Err(LibraryError::Transaction("no active transaction".to_string()));
        }
        let conn = self.connection(&mut state).await?;
        query("COMMIT").execute(&mut *conn).await?;
        state.in_transaction = false;
        Self::release_if_idle(&mut state);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.in_transaction {
            return Err(LibraryError::Transaction("no active transaction".to_string()));
        }
        let conn = self.connection(&mut state).await?;
        let result = query("ROLLBACK").execute(&mut *conn).await;
        state.in_transaction = false;
        if let Err(e) = result {
            warn!(error = %e, "Rollback failed, discarding connection");
            state.conn = None;
            return Err(LibraryError::Database(e));
        }
        Self::release_if_idle(&mut state);
        debug!("Rolled back SQLite transaction");
        Ok(())
    }

    async fn get_items(&self, filter: &ItemFilter) -> Result<Vec<MediaItem>> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT i.* FROM media_items i");
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY i.id");

        let rows = builder
            .build_query_as::<MediaItemRow>()
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter().map(MediaItem::try_from).collect()
    }

    async fn count_items(&self, filter: &ItemFilter) -> Result<u64> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM media_items i");
        push_filter(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn get_item(&self, media_type: MediaType, id: i64) -> Result<Option<MediaItem>> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let row = query_as::<_, MediaItemRow>(
            "SELECT * FROM media_items WHERE id = ? AND media_type = ?",
        )
        .bind(id)
        .bind(media_type.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(MediaItem::try_from).transpose()
    }

    async fn save_item(&self, item: &MediaItem) -> Result<i64> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let art = serde_json::to_string(&item.art)?;
        let details = serde_json::to_string(&item.details)?;

        let id = if item.id > 0 {
            let result = query(
                r#"
                UPDATE media_items
                SET path = ?, title = ?, source = ?, base_path = ?, file_id = ?,
                    parent_path_id = ?, show_id = ?, season_id = ?, set_id = ?,
                    season = ?, art = ?, details = ?
                WHERE id = ? AND media_type = ?
                "#,
            )
            .bind(&item.path)
            .bind(&item.details.title)
            .bind(&item.source)
            .bind(&item.base_path)
            .bind(item.file_id)
            .bind(item.parent_path_id)
            .bind(item.show_id)
            .bind(item.season_id)
            .bind(item.set_id)
            .bind(item.details.season)
            .bind(&art)
            .bind(&details)
            .bind(item.id)
            .bind(item.media_type.as_str())
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(LibraryError::NotFound {
                    entity_type: item.media_type.to_string(),
                    id: item.id.to_string(),
                });
            }
            item.id
        } else {
            query(
                r#"
                INSERT INTO media_items (
                    media_type, path, title, source, base_path, file_id,
                    parent_path_id, show_id, season_id, set_id, season, art, details
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(item.media_type.as_str())
            .bind(&item.path)
            .bind(&item.details.title)
            .bind(&item.source)
            .bind(&item.base_path)
            .bind(item.file_id)
            .bind(item.parent_path_id)
            .bind(item.show_id)
            .bind(item.season_id)
            .bind(item.set_id)
            .bind(item.details.season)
            .bind(&art)
            .bind(&details)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid()
        };

        if item.media_type == MediaType::TvShow && !item.path.is_empty() {
            query("INSERT OR IGNORE INTO tvshow_paths (show_id, path) VALUES (?, ?)")
                .bind(id)
                .bind(&item.path)
                .execute(&mut *conn)
                .await?;
        }

        Ok(id)
    }

    async fn delete_item(&self, media_type: MediaType, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;
        ensure_item_exists(conn, media_type, id).await?;

        match media_type {
            MediaType::TvShow => {
                let dependants = query_scalar::<_, i64>(
                    "SELECT id FROM media_items WHERE show_id = ? AND media_type IN ('season', 'episode')",
                )
                .bind(id)
                .fetch_all(&mut *conn)
                .await?;
                for dependant in dependants {
                    delete_item_rows(conn, dependant).await?;
                }
            }
            MediaType::Season => {
                let episodes = query_scalar::<_, i64>(
                    "SELECT id FROM media_items WHERE season_id = ? AND media_type = 'episode'",
                )
                .bind(id)
                .fetch_all(&mut *conn)
                .await?;
                for episode in episodes {
                    delete_item_rows(conn, episode).await?;
                }
            }
            MediaType::MovieSet => {
                query(
                    r#"
                    UPDATE media_items
                    SET set_id = -1, details = json_remove(details, '$.set_name')
                    WHERE set_id = ? AND media_type = 'movie'
                    "#,
                )
                .bind(id)
                .execute(&mut *conn)
                .await?;
            }
            _ => {}
        }

        delete_item_rows(conn, id).await
    }

    async fn add_path(&self, path: &str) -> Result<i64> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        query("INSERT OR IGNORE INTO paths (path) VALUES (?)")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        let id = query_scalar::<_, i64>("SELECT id FROM paths WHERE path = ?")
            .bind(path)
            .fetch_one(&mut *conn)
            .await?;
        Ok(id)
    }

    async fn add_file(&self, path: &str) -> Result<i64> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        query("INSERT OR IGNORE INTO files (path) VALUES (?)")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        let id = query_scalar::<_, i64>("SELECT id FROM files WHERE path = ?")
            .bind(path)
            .fetch_one(&mut *conn)
            .await?;
        Ok(id)
    }

    async fn delete_file(&self, file_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        query("DELETE FROM files WHERE id = ?")
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_playback_state(
        &self,
        file_id: i64,
        playback: &PlaybackState,
        reset: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        if reset {
            query("UPDATE files SET resume_position = NULL, resume_total = NULL WHERE id = ?")
                .bind(file_id)
                .execute(&mut *conn)
                .await?;
        }

        let result = query("UPDATE files SET playcount = ?, last_played = ? WHERE id = ?")
            .bind(i64::from(playback.playcount))
            .bind(playback.last_played.map(|played| played.to_rfc3339()))
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "file".to_string(),
                id: file_id.to_string(),
            });
        }

        if let Some(resume) = playback.resume.filter(|resume| resume.is_part_way()) {
            query("UPDATE files SET resume_position = ?, resume_total = ? WHERE id = ?")
                .bind(resume.position_secs)
                .bind(resume.total_secs)
                .bind(file_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    async fn get_playback_state(&self, file_id: i64) -> Result<Option<PlaybackState>> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let row = query_as::<_, (i64, Option<String>, Option<f64>, Option<f64>)>(
            "SELECT playcount, last_played, resume_position, resume_total FROM files WHERE id = ?",
        )
        .bind(file_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((playcount, last_played, position, total)) = row else {
            return Ok(None);
        };

        let last_played = last_played
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|parsed| parsed.with_timezone(&Utc))
                    .map_err(|e| LibraryError::InvalidInput {
                        field: "last_played".to_string(),
                        message: e.to_string(),
                    })
            })
            .transpose()?;

        Ok(Some(PlaybackState {
            playcount: playcount.clamp(0, i64::from(u32::MAX)) as u32,
            last_played,
            resume: match (position, total) {
                (Some(position), Some(total)) => Some(ResumePoint::new(position, total)),
                _ => None,
            },
        }))
    }

    async fn count_children(
        &self,
        parent_type: MediaType,
        parent_id: i64,
        import: &MediaImport,
    ) -> Result<ChildCounts> {
        let (child_type, column) = child_relation(parent_type)?;
        let import_id = import.id();

        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let sql = format!(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN EXISTS (
                    SELECT 1 FROM item_imports l
                    WHERE l.item_id = c.id AND l.import_source = ? AND l.import_media_types = ?
                ) THEN 1 ELSE 0 END), 0)
            FROM media_items c
            WHERE c.media_type = ? AND c.{} = ?
            "#,
            column
        );

        let (total, imported) = query_as::<_, (i64, i64)>(&sql)
            .bind(&import_id.source)
            .bind(&import_id.media_types)
            .bind(child_type.as_str())
            .bind(parent_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(ChildCounts {
            total: total.max(0) as u64,
            imported: imported.max(0) as u64,
        })
    }

    async fn set_import_for_item(
        &self,
        media_type: MediaType,
        id: i64,
        import: &MediaImport,
        path: &str,
    ) -> Result<()> {
        let import_id = import.id();
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;
        ensure_item_exists(conn, media_type, id).await?;

        query(
            r#"
            INSERT INTO item_imports (item_id, media_type, import_source, import_media_types, path, enabled)
            VALUES (?, ?, ?, ?, ?, 1)
            ON CONFLICT (item_id, import_source, import_media_types)
            DO UPDATE SET path = excluded.path
            "#,
        )
        .bind(id)
        .bind(media_type.as_str())
        .bind(&import_id.source)
        .bind(&import_id.media_types)
        .bind(path)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn remove_import_from_item(
        &self,
        _media_type: MediaType,
        id: i64,
        import: &MediaImport,
    ) -> Result<()> {
        let import_id = import.id();
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        query(
            "DELETE FROM item_imports WHERE item_id = ? AND import_source = ? AND import_media_types = ?",
        )
        .bind(id)
        .bind(&import_id.source)
        .bind(&import_id.media_types)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn delete_items_from_import(
        &self,
        import: &MediaImport,
        media_type: MediaType,
    ) -> Result<u64> {
        let import_id = import.id();
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let doomed = query_as::<_, (i64, i64)>(
            r#"
            SELECT i.id, i.file_id FROM media_items i
            JOIN item_imports l ON l.item_id = i.id
            WHERE i.media_type = ? AND l.import_source = ? AND l.import_media_types = ?
            "#,
        )
        .bind(media_type.as_str())
        .bind(&import_id.source)
        .bind(&import_id.media_types)
        .fetch_all(&mut *conn)
        .await?;

        for (id, file_id) in &doomed {
            if *file_id > 0 {
                query("DELETE FROM files WHERE id = ?")
                    .bind(*file_id)
                    .execute(&mut *conn)
                    .await?;
            }
            delete_item_rows(conn, *id).await?;
        }
        Ok(doomed.len() as u64)
    }

    async fn path_for_imported_item(
        &self,
        _media_type: MediaType,
        id: i64,
        import: &MediaImport,
    ) -> Result<Option<String>> {
        let import_id = import.id();
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let path = query_scalar::<_, String>(
            "SELECT path FROM item_imports WHERE item_id = ? AND import_source = ? AND import_media_types = ?",
        )
        .bind(id)
        .bind(&import_id.source)
        .bind(&import_id.media_types)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(path)
    }

    async fn set_import_items_enabled(
        &self,
        enable: bool,
        media_type: MediaType,
        import: &MediaImport,
    ) -> Result<()> {
        let import_id = import.id();
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        query(
            r#"
            UPDATE item_imports SET enabled = ?
            WHERE media_type = ? AND import_source = ? AND import_media_types = ?
            "#,
        )
        .bind(enable)
        .bind(media_type.as_str())
        .bind(&import_id.source)
        .bind(&import_id.media_types)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn add_path_to_tvshow(&self, show_id: i64, path: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        query("INSERT OR IGNORE INTO tvshow_paths (show_id, path) VALUES (?, ?)")
            .bind(show_id)
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn remove_path_from_tvshow(&self, show_id: i64, path: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        query("DELETE FROM tvshow_paths WHERE show_id = ? AND path = ?")
            .bind(show_id)
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn tvshow_paths(&self, show_id: i64) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;

        let paths = query_scalar::<_, String>(
            "SELECT path FROM tvshow_paths WHERE show_id = ? ORDER BY path",
        )
        .bind(show_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::import::ImportSource;

    fn test_import() -> MediaImport {
        MediaImport::new(
            ImportSource::new("upnp://server-1/", "Server"),
            "movie,set".parse().unwrap(),
        )
    }

    async fn test_repository() -> SqliteMediaRepository {
        let pool = create_test_pool().await.unwrap();
        SqliteMediaRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_reload_item() {
        let repo = test_repository().await;
        let movie = MediaItem::new(MediaType::Movie, "upnp://server-1/alien.mkv")
            .with_title("Alien")
            .with_year(1979)
            .with_art("poster", "http://img/alien.jpg");

        let id = repo.save_item(&movie).await.unwrap();
        assert!(id > 0);

        let stored = repo.get_item(MediaType::Movie, id).await.unwrap().unwrap();
        assert_eq!(stored.title(), "Alien");
        assert_eq!(stored.details.year, Some(1979));
        assert_eq!(stored.art.get("poster").map(String::as_str), Some("http://img/alien.jpg"));
    }

    #[tokio::test]
    async fn test_update_missing_item_is_not_found() {
        let repo = test_repository().await;
        let mut movie = MediaItem::new(MediaType::Movie, "upnp://server-1/alien.mkv");
        movie.id = 404;

        assert!(matches!(
            repo.save_item(&movie).await,
            Err(LibraryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let repo = test_repository().await;
        repo.open().await.unwrap();
        repo.begin_transaction().await.unwrap();
        let id = repo
            .save_item(&MediaItem::new(MediaType::Movie, "upnp://server-1/a.mkv"))
            .await
            .unwrap();
        repo.rollback().await.unwrap();

        assert!(repo.get_item(MediaType::Movie, id).await.unwrap().is_none());
        repo.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_count_children_in_one_read() {
        let repo = test_repository().await;
        let import = test_import();
        let set_id = repo
            .save_item(&MediaItem::new(MediaType::MovieSet, "").with_title("Trilogy"))
            .await
            .unwrap();

        for n in 1..=3 {
            let mut movie = MediaItem::new(MediaType::Movie, format!("upnp://server-1/{}.mkv", n));
            movie.set_id = set_id;
            let id = repo.save_item(&movie).await.unwrap();
            if n < 3 {
                repo.set_import_for_item(MediaType::Movie, id, &import, &movie.path)
                    .await
                    .unwrap();
            }
        }

        let counts = repo
            .count_children(MediaType::MovieSet, set_id, &import)
            .await
            .unwrap();
        assert_eq!(counts, ChildCounts { total: 3, imported: 2 });
    }

    #[tokio::test]
    async fn test_filter_imported_and_enabled() {
        let repo = test_repository().await;
        let import = test_import();
        let movie = MediaItem::new(MediaType::Movie, "upnp://server-1/a.mkv").with_title("A");
        let id = repo.save_item(&movie).await.unwrap();
        repo.set_import_for_item(MediaType::Movie, id, &import, &movie.path)
            .await
            .unwrap();

        let filter = ItemFilter::new(MediaType::Movie)
            .imported_from(&import)
            .enabled_only();
        assert_eq!(repo.count_items(&filter).await.unwrap(), 1);

        repo.set_import_items_enabled(false, MediaType::Movie, &import)
            .await
            .unwrap();
        assert_eq!(repo.count_items(&filter).await.unwrap(), 0);
        assert_eq!(
            repo.path_for_imported_item(MediaType::Movie, id, &import)
                .await
                .unwrap()
                .as_deref(),
            Some("upnp://server-1/a.mkv")
        );
    }

    #[tokio::test]
    async fn test_delete_set_detaches_movies() {
        let repo = test_repository().await;
        let set_id = repo
            .save_item(&MediaItem::new(MediaType::MovieSet, "").with_title("Trilogy"))
            .await
            .unwrap();
        let mut movie = MediaItem::new(MediaType::Movie, "upnp://server-1/a.mkv")
            .with_set_name("Trilogy");
        movie.set_id = set_id;
        let movie_id = repo.save_item(&movie).await.unwrap();

        repo.delete_item(MediaType::MovieSet, set_id).await.unwrap();

        let stored = repo.get_item(MediaType::Movie, movie_id).await.unwrap().unwrap();
        assert_eq!(stored.set_id, -1);
        assert_eq!(stored.details.set_name, None);
    }

    #[tokio::test]
    async fn test_tvshow_paths() {
        let repo = test_repository().await;
        let show_id = repo
            .save_item(&MediaItem::new(MediaType::TvShow, "upnp://server-1/x/").with_title("X"))
            .await
            .unwrap();
        repo.add_path_to_tvshow(show_id, "upnp://server-2/x/").await.unwrap();
        repo.remove_path_from_tvshow(show_id, "upnp://server-1/x/")
            .await
            .unwrap();

        assert_eq!(
            repo.tvshow_paths(show_id).await.unwrap(),
            vec!["upnp://server-2/x/".to_string()]
        );
    }
}
