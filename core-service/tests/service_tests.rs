//! Integration tests for the service façade
//!
//! These tests bootstrap the service the way a host does:
//! - Configuration validation before anything is opened
//! - Synchronisation against the bundled in-memory SQLite store
//! - Manual import triggers
//! - Event subscription

use chrono::{TimeZone, Utc};
use core_library::{
    ImportSource, ImportTrigger, InMemoryMediaRepository, ItemFilter, MediaImport, MediaItem,
    MediaRepository, MediaType,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, ImportEvent};
use core_runtime::FixedClock;
use core_service::{MediaImportService, ServiceError};
use core_sync::{ChangesetItem, SyncConfig};
use std::sync::Arc;

fn movie_import() -> MediaImport {
    MediaImport::new(
        ImportSource::new("upnp://server-1/", "Living Room"),
        "movie,movieset".parse().unwrap(),
    )
}

fn movie(title: &str, year: i32) -> MediaItem {
    MediaItem::new(
        MediaType::Movie,
        format!("upnp://server-1/movies/{}.mkv", title.to_lowercase()),
    )
    .with_title(title)
    .with_year(year)
}

async fn memory_service() -> (MediaImportService, Arc<InMemoryMediaRepository>) {
    let store = Arc::new(InMemoryMediaRepository::new());
    let service = MediaImportService::builder(CoreConfig::default())
        .repository(store.clone())
        .clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap(),
        )))
        .build()
        .await
        .unwrap();
    (service, store)
}

#[tokio::test]
async fn test_invalid_sync_config_is_rejected() {
    let result = MediaImportService::builder(CoreConfig::default())
        .repository(Arc::new(InMemoryMediaRepository::new()))
        .sync_config(SyncConfig::default().with_progress_interval(0))
        .build()
        .await;

    assert!(matches!(result, Err(ServiceError::Config(_))));
}

#[tokio::test]
async fn test_invalid_core_config_is_rejected() {
    let config = CoreConfig {
        max_connections: 0,
        ..CoreConfig::default()
    };
    let result = MediaImportService::new(config).await;

    assert!(matches!(result, Err(ServiceError::Config(_))));
}

#[tokio::test]
async fn test_synchronise_with_bundled_store() {
    let service = MediaImportService::new(CoreConfig::default()).await.unwrap();
    assert!(service.config().is_in_memory());

    let mut import = movie_import();
    let source = vec![movie("Alien", 1979), movie("Aliens", 1986)];

    let report = service.synchronise(&mut import, source.clone()).await.unwrap();
    assert_eq!(report.added, 2);
    assert!(import.last_synced.is_some());

    let report = service.synchronise(&mut import, source).await.unwrap();
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.added + report.updated + report.removed, 0);

    let repository = service.repository();
    let movies = repository
        .get_items(&ItemFilter::new(MediaType::Movie).imported_from(&import))
        .await
        .unwrap();
    assert_eq!(movies.len(), 2);
}

#[tokio::test]
async fn test_partial_sync_and_removal() {
    let (service, store) = memory_service().await;
    let mut import = movie_import();
    service
        .synchronise(&mut import, vec![movie("Alien", 1979), movie("Aliens", 1986)])
        .await
        .unwrap();

    let report = service
        .synchronise_partial(
            &mut import,
            vec![ChangesetItem::removed(movie("Aliens", 1986))],
        )
        .await
        .unwrap();
    assert_eq!(report.removed, 1);

    let removed = service.remove_import(&import).await.unwrap();
    assert_eq!(removed, 1);
    assert!(store
        .get_items(&ItemFilter::new(MediaType::Movie))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_manual_import_is_not_synchronised_automatically() {
    let (service, store) = memory_service().await;
    let mut import = movie_import();
    import.settings.set_import_trigger(ImportTrigger::Manual);

    let report = service
        .synchronise_if_automatic(&mut import, vec![movie("Alien", 1979)])
        .await
        .unwrap();

    assert!(report.is_none());
    assert!(import.last_synced.is_none());
    assert_eq!(store.write_count().await, 0);

    import.settings.set_import_trigger(ImportTrigger::Auto);
    let report = service
        .synchronise_if_automatic(&mut import, vec![movie("Alien", 1979)])
        .await
        .unwrap();
    assert_eq!(report.map(|r| r.added), Some(1));
}

#[tokio::test]
async fn test_subscribers_see_run_lifecycle() {
    let (service, _store) = memory_service().await;
    let mut events = service.subscribe();
    let mut import = movie_import();

    service
        .synchronise(&mut import, vec![movie("Alien", 1979)])
        .await
        .unwrap();

    let mut lifecycle = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Import(event) = event {
            lifecycle.push(event);
        }
    }
    assert!(matches!(lifecycle.first(), Some(ImportEvent::Started { .. })));
    assert!(matches!(
        lifecycle.last(),
        Some(ImportEvent::Completed { added: 1, .. })
    ));
}

#[tokio::test]
async fn test_shutdown_refuses_new_runs() {
    let (service, _store) = memory_service().await;
    service.shutdown();

    let mut import = movie_import();
    let result = service
        .synchronise(&mut import, vec![movie("Alien", 1979)])
        .await;
    assert!(matches!(result, Err(ServiceError::Sync(_))));
    assert!(!service.cancel_synchronisation(&import.id()).await);
}
