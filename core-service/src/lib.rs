//! Media import service façade and bootstrap helpers.
//!
//! This crate wires the pieces of the import engine together: host
//! configuration, logging, the library store (SQLite on disk, or in memory
//! when no database path is configured), the default handler registry and
//! the sync coordinator. Hosts hand imports and the items reported by a
//! source to [`MediaImportService`] and observe runs through
//! [`MediaImportService::subscribe`].
//!
//! ```rust,ignore
//! let config = CoreConfig::builder().database_path("library.db").build()?;
//! let service = MediaImportService::new(config).await?;
//!
//! let mut events = service.subscribe();
//! let report = service.synchronise(&mut import, items).await?;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

use std::sync::Arc;

use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    ImportId, ImportTrigger, MediaImport, MediaItem, MediaRepository, SqliteMediaRepository,
};
use core_runtime::clock::Clock;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_runtime::logging::init_logging;
use core_sync::{
    ChangesetItem, DetailsLoader, HandlerRegistry, SyncConfig, SyncCoordinator, SyncReport,
};
use tracing::{debug, info, warn};

/// Primary façade exposed to host applications.
pub struct MediaImportService {
    config: CoreConfig,
    repository: Arc<dyn MediaRepository>,
    registry: Arc<HandlerRegistry>,
    coordinator: SyncCoordinator,
    event_bus: EventBus,
}

impl MediaImportService {
    /// Bootstraps a service with default sync settings.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn builder(config: CoreConfig) -> MediaImportServiceBuilder {
        MediaImportServiceBuilder::new(config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn MediaRepository> {
        Arc::clone(&self.repository)
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// New receiver for run and library events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Synchronises the complete current content of a source.
    pub async fn synchronise(
        &self,
        import: &mut MediaImport,
        items: Vec<MediaItem>,
    ) -> Result<SyncReport> {
        Ok(self.coordinator.try_synchronise(import, items).await?)
    }

    /// Synchronises deltas reported by a source.
    pub async fn synchronise_partial(
        &self,
        import: &mut MediaImport,
        changes: Vec<ChangesetItem>,
    ) -> Result<SyncReport> {
        Ok(self
            .coordinator
            .try_synchronise_partial(import, changes)
            .await?)
    }

    /// Synchronises `import` unless its trigger is set to manual.
    ///
    /// Returns `None` when the run was skipped.
    pub async fn synchronise_if_automatic(
        &self,
        import: &mut MediaImport,
        items: Vec<MediaItem>,
    ) -> Result<Option<SyncReport>> {
        let trigger = import.settings.import_trigger().unwrap_or_default();
        if trigger == ImportTrigger::Manual {
            debug!(import = %import, "Import is triggered manually, skipping");
            return Ok(None);
        }
        self.synchronise(import, items).await.map(Some)
    }

    /// Removes everything `import` brought into the library.
    pub async fn remove_import(&self, import: &MediaImport) -> Result<u64> {
        Ok(self.coordinator.remove_import(import).await?)
    }

    pub async fn set_imported_items_enabled(
        &self,
        import: &MediaImport,
        enable: bool,
    ) -> Result<()> {
        Ok(self
            .coordinator
            .set_imported_items_enabled(import, enable)
            .await?)
    }

    pub async fn cancel_synchronisation(&self, import: &ImportId) -> bool {
        self.coordinator.cancel_synchronisation(import).await
    }

    /// Cancels running imports and refuses new ones.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}

/// Builder for [`MediaImportService`].
pub struct MediaImportServiceBuilder {
    config: CoreConfig,
    sync_config: SyncConfig,
    repository: Option<Arc<dyn MediaRepository>>,
    details_loader: Option<Arc<dyn DetailsLoader>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MediaImportServiceBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            sync_config: SyncConfig::default(),
            repository: None,
            details_loader: None,
            clock: None,
        }
    }

    pub fn sync_config(mut self, sync_config: SyncConfig) -> Self {
        self.sync_config = sync_config;
        self
    }

    /// Uses `repository` instead of opening the configured database.
    pub fn repository(mut self, repository: Arc<dyn MediaRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn details_loader(mut self, loader: Arc<dyn DetailsLoader>) -> Self {
        self.details_loader = Some(loader);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the configuration, installs logging and opens the store.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid or the database
    /// cannot be opened and migrated.
    pub async fn build(self) -> Result<MediaImportService> {
        self.config.validate()?;
        self.sync_config.validate()?;

        if let Some(logging) = self.config.logging.clone() {
            if let Err(e) = init_logging(logging) {
                warn!(error = %e, "Keeping the already installed log subscriber");
            }
        }

        let repository = match self.repository {
            Some(repository) => repository,
            None => open_repository(&self.config).await?,
        };

        let registry = HandlerRegistry::with_defaults(Arc::clone(&repository));
        let event_bus = EventBus::new(self.config.event_buffer_size);

        let mut coordinator =
            SyncCoordinator::new(Arc::clone(&repository), Arc::clone(&registry), event_bus.clone())
                .with_config(self.sync_config);
        if let Some(loader) = self.details_loader {
            coordinator = coordinator.with_details_loader(loader);
        }
        if let Some(clock) = self.clock {
            coordinator = coordinator.with_clock(clock);
        }

        info!(
            in_memory = self.config.is_in_memory(),
            media_types = ?registry.media_types(),
            "Media import service ready"
        );

        Ok(MediaImportService {
            config: self.config,
            repository,
            registry,
            coordinator,
            event_bus,
        })
    }
}

async fn open_repository(config: &CoreConfig) -> Result<Arc<dyn MediaRepository>> {
    let database = match &config.database_path {
        Some(path) => DatabaseConfig::new(path.clone()).max_connections(config.max_connections),
        None => DatabaseConfig::in_memory(),
    };
    let pool = create_pool(database).await?;
    Ok(Arc::new(SqliteMediaRepository::new(pool)))
}
