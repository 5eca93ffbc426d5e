//! # Handler Registry
//!
//! Maps media types to handler factories. Handlers that create parents of
//! another type (episodes and seasons creating shows, movies creating sets)
//! receive the registry when they are built and look the parent handler up
//! through it.

use core_library::{MediaRepository, MediaType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::handlers::{
    EpisodeImportHandler, ImportHandler, MovieImportHandler, MovieSetImportHandler,
    MusicVideoImportHandler, SeasonImportHandler, TvShowImportHandler,
};

/// Builds a handler from the repository and the registry it belongs to
pub type HandlerFactory = Arc<
    dyn Fn(Arc<dyn MediaRepository>, Arc<HandlerRegistry>) -> Arc<dyn ImportHandler>
        + Send
        + Sync,
>;

pub struct HandlerRegistry {
    repository: Arc<dyn MediaRepository>,
    factories: HashMap<MediaType, HandlerFactory>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new(repository: Arc<dyn MediaRepository>) -> Self {
        Self {
            repository,
            factories: HashMap::new(),
        }
    }

    /// Registry with a handler for every media type.
    pub fn with_defaults(repository: Arc<dyn MediaRepository>) -> Arc<Self> {
        let mut registry = Self::new(repository);
        registry.register_defaults();
        Arc::new(registry)
    }

    pub fn register_defaults(&mut self) {
        self.register(MediaType::Movie, |repository, registry| {
            Arc::new(MovieImportHandler::new(repository, registry))
        });
        self.register(MediaType::MovieSet, |repository, _| {
            Arc::new(MovieSetImportHandler::new(repository))
        });
        self.register(MediaType::TvShow, |repository, _| {
            Arc::new(TvShowImportHandler::new(repository))
        });
        self.register(MediaType::Season, |repository, registry| {
            Arc::new(SeasonImportHandler::new(repository, registry))
        });
        self.register(MediaType::Episode, |repository, registry| {
            Arc::new(EpisodeImportHandler::new(repository, registry))
        });
        self.register(MediaType::MusicVideo, |repository, _| {
            Arc::new(MusicVideoImportHandler::new(repository))
        });
    }

    /// Registers (or replaces) the factory for `media_type`.
    pub fn register<F>(&mut self, media_type: MediaType, factory: F)
    where
        F: Fn(Arc<dyn MediaRepository>, Arc<HandlerRegistry>) -> Arc<dyn ImportHandler>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(media_type, Arc::new(factory));
    }

    pub fn unregister(&mut self, media_type: MediaType) -> bool {
        self.factories.remove(&media_type).is_some()
    }

    pub fn contains(&self, media_type: MediaType) -> bool {
        self.factories.contains_key(&media_type)
    }

    /// Registered media types in canonical order.
    pub fn media_types(&self) -> Vec<MediaType> {
        MediaType::ALL
            .into_iter()
            .filter(|media_type| self.contains(*media_type))
            .collect()
    }

    pub fn repository(&self) -> &Arc<dyn MediaRepository> {
        &self.repository
    }

    /// Builds the handler for `media_type`, if one is registered.
    pub fn get_handler_for_type(self: &Arc<Self>, media_type: MediaType) -> Option<Arc<dyn ImportHandler>> {
        let factory = self.factories.get(&media_type)?;
        Some(factory(Arc::clone(&self.repository), Arc::clone(self)))
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("media_types", &self.media_types())
            .finish()
    }
}
