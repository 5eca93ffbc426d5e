//! # Media Library Module
//!
//! Owns the local media library the import engine reconciles into.
//!
//! ## Overview
//!
//! This module provides:
//! - The media item model shared by every media type
//! - Import descriptors and their typed settings
//! - The `MediaRepository` persistence contract with in-memory and SQLite
//!   implementations
//! - SQLite pool creation and embedded migrations

pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod paths;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use import::{ImportId, ImportSettings, ImportSource, ImportTrigger, MediaImport, SettingValue};
pub use models::{
    Actor, Field, FieldDifferenceSet, GroupedMediaTypes, MediaItem, MediaType, PlaybackState,
    ResumePoint, VideoDetails, UNPERSISTED_ID,
};
pub use repositories::{
    ChildCounts, InMemoryMediaRepository, ItemFilter, MediaRepository, SqliteMediaRepository,
};
