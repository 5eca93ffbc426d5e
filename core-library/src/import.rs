//! Import descriptors
//!
//! A [`MediaImport`] pairs an [`ImportSource`] with a group of media types and
//! carries the [`ImportSettings`] that steer synchronisation. The engine only
//! reads the descriptor, apart from stamping `last_synced` after a successful
//! run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{LibraryError, Result};
use crate::models::{GroupedMediaTypes, MediaType};

pub const SETTING_IMPORT_TRIGGER: &str = "sync.importtrigger";
pub const SETTING_UPDATE_IMPORTED_ITEMS: &str = "sync.updateimporteditems";
pub const SETTING_UPDATE_PLAYBACK_FROM_SOURCE: &str = "sync.updateplaybackmetadatafromsource";
pub const SETTING_UPDATE_PLAYBACK_ON_SOURCE: &str = "sync.updateplaybackmetadataonsource";

// =============================================================================
// Source
// =============================================================================

/// External provider an import pulls items from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSource {
    /// Unique identifier, also used as base path of imported items
    pub identifier: String,
    pub friendly_name: String,
    pub protocol: Option<String>,
}

impl ImportSource {
    pub fn new(identifier: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            friendly_name: friendly_name.into(),
            protocol: None,
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }
}

// =============================================================================
// Settings
// =============================================================================

/// When an import is synchronised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportTrigger {
    #[default]
    Auto,
    Manual,
}

impl ImportTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportTrigger::Auto => "auto",
            ImportTrigger::Manual => "manual",
        }
    }
}

impl FromStr for ImportTrigger {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(ImportTrigger::Auto),
            "manual" => Ok(ImportTrigger::Manual),
            other => Err(LibraryError::InvalidInput {
                field: SETTING_IMPORT_TRIGGER.to_string(),
                message: format!("unknown import trigger '{}'", other),
            }),
        }
    }
}

impl fmt::Display for ImportTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a single import setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl SettingValue {
    fn kind(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Integer(_) => "integer",
            SettingValue::String(_) => "string",
        }
    }
}

/// Flat map of named options with type-checked accessors
///
/// [`ImportSettings::default`] is populated with the synchronisation options
/// every import understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    values: BTreeMap<String, SettingValue>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            SETTING_IMPORT_TRIGGER.to_string(),
            SettingValue::String(ImportTrigger::Auto.as_str().to_string()),
        );
        values.insert(
            SETTING_UPDATE_IMPORTED_ITEMS.to_string(),
            SettingValue::Bool(true),
        );
        values.insert(
            SETTING_UPDATE_PLAYBACK_FROM_SOURCE.to_string(),
            SettingValue::Bool(true),
        );
        values.insert(
            SETTING_UPDATE_PLAYBACK_ON_SOURCE.to_string(),
            SettingValue::Bool(true),
        );
        Self { values }
    }
}

impl ImportSettings {
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: SettingValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.require(key)? {
            SettingValue::Bool(value) => Ok(*value),
            other => Err(Self::type_mismatch(key, "bool", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.require(key)? {
            SettingValue::Integer(value) => Ok(*value),
            other => Err(Self::type_mismatch(key, "integer", other)),
        }
    }

    pub fn get_string(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            SettingValue::String(value) => Ok(value),
            other => Err(Self::type_mismatch(key, "string", other)),
        }
    }

    pub fn import_trigger(&self) -> Result<ImportTrigger> {
        self.get_string(SETTING_IMPORT_TRIGGER)?.parse()
    }

    pub fn set_import_trigger(&mut self, trigger: ImportTrigger) {
        self.set(
            SETTING_IMPORT_TRIGGER,
            SettingValue::String(trigger.as_str().to_string()),
        );
    }

    pub fn update_imported_items(&self) -> Result<bool> {
        self.get_bool(SETTING_UPDATE_IMPORTED_ITEMS)
    }

    pub fn set_update_imported_items(&mut self, enable: bool) {
        self.set(SETTING_UPDATE_IMPORTED_ITEMS, SettingValue::Bool(enable));
    }

    pub fn update_playback_metadata_from_source(&self) -> Result<bool> {
        self.get_bool(SETTING_UPDATE_PLAYBACK_FROM_SOURCE)
    }

    pub fn set_update_playback_metadata_from_source(&mut self, enable: bool) {
        self.set(SETTING_UPDATE_PLAYBACK_FROM_SOURCE, SettingValue::Bool(enable));
    }

    pub fn update_playback_metadata_on_source(&self) -> Result<bool> {
        self.get_bool(SETTING_UPDATE_PLAYBACK_ON_SOURCE)
    }

    pub fn set_update_playback_metadata_on_source(&mut self, enable: bool) {
        self.set(SETTING_UPDATE_PLAYBACK_ON_SOURCE, SettingValue::Bool(enable));
    }

    /// Serializes the settings for persistence alongside the import.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.values)?)
    }

    /// Restores persisted settings on top of the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let stored: BTreeMap<String, SettingValue> = serde_json::from_str(json)?;
        let mut settings = Self::default();
        settings.values.extend(stored);
        Ok(settings)
    }

    fn require(&self, key: &str) -> Result<&SettingValue> {
        self.values.get(key).ok_or_else(|| LibraryError::NotFound {
            entity_type: "setting".to_string(),
            id: key.to_string(),
        })
    }

    fn type_mismatch(key: &str, expected: &str, actual: &SettingValue) -> LibraryError {
        LibraryError::SettingType {
            key: key.to_string(),
            expected: expected.to_string(),
            actual: actual.kind().to_string(),
        }
    }
}

// =============================================================================
// Import
// =============================================================================

/// Identity of an import: source identifier plus grouped media types
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportId {
    pub source: String,
    pub media_types: String,
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.media_types)
    }
}

/// One configured pairing of a source and the media types synchronised from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaImport {
    pub source: ImportSource,
    pub media_types: GroupedMediaTypes,
    pub last_synced: Option<DateTime<Utc>>,
    pub settings: ImportSettings,
}

impl MediaImport {
    pub fn new(source: ImportSource, media_types: GroupedMediaTypes) -> Self {
        Self {
            source,
            media_types,
            last_synced: None,
            settings: ImportSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn id(&self) -> ImportId {
        ImportId {
            source: self.source.identifier.clone(),
            media_types: self.media_types.to_string(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source.identifier
    }

    pub fn contains(&self, media_type: MediaType) -> bool {
        self.media_types.contains(media_type)
    }
}

impl fmt::Display for MediaImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source.friendly_name, self.media_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ImportSettings::default();
        assert_eq!(settings.import_trigger().unwrap(), ImportTrigger::Auto);
        assert!(settings.update_imported_items().unwrap());
        assert!(settings.update_playback_metadata_from_source().unwrap());
        assert!(settings.update_playback_metadata_on_source().unwrap());
    }

    #[test]
    fn test_accessor_rejects_wrong_type() {
        let mut settings = ImportSettings::default();
        settings.set(SETTING_UPDATE_IMPORTED_ITEMS, SettingValue::String("yes".into()));

        match settings.update_imported_items() {
            Err(LibraryError::SettingType { key, expected, actual }) => {
                assert_eq!(key, SETTING_UPDATE_IMPORTED_ITEMS);
                assert_eq!(expected, "bool");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let settings = ImportSettings::default();
        assert!(matches!(
            settings.get_int("sync.unknown"),
            Err(LibraryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_settings_json_keeps_defaults_for_missing_keys() {
        let restored =
            ImportSettings::from_json(r#"{"sync.importtrigger":"manual","custom.limit":5}"#)
                .unwrap();

        assert_eq!(restored.import_trigger().unwrap(), ImportTrigger::Manual);
        assert_eq!(restored.get_int("custom.limit").unwrap(), 5);
        assert!(restored.update_imported_items().unwrap());
    }

    #[test]
    fn test_import_identity() {
        let import = MediaImport::new(
            ImportSource::new("upnp://server-1/", "Living Room"),
            "tvshow,season,episode".parse().unwrap(),
        );

        let id = import.id();
        assert_eq!(id.source, "upnp://server-1/");
        assert_eq!(id.media_types, "tvshow,season,episode");
        assert_eq!(import.to_string(), "Living Room (tvshow,season,episode)");
    }
}
