//! One logical save slot (or the account data at meta index 0), or a backup.
//!
//! Containers are created for every possible slot whether or not files
//! exist, filled by the [`Codec`](crate::pipeline::Codec), and reset to
//! defaults when their files disappear.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::extra::PlatformExtra;
use crate::json::{get_by_pointer, set_raw_by_pointer};
use crate::model::{Difficulty, GameMode, GameVersion, SaveContext, SaveType};
use crate::paths::PathTable;
use crate::version;

/// Meta index of the first save; 0 is account data, 1 is reserved for settings.
pub const META_INDEX_OFFSET: u32 = 2;
pub const COUNT_SAVE_SLOTS: u32 = 15;
pub const COUNT_SAVES_TOTAL: u32 = COUNT_SAVE_SLOTS * 2;

/// Why a container could not be loaded. Recorded on the container instead of
/// being returned as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incompatibility {
    NonExistent,
    EmptyPayload,
    DeserializationException,
    NoDocument,
    MicrosoftDeleted,
    MicrosoftMissingBlob,
}

impl Incompatibility {
    pub fn tag(self) -> &'static str {
        match self {
            Self::NonExistent => "non-existent",
            Self::EmptyPayload => "empty",
            Self::DeserializationException => "deserialization-exception",
            Self::NoDocument => "no-document",
            Self::MicrosoftDeleted => "microsoft-deleted",
            Self::MicrosoftMissingBlob => "microsoft-missing-blob",
        }
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone)]
pub struct Container {
    meta_index: u32,
    paths: Arc<PathTable>,
    data_file: Option<PathBuf>,
    meta_file: Option<PathBuf>,
    exists: bool,
    document: Option<Value>,
    extra: PlatformExtra,
    game_version: GameVersion,
    save_version: i32,
    incompatibility: Option<Incompatibility>,
    incompatibility_error: Option<String>,
    is_synced: bool,
    unknown_keys: BTreeSet<String>,
    backups: Vec<Container>,
    backup_file: Option<PathBuf>,
}

impl Container {
    pub fn new(meta_index: u32, paths: Arc<PathTable>) -> Self {
        Self {
            meta_index,
            paths,
            data_file: None,
            meta_file: None,
            exists: false,
            document: None,
            extra: PlatformExtra::default(),
            game_version: GameVersion::Unknown,
            save_version: 0,
            incompatibility: None,
            incompatibility_error: None,
            is_synced: true,
            unknown_keys: BTreeSet::new(),
            backups: Vec::new(),
            backup_file: None,
        }
    }

    pub fn with_files(mut self, data_file: Option<PathBuf>, meta_file: Option<PathBuf>) -> Self {
        self.data_file = data_file;
        self.meta_file = meta_file;
        self
    }

    // Identity

    pub fn meta_index(&self) -> u32 {
        self.meta_index
    }

    pub fn is_account(&self) -> bool {
        self.meta_index == 0
    }

    pub fn collection_index(&self) -> Option<u32> {
        self.meta_index.checked_sub(META_INDEX_OFFSET)
    }

    pub fn slot_index(&self) -> Option<u32> {
        self.collection_index().map(|i| i / 2)
    }

    pub fn save_type(&self) -> Option<SaveType> {
        self.collection_index().map(|i| {
            if i % 2 == 0 {
                SaveType::Auto
            } else {
                SaveType::Manual
            }
        })
    }

    pub fn data_file(&self) -> Option<&Path> {
        self.data_file.as_deref()
    }

    pub fn meta_file(&self) -> Option<&Path> {
        self.meta_file.as_deref()
    }

    pub(crate) fn set_files(&mut self, data_file: Option<PathBuf>, meta_file: Option<PathBuf>) {
        self.data_file = data_file;
        self.meta_file = meta_file;
    }

    pub fn paths(&self) -> &Arc<PathTable> {
        &self.paths
    }

    // State

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_compatible(&self) -> bool {
        self.exists && self.incompatibility.is_none()
    }

    pub fn is_loaded(&self) -> bool {
        self.is_compatible() && self.document.is_some()
    }

    pub fn is_synced(&self) -> bool {
        self.is_synced
    }

    pub fn is_backup(&self) -> bool {
        self.backup_file.is_some()
    }

    pub fn backup_file(&self) -> Option<&Path> {
        self.backup_file.as_deref()
    }

    pub fn incompatibility(&self) -> Option<Incompatibility> {
        self.incompatibility
    }

    pub fn incompatibility_error(&self) -> Option<&str> {
        self.incompatibility_error.as_deref()
    }

    pub fn unknown_keys(&self) -> &BTreeSet<String> {
        &self.unknown_keys
    }

    pub fn backups(&self) -> &[Container] {
        &self.backups
    }

    // Metadata

    pub fn document(&self) -> Option<&Value> {
        self.document.as_ref()
    }

    pub fn extra(&self) -> &PlatformExtra {
        &self.extra
    }

    pub fn game_version(&self) -> GameVersion {
        self.game_version
    }

    /// Composite file version as stored in the document.
    pub fn save_version(&self) -> i32 {
        self.save_version
    }

    pub fn base_version(&self) -> i32 {
        self.extra.base_version
    }

    pub fn game_mode(&self) -> GameMode {
        self.extra.game_mode()
    }

    pub fn season(&self) -> u16 {
        self.extra.season
    }

    pub fn difficulty(&self) -> Difficulty {
        self.extra.difficulty()
    }

    pub fn total_play_time(&self) -> u64 {
        self.extra.total_play_time
    }

    pub fn save_name(&self) -> &str {
        &self.extra.save_name
    }

    pub fn save_summary(&self) -> &str {
        &self.extra.save_summary
    }

    pub fn last_write_time(&self) -> Option<DateTime<Utc>> {
        self.extra.last_write_time
    }

    /// Context selected by the document, `Main` for single-context saves.
    pub fn active_context(&self) -> SaveContext {
        self.document
            .as_ref()
            .and_then(|doc| {
                let p = self.paths.resolve("ACTIVE_CONTEXT", doc, SaveContext::Main)?;
                get_by_pointer(doc, &p)?.as_str().and_then(SaveContext::from_name)
            })
            .unwrap_or_default()
    }

    // Typed access

    fn loaded_document(&self) -> Result<&Value> {
        if !self.is_loaded() {
            return Err(Error::NotLoaded(self.meta_index));
        }
        self.document.as_ref().ok_or(Error::NotLoaded(self.meta_index))
    }

    /// Resolves an identifier (or raw pointer) against the loaded document.
    pub fn resolve(&self, identifier: &str, context: SaveContext) -> Option<String> {
        let doc = self.document.as_ref()?;
        self.paths.resolve(identifier, doc, context)
    }

    pub fn get_value(&self, identifier: &str) -> Result<Option<&Value>> {
        self.get_value_in(identifier, self.active_context())
    }

    pub fn get_value_in(&self, identifier: &str, context: SaveContext) -> Result<Option<&Value>> {
        let doc = self.loaded_document()?;
        Ok(self
            .paths
            .resolve(identifier, doc, context)
            .and_then(|p| get_by_pointer(doc, &p)))
    }

    pub fn get_i64(&self, identifier: &str) -> Result<Option<i64>> {
        Ok(self.get_value(identifier)?.and_then(Value::as_i64))
    }

    pub fn get_str(&self, identifier: &str) -> Result<Option<&str>> {
        Ok(self.get_value(identifier)?.and_then(Value::as_str))
    }

    pub fn set_value(&mut self, identifier: &str, value: Value) -> Result<()> {
        let context = self.active_context();
        self.set_value_in(identifier, context, value)
    }

    pub fn set_value_in(&mut self, identifier: &str, context: SaveContext, value: Value) -> Result<()> {
        let doc = self.loaded_document()?;
        let pointer = self
            .paths
            .resolve(identifier, doc, context)
            .ok_or_else(|| Error::InvalidPath(identifier.to_string()))?;
        let doc = self
            .document
            .as_mut()
            .ok_or(Error::NotLoaded(self.meta_index))?;
        set_raw_by_pointer(doc, &pointer, value)?;
        self.is_synced = false;
        Ok(())
    }

    /// Replaces the whole document from outside the pipeline.
    pub fn set_document(&mut self, document: Value) -> Result<()> {
        self.loaded_document()?;
        self.document = Some(document);
        self.is_synced = false;
        Ok(())
    }

    // Mirrored properties: each updates the extra and the document.

    pub fn set_save_name(&mut self, name: &str) -> Result<()> {
        self.set_value("SAVE_NAME", Value::from(name))?;
        self.extra = PlatformExtra {
            save_name: name.to_string(),
            ..self.extra.clone()
        };
        Ok(())
    }

    pub fn set_save_summary(&mut self, summary: &str) -> Result<()> {
        self.set_value("SAVE_SUMMARY", Value::from(summary))?;
        self.extra = PlatformExtra {
            save_summary: summary.to_string(),
            ..self.extra.clone()
        };
        Ok(())
    }

    pub fn set_total_play_time(&mut self, seconds: u64) -> Result<()> {
        self.set_value("TOTAL_PLAY_TIME", Value::from(seconds))?;
        self.extra = PlatformExtra {
            total_play_time: seconds,
            ..self.extra.clone()
        };
        Ok(())
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) -> Result<()> {
        if self.game_version >= GameVersion::Waypoint {
            self.set_value("DIFFICULTY_PRESET", Value::from(difficulty.name()))?;
        } else {
            self.loaded_document()?;
            self.is_synced = false;
        }
        self.extra = PlatformExtra {
            difficulty_preset: difficulty as u8,
            ..self.extra.clone()
        };
        Ok(())
    }

    pub fn set_game_mode(&mut self, mode: GameMode) -> Result<()> {
        let season = if mode == GameMode::Seasonal {
            self.extra.season
        } else {
            0
        };
        self.set_version_parts(mode, season)?;
        if self.game_version >= GameVersion::Waypoint && mode != GameMode::Seasonal {
            self.set_difficulty(Difficulty::from_game_mode(mode))?;
        }
        Ok(())
    }

    pub fn set_season(&mut self, season: u16) -> Result<()> {
        self.set_version_parts(GameMode::Seasonal, season)
    }

    fn set_version_parts(&mut self, mode: GameMode, season: u16) -> Result<()> {
        let version = version::compose(self.extra.base_version, mode, season);
        self.set_value("VERSION", Value::from(version))?;
        self.save_version = version;
        self.extra = PlatformExtra {
            game_mode: mode as u16,
            season,
            ..self.extra.clone()
        };
        Ok(())
    }

    // Pipeline bookkeeping

    pub(crate) fn replace_extra(&mut self, extra: PlatformExtra) {
        self.extra = extra;
    }

    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub(crate) fn set_game_version(&mut self, v: GameVersion) {
        self.game_version = v;
    }

    pub(crate) fn set_save_version(&mut self, v: i32) {
        self.save_version = v;
    }

    pub(crate) fn set_loaded_document(&mut self, document: Value, unknown_keys: BTreeSet<String>) {
        self.document = Some(document);
        self.unknown_keys = unknown_keys;
    }

    pub(crate) fn clear_document(&mut self) {
        self.document = None;
    }

    pub(crate) fn mark_synced(&mut self) {
        self.is_synced = true;
    }

    pub(crate) fn mark_modified(&mut self) {
        self.is_synced = false;
    }

    pub(crate) fn set_incompatibility(&mut self, tag: Incompatibility, error: Option<String>) {
        self.incompatibility = Some(tag);
        self.incompatibility_error = error;
    }

    pub(crate) fn clear_incompatibility(&mut self) {
        self.incompatibility = None;
        self.incompatibility_error = None;
    }

    pub(crate) fn set_backup_file(&mut self, path: PathBuf) {
        self.backup_file = Some(path);
    }

    pub(crate) fn set_backups(&mut self, backups: Vec<Container>) {
        self.backups = backups;
    }

    /// Back to the state of a freshly enumerated slot. File handles, backups
    /// and platform bookkeeping are kept.
    pub(crate) fn reset(&mut self) {
        self.exists = false;
        self.document = None;
        self.extra = PlatformExtra {
            platform: self.extra.platform.clone(),
            ..PlatformExtra::default()
        };
        self.game_version = GameVersion::Unknown;
        self.save_version = 0;
        self.incompatibility = None;
        self.incompatibility_error = None;
        self.is_synced = true;
        self.unknown_keys.clear();
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.slot_index(), self.save_type()) {
            (Some(slot), Some(kind)) => write!(f, "Slot{}{:?}", slot + 1, kind),
            _ => f.write_str("AccountData"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded(doc: Value) -> Container {
        let mut c = Container::new(4, Arc::new(PathTable::default()));
        c.set_exists(true);
        c.set_loaded_document(doc, BTreeSet::new());
        c.mark_synced();
        c
    }

    #[test]
    fn indices() {
        let paths = Arc::new(PathTable::default());
        let account = Container::new(0, paths.clone());
        assert!(account.is_account());
        assert_eq!(account.slot_index(), None);
        assert_eq!(account.to_string(), "AccountData");

        let c = Container::new(5, paths);
        assert_eq!(c.collection_index(), Some(3));
        assert_eq!(c.slot_index(), Some(1));
        assert_eq!(c.save_type(), Some(SaveType::Manual));
        assert_eq!(c.to_string(), "Slot2Manual");
    }

    #[test]
    fn loaded_implies_compatible() {
        let mut c = loaded(json!({"Version": 4652}));
        assert!(c.is_loaded());
        c.set_incompatibility(Incompatibility::EmptyPayload, None);
        assert!(!c.is_compatible());
        assert!(!c.is_loaded());
    }

    #[test]
    fn typed_setters_clear_sync() {
        let mut c = loaded(json!({"Version": 4652, "PlayerStateData": {"SaveName": "A"}}));
        assert!(c.is_synced());
        assert_eq!(c.get_str("SAVE_NAME").unwrap(), Some("A"));
        c.set_save_name("B").unwrap();
        assert!(!c.is_synced());
        assert_eq!(c.save_name(), "B");
        assert_eq!(c.get_str("SAVE_NAME").unwrap(), Some("B"));
    }

    #[test]
    fn unloaded_access_is_an_error() {
        let c = Container::new(2, Arc::new(PathTable::default()));
        assert!(matches!(c.get_value("VERSION"), Err(Error::NotLoaded(2))));
    }

    #[test]
    fn game_mode_updates_version() {
        let mut c = loaded(json!({"Version": 4120 + 512, "PlayerStateData": {}}));
        c.replace_extra(PlatformExtra {
            base_version: 4120,
            game_mode: GameMode::Normal as u16,
            ..Default::default()
        });
        c.set_game_mode(GameMode::Permadeath).unwrap();
        assert_eq!(c.get_i64("VERSION").unwrap(), Some(4120 + 5 * 512));
        assert_eq!(c.game_mode(), GameMode::Permadeath);
        assert!(!c.is_synced());
    }
}
