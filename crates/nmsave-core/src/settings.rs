use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::LoadingStrategy;
use crate::paths::PathEntry;

/// Options of a [`Platform`](crate::platform::Platform). Missing keys in a
/// settings file take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub loading_strategy: LoadingStrategy,
    /// Deobfuscate keys on read and obfuscate them again on write.
    pub use_mapping: bool,
    /// Write even if nothing changed since the last read.
    pub write_always: bool,
    /// Stamp written files with the last write time of the save.
    pub set_last_write_time: bool,
    pub use_external_source_for_user: bool,
    /// Where backups go. Defaults to `backup` inside the account directory.
    pub backup_directory: Option<PathBuf>,
    /// Archives kept per slot, 0 keeps all.
    pub max_backup_count: usize,
    pub path_extensions: Vec<PathEntry>,
    /// Additional `(plaintext, obfuscated)` key pairs.
    pub mapping_extensions: Vec<(String, String)>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            loading_strategy: LoadingStrategy::default(),
            use_mapping: true,
            write_always: false,
            set_last_write_time: true,
            use_external_source_for_user: false,
            backup_directory: None,
            max_backup_count: 3,
            path_extensions: Vec::new(),
            mapping_extensions: Vec::new(),
        }
    }
}

impl PlatformSettings {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        Ok(fs::write(path, serde_json::to_vec_pretty(self)?)?)
    }

    pub fn backup_directory_for(&self, account_dir: &Path) -> PathBuf {
        self.backup_directory
            .clone()
            .unwrap_or_else(|| account_dir.join("backup"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let s: PlatformSettings =
            serde_json::from_str(r#"{"loading_strategy":"Full","write_always":true}"#).unwrap();
        assert_eq!(s.loading_strategy, LoadingStrategy::Full);
        assert!(s.write_always);
        assert!(s.use_mapping);
        assert_eq!(s.max_backup_count, 3);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let s = PlatformSettings {
            path_extensions: vec![PathEntry {
                identifier: "CUSTOM".into(),
                variants: vec!["/Custom".into()],
            }],
            mapping_extensions: vec![("Custom".into(), "c7x".into())],
            ..Default::default()
        };
        s.save(&path).unwrap();
        assert_eq!(PlatformSettings::load(&path).unwrap(), s);
    }
}
