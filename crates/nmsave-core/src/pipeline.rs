//! Read and write pipeline of a single container.
//!
//! ```text
//! read:  meta bytes -> decrypt -> decompress -> PlatformExtra
//!        data bytes -> decrypt -> decompress -> trim -> JSON -> deobfuscate -> derive
//! write: document -> obfuscate -> JSON + NUL -> compress -> encrypt -> data bytes
//!        PlatformExtra -> meta buffer -> compress -> encrypt -> meta bytes
//! ```
//!
//! Data problems never leave the pipeline as errors. They are recorded on
//! the container as an [`Incompatibility`] so bulk loading carries on with
//! the next slot.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use regex::bytes::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::container::{Container, Incompatibility};
use crate::error::{Error, Result};
use crate::extra::{PlatformExtra, PlatformSpecific, needs_update, needs_update_str};
use crate::json::{get_by_pointer, parse_document, serialize_document, trim_document};
use crate::layout::MetaLayout;
use crate::mapping::Mapping;
use crate::model::{Difficulty, GameMode, GameVersion};
use crate::paths::PathTable;
use crate::settings::PlatformSettings;
use crate::version::{decompose, game_mode_from_version, game_version_from_base, infer_game_version};

/// Scalars found in a document or in its raw text.
#[derive(Debug, Default)]
struct Derived {
    save_version: i32,
    total_play_time: Option<u64>,
    save_name: Option<String>,
    save_summary: Option<String>,
    difficulty: Option<Difficulty>,
}

/// Regex scans over the raw document text for hollow loading.
#[derive(Debug)]
struct HollowScanner {
    version: Option<Regex>,
    total_play_time: Option<Regex>,
    save_name: Option<Regex>,
    save_summary: Option<Regex>,
    difficulty: Option<Regex>,
    markers: Vec<(String, Regex)>,
}

fn key_alternation(keys: &[String]) -> Option<String> {
    if keys.is_empty() {
        return None;
    }
    let alt: Vec<String> = keys.iter().map(|k| regex::escape(k)).collect();
    Some(format!("\"(?:{})\"\\s*:\\s*", alt.join("|")))
}

fn number_pattern(paths: &PathTable, identifier: &str) -> Option<Regex> {
    let keys = key_alternation(&paths.leaf_keys(identifier))?;
    Regex::new(&format!("{keys}(-?\\d+)")).ok()
}

fn string_pattern(paths: &PathTable, identifier: &str) -> Option<Regex> {
    let keys = key_alternation(&paths.leaf_keys(identifier))?;
    Regex::new(&format!(r#"{keys}("(?:[^"\\]|\\.)*")"#)).ok()
}

impl HollowScanner {
    fn new(paths: &PathTable) -> Self {
        let markers = ["SETTLEMENT_STATES", "REDEEMED_SEASON_REWARDS"]
            .into_iter()
            .filter_map(|id| {
                let keys = key_alternation(&paths.leaf_keys(id))?;
                Some((id.to_string(), Regex::new(&keys).ok()?))
            })
            .collect();
        Self {
            version: number_pattern(paths, "VERSION"),
            total_play_time: number_pattern(paths, "TOTAL_PLAY_TIME"),
            save_name: string_pattern(paths, "SAVE_NAME"),
            save_summary: string_pattern(paths, "SAVE_SUMMARY"),
            difficulty: string_pattern(paths, "DIFFICULTY_PRESET"),
            markers,
        }
    }

    fn capture<'a>(re: &Option<Regex>, text: &'a [u8]) -> Option<&'a [u8]> {
        Some(re.as_ref()?.captures(text)?.get(1)?.as_bytes())
    }

    fn number(re: &Option<Regex>, text: &[u8]) -> Option<i64> {
        std::str::from_utf8(Self::capture(re, text)?).ok()?.parse().ok()
    }

    fn string(re: &Option<Regex>, text: &[u8]) -> Option<String> {
        serde_json::from_slice(Self::capture(re, text)?).ok()
    }

    fn scan(&self, text: &[u8]) -> Derived {
        Derived {
            save_version: Self::number(&self.version, text).unwrap_or_default() as i32,
            total_play_time: Self::number(&self.total_play_time, text).map(|v| v.max(0) as u64),
            save_name: Self::string(&self.save_name, text),
            save_summary: Self::string(&self.save_summary, text),
            difficulty: Self::string(&self.difficulty, text).map(|s| Difficulty::from_name(&s)),
        }
    }

    fn has_key(&self, text: &[u8], identifier: &str) -> bool {
        self.markers
            .iter()
            .find(|(id, _)| id == identifier)
            .is_some_and(|(_, re)| re.is_match(text))
    }
}

fn modified_time(path: Option<&Path>) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path?).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn set_modified_time(path: &Path, t: DateTime<Utc>) -> std::io::Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(SystemTime::from(t))
}

/// Reads and writes containers of one platform.
#[derive(Debug)]
pub struct Codec {
    layout: Box<dyn MetaLayout>,
    settings: PlatformSettings,
    paths: Arc<PathTable>,
    mapping: Arc<Mapping>,
    scanner: HollowScanner,
}

impl Codec {
    pub fn new(layout: Box<dyn MetaLayout>, settings: PlatformSettings) -> Self {
        let paths = Arc::new(PathTable::with_extensions(settings.path_extensions.clone()));
        let mapping = Arc::new(Mapping::with_extensions(settings.mapping_extensions.clone()));
        let scanner = HollowScanner::new(&paths);
        Self {
            layout,
            settings,
            paths,
            mapping,
            scanner,
        }
    }

    pub fn layout(&self) -> &dyn MetaLayout {
        self.layout.as_ref()
    }

    pub fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    pub fn paths(&self) -> &Arc<PathTable> {
        &self.paths
    }

    pub fn mapping(&self) -> &Arc<Mapping> {
        &self.mapping
    }

    // Read

    /// Full load of a container from its files.
    pub fn read(&self, container: &mut Container) {
        self.load(container, false);
    }

    /// Metadata-only load. The document is not kept.
    pub fn read_hollow(&self, container: &mut Container) {
        self.load(container, true);
    }

    fn load(&self, container: &mut Container, hollow: bool) {
        container.clear_incompatibility();
        container.clear_document();

        if let Some(tag) = self.layout.precheck(container) {
            warn!("{container}: {tag}");
            container.set_exists(true);
            container.set_incompatibility(tag, None);
            return;
        }
        if !self.layout.slot_exists(container) {
            container.reset();
            container.set_incompatibility(Incompatibility::NonExistent, None);
            return;
        }
        container.set_exists(true);

        let meta = self.layout.read_meta_bytes(container).unwrap_or_else(|e| {
            warn!("{container}: meta unreadable: {e}");
            None
        });
        self.apply_meta(container, meta.as_deref());

        let data = match self.layout.read_data_bytes(container, container.extra()) {
            Ok(d) => d,
            Err(e) => {
                warn!("{container}: data unreadable: {e}");
                container.set_incompatibility(Incompatibility::DeserializationException, Some(e.to_string()));
                return;
            }
        };
        self.apply_data(container, data, hollow);
    }

    /// Loads a container from bytes that did not come from its own files,
    /// such as a backup archive.
    pub fn read_bytes(&self, container: &mut Container, meta: Option<&[u8]>, data: Vec<u8>, hollow: bool) {
        container.clear_incompatibility();
        container.clear_document();
        container.set_exists(true);
        self.apply_meta(container, meta);
        self.apply_data(container, data, hollow);
    }

    fn parse_meta(&self, container: &Container, meta: &[u8]) -> Result<PlatformExtra> {
        let meta = self.layout.decrypt_meta(container, meta.to_vec());
        let meta = self.layout.decompress_meta(meta)?;
        self.layout.parse_meta(container, &meta)
    }

    fn apply_meta(&self, container: &mut Container, meta: Option<&[u8]>) {
        let previous = container.extra().platform.clone();
        let mut extra = match meta.map(|m| self.parse_meta(container, m)) {
            Some(Ok(extra)) => extra,
            Some(Err(e)) => {
                warn!("{container}: meta ignored: {e}");
                PlatformExtra::default()
            }
            None => PlatformExtra::default(),
        };
        if extra.platform == PlatformSpecific::None {
            extra = extra.with_platform(previous);
        }
        if extra.last_write_time.is_none()
            && let Some(t) = modified_time(container.data_file())
        {
            extra = extra.with_last_write_time(t);
        }
        container.set_game_version(game_version_from_base(extra.base_version));
        container.replace_extra(extra);
    }

    fn apply_data(&self, container: &mut Container, data: Vec<u8>, hollow: bool) {
        if data.is_empty() {
            container.set_incompatibility(Incompatibility::EmptyPayload, None);
            return;
        }
        let data = self.layout.decrypt_data(data);
        let plain = match self.layout.decompress_data(container, container.extra(), data) {
            Ok(p) => p,
            Err(e) => {
                warn!("{container}: decompression failed: {e}");
                container.set_incompatibility(Incompatibility::DeserializationException, Some(e.to_string()));
                return;
            }
        };
        let text = trim_document(&plain);
        if text.is_empty() {
            container.set_incompatibility(Incompatibility::EmptyPayload, None);
            return;
        }

        if hollow {
            let derived = self.scanner.scan(text);
            let level = infer_game_version(base_of(&derived), |id| self.scanner.has_key(text, id));
            self.apply_derived(container, derived, level, false);
            container.mark_synced();
            debug!("{container}: hollow load, {:?}", container.game_version());
            return;
        }

        let mut document = match parse_document(text) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                container.set_incompatibility(Incompatibility::NoDocument, None);
                return;
            }
            Err(e) => {
                warn!("{container}: {e}");
                container.set_incompatibility(Incompatibility::DeserializationException, Some(e.to_string()));
                return;
            }
        };
        let unknown = if self.settings.use_mapping {
            self.mapping.deobfuscate(&mut document)
        } else {
            BTreeSet::new()
        };
        if !unknown.is_empty() {
            debug!("{container}: {} unknown keys", unknown.len());
        }
        container.set_loaded_document(document, unknown);
        self.derive_from_document(container, false);
        container.mark_synced();
        debug!("{container}: loaded, {:?}", container.game_version());
    }

    // Derivation

    fn derive_document(&self, container: &Container) -> Derived {
        let Some(doc) = container.document() else {
            return Derived::default();
        };
        let context = container.active_context();
        let value = |id: &str| -> Option<&Value> {
            let p = self.paths.resolve(id, doc, context)?;
            get_by_pointer(doc, &p)
        };
        Derived {
            save_version: value("VERSION").and_then(Value::as_i64).unwrap_or_default() as i32,
            total_play_time: value("TOTAL_PLAY_TIME").and_then(Value::as_u64),
            save_name: value("SAVE_NAME").and_then(Value::as_str).map(str::to_string),
            save_summary: value("SAVE_SUMMARY").and_then(Value::as_str).map(str::to_string),
            difficulty: value("DIFFICULTY_PRESET")
                .and_then(Value::as_str)
                .map(Difficulty::from_name),
        }
    }

    /// Refreshes the cached scalars of `container` from its document.
    /// Without `forced` only scalars that are still zero are replaced.
    pub fn derive_from_document(&self, container: &mut Container, forced: bool) {
        let derived = self.derive_document(container);
        let level = {
            let doc = container.document();
            let context = container.active_context();
            infer_game_version(base_of(&derived), |id| {
                doc.and_then(|d| {
                    let p = self.paths.resolve(id, d, context)?;
                    get_by_pointer(d, &p)
                })
                .is_some()
            })
        };
        self.apply_derived(container, derived, level, forced);
    }

    fn apply_derived(&self, container: &mut Container, derived: Derived, level: GameVersion, forced: bool) {
        // Without a stored version there is nothing to decompose.
        let versioned = derived.save_version > 0;
        let (mut mode, season) = game_mode_from_version(derived.save_version);
        let base = base_of(&derived);
        if level >= GameVersion::Waypoint
            && mode == GameMode::Normal
            && let Some(d) = derived.difficulty.filter(|d| *d != Difficulty::Invalid)
        {
            mode = d.game_mode();
        }

        let old = container.extra().clone();
        let mut extra = PlatformExtra {
            base_version: if versioned && needs_update(forced, old.base_version) { base } else { old.base_version },
            game_mode: if versioned && needs_update(forced, old.game_mode) { mode as u16 } else { old.game_mode },
            season: if versioned && needs_update(forced, old.season) { season } else { old.season },
            total_play_time: match derived.total_play_time {
                Some(t) if needs_update(forced, old.total_play_time) => t,
                _ => old.total_play_time,
            },
            ..old.clone()
        };
        if let Some(name) = derived.save_name.filter(|_| needs_update_str(forced, &old.save_name)) {
            extra.save_name = name;
        }
        if let Some(summary) = derived
            .save_summary
            .filter(|_| needs_update_str(forced, &old.save_summary))
        {
            extra.save_summary = summary;
        }
        if let Some(d) = derived
            .difficulty
            .filter(|_| needs_update(forced, old.difficulty_preset))
        {
            extra.difficulty_preset = d as u8;
        }

        if level != GameVersion::Unknown {
            container.set_game_version(level);
        }
        container.set_save_version(derived.save_version);
        container.replace_extra(extra);
    }

    /// Replaces the document from outside (import, copy) and derives every
    /// scalar from it. The container is out of sync until written.
    pub fn rebuild(&self, container: &mut Container, mut document: Value) {
        let unknown = if self.settings.use_mapping {
            self.mapping.deobfuscate(&mut document)
        } else {
            BTreeSet::new()
        };
        container.clear_incompatibility();
        container.set_exists(true);
        container.set_loaded_document(document, unknown);
        self.derive_from_document(container, true);
        container.mark_modified();
    }

    // Write

    /// Writes data and meta of a loaded container. `Ok(false)` when there was
    /// nothing to write.
    pub fn write(&self, container: &mut Container) -> Result<bool> {
        if !container.is_loaded() {
            return Err(Error::NotLoaded(container.meta_index()));
        }
        if container.is_synced() && !self.settings.write_always {
            debug!("{container}: in sync, nothing written");
            return Ok(false);
        }

        let mut document = container
            .document()
            .cloned()
            .ok_or(Error::NotLoaded(container.meta_index()))?;
        if self.settings.use_mapping {
            self.mapping.obfuscate(&mut document);
        }
        let plain = serialize_document(&document)?;
        let data = self
            .layout
            .encrypt_data(self.layout.compress_data(container, &plain));

        let mut extra = container
            .extra()
            .with_sizes(plain.len() as u32, data.len() as u32);
        let now = Utc::now();
        if self.settings.set_last_write_time {
            extra = extra.with_last_write_time(now);
        }
        let extra = self.layout.finalize_extra(container, extra);
        self.layout.write_data_bytes(container, &extra, &data)?;

        let format = self.layout.meta_format_for(container, &extra);
        let meta_plain = self.layout.create_meta(container, &extra, format)?;
        let meta = self
            .layout
            .encrypt_meta(container, self.layout.compress_meta(meta_plain.clone())?);
        self.layout.write_meta_bytes(container, &meta)?;

        let known = self.layout.known_length(format).min(meta_plain.len());
        let extra = PlatformExtra {
            format,
            bytes: meta_plain[known..].to_vec(),
            ..extra
        };

        if self.settings.set_last_write_time {
            let t = extra.last_write_time.unwrap_or(now);
            for path in [container.data_file(), container.meta_file()].into_iter().flatten() {
                if let Err(e) = set_modified_time(path, t) {
                    warn!("{}: cannot set modification time: {e}", path.display());
                }
            }
        }

        container.replace_extra(extra);
        container.mark_synced();
        debug!("{container}: written, {} bytes data, {} bytes meta", data.len(), meta.len());
        Ok(true)
    }

    /// Bytes a backup of `container` consists of: `(data, meta)` as on disk.
    pub fn raw_bytes(&self, container: &Container) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let data = self.layout.read_data_bytes(container, container.extra())?;
        let meta = self.layout.read_meta_bytes(container)?;
        Ok((data, meta))
    }
}

fn base_of(derived: &Derived) -> i32 {
    if derived.save_version <= 0 {
        return 0;
    }
    let (mode, season) = game_mode_from_version(derived.save_version);
    decompose(derived.save_version, mode, season)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hollow_scan_reads_scalars() {
        let scanner = HollowScanner::new(&PathTable::default());
        let text = br#"{"F2P":4652,"6f=":{"Pk4":"My \"Base\"","Lg8":12345,"GQA":[]}}"#;
        let d = scanner.scan(text);
        assert_eq!(d.save_version, 4652);
        assert_eq!(d.total_play_time, Some(12345));
        assert_eq!(d.save_name.as_deref(), Some("My \"Base\""));
        assert!(scanner.has_key(text, "SETTLEMENT_STATES"));
        assert!(!scanner.has_key(text, "REDEEMED_SEASON_REWARDS"));
    }

    #[test]
    fn base_from_composite_version() {
        let d = Derived {
            save_version: 4135 + 6 * 512 + 3 * 128 * 512,
            ..Default::default()
        };
        assert_eq!(base_of(&d), 4135);
        let d = Derived {
            save_version: 4652,
            ..Default::default()
        };
        assert_eq!(base_of(&d), 4140);
        assert_eq!(base_of(&Derived::default()), 0);
    }

    #[test]
    fn missing_version_keeps_scalars() {
        let layout = crate::layout::for_platform(crate::model::PlatformKind::Steam, false);
        let codec = Codec::new(layout, PlatformSettings::default());
        let mut c = Container::new(0, codec.paths().clone());
        codec.rebuild(&mut c, serde_json::json!({"UserSettingsData": {}}));
        assert!(c.is_loaded());
        assert_eq!(c.base_version(), 0);
        assert_eq!(c.game_mode(), GameMode::Unspecified);
        assert_eq!(c.season(), 0);
        assert_eq!(c.save_version(), 0);
    }
}
