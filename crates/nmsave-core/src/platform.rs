//! One account directory of one platform and all of its slots.

use chrono::Utc;
use log::{debug, warn};
use rayon::prelude::*;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::backup;
use crate::container::{COUNT_SAVES_TOTAL, Container, Incompatibility, META_INDEX_OFFSET};
use crate::error::{Error, Result};
use crate::extra::{PlatformExtra, PlatformSpecific};
use crate::layout::{self, MEMORYDAT_FILE};
use crate::microsoft::{self, ContainersIndex, INDEX_FILE, INDEX_VERSION};
use crate::model::{GameVersion, LoadingStrategy, MetaFormat, PlatformKind};
use crate::paths::PathTable;
use crate::pipeline::Codec;
use crate::settings::PlatformSettings;

/// Notified synchronously after the action completed.
pub trait PlatformObserver: Send + Sync {
    fn on_write(&self, _container: &Container) {}
    fn on_backup(&self, _container: &Container, _archive: &Path) {}
    fn on_restore(&self, _container: &Container, _archive: &Path) {}
}

/// Looks up a display name for a platform user id. Failures are ignored.
pub trait UserNameResolver {
    fn resolve(&self, kind: PlatformKind, user_id: &str) -> std::result::Result<String, String>;
}

/// Everything of a loaded container that moves with copy, swap and restore.
struct Snapshot {
    document: Value,
    extra: PlatformExtra,
    unknown: BTreeSet<String>,
    game_version: GameVersion,
    save_version: i32,
}

impl Snapshot {
    fn of(container: &Container) -> Option<Self> {
        Some(Self {
            document: container.document()?.clone(),
            extra: container.extra().clone(),
            unknown: container.unknown_keys().clone(),
            game_version: container.game_version(),
            save_version: container.save_version(),
        })
    }

    /// Moves the snapshot into `container`, keeping its platform bookkeeping.
    fn apply(self, container: &mut Container) {
        let platform = container.extra().platform.clone();
        container.clear_incompatibility();
        container.set_exists(true);
        container.set_loaded_document(self.document, self.unknown);
        container.replace_extra(self.extra.with_platform(platform));
        container.set_game_version(self.game_version);
        container.set_save_version(self.save_version);
        container.mark_modified();
    }
}

/// Steam user id taken from the account directory name.
fn steam_user_id(account_dir: &Path) -> Option<String> {
    let re = Regex::new(r"^st_(7656119\d{10})$").ok()?;
    let name = account_dir.file_name()?.to_str()?;
    Some(re.captures(name)?.get(1)?.as_str().to_string())
}

pub struct Platform {
    kind: PlatformKind,
    account_dir: PathBuf,
    codec: Codec,
    containers: Vec<Container>,
    microsoft_index: Option<ContainersIndex>,
    observer: Option<Box<dyn PlatformObserver>>,
    user_id: Option<String>,
    user_name: Option<String>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("kind", &self.kind)
            .field("account_dir", &self.account_dir)
            .field("containers", &self.containers.len())
            .finish()
    }
}

impl Platform {
    /// Opens an account directory and loads its slots according to the
    /// loading strategy.
    pub fn open(account_dir: impl Into<PathBuf>, kind: PlatformKind, settings: PlatformSettings) -> Result<Self> {
        let account_dir = account_dir.into();
        if !account_dir.is_dir() {
            return Err(Error::InvalidPath(account_dir.display().to_string()));
        }
        let legacy = kind == PlatformKind::Playstation && account_dir.join(MEMORYDAT_FILE).is_file();
        let codec = Codec::new(layout::for_platform(kind, legacy), settings);

        let microsoft_index = if kind == PlatformKind::Microsoft {
            let path = account_dir.join(INDEX_FILE);
            match ContainersIndex::read(&path) {
                Ok(idx) => Some(idx),
                Err(e) => {
                    warn!("{}: {e}", path.display());
                    None
                }
            }
        } else {
            None
        };
        let user_id = match kind {
            PlatformKind::Steam => steam_user_id(&account_dir),
            _ => None,
        };

        let mut platform = Self {
            kind,
            account_dir,
            codec,
            containers: Vec::new(),
            microsoft_index,
            observer: None,
            user_id,
            user_name: None,
        };
        platform.containers = platform.enumerate();
        Ok(platform)
    }

    pub fn with_observer(mut self, observer: Box<dyn PlatformObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn meta_indices() -> impl Iterator<Item = u32> {
        std::iter::once(0).chain(META_INDEX_OFFSET..META_INDEX_OFFSET + COUNT_SAVES_TOTAL)
    }

    fn create_container(&self, meta_index: u32) -> Container {
        let container = Container::new(meta_index, self.codec.paths().clone());
        if self.kind == PlatformKind::Microsoft {
            let resolved = microsoft::identifier_of(meta_index, container.slot_index(), container.save_type())
                .and_then(|id| self.microsoft_index.as_ref()?.entry(&id))
                .map(|entry| microsoft::resolve_entry(&self.account_dir, entry));
            let Some(resolved) = resolved else {
                return container;
            };
            let mut container = container.with_files(resolved.data_file, resolved.meta_file);
            container.replace_extra(PlatformExtra {
                platform: PlatformSpecific::Microsoft(resolved.extra),
                ..PlatformExtra::default()
            });
            return container;
        }
        match self.codec.layout().file_names(meta_index) {
            Some((data, meta)) => {
                container.with_files(Some(self.account_dir.join(data)), Some(self.account_dir.join(meta)))
            }
            None => container,
        }
    }

    fn enumerate(&self) -> Vec<Container> {
        let strategy = self.codec.settings().loading_strategy;
        let collected = Mutex::new(Vec::with_capacity(COUNT_SAVES_TOTAL as usize + 1));

        Self::meta_indices()
            .collect::<Vec<_>>()
            .par_iter()
            .for_each(|&meta_index| {
                let mut container = self.create_container(meta_index);
                match strategy {
                    LoadingStrategy::Empty => {}
                    LoadingStrategy::Hollow => self.codec.read_hollow(&mut container),
                    LoadingStrategy::Current if !container.is_account() => {
                        self.codec.read_hollow(&mut container)
                    }
                    LoadingStrategy::Current | LoadingStrategy::Full => self.codec.read(&mut container),
                }
                collected
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(container);
            });

        let mut containers = collected.into_inner().unwrap_or_else(|e| e.into_inner());
        containers.sort_by_key(Container::meta_index);
        debug!(
            "{} {}: {} of {} slots exist",
            self.kind,
            self.account_dir.display(),
            containers.iter().filter(|c| c.exists()).count(),
            containers.len()
        );
        containers
    }

    // Accessors

    pub fn kind(&self) -> PlatformKind {
        self.kind
    }

    pub fn account_dir(&self) -> &Path {
        &self.account_dir
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn settings(&self) -> &PlatformSettings {
        self.codec.settings()
    }

    pub fn paths(&self) -> &Arc<PathTable> {
        self.codec.paths()
    }

    /// `memory.dat` based Playstation account.
    pub fn is_legacy(&self) -> bool {
        self.kind == PlatformKind::Playstation && self.account_dir.join(MEMORYDAT_FILE).is_file()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Asks `resolver` for the display name of the account owner. Only
    /// consulted when enabled in the settings.
    pub fn resolve_user_name(&mut self, resolver: &dyn UserNameResolver) -> Option<&str> {
        if !self.settings().use_external_source_for_user {
            return None;
        }
        let id = self.user_id.as_deref()?;
        match resolver.resolve(self.kind, id) {
            Ok(name) => self.user_name = Some(name),
            Err(e) => warn!("user name of {id} not resolved: {e}"),
        }
        self.user_name.as_deref()
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn account(&self) -> Option<&Container> {
        self.containers.iter().find(|c| c.is_account())
    }

    fn position(&self, meta_index: u32) -> Result<usize> {
        self.containers
            .iter()
            .position(|c| c.meta_index() == meta_index)
            .ok_or(Error::InvalidIndex(meta_index))
    }

    pub fn get(&self, meta_index: u32) -> Result<&Container> {
        Ok(&self.containers[self.position(meta_index)?])
    }

    pub fn get_mut(&mut self, meta_index: u32) -> Result<&mut Container> {
        let pos = self.position(meta_index)?;
        Ok(&mut self.containers[pos])
    }

    // Pipeline

    /// Full load of one slot from disk.
    pub fn read(&mut self, meta_index: u32) -> Result<&Container> {
        let pos = self.position(meta_index)?;
        self.codec.read(&mut self.containers[pos]);
        Ok(&self.containers[pos])
    }

    fn ensure_loaded(&mut self, pos: usize) {
        let c = &mut self.containers[pos];
        if c.exists() && c.is_compatible() && !c.is_loaded() {
            self.codec.read(c);
        }
    }

    pub fn rebuild(&mut self, meta_index: u32, document: Value) -> Result<()> {
        let pos = self.position(meta_index)?;
        self.codec.rebuild(&mut self.containers[pos], document);
        Ok(())
    }

    /// Writes one slot. `Ok(false)` when it was already in sync.
    pub fn write(&mut self, meta_index: u32) -> Result<bool> {
        let pos = self.position(meta_index)?;
        self.write_at(pos)
    }

    fn write_at(&mut self, pos: usize) -> Result<bool> {
        let container = &mut self.containers[pos];
        if !container.is_loaded() {
            return Err(Error::NotLoaded(container.meta_index()));
        }
        if container.is_synced() && !self.codec.settings().write_always {
            return Ok(false);
        }

        let written = if self.kind == PlatformKind::Microsoft {
            Self::write_microsoft(&self.codec, &self.account_dir, &mut self.microsoft_index, container)?
        } else {
            self.codec.write(container)?
        };
        if written && let Some(observer) = &self.observer {
            observer.on_write(&self.containers[pos]);
        }
        Ok(written)
    }

    fn write_microsoft(
        codec: &Codec,
        account_dir: &Path,
        index: &mut Option<ContainersIndex>,
        container: &mut Container,
    ) -> Result<bool> {
        let previous_extra = container.extra().clone();
        let previous_files = (
            container.data_file().map(Path::to_path_buf),
            container.meta_file().map(Path::to_path_buf),
        );
        let previous = previous_extra.microsoft().cloned();
        let next = microsoft::prepare_write(account_dir, previous.as_ref());
        container.set_files(next.data_file, next.meta_file);
        container.replace_extra(previous_extra.with_platform(PlatformSpecific::Microsoft(next.extra)));

        let written = match codec.write(container) {
            Ok(w) => w,
            Err(e) => {
                container.set_files(previous_files.0, previous_files.1);
                container.replace_extra(previous_extra);
                return Err(e);
            }
        };

        let size = |p: Option<&Path>| p.and_then(|p| fs::metadata(p).ok()).map_or(0, |m| m.len());
        let mut current = container.extra().microsoft().cloned().unwrap_or_default();
        current.total_size = size(container.data_file()) + size(container.meta_file());
        container.replace_extra(
            container
                .extra()
                .with_platform(PlatformSpecific::Microsoft(current.clone())),
        );
        microsoft::commit_write(account_dir, &current, previous.as_ref())?;

        let now = Utc::now();
        let index = index.get_or_insert_with(|| ContainersIndex {
            version: INDEX_VERSION,
            package: String::new(),
            last_modified: 0,
            state: 0,
            account: String::new(),
            unknown: 0,
            entries: Vec::new(),
        });
        if let Some(entry) = microsoft::index_entry_of(container, now) {
            index.upsert(entry);
        }
        index.last_modified = microsoft::filetime_from(now);
        index.write(&account_dir.join(INDEX_FILE))?;
        Ok(written)
    }

    // Slot management

    fn check_transferable(&self, pos: usize) -> Result<()> {
        let c = &self.containers[pos];
        if c.exists() && !c.is_compatible() {
            return Err(Error::Incompatible(c.meta_index()));
        }
        Ok(())
    }

    /// Fully loads a slot that is about to be moved. A slot that exists but
    /// does not load is refused.
    fn load_transferable(&mut self, pos: usize) -> Result<()> {
        self.check_transferable(pos)?;
        self.ensure_loaded(pos);
        let c = &self.containers[pos];
        if c.exists() && !c.is_loaded() {
            return Err(Error::Incompatible(c.meta_index()));
        }
        Ok(())
    }

    /// Copies document and metadata of `source` onto `destination` and
    /// writes it. A missing source deletes the destination.
    pub fn copy(&mut self, source: u32, destination: u32) -> Result<()> {
        let (src, dst) = (self.position(source)?, self.position(destination)?);
        if src == dst {
            return Ok(());
        }
        self.load_transferable(src)?;
        self.check_transferable(dst)?;

        match Snapshot::of(&self.containers[src]) {
            Some(snapshot) => {
                snapshot.apply(&mut self.containers[dst]);
                self.write_at(dst)?;
            }
            None => self.delete_at(dst)?,
        }
        Ok(())
    }

    /// Exchanges two slots on disk.
    pub fn swap(&mut self, a: u32, b: u32) -> Result<()> {
        let (pa, pb) = (self.position(a)?, self.position(b)?);
        if pa == pb {
            return Ok(());
        }
        self.load_transferable(pa)?;
        self.load_transferable(pb)?;

        let snap_a = Snapshot::of(&self.containers[pa]);
        let snap_b = Snapshot::of(&self.containers[pb]);
        for (pos, snapshot) in [(pa, snap_b), (pb, snap_a)] {
            match snapshot {
                Some(s) => {
                    s.apply(&mut self.containers[pos]);
                    self.write_at(pos)?;
                }
                None => self.delete_at(pos)?,
            }
        }
        Ok(())
    }

    /// Removes the files of a slot and resets its container.
    pub fn delete(&mut self, meta_index: u32) -> Result<()> {
        let pos = self.position(meta_index)?;
        self.delete_at(pos)
    }

    fn delete_at(&mut self, pos: usize) -> Result<()> {
        let container = &mut self.containers[pos];
        if self.kind == PlatformKind::Playstation && self.codec.layout().fields().legacy_offset.is_some() {
            if container.exists() {
                let blank = vec![0u8; self.codec.layout().total_length(MetaFormat::Vanilla).unwrap_or(0)];
                self.codec.layout().write_meta_bytes(container, &blank)?;
            }
        } else {
            for path in [container.data_file(), container.meta_file()].into_iter().flatten() {
                if path.is_file() {
                    fs::remove_file(path)?;
                }
            }
        }

        if self.kind == PlatformKind::Microsoft {
            if let Some(ms) = container.extra().microsoft() {
                let blob_container = self
                    .account_dir
                    .join(microsoft::guid_name(&ms.blob_directory))
                    .join(format!("container.{}", ms.blob_container_extension));
                if blob_container.is_file() {
                    fs::remove_file(blob_container)?;
                }
            }
            if let (Some(index), Some(id)) = (
                self.microsoft_index.as_mut(),
                microsoft::container_identifier(container),
            ) {
                index.remove(&id);
                index.write(&self.account_dir.join(INDEX_FILE))?;
            }
            container.set_files(None, None);
            container.replace_extra(PlatformExtra::default());
        }

        container.reset();
        container.set_incompatibility(Incompatibility::NonExistent, None);
        debug!("{container}: deleted");
        Ok(())
    }

    // Backups

    pub fn backup_directory(&self) -> PathBuf {
        self.settings().backup_directory_for(&self.account_dir)
    }

    /// Archives the current files of a slot.
    pub fn backup(&mut self, meta_index: u32) -> Result<PathBuf> {
        let pos = self.position(meta_index)?;
        let container = &self.containers[pos];
        if !container.exists() {
            return Err(Error::NotLoaded(meta_index));
        }
        let (data, meta) = self.codec.raw_bytes(container)?;
        let dir = self.backup_directory();
        let archive = backup::create_backup(
            &dir,
            self.kind,
            meta_index,
            container.base_version(),
            &data,
            meta.as_deref(),
        )?;
        for removed in backup::prune_backups(&dir, self.kind, meta_index, self.settings().max_backup_count)? {
            debug!("pruned {}", removed.display());
        }
        self.load_backups(meta_index)?;
        if let Some(observer) = &self.observer {
            observer.on_backup(&self.containers[pos], &archive);
        }
        Ok(archive)
    }

    fn read_backup_container(&self, meta_index: u32, archive: &Path, hollow: bool) -> Result<Container> {
        let (data, meta) = backup::read_backup(archive)?;
        let mut c = Container::new(meta_index, self.codec.paths().clone());
        c.set_backup_file(archive.to_path_buf());
        self.codec.read_bytes(&mut c, meta.as_deref(), data, hollow);
        Ok(c)
    }

    /// Lists the archives of a slot into its backup collection, oldest first.
    pub fn load_backups(&mut self, meta_index: u32) -> Result<&[Container]> {
        let pos = self.position(meta_index)?;
        let backups: Vec<Container> = backup::list_backups(&self.backup_directory(), self.kind, meta_index)
            .into_iter()
            .filter_map(|entry| match self.read_backup_container(meta_index, &entry.path, true) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("{}: {e}", entry.path.display());
                    None
                }
            })
            .collect();
        self.containers[pos].set_backups(backups);
        Ok(self.containers[pos].backups())
    }

    /// Replaces a slot with the content of a backup archive and writes it.
    pub fn restore(&mut self, meta_index: u32, archive: &Path) -> Result<()> {
        let pos = self.position(meta_index)?;
        self.check_transferable(pos)?;
        let backup = self.read_backup_container(meta_index, archive, false)?;
        let snapshot = Snapshot::of(&backup)
            .filter(|_| backup.is_loaded())
            .ok_or(Error::Incompatible(meta_index))?;
        snapshot.apply(&mut self.containers[pos]);
        self.write_at(pos)?;
        if let Some(observer) = &self.observer {
            observer.on_restore(&self.containers[pos], archive);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steam_user_from_directory() {
        assert_eq!(
            steam_user_id(Path::new("/saves/st_76561198012345678")).as_deref(),
            Some("76561198012345678")
        );
        assert_eq!(steam_user_id(Path::new("/saves/DefaultUser")), None);
    }

    #[test]
    fn slot_range() {
        let all: Vec<u32> = Platform::meta_indices().collect();
        assert_eq!(all.len(), 31);
        assert_eq!(all[0], 0);
        assert_eq!(all[1], 2);
        assert_eq!(all[30], 31);
    }
}
