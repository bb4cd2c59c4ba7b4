//! Microsoft Store blob storage.
//!
//! An account directory holds `containers.index` listing one entry per slot.
//! Each entry points to a directory named after a GUID that holds a
//! `container.N` file, which maps blob names ("data", "meta") to the GUID
//! named files with the actual content.
//!
//! ```text
//! containers.index
//!   u32 version, u64 entry count, string package, u64 filetime,
//!   u32 state, string account guid, u64 unknown
//!   per entry:
//!     string identifier, string identifier, string sync time,
//!     u8 container extension, u32 sync state, guid directory,
//!     u64 filetime, u64 unknown, u64 total size
//! container.N
//!   u32 version, u32 blob count
//!   per blob: 64 UTF-16 units name, guid cloud, guid local
//! ```
//!
//! Strings are prefixed with their length in UTF-16 code units.

use chrono::{DateTime, Utc};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::binio::*;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::extra::MicrosoftExtra;
use crate::model::{MicrosoftSyncState, SaveType};

pub const INDEX_FILE: &str = "containers.index";
pub const INDEX_VERSION: u32 = 0xE;
pub const BLOB_CONTAINER_VERSION: u32 = 4;
const BLOB_NAME_UNITS: usize = 64;

pub const BLOB_DATA: &str = "data";
pub const BLOB_META: &str = "meta";

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;

pub fn filetime_from(t: DateTime<Utc>) -> u64 {
    let secs = t.timestamp() + FILETIME_EPOCH_OFFSET;
    (secs.max(0) as u64) * 10_000_000 + u64::from(t.timestamp_subsec_nanos() / 100)
}

pub fn filetime_to(ft: u64) -> Option<DateTime<Utc>> {
    let secs = (ft / 10_000_000) as i64 - FILETIME_EPOCH_OFFSET;
    let nanos = ((ft % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub identifier: String,
    pub identifier_secondary: String,
    pub sync_time: String,
    pub container_extension: u8,
    pub sync_state: u32,
    pub directory: Uuid,
    pub last_modified: u64,
    pub unknown: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainersIndex {
    pub version: u32,
    pub package: String,
    pub last_modified: u64,
    pub state: u32,
    pub account: String,
    pub unknown: u64,
    pub entries: Vec<IndexEntry>,
}

impl ContainersIndex {
    pub fn read(path: &Path) -> Result<Self> {
        Self::parse(&fs::read(path)?)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);
        let version = read_u32(&mut r)?;
        if version != INDEX_VERSION {
            return Err(Error::InvalidMagic {
                expected: INDEX_VERSION,
                actual: version,
            });
        }
        let count = read_u64(&mut r)?;
        let package = read_utf16_lp(&mut r)?;
        let last_modified = read_u64(&mut r)?;
        let state = read_u32(&mut r)?;
        let account = read_utf16_lp(&mut r)?;
        let unknown = read_u64(&mut r)?;

        let mut entries = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            entries.push(IndexEntry {
                identifier: read_utf16_lp(&mut r)?,
                identifier_secondary: read_utf16_lp(&mut r)?,
                sync_time: read_utf16_lp(&mut r)?,
                container_extension: read_u8(&mut r)?,
                sync_state: read_u32(&mut r)?,
                directory: read_guid(&mut r)?,
                last_modified: read_u64(&mut r)?,
                unknown: read_u64(&mut r)?,
                total_size: read_u64(&mut r)?,
            });
        }
        Ok(Self {
            version,
            package,
            last_modified,
            state,
            account,
            unknown,
            entries,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = Vec::new();
        write_u32(&mut w, self.version)?;
        write_u64(&mut w, self.entries.len() as u64)?;
        write_utf16_lp(&mut w, &self.package)?;
        write_u64(&mut w, self.last_modified)?;
        write_u32(&mut w, self.state)?;
        write_utf16_lp(&mut w, &self.account)?;
        write_u64(&mut w, self.unknown)?;
        for e in &self.entries {
            write_utf16_lp(&mut w, &e.identifier)?;
            write_utf16_lp(&mut w, &e.identifier_secondary)?;
            write_utf16_lp(&mut w, &e.sync_time)?;
            write_u8(&mut w, e.container_extension)?;
            write_u32(&mut w, e.sync_state)?;
            write_guid(&mut w, &e.directory)?;
            write_u64(&mut w, e.last_modified)?;
            write_u64(&mut w, e.unknown)?;
            write_u64(&mut w, e.total_size)?;
        }
        Ok(w)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        Ok(fs::write(path, self.to_bytes()?)?)
    }

    pub fn entry(&self, identifier: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    /// Replaces the entry with the same identifier or appends a new one.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.identifier == entry.identifier)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, identifier: &str) {
        self.entries.retain(|e| e.identifier != identifier);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub name: String,
    pub cloud: Uuid,
    pub local: Uuid,
}

pub fn read_blob_container(path: &Path) -> Result<Vec<Blob>> {
    parse_blob_container(&fs::read(path)?)
}

pub fn parse_blob_container(data: &[u8]) -> Result<Vec<Blob>> {
    let mut r = Cursor::new(data);
    let version = read_u32(&mut r)?;
    if version != BLOB_CONTAINER_VERSION {
        return Err(Error::InvalidMagic {
            expected: BLOB_CONTAINER_VERSION,
            actual: version,
        });
    }
    let count = read_u32(&mut r)?;
    (0..count)
        .map(|_| {
            Ok(Blob {
                name: read_utf16_units(&mut r, BLOB_NAME_UNITS)?,
                cloud: read_guid(&mut r)?,
                local: read_guid(&mut r)?,
            })
        })
        .collect()
}

pub fn blob_container_bytes(blobs: &[Blob]) -> Result<Vec<u8>> {
    let mut w = Vec::new();
    write_u32(&mut w, BLOB_CONTAINER_VERSION)?;
    write_u32(&mut w, blobs.len() as u32)?;
    for b in blobs {
        write_utf16_units(&mut w, &b.name, BLOB_NAME_UNITS)?;
        write_guid(&mut w, &b.cloud)?;
        write_guid(&mut w, &b.local)?;
    }
    Ok(w)
}

/// On-disk spelling of a GUID used for directory and blob file names.
pub fn guid_name(g: &Uuid) -> String {
    g.simple().to_string().to_uppercase()
}

/// Index identifier of a slot.
pub fn identifier_of(meta_index: u32, slot_index: Option<u32>, save_type: Option<SaveType>) -> Option<String> {
    match (meta_index, slot_index, save_type) {
        (0, _, _) => Some("AccountData".to_string()),
        (_, Some(slot), Some(SaveType::Auto)) => Some(format!("Slot{}Auto", slot + 1)),
        (_, Some(slot), Some(SaveType::Manual)) => Some(format!("Slot{}Manual", slot + 1)),
        _ => None,
    }
}

pub fn container_identifier(container: &Container) -> Option<String> {
    identifier_of(
        container.meta_index(),
        container.slot_index(),
        container.save_type(),
    )
}

/// Files of one index entry. Blob paths are `None` when the blob container
/// does not list them.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub extra: MicrosoftExtra,
    pub data_file: Option<PathBuf>,
    pub meta_file: Option<PathBuf>,
}

/// Follows an index entry to its blob files.
pub fn resolve_entry(account_dir: &Path, entry: &IndexEntry) -> ResolvedEntry {
    let dir = account_dir.join(guid_name(&entry.directory));
    let blobs = read_blob_container(&dir.join(format!("container.{}", entry.container_extension)))
        .unwrap_or_else(|e| {
            log::warn!("Blob container of {} unreadable: {e}", entry.identifier);
            Vec::new()
        });
    let find = |name: &str| blobs.iter().find(|b| b.name == name).map(|b| b.local);
    let blob_data = find(BLOB_DATA);
    let blob_meta = find(BLOB_META);

    ResolvedEntry {
        extra: MicrosoftExtra {
            sync_state: MicrosoftSyncState::from_u32(entry.sync_state),
            sync_time: entry.sync_time.clone(),
            blob_container_extension: entry.container_extension,
            blob_directory: entry.directory,
            blob_data,
            blob_meta,
            total_size: entry.total_size,
        },
        data_file: blob_data.map(|g| dir.join(guid_name(&g))),
        meta_file: blob_meta.map(|g| dir.join(guid_name(&g))),
    }
}

/// Next blob set for a write: new file GUIDs, the following container
/// extension and an updated sync state. The directory is kept when known.
pub fn prepare_write(account_dir: &Path, previous: Option<&MicrosoftExtra>) -> ResolvedEntry {
    let extension = match previous.map(|p| p.blob_container_extension) {
        None | Some(u8::MAX) => 1,
        Some(n) => n + 1,
    };
    let sync_state = match previous.map(|p| p.sync_state) {
        Some(MicrosoftSyncState::Synced) => MicrosoftSyncState::Modified,
        Some(s @ (MicrosoftSyncState::Modified | MicrosoftSyncState::Created)) => s,
        _ => MicrosoftSyncState::Created,
    };
    let directory = previous
        .map(|p| p.blob_directory)
        .filter(|d| !d.is_nil())
        .unwrap_or_else(Uuid::new_v4);
    let (data, meta) = (Uuid::new_v4(), Uuid::new_v4());
    let dir = account_dir.join(guid_name(&directory));

    ResolvedEntry {
        extra: MicrosoftExtra {
            sync_state,
            sync_time: previous.map(|p| p.sync_time.clone()).unwrap_or_default(),
            blob_container_extension: extension,
            blob_directory: directory,
            blob_data: Some(data),
            blob_meta: Some(meta),
            total_size: 0,
        },
        data_file: Some(dir.join(guid_name(&data))),
        meta_file: Some(dir.join(guid_name(&meta))),
    }
}

/// Writes the blob container of `current` and removes the files of
/// `previous` that are no longer referenced.
pub fn commit_write(account_dir: &Path, current: &MicrosoftExtra, previous: Option<&MicrosoftExtra>) -> Result<()> {
    let dir = account_dir.join(guid_name(&current.blob_directory));
    fs::create_dir_all(&dir)?;
    let blobs: Vec<Blob> = [(BLOB_DATA, current.blob_data), (BLOB_META, current.blob_meta)]
        .into_iter()
        .filter_map(|(name, local)| {
            local.map(|local| Blob {
                name: name.to_string(),
                cloud: Uuid::nil(),
                local,
            })
        })
        .collect();
    fs::write(
        dir.join(format!("container.{}", current.blob_container_extension)),
        blob_container_bytes(&blobs)?,
    )?;

    if let Some(prev) = previous.filter(|p| !p.blob_directory.is_nil() && *p != current) {
        let old_dir = account_dir.join(guid_name(&prev.blob_directory));
        let mut stale = vec![old_dir.join(format!("container.{}", prev.blob_container_extension))];
        stale.extend(
            [prev.blob_data, prev.blob_meta]
                .into_iter()
                .flatten()
                .map(|g| old_dir.join(guid_name(&g))),
        );
        for path in stale.iter().filter(|p| p.is_file()) {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Entry describing `container` after a write.
pub fn index_entry_of(container: &Container, now: DateTime<Utc>) -> Option<IndexEntry> {
    let ms = container.extra().microsoft()?;
    let identifier = container_identifier(container)?;
    Some(IndexEntry {
        identifier_secondary: identifier.clone(),
        identifier,
        sync_time: ms.sync_time.clone(),
        container_extension: ms.blob_container_extension,
        sync_state: ms.sync_state.as_u32(),
        directory: ms.blob_directory,
        last_modified: filetime_from(container.last_write_time().unwrap_or(now)),
        unknown: 0,
        total_size: ms.total_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_index() -> ContainersIndex {
        ContainersIndex {
            version: INDEX_VERSION,
            package: "HelloGames.NoMansSky_bs190hzg1sesy!NoMansSky".into(),
            last_modified: 133_000_000_000_000_000,
            state: 0x1000_0000,
            account: "00000000-0000-0000-0000-000000000000".into(),
            unknown: 0,
            entries: vec![IndexEntry {
                identifier: "Slot1Auto".into(),
                identifier_secondary: "Slot1Auto".into(),
                sync_time: "0x8DB1A2B3C4D5E6F".into(),
                container_extension: 3,
                sync_state: 1,
                directory: Uuid::from_u128(0x1234),
                last_modified: 133_000_000_000_000_000,
                unknown: 0,
                total_size: 4096,
            }],
        }
    }

    #[test]
    fn index_layout() {
        let idx = sample_index();
        let bytes = idx.to_bytes().unwrap();
        assert_eq!(read_u32_at(&bytes, 0).unwrap(), INDEX_VERSION);
        assert_eq!(read_u64_at(&bytes, 4).unwrap(), 1);
        assert_eq!(ContainersIndex::parse(&bytes).unwrap(), idx);
    }

    #[test]
    fn blob_container_layout() {
        let blobs = vec![
            Blob {
                name: BLOB_DATA.into(),
                cloud: Uuid::nil(),
                local: Uuid::from_u128(1),
            },
            Blob {
                name: BLOB_META.into(),
                cloud: Uuid::nil(),
                local: Uuid::from_u128(2),
            },
        ];
        let bytes = blob_container_bytes(&blobs).unwrap();
        assert_eq!(bytes.len(), 8 + 2 * (128 + 32));
        assert_eq!(parse_blob_container(&bytes).unwrap(), blobs);
    }

    #[test]
    fn identifiers() {
        assert_eq!(identifier_of(0, None, None).as_deref(), Some("AccountData"));
        assert_eq!(
            identifier_of(2, Some(0), Some(SaveType::Auto)).as_deref(),
            Some("Slot1Auto")
        );
        assert_eq!(
            identifier_of(31, Some(14), Some(SaveType::Manual)).as_deref(),
            Some("Slot15Manual")
        );
    }

    #[test]
    fn filetime_conversion() {
        let t = Utc.with_ymd_and_hms(2023, 5, 1, 10, 30, 0).unwrap();
        assert_eq!(filetime_to(filetime_from(t)), Some(t));
    }

    #[test]
    fn sync_state_after_write() {
        let synced = MicrosoftExtra {
            sync_state: MicrosoftSyncState::Synced,
            blob_container_extension: 255,
            blob_directory: Uuid::from_u128(9),
            ..Default::default()
        };
        let next = prepare_write(Path::new("/tmp"), Some(&synced));
        assert_eq!(next.extra.sync_state, MicrosoftSyncState::Modified);
        assert_eq!(next.extra.blob_container_extension, 1);
        assert_eq!(next.extra.blob_directory, Uuid::from_u128(9));

        let fresh = prepare_write(Path::new("/tmp"), None);
        assert_eq!(fresh.extra.sync_state, MicrosoftSyncState::Created);
    }
}
