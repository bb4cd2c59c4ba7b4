//! Playstation layouts.
//!
//! Streaming saves use one `savedataNN.hg`/`mf_savedataNN.hg` pair per slot.
//! Older saves keep every slot in a single `memory.dat`: a small header, a
//! table of vanilla meta entries and fixed-capacity data regions.
//!
//! ```text
//! 0x000  header (magic, format, slot count)
//! 0x020  meta entry per meta index, 0x30 bytes each
//! 0x800  account data, 0x40000 bytes
//! ...    save data, 0x300000 bytes per slot from meta index 2 on
//! ```

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use super::{MetaFields, MetaLayout};
use crate::binio::{read_u32_at, write_bytes_clipped, write_u32_at};
use crate::compression;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::extra::{PlatformExtra, PlatformSpecific};
use crate::model::{MetaFormat, PlatformKind};

pub const META_MAGIC: u32 = 0xCA55E77E;

pub const MEMORYDAT_FILE: &str = "memory.dat";

const MEMORYDAT_HEADER_LENGTH: usize = 0x20;
const MEMORYDAT_META_LENGTH: usize = 0x30;
const MEMORYDAT_SLOT_COUNT: u32 = 32;
const MEMORYDAT_OFFSET_DATA: usize = 0x800;
const MEMORYDAT_LENGTH_ACCOUNT: usize = 0x40000;
const MEMORYDAT_LENGTH_SAVE: usize = 0x300000;

const STREAMING: MetaFields = MetaFields {
    magic: Some(META_MAGIC),
    format: Some(0x04),
    size_disk: Some(0x08),
    legacy_offset: None,
    meta_index: Some(0x10),
    timestamp: Some(0x14),
    size_decompressed: Some(0x18),
    base_version: 0x1C,
    game_mode: 0x20,
    total_play_time: 0x24,
    known_vanilla: 0x2C,
    save_name: 0x30,
    save_summary: 0xB0,
    difficulty: 0x130,
    known_waypoint: 0x131,
};

static FIELDS_STREAMING: MetaFields = STREAMING;

static FIELDS_LEGACY: MetaFields = MetaFields {
    legacy_offset: Some(0x0C),
    ..STREAMING
};

static LENGTHS_STREAMING: [(MetaFormat, usize); 4] = [
    (MetaFormat::Vanilla, 0x30),
    (MetaFormat::Waypoint, 0x140),
    (MetaFormat::WorldsPartI, 0x150),
    (MetaFormat::WorldsPartII, 0x160),
];

static LENGTHS_LEGACY: [(MetaFormat, usize); 1] = [(MetaFormat::Vanilla, MEMORYDAT_META_LENGTH)];

/// Data region of a slot inside `memory.dat` as `(offset, capacity)`.
pub fn memorydat_region(meta_index: u32) -> Option<(usize, usize)> {
    match meta_index {
        0 => Some((MEMORYDAT_OFFSET_DATA, MEMORYDAT_LENGTH_ACCOUNT)),
        1 => None,
        n => Some((
            MEMORYDAT_OFFSET_DATA
                + MEMORYDAT_LENGTH_ACCOUNT
                + (n as usize - 2) * MEMORYDAT_LENGTH_SAVE,
            MEMORYDAT_LENGTH_SAVE,
        )),
    }
}

fn memorydat_meta_offset(meta_index: u32) -> usize {
    MEMORYDAT_HEADER_LENGTH + meta_index as usize * MEMORYDAT_META_LENGTH
}

/// Reads `len` bytes at `offset` without loading the rest of the file.
/// `None` when the file ends before the range does.
fn read_range(path: &Path, offset: usize, len: usize) -> Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset as u64))?;
    let mut buf = vec![0u8; len];
    match file.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaystationLayout {
    /// All slots in one `memory.dat`.
    pub legacy: bool,
}

impl PlaystationLayout {
    fn data_path<'a>(&self, container: &'a Container) -> Result<&'a Path> {
        container
            .data_file()
            .ok_or_else(|| Error::Unsupported(format!("no data file for {container}")))
    }

    fn region(&self, container: &Container) -> Result<(usize, usize)> {
        memorydat_region(container.meta_index()).ok_or(Error::InvalidIndex(container.meta_index()))
    }

    /// Current file content, grown to hold `min_len` bytes.
    fn load_memorydat(&self, container: &Container, min_len: usize) -> Result<Vec<u8>> {
        let path = self.data_path(container)?;
        let mut buf = if path.is_file() { fs::read(path)? } else { Vec::new() };
        if buf.len() < min_len {
            buf.resize(min_len, 0);
        }
        Ok(buf)
    }
}

impl MetaLayout for PlaystationLayout {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Playstation
    }

    fn fields(&self) -> &'static MetaFields {
        if self.legacy { &FIELDS_LEGACY } else { &FIELDS_STREAMING }
    }

    fn lengths(&self) -> &'static [(MetaFormat, usize)] {
        if self.legacy { &LENGTHS_LEGACY } else { &LENGTHS_STREAMING }
    }

    fn file_names(&self, meta_index: u32) -> Option<(String, String)> {
        if meta_index == 1 {
            return None;
        }
        if self.legacy {
            return Some((MEMORYDAT_FILE.to_string(), MEMORYDAT_FILE.to_string()));
        }
        Some((
            format!("savedata{meta_index:02}.hg"),
            format!("mf_savedata{meta_index:02}.hg"),
        ))
    }

    fn slot_exists(&self, container: &Container) -> bool {
        if !self.legacy {
            return container.data_file().is_some_and(|p| p.is_file());
        }
        matches!(self.read_meta_bytes(container), Ok(Some(_)))
    }

    fn read_meta_bytes(&self, container: &Container) -> Result<Option<Vec<u8>>> {
        if !self.legacy {
            return match container.meta_file() {
                Some(p) if p.is_file() => Ok(Some(fs::read(p)?)),
                _ => Ok(None),
            };
        }
        let path = self.data_path(container)?;
        if container.meta_index() == 1 || !path.is_file() {
            return Ok(None);
        }
        let start = memorydat_meta_offset(container.meta_index());
        let Some(meta) = read_range(path, start, MEMORYDAT_META_LENGTH)? else {
            return Ok(None);
        };
        if read_u32_at(&meta, 0)? != META_MAGIC {
            return Ok(None);
        }
        Ok(Some(meta))
    }

    fn read_data_bytes(&self, container: &Container, extra: &PlatformExtra) -> Result<Vec<u8>> {
        if !self.legacy {
            let p = self.data_path(container)?;
            return Ok(fs::read(p)?);
        }
        let (default_offset, capacity) = self.region(container)?;
        let offset = extra
            .legacy_offset()
            .filter(|o| *o != 0)
            .map_or(default_offset, |o| o as usize);
        let len = (extra.size_disk as usize).min(capacity);
        read_range(self.data_path(container)?, offset, len)?.ok_or(Error::UnexpectedEof)
    }

    fn write_data_bytes(&self, container: &Container, extra: &PlatformExtra, data: &[u8]) -> Result<()> {
        if !self.legacy {
            let p = self.data_path(container)?;
            if let Some(dir) = p.parent() {
                fs::create_dir_all(dir)?;
            }
            return Ok(fs::write(p, data)?);
        }
        let (_, capacity) = self.region(container)?;
        let offset = extra
            .legacy_offset()
            .ok_or(Error::InvalidIndex(container.meta_index()))? as usize;
        if data.len() > capacity {
            return Err(Error::Unsupported(format!(
                "{} bytes do not fit the {capacity} byte region of {container}",
                data.len()
            )));
        }
        let mut file = self.load_memorydat(container, offset + capacity)?;
        file[offset..offset + capacity].fill(0);
        write_bytes_clipped(&mut file, offset, data);
        Ok(fs::write(self.data_path(container)?, file)?)
    }

    fn write_meta_bytes(&self, container: &Container, meta: &[u8]) -> Result<()> {
        if !self.legacy {
            let p = container
                .meta_file()
                .ok_or_else(|| Error::Unsupported(format!("no meta file for {container}")))?;
            return Ok(fs::write(p, meta)?);
        }
        let start = memorydat_meta_offset(container.meta_index());
        let mut file = self.load_memorydat(container, MEMORYDAT_OFFSET_DATA)?;
        write_u32_at(&mut file, 0, META_MAGIC)?;
        write_u32_at(&mut file, 4, MetaFormat::Vanilla.tag())?;
        write_u32_at(&mut file, 8, MEMORYDAT_SLOT_COUNT)?;
        write_bytes_clipped(&mut file, start, meta);
        Ok(fs::write(self.data_path(container)?, file)?)
    }

    fn decompress_data(&self, _container: &Container, extra: &PlatformExtra, data: Vec<u8>) -> Result<Vec<u8>> {
        if compression::is_chunked(&data) {
            compression::decompress_chunked(&data)
        } else if self.legacy {
            compression::decompress_single(&data, extra.size_decompressed as usize)
        } else {
            Ok(data)
        }
    }

    fn compress_data(&self, _container: &Container, plain: &[u8]) -> Vec<u8> {
        if self.legacy {
            compression::compress_single(plain)
        } else {
            compression::compress_chunked(plain)
        }
    }

    fn finalize_extra(&self, container: &Container, extra: PlatformExtra) -> PlatformExtra {
        if !self.legacy {
            return extra;
        }
        match memorydat_region(container.meta_index()) {
            Some((offset, _)) => PlatformExtra {
                platform: PlatformSpecific::PlaystationLegacy {
                    offset: offset as u32,
                },
                ..extra
            },
            None => extra,
        }
    }
}
