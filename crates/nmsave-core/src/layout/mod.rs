//! Per-platform meta layouts and data transforms.
//!
//! Every platform family stores the same scalars at its own byte offsets and
//! has its own idea of how data and meta bytes are encrypted, compressed and
//! located on disk. [`MetaLayout`] captures that; the default methods cover
//! the common case so an implementation only overrides what differs.
//!
//! Meta lengths form a closed set per platform and the length of a buffer
//! selects its generation.

mod microsoft;
mod playstation;
mod steam;
mod switch;

pub use microsoft::MicrosoftLayout;
pub use playstation::{MEMORYDAT_FILE, PlaystationLayout};
pub use steam::SteamLayout;
pub use switch::SwitchLayout;

use chrono::DateTime;
use std::fmt;
use std::fs;

use crate::binio::*;
use crate::compression;
use crate::container::{Container, Incompatibility};
use crate::error::{Error, Result};
use crate::extra::{PlatformExtra, PlatformSpecific};
use crate::model::{GameVersion, MetaFormat, PlatformKind};

pub const SAVE_NAME_LENGTH: usize = 0x80;
pub const SAVE_SUMMARY_LENGTH: usize = 0x80;

/// Byte offsets of one platform's meta buffer.
#[derive(Debug, Clone, Copy)]
pub struct MetaFields {
    /// Expected value of the first word, if the platform writes one.
    pub magic: Option<u32>,
    pub format: Option<usize>,
    pub size_decompressed: Option<usize>,
    pub size_disk: Option<usize>,
    pub legacy_offset: Option<usize>,
    pub meta_index: Option<usize>,
    /// Unix seconds as u32.
    pub timestamp: Option<usize>,
    pub base_version: usize,
    /// u16 game mode followed by u16 season.
    pub game_mode: usize,
    pub total_play_time: usize,
    /// End of the fields every generation has.
    pub known_vanilla: usize,
    pub save_name: usize,
    pub save_summary: usize,
    pub difficulty: usize,
    /// End of the fields since Waypoint.
    pub known_waypoint: usize,
}

/// Data is split into chunks since Frontiers; unknown versions get the
/// current format.
pub fn uses_chunks(version: GameVersion) -> bool {
    version == GameVersion::Unknown || version >= GameVersion::Frontiers
}

pub trait MetaLayout: fmt::Debug + Send + Sync {
    fn kind(&self) -> PlatformKind;

    fn fields(&self) -> &'static MetaFields;

    /// Closed set of `(generation, total length)`.
    fn lengths(&self) -> &'static [(MetaFormat, usize)];

    /// Data and meta file names of a slot relative to the account directory.
    /// `None` where names are not derived from the index.
    fn file_names(&self, meta_index: u32) -> Option<(String, String)>;

    fn is_meta_encrypted(&self) -> bool {
        false
    }

    fn is_meta_compressed(&self) -> bool {
        false
    }

    fn known_length(&self, format: MetaFormat) -> usize {
        let f = self.fields();
        if format.has_extended_fields() {
            f.known_waypoint
        } else {
            f.known_vanilla
        }
    }

    fn total_length(&self, format: MetaFormat) -> Option<usize> {
        self.lengths()
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, len)| *len)
    }

    fn format_of_length(&self, len: usize) -> Option<MetaFormat> {
        self.lengths()
            .iter()
            .find(|(_, l)| *l == len)
            .map(|(f, _)| *f)
    }

    /// Generation to write: never below what was read, never above what
    /// this platform knows.
    fn meta_format_for(&self, container: &Container, extra: &PlatformExtra) -> MetaFormat {
        let newest = self
            .lengths()
            .iter()
            .map(|(f, _)| *f)
            .max()
            .unwrap_or(MetaFormat::Vanilla);
        if container.is_account() {
            return MetaFormat::Vanilla;
        }
        MetaFormat::for_game_version(container.game_version())
            .max(extra.format)
            .min(newest)
    }

    /// Platform-specific reasons to not even look at the files.
    fn precheck(&self, _container: &Container) -> Option<Incompatibility> {
        None
    }

    fn slot_exists(&self, container: &Container) -> bool {
        container.data_file().is_some_and(|p| p.is_file())
    }

    // I/O

    fn read_meta_bytes(&self, container: &Container) -> Result<Option<Vec<u8>>> {
        match container.meta_file() {
            Some(p) if p.is_file() => Ok(Some(fs::read(p)?)),
            _ => Ok(None),
        }
    }

    fn read_data_bytes(&self, container: &Container, _extra: &PlatformExtra) -> Result<Vec<u8>> {
        let p = container
            .data_file()
            .ok_or_else(|| Error::Unsupported(format!("no data file for {container}")))?;
        Ok(fs::read(p)?)
    }

    fn write_data_bytes(&self, container: &Container, _extra: &PlatformExtra, data: &[u8]) -> Result<()> {
        let p = container
            .data_file()
            .ok_or_else(|| Error::Unsupported(format!("no data file for {container}")))?;
        if let Some(dir) = p.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(fs::write(p, data)?)
    }

    fn write_meta_bytes(&self, container: &Container, meta: &[u8]) -> Result<()> {
        let p = container
            .meta_file()
            .ok_or_else(|| Error::Unsupported(format!("no meta file for {container}")))?;
        if let Some(dir) = p.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(fs::write(p, meta)?)
    }

    // Transforms

    fn decrypt_meta(&self, _container: &Container, meta: Vec<u8>) -> Vec<u8> {
        meta
    }

    fn encrypt_meta(&self, _container: &Container, meta: Vec<u8>) -> Vec<u8> {
        meta
    }

    fn decompress_meta(&self, meta: Vec<u8>) -> Result<Vec<u8>> {
        Ok(meta)
    }

    fn compress_meta(&self, meta: Vec<u8>) -> Result<Vec<u8>> {
        Ok(meta)
    }

    fn decrypt_data(&self, data: Vec<u8>) -> Vec<u8> {
        data
    }

    fn encrypt_data(&self, data: Vec<u8>) -> Vec<u8> {
        data
    }

    /// Chunked when the chunk magic is present, plaintext otherwise.
    fn decompress_data(&self, _container: &Container, _extra: &PlatformExtra, data: Vec<u8>) -> Result<Vec<u8>> {
        if compression::is_chunked(&data) {
            compression::decompress_chunked(&data)
        } else {
            Ok(data)
        }
    }

    fn compress_data(&self, _container: &Container, plain: &[u8]) -> Vec<u8> {
        compression::compress_chunked(plain)
    }

    /// Last chance to adjust the extra after sizes are known and before the
    /// meta is built.
    fn finalize_extra(&self, _container: &Container, extra: PlatformExtra) -> PlatformExtra {
        extra
    }

    fn parse_meta(&self, _container: &Container, meta: &[u8]) -> Result<PlatformExtra> {
        parse_fields(self, meta)
    }

    fn create_meta(&self, container: &Container, extra: &PlatformExtra, format: MetaFormat) -> Result<Vec<u8>> {
        create_fields(self, container, extra, format)
    }
}

/// Reads every field the layout declares.
pub fn parse_fields<L: MetaLayout + ?Sized>(layout: &L, meta: &[u8]) -> Result<PlatformExtra> {
    let f = layout.fields();
    let format = layout
        .format_of_length(meta.len())
        .ok_or(Error::InvalidMetaLength(meta.len()))?;
    if let Some(expected) = f.magic {
        let actual = read_u32_at(meta, 0)?;
        if actual != expected {
            return Err(Error::InvalidMagic { expected, actual });
        }
    }
    let opt_u32 = |offset: Option<usize>| -> Result<Option<u32>> {
        offset.map(|o| read_u32_at(meta, o)).transpose()
    };

    let known = layout.known_length(format);
    let mut extra = PlatformExtra {
        format,
        bytes: meta.get(known..).map(<[u8]>::to_vec).unwrap_or_default(),
        size_decompressed: opt_u32(f.size_decompressed)?.unwrap_or_default(),
        size_disk: opt_u32(f.size_disk)?.unwrap_or_default(),
        last_write_time: opt_u32(f.timestamp)?
            .filter(|t| *t != 0)
            .and_then(|t| DateTime::from_timestamp(t as i64, 0)),
        base_version: read_i32_at(meta, f.base_version)?,
        game_mode: read_u16_at(meta, f.game_mode)?,
        season: read_u16_at(meta, f.game_mode + 2)?,
        total_play_time: read_u64_at(meta, f.total_play_time)?,
        ..Default::default()
    };
    if let Some(offset) = opt_u32(f.legacy_offset)? {
        extra.platform = PlatformSpecific::PlaystationLegacy { offset };
    }
    if format.has_extended_fields() {
        extra.save_name = read_fixed_str_at(meta, f.save_name, SAVE_NAME_LENGTH)?;
        extra.save_summary = read_fixed_str_at(meta, f.save_summary, SAVE_SUMMARY_LENGTH)?;
        extra.difficulty_preset = read_u8_at(meta, f.difficulty)?;
    }
    Ok(extra)
}

/// Builds a meta buffer of `format`.
///
/// Cached trailing bytes go in first, at the end of the known region of the
/// generation they were read from; the known fields of `format` then
/// overwrite whatever they overlap.
pub fn create_fields<L: MetaLayout + ?Sized>(
    layout: &L,
    container: &Container,
    extra: &PlatformExtra,
    format: MetaFormat,
) -> Result<Vec<u8>> {
    let f = layout.fields();
    let total = layout
        .total_length(format)
        .ok_or_else(|| Error::Unsupported(format!("{:?} meta on {}", format, layout.kind())))?;
    let mut buf = vec![0u8; total];

    if extra.format != MetaFormat::Unknown {
        write_bytes_clipped(&mut buf, layout.known_length(extra.format), &extra.bytes);
    }

    if let Some(magic) = f.magic {
        write_u32_at(&mut buf, 0, magic)?;
    }
    if let Some(o) = f.format {
        write_u32_at(&mut buf, o, format.tag())?;
    }
    if let Some(o) = f.size_decompressed {
        write_u32_at(&mut buf, o, extra.size_decompressed)?;
    }
    if let Some(o) = f.size_disk {
        write_u32_at(&mut buf, o, extra.size_disk)?;
    }
    if let Some(o) = f.legacy_offset {
        write_u32_at(&mut buf, o, extra.legacy_offset().unwrap_or_default())?;
    }
    if let Some(o) = f.meta_index {
        write_u32_at(&mut buf, o, container.meta_index())?;
    }
    if let Some(o) = f.timestamp {
        let t = extra.last_write_time.map_or(0, |t| t.timestamp() as u32);
        write_u32_at(&mut buf, o, t)?;
    }
    write_i32_at(&mut buf, f.base_version, extra.base_version)?;
    write_u16_at(&mut buf, f.game_mode, extra.game_mode)?;
    write_u16_at(&mut buf, f.game_mode + 2, extra.season)?;
    write_u64_at(&mut buf, f.total_play_time, extra.total_play_time)?;

    if format.has_extended_fields() {
        write_fixed_str_at(&mut buf, f.save_name, SAVE_NAME_LENGTH, &extra.save_name)?;
        write_fixed_str_at(&mut buf, f.save_summary, SAVE_SUMMARY_LENGTH, &extra.save_summary)?;
        write_u8_at(&mut buf, f.difficulty, extra.difficulty_preset)?;
    }
    Ok(buf)
}

/// Layout of a platform. `legacy` selects `memory.dat` on Playstation.
pub fn for_platform(kind: PlatformKind, legacy: bool) -> Box<dyn MetaLayout> {
    match kind {
        PlatformKind::Steam | PlatformKind::Gog | PlatformKind::Mac => Box::new(SteamLayout::new(kind)),
        PlatformKind::Microsoft => Box::new(MicrosoftLayout),
        PlatformKind::Playstation => Box::new(PlaystationLayout { legacy }),
        PlatformKind::Switch => Box::new(SwitchLayout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathTable;
    use std::sync::Arc;

    fn layouts() -> Vec<Box<dyn MetaLayout>> {
        vec![
            for_platform(PlatformKind::Steam, false),
            for_platform(PlatformKind::Microsoft, false),
            for_platform(PlatformKind::Playstation, false),
            for_platform(PlatformKind::Playstation, true),
            for_platform(PlatformKind::Switch, false),
        ]
    }

    /// Base version that matches the generation, so the Microsoft size field
    /// has its generation's meaning.
    fn base_for(format: MetaFormat) -> i32 {
        match format {
            MetaFormat::WorldsPartI | MetaFormat::WorldsPartII => 4153,
            _ => 4140,
        }
    }

    #[test]
    fn every_generation_keeps_its_scalars() {
        let c = Container::new(5, Arc::new(PathTable::default()));
        let written = DateTime::from_timestamp(1_700_000_000, 0);
        for layout in layouts() {
            for (format, len) in layout.lengths() {
                let extra = PlatformExtra {
                    format: *format,
                    base_version: base_for(*format),
                    game_mode: 6,
                    season: 17,
                    total_play_time: 987_654,
                    save_name: "Outpost".into(),
                    save_summary: "In orbit".into(),
                    difficulty_preset: 3,
                    size_decompressed: 0x4000,
                    size_disk: 0x1800,
                    last_write_time: written,
                    ..Default::default()
                };
                let case = format!("{} {format:?}", layout.kind());

                let plain = layout.create_meta(&c, &extra, *format).unwrap();
                assert_eq!(plain.len(), *len, "{case}");
                let stored = layout.encrypt_meta(&c, layout.compress_meta(plain).unwrap());
                let meta = layout
                    .decompress_meta(layout.decrypt_meta(&c, stored))
                    .unwrap();
                let parsed = layout.parse_meta(&c, &meta).unwrap();

                assert_eq!(parsed.format, *format, "{case}");
                assert_eq!(parsed.base_version, extra.base_version, "{case}");
                assert_eq!(parsed.game_mode, 6, "{case}");
                assert_eq!(parsed.season, 17, "{case}");
                assert_eq!(parsed.total_play_time, 987_654, "{case}");

                let f = layout.fields();
                if layout.kind() == PlatformKind::Microsoft {
                    if extra.base_version >= 4152 {
                        assert_eq!(parsed.size_disk, 0x1800, "{case}");
                    } else {
                        assert_eq!(parsed.size_decompressed, 0x4000, "{case}");
                    }
                }
                if f.size_decompressed.is_some() {
                    assert_eq!(parsed.size_decompressed, 0x4000, "{case}");
                }
                if f.size_disk.is_some() {
                    assert_eq!(parsed.size_disk, 0x1800, "{case}");
                }
                if f.timestamp.is_some() {
                    assert_eq!(parsed.last_write_time, written, "{case}");
                }

                if format.has_extended_fields() {
                    assert_eq!(parsed.save_name, "Outpost", "{case}");
                    assert_eq!(parsed.save_summary, "In orbit", "{case}");
                    assert_eq!(parsed.difficulty_preset, 3, "{case}");
                } else {
                    assert_eq!(parsed.save_name, "", "{case}");
                    assert_eq!(parsed.difficulty_preset, 0, "{case}");
                }
            }
        }
    }
}
