//! Microsoft Store layout.
//!
//! No magic and no format tag: the generation is known from the length only.
//! Blob files are found through `containers.index`, so their names are not
//! derived from the meta index here.

use super::{MetaFields, MetaLayout, create_fields, parse_fields};
use crate::binio::{read_u32_at, write_u32_at};
use crate::compression;
use crate::container::{Container, Incompatibility};
use crate::error::Result;
use crate::extra::PlatformExtra;
use crate::model::{GameVersion, MetaFormat, MicrosoftSyncState, PlatformKind};
use crate::version::game_version_from_base;

/// Holds the decompressed size before Worlds Part I and the size on disk since.
const SIZE_FIELD: usize = 0x10;

static FIELDS: MetaFields = MetaFields {
    magic: None,
    format: None,
    size_decompressed: None,
    size_disk: None,
    legacy_offset: None,
    meta_index: None,
    timestamp: None,
    base_version: 0x00,
    game_mode: 0x04,
    total_play_time: 0x08,
    known_vanilla: 0x14,
    save_name: 0x18,
    save_summary: 0x98,
    difficulty: 0x118,
    known_waypoint: 0x119,
};

static LENGTHS: [(MetaFormat, usize); 4] = [
    (MetaFormat::Vanilla, 0x18),
    (MetaFormat::Waypoint, 0x128),
    (MetaFormat::WorldsPartI, 0x130),
    (MetaFormat::WorldsPartII, 0x138),
];

fn size_field_is_disk(base_version: i32) -> bool {
    game_version_from_base(base_version) >= GameVersion::WorldsPartI
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MicrosoftLayout;

impl MetaLayout for MicrosoftLayout {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Microsoft
    }

    fn fields(&self) -> &'static MetaFields {
        &FIELDS
    }

    fn lengths(&self) -> &'static [(MetaFormat, usize)] {
        &LENGTHS
    }

    fn file_names(&self, _meta_index: u32) -> Option<(String, String)> {
        None
    }

    fn precheck(&self, container: &Container) -> Option<Incompatibility> {
        let ms = container.extra().microsoft()?;
        if ms.sync_state == MicrosoftSyncState::Deleted {
            return Some(Incompatibility::MicrosoftDeleted);
        }
        let present = |p: Option<&std::path::Path>| p.is_some_and(|p| p.is_file());
        if !present(container.data_file()) || !present(container.meta_file()) {
            return Some(Incompatibility::MicrosoftMissingBlob);
        }
        None
    }

    fn parse_meta(&self, _container: &Container, meta: &[u8]) -> Result<PlatformExtra> {
        let mut extra = parse_fields(self, meta)?;
        let size = read_u32_at(meta, SIZE_FIELD)?;
        if size_field_is_disk(extra.base_version) {
            extra.size_disk = size;
        } else {
            extra.size_decompressed = size;
        }
        Ok(extra)
    }

    fn create_meta(&self, container: &Container, extra: &PlatformExtra, format: MetaFormat) -> Result<Vec<u8>> {
        let mut buf = create_fields(self, container, extra, format)?;
        let size = if size_field_is_disk(extra.base_version) {
            extra.size_disk
        } else {
            extra.size_decompressed
        };
        write_u32_at(&mut buf, SIZE_FIELD, size)?;
        Ok(buf)
    }

    fn decompress_data(&self, _container: &Container, extra: &PlatformExtra, data: Vec<u8>) -> Result<Vec<u8>> {
        if compression::is_chunked(&data) {
            compression::decompress_chunked(&data)
        } else {
            compression::decompress_single(&data, extra.size_decompressed as usize)
        }
    }
}
