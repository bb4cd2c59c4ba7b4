//! Switch layout. Data is always chunked and the meta keeps its own
//! timestamp and meta index.

use super::{MetaFields, MetaLayout};
use crate::model::{MetaFormat, PlatformKind};

pub const META_MAGIC: u32 = 0xCA55E77E;

static FIELDS: MetaFields = MetaFields {
    magic: Some(META_MAGIC),
    format: Some(0x04),
    size_decompressed: Some(0x08),
    size_disk: None,
    legacy_offset: None,
    meta_index: Some(0x0C),
    timestamp: Some(0x10),
    base_version: 0x14,
    game_mode: 0x18,
    total_play_time: 0x1C,
    known_vanilla: 0x24,
    save_name: 0x28,
    save_summary: 0xA8,
    difficulty: 0x128,
    known_waypoint: 0x129,
};

static LENGTHS: [(MetaFormat, usize); 4] = [
    (MetaFormat::Vanilla, 0x28),
    (MetaFormat::Waypoint, 0x138),
    (MetaFormat::WorldsPartI, 0x148),
    (MetaFormat::WorldsPartII, 0x158),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchLayout;

impl MetaLayout for SwitchLayout {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Switch
    }

    fn fields(&self) -> &'static MetaFields {
        &FIELDS
    }

    fn lengths(&self) -> &'static [(MetaFormat, usize)] {
        &LENGTHS
    }

    fn file_names(&self, meta_index: u32) -> Option<(String, String)> {
        (meta_index != 1).then(|| {
            (
                format!("savedata{meta_index:02}.hg"),
                format!("manifest{meta_index:02}.hg"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::extra::PlatformExtra;
    use crate::paths::PathTable;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn timestamp_and_index_are_stored() {
        let c = Container::new(7, Arc::new(PathTable::default()));
        let t = Utc.with_ymd_and_hms(2024, 8, 14, 12, 0, 0).unwrap();
        let extra = PlatformExtra {
            base_version: 4147,
            last_write_time: Some(t),
            ..Default::default()
        };
        let meta = SwitchLayout.create_meta(&c, &extra, MetaFormat::Waypoint).unwrap();
        assert_eq!(meta.len(), 0x138);
        assert_eq!(crate::binio::read_u32_at(&meta, 0x0C).unwrap(), 7);
        assert_eq!(crate::binio::read_u32_at(&meta, 0x04).unwrap(), 0x7D1);

        let parsed = SwitchLayout.parse_meta(&c, &meta).unwrap();
        assert_eq!(parsed.last_write_time, Some(t));
        assert_eq!(parsed.base_version, 4147);
    }
}
