//! Desktop store layout, shared by Steam, GOG and Mac.
//!
//! The meta file is encrypted with the slot-keyed block cipher. Data files
//! are plain JSON before Frontiers and chunked LZ4 since.

use super::{MetaFields, MetaLayout, uses_chunks};
use crate::cipher;
use crate::container::Container;
use crate::model::{MetaFormat, PlatformKind};

pub const META_MAGIC: u32 = 0xEEEEEEBE;

const LENGTH_VANILLA: usize = 0x68;

static FIELDS: MetaFields = MetaFields {
    magic: Some(META_MAGIC),
    format: Some(0x04),
    // 0x08..0x38 held content hashes in earlier releases and is zero now.
    size_decompressed: Some(0x38),
    size_disk: Some(0x3C),
    legacy_offset: None,
    meta_index: None,
    timestamp: None,
    base_version: 0x44,
    game_mode: 0x48,
    total_play_time: 0x4C,
    known_vanilla: 0x54,
    save_name: 0x58,
    save_summary: 0xD8,
    difficulty: 0x158,
    known_waypoint: 0x159,
};

static LENGTHS: [(MetaFormat, usize); 4] = [
    (MetaFormat::Vanilla, LENGTH_VANILLA),
    (MetaFormat::Waypoint, 0x168),
    (MetaFormat::WorldsPartI, 0x180),
    (MetaFormat::WorldsPartII, 0x1B0),
];

#[derive(Debug, Clone, Copy)]
pub struct SteamLayout {
    kind: PlatformKind,
}

impl SteamLayout {
    pub fn new(kind: PlatformKind) -> Self {
        Self { kind }
    }
}

impl MetaLayout for SteamLayout {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn fields(&self) -> &'static MetaFields {
        &FIELDS
    }

    fn lengths(&self) -> &'static [(MetaFormat, usize)] {
        &LENGTHS
    }

    fn file_names(&self, meta_index: u32) -> Option<(String, String)> {
        let stem = match meta_index {
            0 => "accountdata".to_string(),
            1 => return None,
            2 => "save".to_string(),
            n => format!("save{}", n - 1),
        };
        Some((format!("{stem}.hg"), format!("mf_{stem}.hg")))
    }

    fn is_meta_encrypted(&self) -> bool {
        true
    }

    fn decrypt_meta(&self, container: &Container, meta: Vec<u8>) -> Vec<u8> {
        let rounds = cipher::iterations_for(meta.len(), LENGTH_VANILLA);
        cipher::decrypt(&meta, container.meta_index(), rounds)
    }

    fn encrypt_meta(&self, container: &Container, meta: Vec<u8>) -> Vec<u8> {
        let rounds = cipher::iterations_for(meta.len(), LENGTH_VANILLA);
        cipher::encrypt(&meta, container.meta_index(), rounds)
    }

    fn compress_data(&self, container: &Container, plain: &[u8]) -> Vec<u8> {
        if uses_chunks(container.game_version()) {
            crate::compression::compress_chunked(plain)
        } else {
            plain.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra::PlatformExtra;
    use crate::paths::PathTable;
    use std::sync::Arc;

    #[test]
    fn file_names_follow_meta_index() {
        let l = SteamLayout::new(PlatformKind::Steam);
        assert_eq!(
            l.file_names(0),
            Some(("accountdata.hg".into(), "mf_accountdata.hg".into()))
        );
        assert_eq!(l.file_names(1), None);
        assert_eq!(l.file_names(2), Some(("save.hg".into(), "mf_save.hg".into())));
        assert_eq!(l.file_names(3), Some(("save2.hg".into(), "mf_save2.hg".into())));
        assert_eq!(l.file_names(31), Some(("save30.hg".into(), "mf_save30.hg".into())));
    }

    #[test]
    fn encrypted_meta_roundtrip() {
        let l = SteamLayout::new(PlatformKind::Steam);
        let c = Container::new(5, Arc::new(PathTable::default()));
        let extra = PlatformExtra {
            format: MetaFormat::WorldsPartI,
            base_version: 4170,
            game_mode: 1,
            total_play_time: 3600,
            save_name: "Home".into(),
            save_summary: "On a moon".into(),
            difficulty_preset: 2,
            size_decompressed: 1000,
            size_disk: 400,
            ..Default::default()
        };
        let plain = l.create_meta(&c, &extra, MetaFormat::WorldsPartI).unwrap();
        assert_eq!(plain.len(), 0x180);

        let encrypted = l.encrypt_meta(&c, plain.clone());
        assert_eq!(&encrypted[..4], &META_MAGIC.to_le_bytes());
        assert_ne!(encrypted, plain);

        let parsed = l.parse_meta(&c, &l.decrypt_meta(&c, encrypted)).unwrap();
        assert_eq!(parsed.format, MetaFormat::WorldsPartI);
        assert_eq!(parsed.base_version, 4170);
        assert_eq!(parsed.save_name, "Home");
        assert_eq!(parsed.save_summary, "On a moon");
        assert_eq!(parsed.difficulty_preset, 2);
        assert_eq!(parsed.size_disk, 400);
        assert_eq!(parsed.total_play_time, 3600);
    }

    #[test]
    fn trailing_bytes_survive_rewrite() {
        let l = SteamLayout::new(PlatformKind::Gog);
        let c = Container::new(2, Arc::new(PathTable::default()));
        let mut raw = l
            .create_meta(&c, &PlatformExtra::default(), MetaFormat::WorldsPartII)
            .unwrap();
        raw[0x1A0] = 0xAB;
        let parsed = l.parse_meta(&c, &raw).unwrap();
        assert_eq!(parsed.bytes.len(), 0x1B0 - 0x159);

        let rebuilt = l
            .create_meta(&c, &parsed, MetaFormat::WorldsPartII)
            .unwrap();
        assert_eq!(rebuilt[0x1A0], 0xAB);
    }
}
