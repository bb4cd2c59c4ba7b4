//! Scalars extracted from a meta file.
//!
//! A [`PlatformExtra`] is owned by exactly one container and is never mutated
//! in place: every change builds a new value (usually with struct update
//! syntax) and replaces the old one wholesale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::{Difficulty, GameMode, MetaFormat, MicrosoftSyncState};

/// Microsoft blob bookkeeping taken from `containers.index` and the blob
/// container file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MicrosoftExtra {
    pub sync_state: MicrosoftSyncState,
    /// Opaque sync timestamp string, preserved verbatim.
    pub sync_time: String,
    /// Numeric extension of the `container.N` file.
    pub blob_container_extension: u8,
    pub blob_directory: Uuid,
    pub blob_data: Option<Uuid>,
    pub blob_meta: Option<Uuid>,
    /// Total size stored in the index entry.
    pub total_size: u64,
}

/// Sub-fields only one platform family carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum PlatformSpecific {
    #[default]
    None,
    Microsoft(MicrosoftExtra),
    /// Offset of the slot's data inside `memory.dat`.
    PlaystationLegacy { offset: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformExtra {
    /// Generation of the meta buffer this value was read from or last written as.
    pub format: MetaFormat,
    /// Meta bytes past the known region of `format`, preserved verbatim.
    pub bytes: Vec<u8>,
    pub size_decompressed: u32,
    pub size_disk: u32,
    pub last_write_time: Option<DateTime<Utc>>,
    pub base_version: i32,
    pub game_mode: u16,
    pub season: u16,
    /// Seconds.
    pub total_play_time: u64,
    pub save_name: String,
    pub save_summary: String,
    pub difficulty_preset: u8,
    pub platform: PlatformSpecific,
}

impl PlatformExtra {
    pub fn game_mode(&self) -> GameMode {
        GameMode::from_u16(self.game_mode)
    }

    pub fn difficulty(&self) -> Difficulty {
        Difficulty::from_u8(self.difficulty_preset)
    }

    pub fn microsoft(&self) -> Option<&MicrosoftExtra> {
        match &self.platform {
            PlatformSpecific::Microsoft(m) => Some(m),
            _ => None,
        }
    }

    pub fn legacy_offset(&self) -> Option<u32> {
        match self.platform {
            PlatformSpecific::PlaystationLegacy { offset } => Some(offset),
            _ => None,
        }
    }

    pub fn with_sizes(&self, size_decompressed: u32, size_disk: u32) -> Self {
        Self {
            size_decompressed,
            size_disk,
            ..self.clone()
        }
    }

    pub fn with_last_write_time(&self, t: DateTime<Utc>) -> Self {
        Self {
            last_write_time: Some(t),
            ..self.clone()
        }
    }

    pub fn with_platform(&self, platform: PlatformSpecific) -> Self {
        Self {
            platform,
            ..self.clone()
        }
    }
}

/// Whether a cached scalar must be (re)derived.
///
/// Zero doubles as "not computed yet", so a legitimate zero is recomputed
/// every time. Downstream derivation relies on that.
pub fn needs_update<T: PartialOrd + Default>(forced: bool, value: T) -> bool {
    forced || value <= T::default()
}

/// String variant of [`needs_update`].
pub fn needs_update_str(forced: bool, value: &str) -> bool {
    forced || value.is_empty()
}
