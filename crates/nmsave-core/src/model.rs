//! Small value types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storefront or console a save directory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformKind {
    Steam,
    Gog,
    Mac,
    Microsoft,
    Playstation,
    Switch,
}

impl PlatformKind {
    /// Steam, GOG and Mac share one on-disk format.
    pub fn is_desktop_store(self) -> bool {
        matches!(self, Self::Steam | Self::Gog | Self::Mac)
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Steam => "steam",
            Self::Gog => "gog",
            Self::Mac => "mac",
            Self::Microsoft => "microsoft",
            Self::Playstation => "playstation",
            Self::Switch => "switch",
        }
    }

    pub fn from_short_name(s: &str) -> Option<Self> {
        [
            Self::Steam,
            Self::Gog,
            Self::Mac,
            Self::Microsoft,
            Self::Playstation,
            Self::Switch,
        ]
        .into_iter()
        .find(|k| k.short_name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Game mode as encoded in the composite file version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u16)]
pub enum GameMode {
    #[default]
    Unspecified = 0,
    Normal = 1,
    Creative = 2,
    Survival = 3,
    Ambient = 4,
    Permadeath = 5,
    Seasonal = 6,
}

impl GameMode {
    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::Normal,
            2 => Self::Creative,
            3 => Self::Survival,
            4 => Self::Ambient,
            5 => Self::Permadeath,
            6 => Self::Seasonal,
            _ => Self::Unspecified,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as u16 as i32
    }
}

/// Difficulty preset stored in the document since Waypoint.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Difficulty {
    #[default]
    Invalid = 0,
    Custom = 1,
    Normal = 2,
    Creative = 3,
    Relaxed = 4,
    Survival = 5,
    Permadeath = 6,
}

impl Difficulty {
    const ALL: [Self; 7] = [
        Self::Invalid,
        Self::Custom,
        Self::Normal,
        Self::Creative,
        Self::Relaxed,
        Self::Survival,
        Self::Permadeath,
    ];

    pub fn from_u8(v: u8) -> Self {
        Self::ALL.get(v as usize).copied().unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Custom => "Custom",
            Self::Normal => "Normal",
            Self::Creative => "Creative",
            Self::Relaxed => "Relaxed",
            Self::Survival => "Survival",
            Self::Permadeath => "Permadeath",
        }
    }

    pub fn from_name(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .unwrap_or_default()
    }

    /// Mode a preset corresponds to when the file version no longer carries it.
    pub fn game_mode(self) -> GameMode {
        match self {
            Self::Invalid => GameMode::Unspecified,
            Self::Custom | Self::Normal | Self::Relaxed => GameMode::Normal,
            Self::Creative => GameMode::Creative,
            Self::Survival => GameMode::Survival,
            Self::Permadeath => GameMode::Permadeath,
        }
    }

    pub fn from_game_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::Unspecified => Self::Invalid,
            GameMode::Normal | GameMode::Seasonal => Self::Normal,
            GameMode::Creative => Self::Creative,
            GameMode::Survival => Self::Survival,
            GameMode::Ambient => Self::Relaxed,
            GameMode::Permadeath => Self::Permadeath,
        }
    }
}

/// Product revision that produced a save, inferred from the base version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GameVersion {
    #[default]
    Unknown,
    Vanilla,
    Foundation,
    PathFinder,
    AtlasRises,
    Next,
    Abyss,
    Visions,
    Beyond,
    Synthesis,
    LivingShip,
    ExoMech,
    Crossplay,
    Desolation,
    Origins,
    NextGeneration,
    Companions,
    Expeditions,
    Beachhead,
    Prisms,
    Frontiers,
    Emergence,
    Sentinel,
    Outlaws,
    Endurance,
    Waypoint,
    Fractal,
    Interceptor,
    Singularity,
    Echoes,
    Omega,
    Orbital,
    Adrift,
    WorldsPartI,
    WorldsPartII,
}

/// Slot kind derived from the collection index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveType {
    Auto = 0,
    Manual = 1,
}

/// One of the two parallel sub-documents of context-capable saves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveContext {
    #[default]
    Main,
    Season,
}

impl SaveContext {
    /// Value of the active-context key in the document.
    pub fn name(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::Season => "Season",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "Main" => Some(Self::Main),
            "Season" => Some(Self::Season),
            _ => None,
        }
    }
}

/// Generation of a meta buffer, stored as the format tag on most platforms.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum MetaFormat {
    #[default]
    Unknown,
    Vanilla,
    Waypoint,
    WorldsPartI,
    WorldsPartII,
}

impl MetaFormat {
    pub fn tag(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Vanilla => 0x7D0,
            Self::Waypoint => 0x7D1,
            Self::WorldsPartI => 0x7D2,
            Self::WorldsPartII => 0x7D3,
        }
    }

    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0x7D0 => Self::Vanilla,
            0x7D1 => Self::Waypoint,
            0x7D2 => Self::WorldsPartI,
            0x7D3 => Self::WorldsPartII,
            _ => Self::Unknown,
        }
    }

    /// Lowest meta generation able to hold everything a save of `version` needs.
    pub fn for_game_version(version: GameVersion) -> Self {
        if version >= GameVersion::WorldsPartII {
            Self::WorldsPartII
        } else if version >= GameVersion::WorldsPartI {
            Self::WorldsPartI
        } else if version >= GameVersion::Waypoint {
            Self::Waypoint
        } else {
            Self::Vanilla
        }
    }

    /// Save name, summary and difficulty are part of the meta from Waypoint on.
    pub fn has_extended_fields(self) -> bool {
        self >= Self::Waypoint
    }
}

/// Cloud sync state of a Microsoft blob container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicrosoftSyncState {
    #[default]
    Unknown,
    Synced,
    Modified,
    Created,
    Deleted,
}

impl MicrosoftSyncState {
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::Synced,
            2 => Self::Modified,
            3 => Self::Created,
            5 => Self::Deleted,
            _ => Self::Unknown,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Synced => 1,
            Self::Modified => 2,
            Self::Created => 3,
            Self::Deleted => 5,
        }
    }
}

/// How much of every slot is loaded when a platform is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingStrategy {
    /// Containers are created but nothing is read.
    Empty,
    /// Metadata only for every slot.
    Hollow,
    /// Account data fully, every save hollow.
    #[default]
    Current,
    /// Everything fully.
    Full,
}
