//! Composite file version arithmetic and feature level inference.
//!
//! The version stored in a save packs base version, game mode and season:
//!
//! ```text
//! version = base + (mode + season * 128) * 512
//! ```
//!
//! Season only takes part for seasonal saves. Since Waypoint the custom
//! modes (creative, survival, ambient) are written as normal and the actual
//! mode lives in the difficulty preset. Saves older than vanilla never had a
//! mode besides normal and permadeath. [`compose`] and [`decompose`] apply the
//! same normalization on both sides, which keeps them inverse to each other.

use crate::model::{GameMode, GameVersion};

pub const OFFSET_GAMEMODE: i32 = 512;
pub const OFFSET_SEASON: i32 = 128;

pub const THRESHOLD_VANILLA: i32 = 4098;
pub const THRESHOLD_WAYPOINT: i32 = 4140;
pub const THRESHOLD_VANILLA_GAMEMODE: i32 = THRESHOLD_VANILLA + OFFSET_GAMEMODE;
pub const THRESHOLD_WAYPOINT_GAMEMODE: i32 = THRESHOLD_WAYPOINT + OFFSET_GAMEMODE;

fn offset(mode: GameMode, season: u16) -> i32 {
    let season = if mode == GameMode::Seasonal {
        season as i32 * OFFSET_SEASON
    } else {
        0
    };
    (mode.as_i32() + season) * OFFSET_GAMEMODE
}

fn is_custom(mode: GameMode) -> bool {
    matches!(
        mode,
        GameMode::Creative | GameMode::Survival | GameMode::Ambient
    )
}

/// Packs base version, game mode and season into the stored file version.
pub fn compose(base: i32, mode: GameMode, season: u16) -> i32 {
    let mode = match mode {
        GameMode::Seasonal | GameMode::Permadeath => mode,
        _ if base < THRESHOLD_VANILLA => GameMode::Normal,
        _ if base < THRESHOLD_WAYPOINT => mode,
        _ => GameMode::Normal,
    };
    base + offset(mode, season)
}

/// Extracts the base version from a stored file version.
pub fn decompose(version: i32, mode: GameMode, season: u16) -> i32 {
    let base = version - offset(mode, season);
    let fallback = (base < THRESHOLD_VANILLA && mode < GameMode::Permadeath)
        || (base >= THRESHOLD_WAYPOINT_GAMEMODE && mode == GameMode::Unspecified)
        || (base >= THRESHOLD_WAYPOINT && is_custom(mode));
    if fallback {
        version - offset(GameMode::Normal, season)
    } else {
        base
    }
}

/// Reads mode and season back out of a file version.
///
/// Only valid while the base version stays below `8 * 512 + 512`, which
/// holds for every released game version.
pub fn game_mode_from_version(version: i32) -> (GameMode, u16) {
    let packed = version >> 9;
    if packed < 8 {
        return (GameMode::Unspecified, 0);
    }
    let packed = packed - 8;
    let mode = (packed % OFFSET_SEASON) as u16;
    let season = (packed / OFFSET_SEASON) as u16;
    match GameMode::from_u16(mode) {
        GameMode::Unspecified => (GameMode::Unspecified, 0),
        GameMode::Seasonal => (GameMode::Seasonal, season),
        m => (m, 0),
    }
}

/// A document key whose absence lowers the inferred level.
struct KeyCheck {
    identifier: &'static str,
    without: GameVersion,
}

/// Descending base version thresholds. Some releases share a base version
/// and are told apart by a key only the newer one writes.
const GAME_VERSIONS: &[(i32, GameVersion, Option<KeyCheck>)] = &[
    (4153, GameVersion::WorldsPartII, None),
    (4152, GameVersion::WorldsPartI, None),
    (4151, GameVersion::Adrift, None),
    (4150, GameVersion::Orbital, None),
    (4149, GameVersion::Omega, None),
    (4148, GameVersion::Echoes, None),
    (4147, GameVersion::Singularity, None),
    (4146, GameVersion::Interceptor, None),
    (4145, GameVersion::Fractal, None),
    (4140, GameVersion::Waypoint, None),
    (4139, GameVersion::Endurance, None),
    (4138, GameVersion::Outlaws, None),
    (4137, GameVersion::Sentinel, None),
    (4136, GameVersion::Emergence, None),
    (
        4135,
        GameVersion::Frontiers,
        Some(KeyCheck {
            identifier: "SETTLEMENT_STATES",
            without: GameVersion::Prisms,
        }),
    ),
    (
        4133,
        GameVersion::Beachhead,
        Some(KeyCheck {
            identifier: "REDEEMED_SEASON_REWARDS",
            without: GameVersion::Expeditions,
        }),
    ),
    (4129, GameVersion::Companions, None),
    (4128, GameVersion::NextGeneration, None),
    (4127, GameVersion::Origins, None),
    (4126, GameVersion::Desolation, None),
    (4125, GameVersion::Crossplay, None),
    (4124, GameVersion::ExoMech, None),
    (4123, GameVersion::LivingShip, None),
    (4122, GameVersion::Synthesis, None),
    (4120, GameVersion::Beyond, None),
    (4119, GameVersion::Visions, None),
    (4118, GameVersion::Abyss, None),
    (4114, GameVersion::Next, None),
    (4105, GameVersion::AtlasRises, None),
    (4104, GameVersion::PathFinder, None),
    (4100, GameVersion::Foundation, None),
    (THRESHOLD_VANILLA, GameVersion::Vanilla, None),
];

/// Infers the feature level from a base version.
///
/// `has_key` answers whether the save contains the key behind a path
/// identifier; it is consulted only where two releases share a base version.
pub fn infer_game_version<F>(base_version: i32, has_key: F) -> GameVersion
where
    F: Fn(&str) -> bool,
{
    for (threshold, level, check) in GAME_VERSIONS {
        if base_version < *threshold {
            continue;
        }
        return match check {
            Some(p) if !has_key(p.identifier) => p.without,
            _ => *level,
        };
    }
    GameVersion::Unknown
}

/// Feature level without any key lookups. Shared base versions resolve to
/// the newer release.
pub fn game_version_from_base(base_version: i32) -> GameVersion {
    infer_game_version(base_version, |_| true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [GameMode; 5] = [
        GameMode::Normal,
        GameMode::Creative,
        GameMode::Survival,
        GameMode::Permadeath,
        GameMode::Seasonal,
    ];

    #[test]
    fn compose_decompose_are_inverse() {
        for mode in MODES {
            for season in 0..=40u16 {
                for base in [3999, 4098, 4140, 200000] {
                    let version = compose(base, mode, season);
                    assert_eq!(
                        decompose(version, mode, season),
                        base,
                        "base {base} mode {mode:?} season {season} version {version}"
                    );
                }
            }
        }
    }

    #[test]
    fn expedition_versions() {
        // The first expedition was written with season 0.
        assert_eq!(compose(4133, GameMode::Seasonal, 0), 7205);
        assert_eq!(compose(4133, GameMode::Seasonal, 2), 138277);
        assert_eq!(compose(4135, GameMode::Seasonal, 3), 203815);
        assert_eq!(compose(4135, GameMode::Seasonal, 4), 269351);
        assert_eq!(decompose(269351, GameMode::Seasonal, 4), 4135);
    }

    #[test]
    fn custom_modes_are_normal_after_waypoint() {
        assert_eq!(compose(4145, GameMode::Creative, 0), 4145 + 512);
        assert_eq!(compose(4139, GameMode::Creative, 0), 4139 + 1024);
        assert_eq!(compose(4145, GameMode::Permadeath, 0), 4145 + 5 * 512);
    }

    #[test]
    fn unspecified_mode_falls_back_to_normal() {
        assert_eq!(decompose(4652, GameMode::Unspecified, 0), 4140);
        assert_eq!(decompose(4610, GameMode::Unspecified, 0), 4610);
    }

    #[test]
    fn mode_and_season_from_version() {
        assert_eq!(game_mode_from_version(7205), (GameMode::Seasonal, 0));
        assert_eq!(game_mode_from_version(138277), (GameMode::Seasonal, 2));
        assert_eq!(game_mode_from_version(4140 + 512), (GameMode::Normal, 0));
        assert_eq!(
            game_mode_from_version(4120 + 5 * 512),
            (GameMode::Permadeath, 0)
        );
        assert_eq!(game_mode_from_version(100), (GameMode::Unspecified, 0));
    }

    #[test]
    fn feature_level_table() {
        assert_eq!(game_version_from_base(4000), GameVersion::Unknown);
        assert_eq!(game_version_from_base(4098), GameVersion::Vanilla);
        assert_eq!(game_version_from_base(4142), GameVersion::Waypoint);
        assert_eq!(game_version_from_base(4160), GameVersion::WorldsPartII);
        assert_eq!(
            infer_game_version(4135, |id| id != "SETTLEMENT_STATES"),
            GameVersion::Prisms
        );
        assert_eq!(infer_game_version(4135, |_| true), GameVersion::Frontiers);
        assert_eq!(infer_game_version(4133, |_| false), GameVersion::Expeditions);
    }
}
