//! Semantic path identifiers and their literal JSON pointers.
//!
//! A document comes in two key spellings (plaintext and obfuscated) and two
//! format generations (single document, and since Omega two parallel
//! contexts under one root). Every identifier maps to up to four pointers:
//!
//! ```text
//! index = (generation - 1) * 2 + obfuscated
//! ```
//!
//! Empty slots fall back to the same spelling of the previous generation, so
//! paths that did not move are stored once. `{0}` is replaced by the key of
//! the requested context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::model::SaveContext;

const PLACEHOLDER: &str = "{0}";

const ROOT_KEY_PLAIN: &str = "Version";
const ROOT_KEY_OBFUSCATED: &str = "F2P";
const CONTEXT_KEY_PLAIN: &str = "BaseContext";
const CONTEXT_KEY_OBFUSCATED: &str = "vLc";

fn context_key(context: SaveContext, obfuscated: bool) -> &'static str {
    match (context, obfuscated) {
        (SaveContext::Main, false) => CONTEXT_KEY_PLAIN,
        (SaveContext::Main, true) => CONTEXT_KEY_OBFUSCATED,
        (SaveContext::Season, false) => "ExpeditionContext",
        (SaveContext::Season, true) => "2YS",
    }
}

/// `(identifier, [gen1 plain, gen1 obfuscated, gen2 plain, gen2 obfuscated])`
const BUILTIN: &[(&str, [&str; 4])] = &[
    ("VERSION", ["/Version", "/F2P", "", ""]),
    ("PLATFORM", ["/Platform", "/8>q", "", ""]),
    ("ACTIVE_CONTEXT", ["", "", "/ActiveContext", "/XTp"]),
    (
        "PLAYER_STATE",
        ["/PlayerStateData", "/6f=", "/{0}/PlayerStateData", "/{0}/6f="],
    ),
    (
        "SAVE_NAME",
        [
            "/PlayerStateData/SaveName",
            "/6f=/Pk4",
            "/CommonStateData/SaveName",
            "/<h0/Pk4",
        ],
    ),
    (
        "SAVE_SUMMARY",
        [
            "/PlayerStateData/SaveSummary",
            "/6f=/n:R",
            "/{0}/PlayerStateData/SaveSummary",
            "/{0}/6f=/n:R",
        ],
    ),
    (
        "TOTAL_PLAY_TIME",
        [
            "/PlayerStateData/TotalPlayTime",
            "/6f=/Lg8",
            "/CommonStateData/TotalPlayTime",
            "/<h0/Lg8",
        ],
    ),
    (
        "DIFFICULTY_PRESET",
        [
            "/PlayerStateData/DifficultyState/Preset/DifficultyPresetType",
            "/6f=/LyC/:fe/bN4",
            "/{0}/PlayerStateData/DifficultyState/Preset/DifficultyPresetType",
            "/{0}/6f=/LyC/:fe/bN4",
        ],
    ),
    (
        "SEASON_ID",
        [
            "/PlayerStateData/SeasonData/SeasonId",
            "/6f=/Rol/gou",
            "/{0}/PlayerStateData/SeasonData/SeasonId",
            "/{0}/6f=/Rol/gou",
        ],
    ),
    (
        "SETTLEMENT_STATES",
        [
            "/PlayerStateData/SettlementStatesV2",
            "/6f=/GQA",
            "/{0}/PlayerStateData/SettlementStatesV2",
            "/{0}/6f=/GQA",
        ],
    ),
    (
        "REDEEMED_SEASON_REWARDS",
        [
            "/PlayerStateData/RedeemedSeasonRewards",
            "/6f=/8Lq",
            "/{0}/PlayerStateData/RedeemedSeasonRewards",
            "/{0}/6f=/8Lq",
        ],
    ),
    (
        "UNIVERSE_ADDRESS",
        [
            "/PlayerStateData/UniverseAddress",
            "/6f=/yhJ",
            "/{0}/PlayerStateData/UniverseAddress",
            "/{0}/6f=/yhJ",
        ],
    ),
];

/// Host-supplied entry. Variants follow the same index order as built-ins;
/// an entry with one variant is stateless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub identifier: String,
    pub variants: Vec<String>,
}

/// Key state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentState {
    pub obfuscated: bool,
    /// 1 = single document, 2 = context-capable.
    pub generation: usize,
}

impl DocumentState {
    /// Looks at the root keys. `None` when neither spelling of the version key exists.
    pub fn detect(document: &Value) -> Option<Self> {
        let root = document.as_object()?;
        let obfuscated = if root.contains_key(ROOT_KEY_PLAIN) {
            false
        } else if root.contains_key(ROOT_KEY_OBFUSCATED) {
            true
        } else {
            return None;
        };
        let generation = if root.contains_key(CONTEXT_KEY_PLAIN)
            || root.contains_key(CONTEXT_KEY_OBFUSCATED)
        {
            2
        } else {
            1
        };
        Some(Self {
            obfuscated,
            generation,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PathTable {
    entries: HashMap<String, Vec<String>>,
}

impl Default for PathTable {
    fn default() -> Self {
        Self::with_extensions(Vec::new())
    }
}

impl PathTable {
    /// Built-in table merged with additive extensions. Extensions never
    /// replace a built-in identifier.
    pub fn with_extensions(extensions: Vec<PathEntry>) -> Self {
        let mut entries: HashMap<String, Vec<String>> = BUILTIN
            .iter()
            .map(|(id, variants)| {
                (
                    id.to_ascii_uppercase(),
                    variants.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect();
        for e in extensions {
            entries
                .entry(e.identifier.to_ascii_uppercase())
                .or_insert(e.variants);
        }
        Self { entries }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(&identifier.to_ascii_uppercase())
    }

    /// Resolves `identifier` for `document` and `context`.
    ///
    /// Unregistered identifiers are returned unchanged so raw pointers can be
    /// passed through. `None` means the document state could not be
    /// determined (or the identifier does not exist in this state).
    pub fn resolve(&self, identifier: &str, document: &Value, context: SaveContext) -> Option<String> {
        let Some(variants) = self.entries.get(&identifier.to_ascii_uppercase()) else {
            return Some(identifier.to_string());
        };
        if let [single] = variants.as_slice() {
            return Some(single.clone());
        }
        let state = DocumentState::detect(document)?;
        self.resolve_in_state(variants, state, context)
    }

    fn resolve_in_state(
        &self,
        variants: &[String],
        state: DocumentState,
        context: SaveContext,
    ) -> Option<String> {
        let mut index = (state.generation - 1) * 2 + state.obfuscated as usize;
        loop {
            if let Some(path) = variants.get(index).filter(|p| !p.is_empty()) {
                return Some(path.replace(PLACEHOLDER, context_key(context, state.obfuscated)));
            }
            if index < 2 {
                return None;
            }
            index -= 2;
        }
    }

    /// Last key of every spelling of `identifier`, used to scan raw bytes.
    pub fn leaf_keys(&self, identifier: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .get(&identifier.to_ascii_uppercase())
            .into_iter()
            .flatten()
            .filter_map(|p| p.rsplit('/').next())
            .filter(|k| !k.is_empty())
            .map(unescape_token)
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Decodes a single RFC 6901 reference token.
pub fn unescape_token(tok: &str) -> String {
    tok.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plaintext_and_obfuscated_documents() {
        let t = PathTable::default();
        let plain = json!({"Version": 4140, "PlayerStateData": {}});
        let obf = json!({"F2P": 4140, "6f=": {}});
        assert_eq!(
            t.resolve("SAVE_NAME", &plain, SaveContext::Main).as_deref(),
            Some("/PlayerStateData/SaveName")
        );
        assert_eq!(
            t.resolve("save_name", &obf, SaveContext::Main).as_deref(),
            Some("/6f=/Pk4")
        );
    }

    #[test]
    fn context_placeholder_and_generation_fallback() {
        let t = PathTable::default();
        let doc = json!({"F2P": 4150, "XTp": "Main", "vLc": {}, "2YS": {}});
        assert_eq!(
            t.resolve("SAVE_SUMMARY", &doc, SaveContext::Season).as_deref(),
            Some("/2YS/6f=/n:R")
        );
        // Unchanged since the first generation.
        assert_eq!(t.resolve("VERSION", &doc, SaveContext::Main).as_deref(), Some("/F2P"));
        // Not present in the first generation.
        let old = json!({"Version": 4120});
        assert_eq!(t.resolve("ACTIVE_CONTEXT", &old, SaveContext::Main), None);
    }

    #[test]
    fn unknown_state_and_passthrough() {
        let t = PathTable::default();
        let doc = json!({"Something": 1});
        assert_eq!(t.resolve("SAVE_NAME", &doc, SaveContext::Main), None);
        assert_eq!(
            t.resolve("/raw/pointer", &doc, SaveContext::Main).as_deref(),
            Some("/raw/pointer")
        );
    }

    #[test]
    fn stateless_extension() {
        let t = PathTable::with_extensions(vec![
            PathEntry {
                identifier: "CUSTOM".into(),
                variants: vec!["/Custom/Path".into()],
            },
            PathEntry {
                identifier: "VERSION".into(),
                variants: vec!["/Replaced".into()],
            },
        ]);
        let doc = json!({});
        assert_eq!(
            t.resolve("custom", &doc, SaveContext::Main).as_deref(),
            Some("/Custom/Path")
        );
        let plain = json!({"Version": 1});
        assert_eq!(
            t.resolve("VERSION", &plain, SaveContext::Main).as_deref(),
            Some("/Version")
        );
    }

    #[test]
    fn leaf_keys_cover_both_spellings() {
        let t = PathTable::default();
        assert_eq!(t.leaf_keys("TOTAL_PLAY_TIME"), ["Lg8", "TotalPlayTime"]);
    }
}
