//! Translation between obfuscated on-disk keys and their plaintext names.

use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Built-in `(plaintext, obfuscated)` pairs.
const BUILTIN: &[(&str, &str)] = &[
    ("ActiveContext", "XTp"),
    ("BaseContext", "vLc"),
    ("CommonStateData", "<h0"),
    ("DifficultyPresetType", "bN4"),
    ("DifficultyState", "LyC"),
    ("ExpeditionContext", "2YS"),
    ("GameKnowledgeData", "4Uh"),
    ("Platform", "8>q"),
    ("PlayerStateData", "6f="),
    ("Preset", ":fe"),
    ("RedeemedSeasonRewards", "8Lq"),
    ("SaveName", "Pk4"),
    ("SaveSummary", "n:R"),
    ("SeasonData", "Rol"),
    ("SeasonId", "gou"),
    ("SettlementStatesV2", "GQA"),
    ("TotalPlayTime", "Lg8"),
    ("UniverseAddress", "yhJ"),
    ("Version", "F2P"),
];

/// Bidirectional key table. Host applications may add entries; built-in
/// entries are never replaced.
#[derive(Debug, Clone)]
pub struct Mapping {
    to_plain: HashMap<String, String>,
    to_obfuscated: HashMap<String, String>,
}

impl Default for Mapping {
    fn default() -> Self {
        Self::with_extensions(std::iter::empty::<(String, String)>())
    }
}

impl Mapping {
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut m = Self {
            to_plain: HashMap::new(),
            to_obfuscated: HashMap::new(),
        };
        for (plain, obf) in BUILTIN {
            m.insert((*plain).to_string(), (*obf).to_string());
        }
        for (plain, obf) in extensions {
            let (plain, obf) = (plain.into(), obf.into());
            if m.to_obfuscated.contains_key(&plain) || m.to_plain.contains_key(&obf) {
                continue;
            }
            m.insert(plain, obf);
        }
        m
    }

    fn insert(&mut self, plain: String, obf: String) {
        self.to_plain.insert(obf.clone(), plain.clone());
        self.to_obfuscated.insert(plain, obf);
    }

    pub fn plain_of(&self, key: &str) -> Option<&str> {
        self.to_plain.get(key).map(String::as_str)
    }

    pub fn obfuscated_of(&self, key: &str) -> Option<&str> {
        self.to_obfuscated.get(key).map(String::as_str)
    }

    /// Renames every known obfuscated key in place and returns the keys that
    /// are neither known tokens nor known plaintext names.
    pub fn deobfuscate(&self, value: &mut Value) -> BTreeSet<String> {
        let mut unknown = BTreeSet::new();
        rename_keys(value, &self.to_plain, &self.to_obfuscated, &mut unknown);
        unknown
    }

    /// Renames every known plaintext key back to its token.
    pub fn obfuscate(&self, value: &mut Value) {
        let mut ignored = BTreeSet::new();
        rename_keys(value, &self.to_obfuscated, &self.to_plain, &mut ignored);
    }
}

fn rename_keys(
    value: &mut Value,
    table: &HashMap<String, String>,
    already: &HashMap<String, String>,
    unknown: &mut BTreeSet<String>,
) {
    match value {
        Value::Object(map) => {
            let old = std::mem::take(map);
            let mut renamed = Map::with_capacity(old.len());
            for (key, mut child) in old {
                rename_keys(&mut child, table, already, unknown);
                let key = match table.get(&key) {
                    Some(k) => k.clone(),
                    None => {
                        if !already.contains_key(&key) {
                            unknown.insert(key.clone());
                        }
                        key
                    }
                };
                renamed.insert(key, child);
            }
            *map = renamed;
        }
        Value::Array(items) => {
            for item in items {
                rename_keys(item, table, already, unknown);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deobfuscate_renames_and_reports_unknown() {
        let m = Mapping::default();
        let mut doc = json!({"F2P": 4652, "6f=": {"Pk4": "Home", "zzz": 1}, "Version2": [{"Lg8": 5}]});
        let unknown = m.deobfuscate(&mut doc);
        assert_eq!(doc["Version"], json!(4652));
        assert_eq!(doc["PlayerStateData"]["SaveName"], json!("Home"));
        assert_eq!(doc["Version2"][0]["TotalPlayTime"], json!(5));
        assert!(unknown.contains("zzz"));
        assert!(unknown.contains("Version2"));
        assert!(!unknown.contains("F2P"));
    }

    #[test]
    fn obfuscate_reverses_and_keeps_order() {
        let m = Mapping::default();
        let original = json!({"F2P": 1, "8>q": "PC", "6f=": {"Lg8": 10}});
        let mut doc = original.clone();
        m.deobfuscate(&mut doc);
        m.obfuscate(&mut doc);
        assert_eq!(doc, original);
        let keys: Vec<_> = doc.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["F2P", "8>q", "6f="]);
    }

    #[test]
    fn extensions_are_additive() {
        let m = Mapping::with_extensions([("Custom", "c1"), ("Version", "nope")]);
        assert_eq!(m.plain_of("c1"), Some("Custom"));
        assert_eq!(m.obfuscated_of("Version"), Some("F2P"));
        assert_eq!(m.plain_of("nope"), None);
    }
}
