//! Deterministic deep-merge with provenance tracking (C1, spec §4.3).
//!
//! Maps merge recursively, arrays replace wholesale, scalars are last-wins,
//! and neither input is mutated — the result is always a fresh tree so
//! snapshots never alias transient per-file maps.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::value::{Map, Value};

/// Per-top-level-key provenance: which file (and, once providers are bound,
/// which alias) last wrote that key. Nested keys inherit the top-level
/// owner (spec §3 invariant).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Provenance {
    pub source_file: PathBuf,
    pub provider_alias: Option<String>,
}

pub type ProvenanceMap = BTreeMap<String, Provenance>;

/// Merges `src` onto `dst`, returning a new map. `dst`/`src` are left
/// untouched. `provenance` is updated in place: every top-level key present
/// in `src` is attributed to `src_source`; keys present only in `dst` keep
/// whatever they already had.
pub fn merge(
    dst: &Map,
    src: &Map,
    dst_source: &std::path::Path,
    src_source: &std::path::Path,
    provenance: &mut ProvenanceMap,
) -> Map {
    let mut out = dst.clone();
    for (key, src_value) in src {
        match out.get(key) {
            Some(Value::Map(dst_map)) if matches!(src_value, Value::Map(_)) => {
                let src_map = src_value.as_map().expect("matched above");
                let merged = merge_maps_no_provenance(dst_map, src_map);
                out.insert(key.clone(), Value::Map(merged));
            }
            // Type mismatch (map vs scalar, list vs scalar, ...) or a plain
            // scalar/array key: `src` wins wholesale. Arrays always replace
            // rather than merging element-wise.
            _ => {
                out.insert(key.clone(), src_value.clone());
            }
        }
        provenance.insert(
            key.clone(),
            Provenance { source_file: src_source.to_path_buf(), provider_alias: None },
        );
    }
    for key in out.keys() {
        provenance.entry(key.clone()).or_insert_with(|| Provenance {
            source_file: dst_source.to_path_buf(),
            provider_alias: None,
        });
    }
    out
}

/// Recursive map merge used for nested keys, which do not get their own
/// provenance entries (only the top-level owner is recorded).
fn merge_maps_no_provenance(dst: &Map, src: &Map) -> Map {
    let mut out = dst.clone();
    for (key, src_value) in src {
        match (out.get(key), src_value) {
            (Some(Value::Map(dst_map)), Value::Map(src_map)) => {
                out.insert(key.clone(), Value::Map(merge_maps_no_provenance(dst_map, src_map)));
            }
            _ => {
                out.insert(key.clone(), src_value.clone());
            }
        }
    }
    out
}

/// Deep-merges a resolved provider map with sibling overrides written in the
/// same map literal (spec §4.11 step 8). Overrides always win, recursively.
pub fn merge_overrides(resolved: &Map, overrides: &Map) -> Map {
    merge_maps_no_provenance(resolved, overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Number;
    use std::path::Path;

    fn pb(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn deep_merge_with_provenance() {
        let mut base = Map::new();
        let mut db = Map::new();
        db.insert("host".into(), Value::String("h1".into()));
        db.insert("port".into(), Value::Number(Number::Int(5432)));
        base.insert("db".into(), Value::Map(db));

        let mut over = Map::new();
        let mut over_db = Map::new();
        over_db.insert("host".into(), Value::String("h2".into()));
        over.insert("db".into(), Value::Map(over_db));

        let mut provenance = ProvenanceMap::new();
        let merged = merge(&base, &over, Path::new("base.csl"), Path::new("over.csl"), &mut provenance);

        let db = merged.get("db").unwrap().as_map().unwrap();
        assert_eq!(db.get("host"), Some(&Value::String("h2".into())));
        assert_eq!(db.get("port"), Some(&Value::Number(Number::Int(5432))));
        assert_eq!(provenance.get("db").unwrap().source_file, pb("over.csl"));
    }

    #[test]
    fn arrays_replace_wholesale() {
        let mut base = Map::new();
        base.insert(
            "items".into(),
            Value::List(vec![Value::Number(Number::Int(1)), Value::Number(Number::Int(2)), Value::Number(Number::Int(3))]),
        );
        let mut over = Map::new();
        over.insert("items".into(), Value::List(vec![Value::Number(Number::Int(4)), Value::Number(Number::Int(5))]));

        let mut provenance = ProvenanceMap::new();
        let merged = merge(&base, &over, Path::new("a"), Path::new("b"), &mut provenance);
        assert_eq!(
            merged.get("items"),
            Some(&Value::List(vec![Value::Number(Number::Int(4)), Value::Number(Number::Int(5))]))
        );
    }

    #[test]
    fn inputs_are_not_mutated() {
        let mut base = Map::new();
        base.insert("k".into(), Value::String("base".into()));
        let mut over = Map::new();
        over.insert("k".into(), Value::String("over".into()));

        let base_before = base.clone();
        let over_before = over.clone();
        let mut provenance = ProvenanceMap::new();
        let _ = merge(&base, &over, Path::new("a"), Path::new("b"), &mut provenance);
        assert_eq!(base, base_before);
        assert_eq!(over, over_before);
    }

    #[test]
    fn type_mismatch_resolves_to_src() {
        let mut base = Map::new();
        base.insert("k".into(), Value::Map(Map::new()));
        let mut over = Map::new();
        over.insert("k".into(), Value::String("scalar".into()));

        let mut provenance = ProvenanceMap::new();
        let merged = merge(&base, &over, Path::new("a"), Path::new("b"), &mut provenance);
        assert_eq!(merged.get("k"), Some(&Value::String("scalar".into())));
    }
}
