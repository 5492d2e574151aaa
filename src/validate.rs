//! Validator (C10, spec §4.10). Runs after merge but before reference
//! resolution, so problems that don't require a live fetch are reported
//! without ever talking to a provider: unresolved aliases (with a
//! best-effort "did you mean" suggestion) and dependency cycles among
//! provider `init` configs.

use std::collections::{BTreeMap, HashSet};

use crate::cycle::CycleStack;
use crate::error::ResolveError;
use crate::utils::suggest_closest;
use crate::value::{Map, Placeholder, Value};

fn collect_placeholders(map: &Map) -> Vec<(Vec<String>, Placeholder)> {
    fn walk(path: &mut Vec<String>, value: &Value, out: &mut Vec<(Vec<String>, Placeholder)>) {
        match value {
            Value::Placeholder(p) => out.push((path.clone(), p.clone())),
            Value::Map(map) => {
                for (k, v) in map {
                    path.push(k.clone());
                    walk(path, v, out);
                    path.pop();
                }
            }
            Value::List(items) => {
                for (i, v) in items.iter().enumerate() {
                    path.push(i.to_string());
                    walk(path, v, out);
                    path.pop();
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    let mut path = Vec::new();
    for (k, v) in map {
        path.push(k.clone());
        walk(&mut path, v, &mut out);
        path.pop();
    }
    out
}

/// Reports any reference placeholder whose alias isn't among the aliases
/// actually declared by `[source]`/`[import]` blocks.
pub fn validate_unresolved_aliases(data: &Map, known_aliases: &[String]) -> Vec<ResolveError> {
    let known: Vec<String> = known_aliases.to_vec();
    collect_placeholders(data)
        .into_iter()
        .filter(|(_, p)| !known.iter().any(|a| a == &p.alias))
        .map(|(_, p)| {
            let suggestion = suggest_closest(&p.alias, known.iter())
                .map(|s| format!(" (did you mean `{s}`?)"))
                .unwrap_or_default();
            ResolveError::UnresolvedAlias { alias: p.alias, suggestion }
        })
        .collect()
}

/// Detects cycles among provider `init` configs that reference each other by
/// alias — e.g. alias `a`'s config contains `@b:...` while `b`'s config
/// contains `@a:...`. Such a cycle can never resolve since both providers
/// need the other initialized first, and would otherwise surface as an
/// indefinite hang on the alias registry's per-alias lock rather than a
/// clear error.
pub fn validate_alias_dependency_cycles(source_configs: &BTreeMap<String, Map>) -> Vec<ResolveError> {
    let mut issues = Vec::new();
    let mut globally_cleared = HashSet::new();

    for alias in source_configs.keys() {
        if globally_cleared.contains(alias) {
            continue;
        }
        let mut stack: CycleStack<String> = CycleStack::new();
        if let Err(chain) = walk_alias(alias, source_configs, &mut stack, &mut globally_cleared) {
            issues.push(ResolveError::Cycle { chain });
        }
    }
    issues
}

fn walk_alias(
    alias: &str,
    configs: &BTreeMap<String, Map>,
    stack: &mut CycleStack<String>,
    globally_cleared: &mut HashSet<String>,
) -> Result<(), Vec<String>> {
    stack.push(alias.to_string())?;
    if let Some(config) = configs.get(alias) {
        for (_, placeholder) in collect_placeholders(config) {
            walk_alias(&placeholder.alias, configs, stack, globally_cleared)?;
        }
    }
    stack.pop();
    globally_cleared.insert(alias.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceSpan;

    fn placeholder(alias: &str) -> Value {
        Value::Placeholder(crate::value::Placeholder {
            alias: alias.to_string(),
            path: vec!["x".into()],
            span: SourceSpan::synthetic("test.csl"),
            overrides: None,
        })
    }

    #[test]
    fn flags_unresolved_alias_with_suggestion() {
        let mut data = Map::new();
        data.insert("k".into(), placeholder("cofnig"));
        let issues = validate_unresolved_aliases(&data, &["config".to_string(), "secrets".to_string()]);
        assert_eq!(issues.len(), 1);
        match &issues[0] {
            ResolveError::UnresolvedAlias { alias, suggestion } => {
                assert_eq!(alias, "cofnig");
                assert!(suggestion.contains("config"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn known_alias_is_not_flagged() {
        let mut data = Map::new();
        data.insert("k".into(), placeholder("config"));
        let issues = validate_unresolved_aliases(&data, &["config".to_string()]);
        assert!(issues.is_empty());
    }

    #[test]
    fn detects_mutual_alias_dependency_cycle() {
        let mut configs = BTreeMap::new();
        let mut a_config = Map::new();
        a_config.insert("dep".into(), placeholder("b"));
        let mut b_config = Map::new();
        b_config.insert("dep".into(), placeholder("a"));
        configs.insert("a".to_string(), a_config);
        configs.insert("b".to_string(), b_config);

        let issues = validate_alias_dependency_cycles(&configs);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ResolveError::Cycle { .. }));
    }

    #[test]
    fn acyclic_configs_pass() {
        let mut configs = BTreeMap::new();
        configs.insert("a".to_string(), Map::new());
        configs.insert("b".to_string(), Map::new());
        assert!(validate_alias_dependency_cycles(&configs).is_empty());
    }
}
