//! Small standalone algorithms shared across components, grouped the way the
//! teacher keeps miscellaneous helpers in one `utils` module.

use crate::value::Value;

/// Plain Levenshtein edit distance, used by the validator (C10) to suggest a
/// likely-intended alias for an unresolved reference.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// Suggests the closest candidate to `query` among `candidates`, using the
/// threshold documented in `SPEC_FULL.md` §3.1: distance <= 2 or <= 30% of the
/// query length, whichever is larger. Returns `None` when nothing is close
/// enough to be worth suggesting.
pub fn suggest_closest<'a>(query: &str, candidates: impl IntoIterator<Item = &'a String>) -> Option<&'a str> {
    let threshold = ((query.chars().count() as f64 * 0.3).ceil() as usize).max(2);
    candidates
        .into_iter()
        .map(|c| (edit_distance(query, c), c.as_str()))
        .filter(|(dist, _)| *dist <= threshold)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, c)| c)
}

/// Navigates `value` by a dot-path of string segments, the way provider
/// responses and reference paths are addressed throughout C9/C11. An empty
/// path (or a single `"."` segment) returns `value` itself (root mode).
pub fn navigate<'a>(value: &'a Value, path: &[String]) -> Result<&'a Value, NavigateError> {
    if path.is_empty() || (path.len() == 1 && path[0] == ".") {
        return Ok(value);
    }
    let mut current = value;
    for (i, segment) in path.iter().enumerate() {
        match current {
            Value::Map(map) => match map.get(segment) {
                Some(v) => current = v,
                None => {
                    return Err(NavigateError::KeyNotFound {
                        missing_at: i,
                        available: map.keys().cloned().collect(),
                    })
                }
            },
            _ => return Err(NavigateError::NavigateThroughScalar { at: i }),
        }
    }
    Ok(current)
}

#[derive(Debug)]
pub enum NavigateError {
    KeyNotFound { missing_at: usize, available: Vec<String> },
    NavigateThroughScalar { at: usize },
}

pub fn default_max_concurrent_providers() -> usize {
    num_cpus::get().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_distance_basic() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("cfg", "cfg"), 0);
    }

    #[test]
    fn suggest_closest_finds_typo() {
        let candidates = vec!["config".to_string(), "secrets".to_string()];
        assert_eq!(suggest_closest("confg", &candidates), Some("config"));
        assert_eq!(suggest_closest("zzzzzzzzzz", &candidates), None);
    }
}
