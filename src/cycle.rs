//! A small reusable "resolution stack" used for cycle detection by both the
//! Import Resolver (C9) and the Reference Resolver (C11) — same algorithm,
//! same data structure, per the supplemental note in `SPEC_FULL.md`: push a
//! key on entry, fail if it's already on the stack, pop on exit.

use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Default, Clone)]
pub struct CycleStack<K> {
    stack: Vec<K>,
    seen: HashSet<K>,
}

impl<K: Eq + Hash + Clone + std::fmt::Display> CycleStack<K> {
    pub fn new() -> Self {
        Self { stack: Vec::new(), seen: HashSet::new() }
    }

    /// Attempts to push `key`. Returns `Err` with the full chain (including
    /// the repeated key at both ends) if it is already present.
    pub fn push(&mut self, key: K) -> Result<(), Vec<String>> {
        if self.seen.contains(&key) {
            let mut chain: Vec<String> = self.stack.iter().map(|k| k.to_string()).collect();
            chain.push(key.to_string());
            return Err(chain);
        }
        self.seen.insert(key.clone());
        self.stack.push(key);
        Ok(())
    }

    pub fn pop(&mut self) {
        if let Some(key) = self.stack.pop() {
            self.seen.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_repeated_key() {
        let mut stack: CycleStack<String> = CycleStack::new();
        stack.push("a:x".into()).unwrap();
        stack.push("b:y".into()).unwrap();
        let err = stack.push("a:x".into()).unwrap_err();
        assert_eq!(err, vec!["a:x", "b:y", "a:x"]);
    }

    #[test]
    fn pop_allows_reuse() {
        let mut stack: CycleStack<String> = CycleStack::new();
        stack.push("a:x".into()).unwrap();
        stack.pop();
        assert!(stack.push("a:x".into()).is_ok());
    }
}
