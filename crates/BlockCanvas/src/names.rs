//! Case-insensitive registry of names in use (variables, procedures).

use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct NameManager {
    /// Lower-cased name → name as first registered.
    used: BTreeMap<String, String>,
}

impl NameManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains_key(&name.to_lowercase())
    }

    /// The spelling `name` was first registered with.
    pub fn original(&self, name: &str) -> Option<&str> {
        self.used.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Registers `name`. Returns false if an equivalent name was already present.
    pub fn add_name(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        if self.used.contains_key(&key) {
            return false;
        }
        self.used.insert(key, name.to_string());
        true
    }

    pub fn remove_name(&mut self, name: &str) -> bool {
        self.used.remove(&name.to_lowercase()).is_some()
    }

    /// Returns a name not yet in use, derived from `name` by incrementing a trailing
    /// number (`foo` → `foo2`, `item7` → `item8`). Registers it when `add_name` is set.
    pub fn generate_unique_name(&mut self, name: &str, add_name: bool) -> String {
        let mut candidate = name.to_string();
        while self.contains(&candidate) {
            candidate = increment_suffix(&candidate);
        }
        if add_name {
            self.add_name(&candidate);
        }
        candidate
    }

    /// Registered names in case-insensitive order.
    pub fn names(&self) -> Vec<String> {
        self.used.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn clear(&mut self) {
        self.used.clear();
    }
}

fn increment_suffix(name: &str) -> String {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &name[stem.len()..];
    match digits.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
        Some(n) => format!("{stem}{n}"),
        None => format!("{name}2"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_contains() {
        let mut names = NameManager::new();
        assert!(names.add_name("Count"));
        assert!(names.contains("count"));
        assert!(!names.add_name("COUNT"));
        assert_eq!(names.names(), vec!["Count".to_string()]);
    }

    #[test]
    fn test_generate_unique_name() {
        let mut names = NameManager::new();
        names.add_name("foo");
        assert_eq!(names.generate_unique_name("foo", true), "foo2");
        assert_eq!(names.generate_unique_name("foo", true), "foo3");
        assert_eq!(names.generate_unique_name("bar", false), "bar");
        assert!(!names.contains("bar"));

        names.add_name("item7");
        assert_eq!(names.generate_unique_name("item7", false), "item8");
    }

    #[test]
    fn test_generate_unique_name_with_huge_suffix() {
        let mut names = NameManager::new();
        let max = format!("f{}", u64::MAX);
        names.add_name(&max);
        let unique = names.generate_unique_name(&max, true);
        assert_eq!(unique, format!("{max}2"));

        // The appended digit no longer fits a u64 either, so another one is added.
        assert_eq!(names.generate_unique_name(&max, false), format!("{max}22"));
    }
}
