use std::collections::HashMap;

use serde_json::Value;

/// Transient scratchpad for the current session.
///
/// Never persisted; cleared when the session ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingMemory {
    entries: HashMap<String, Value>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_clear() {
        let mut working = WorkingMemory::new();
        assert_eq!(working.set("goal", json!("fix the build")), None);
        assert_eq!(working.set("goal", json!("ship")), Some(json!("fix the build")));
        assert_eq!(working.get("goal"), Some(&json!("ship")));

        working.clear();
        assert!(working.is_empty());
    }
}
