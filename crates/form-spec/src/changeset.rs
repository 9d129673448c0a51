use serde_json::{Map, Value};

/// Pending `(key, value)` mutations of a form, flushed by `Form::save`.
/// Later writes replace earlier ones; first-write order is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    entries: Vec<(String, Value)>,
}

impl Changeset {
    pub fn record(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_write_wins_and_order_is_stable() {
        let mut changes = Changeset::default();
        changes.record("b", json!(1));
        changes.record("a", json!(2));
        changes.record("b", json!(3));
        let entries: Vec<_> = changes.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert_eq!(entries, vec![("b".to_string(), json!(3)), ("a".to_string(), json!(2))]);
        assert_eq!(changes.len(), 2);
    }
}
