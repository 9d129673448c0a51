use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Extension point applied to field definitions (as a JSON array) before a form is built.
pub const FORM_FIELDS: &str = "form.fields";
/// Extension point applied to the pending value map before it is persisted.
pub const FORM_VALUES: &str = "form.values";

type FilterFn = Box<dyn Fn(Value, &Value) -> Value + Send + Sync>;

/// Named extension points, each an ordered list of callbacks. A filter receives
/// the accumulated value and a read-only context and returns the next value.
#[derive(Default)]
pub struct Filters {
    points: BTreeMap<String, Vec<FilterFn>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, point: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.points
            .entry(point.into())
            .or_default()
            .push(Box::new(filter));
        self
    }

    /// Threads `seed` through every filter of `point` in registration order.
    pub fn apply(&self, point: &str, seed: Value, ctx: &Value) -> Value {
        match self.points.get(point) {
            Some(filters) => filters.iter().fold(seed, |acc, filter| filter(acc, ctx)),
            None => seed,
        }
    }

    pub fn has(&self, point: &str) -> bool {
        self.points.get(point).is_some_and(|filters| !filters.is_empty())
    }
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .points
            .iter()
            .map(|(point, filters)| (point.as_str(), filters.len()))
            .collect();
        f.debug_struct("Filters").field("points", &counts).finish()
    }
}
