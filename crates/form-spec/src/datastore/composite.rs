use std::sync::Arc;

use serde_json::{Map, Value};

use crate::datastore::{Datastore, OwnerId};
use crate::error::PersistenceError;
use crate::field::{Weekday, is_empty};
use crate::spec::field::{CompositePartSpec, CompositePreset};

/// One physical sub-field of a composite value.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositePart {
    pub name: String,
    pub key: String,
    pub default: Value,
}

impl CompositePart {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            default: Value::Null,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn from_spec(spec: &CompositePartSpec) -> Self {
        Self {
            name: spec.name.clone(),
            key: spec.key.clone(),
            default: spec.default.clone().unwrap_or(Value::Null),
        }
    }
}

type Derive = fn(&mut Map<String, Value>);

/// A logical field backed by several physical sub-fields.
///
/// `save` fans out one write per non-empty member; a failing write stops the
/// fan-out but earlier writes stay in place.
#[derive(Debug, Clone)]
pub struct CompositeStrategy {
    parts: Vec<CompositePart>,
    inner: Arc<dyn Datastore>,
    derive: Option<Derive>,
}

impl CompositeStrategy {
    pub fn new(parts: Vec<CompositePart>, inner: Arc<dyn Datastore>) -> Self {
        Self {
            parts,
            inner,
            derive: None,
        }
    }

    pub fn preset(preset: CompositePreset, key: &str, inner: Arc<dyn Datastore>) -> Self {
        match preset {
            CompositePreset::Geolocation => Self::geolocation(key, inner),
            CompositePreset::OpeningHours => Self::opening_hours(key, inner),
        }
    }

    /// `{address, lat, lng}` stored as `<key>_address`, `<key>_lat`, `<key>_lng`
    /// plus a derived `<key>_coordinates` string `"lat,lng"`.
    pub fn geolocation(key: &str, inner: Arc<dyn Datastore>) -> Self {
        let parts = vec![
            CompositePart::new("address", format!("{key}_address"))
                .with_default(Value::String(String::new())),
            CompositePart::new("lat", format!("{key}_lat")),
            CompositePart::new("lng", format!("{key}_lng")),
            CompositePart::new("coordinates", format!("{key}_coordinates"))
                .with_default(Value::String(String::new())),
        ];
        Self {
            parts,
            inner,
            derive: Some(derive_coordinates),
        }
    }

    /// One `<key>_<weekday>` sub-field per day of the week.
    pub fn opening_hours(key: &str, inner: Arc<dyn Datastore>) -> Self {
        let parts = Weekday::ALL
            .iter()
            .map(|day| CompositePart::new(day.as_str(), format!("{key}_{day}")))
            .collect();
        Self::new(parts, inner)
    }

    pub fn parts(&self) -> &[CompositePart] {
        &self.parts
    }
}

fn derive_coordinates(value: &mut Map<String, Value>) {
    let lat = value.get("lat").and_then(Value::as_f64);
    let lng = value.get("lng").and_then(Value::as_f64);
    if let (Some(lat), Some(lng)) = (lat, lng) {
        value.insert("coordinates".into(), Value::String(format!("{lat},{lng}")));
    }
}

impl Datastore for CompositeStrategy {
    fn load(&self, owner: OwnerId, _key: &str) -> Value {
        let mut value = Map::new();
        for part in &self.parts {
            let stored = self.inner.load(owner, &part.key);
            let member = if is_empty(&stored) {
                part.default.clone()
            } else {
                stored
            };
            value.insert(part.name.clone(), member);
        }
        Value::Object(value)
    }

    fn save(&self, owner: OwnerId, _key: &str, value: &Value) -> Result<(), PersistenceError> {
        let mut members = value.as_object().cloned().unwrap_or_default();
        if let Some(derive) = self.derive {
            derive(&mut members);
        }
        for part in &self.parts {
            let Some(member) = members.get(&part.name) else {
                continue;
            };
            if is_empty(member) {
                continue;
            }
            self.inner.save(owner, &part.key, member)?;
        }
        Ok(())
    }

    fn delete(&self, owner: OwnerId, _key: &str) -> Result<(), PersistenceError> {
        for part in &self.parts {
            self.inner.delete(owner, &part.key)?;
        }
        Ok(())
    }
}
