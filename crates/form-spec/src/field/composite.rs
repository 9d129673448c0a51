use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value, json};

use crate::field::{Field, FieldType, is_empty, sanitize_list, sanitize_text};
use crate::spec::field::FieldDefinition;

static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|day| day.as_str() == name)
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recovers the weekday from a key following the `<prefix>_<weekday>` convention,
/// e.g. `opening_hours_monday`. Keys outside the convention yield `None`.
pub fn weekday_from_key(key: &str) -> Option<Weekday> {
    let (_, suffix) = key.rsplit_once('_')?;
    Weekday::parse(suffix)
}

fn coordinate(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::Number(number)) => Value::Number(number.clone()),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Address plus coordinates: `{address, lat, lng}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeolocationField;

impl FieldType for GeolocationField {
    fn name(&self) -> &'static str {
        "geolocation"
    }

    fn value_schema(&self, _definition: &FieldDefinition) -> Value {
        json!({
            "type": "object",
            "properties": {
                "address": { "type": "string" },
                "lat": { "type": ["number", "string"] },
                "lng": { "type": ["number", "string"] },
            },
        })
    }

    fn is_multiple(&self, _definition: &FieldDefinition) -> bool {
        false
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        let Some(map) = raw.and_then(Value::as_object) else {
            return Value::Null;
        };
        let mut value = Map::new();
        value.insert("address".into(), Value::String(sanitize_text(map.get("address"))));
        value.insert("lat".into(), coordinate(map.get("lat")));
        value.insert("lng".into(), coordinate(map.get("lng")));
        Value::Object(value)
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        let map = field.value().as_object()?;
        let lat = map.get("lat").and_then(Value::as_f64);
        let lng = map.get("lng").and_then(Value::as_f64);
        if lat.is_some() != lng.is_some() {
            return Some("{{label}} needs both latitude and longitude".into());
        }
        if lat.is_some_and(|lat| !(-90.0..=90.0).contains(&lat))
            || lng.is_some_and(|lng| !(-180.0..=180.0).contains(&lng))
        {
            return Some("{{label}} has coordinates out of range".into());
        }
        None
    }
}

/// Weekly schedule: `{ "<weekday>": { "open": "HH:MM", "close": "HH:MM" } }`.
///
/// Payload keys may carry a prefix (`hours_monday`); the weekday is recovered
/// with [`weekday_from_key`] and unknown keys are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpeningHoursField;

impl FieldType for OpeningHoursField {
    fn name(&self) -> &'static str {
        "opening_hours"
    }

    fn value_schema(&self, _definition: &FieldDefinition) -> Value {
        let day = json!({
            "type": "object",
            "properties": {
                "open": { "type": "string", "pattern": "^\\d{2}:\\d{2}$" },
                "close": { "type": "string", "pattern": "^\\d{2}:\\d{2}$" },
            },
        });
        let days: Map<String, Value> = Weekday::ALL
            .iter()
            .map(|weekday| (weekday.as_str().to_string(), day.clone()))
            .collect();
        json!({ "type": "object", "properties": days })
    }

    fn is_multiple(&self, _definition: &FieldDefinition) -> bool {
        false
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        let Some(map) = raw.and_then(Value::as_object) else {
            return Value::Null;
        };
        let mut days = Map::new();
        for (key, slot) in map {
            let Some(day) = Weekday::parse(key).or_else(|| weekday_from_key(key)) else {
                continue;
            };
            let Some(slot) = slot.as_object() else {
                continue;
            };
            let mut hours = Map::new();
            hours.insert("open".into(), Value::String(sanitize_text(slot.get("open"))));
            hours.insert("close".into(), Value::String(sanitize_text(slot.get("close"))));
            days.insert(day.as_str().into(), Value::Object(hours));
        }
        Value::Object(days)
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        let days = field.value().as_object()?;
        for (day, slot) in days {
            if is_empty(slot) {
                continue;
            }
            let open = slot.get("open").and_then(Value::as_str).unwrap_or_default();
            let close = slot.get("close").and_then(Value::as_str).unwrap_or_default();
            if !CLOCK.is_match(open) || !CLOCK.is_match(close) {
                return Some(format!("{{{{label}}}} has an invalid time on {day}"));
            }
            if open >= close {
                return Some(format!("{{{{label}}}} closes before it opens on {day}"));
            }
        }
        None
    }
}

/// Tag/term picker; the value is a list of positive term ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermsField;

impl TermsField {
    pub fn term_id(item: &Value) -> Option<u64> {
        match item {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
        .filter(|id| *id > 0)
    }
}

impl FieldType for TermsField {
    fn name(&self) -> &'static str {
        "terms"
    }

    fn value_schema(&self, _definition: &FieldDefinition) -> Value {
        json!({ "type": ["integer", "string"] })
    }

    fn is_multiple(&self, _definition: &FieldDefinition) -> bool {
        true
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        let mut value = sanitize_list(raw, |item| Self::term_id(item).map(Value::from));
        if let Value::Array(items) = &mut value {
            let mut seen = Vec::with_capacity(items.len());
            items.retain(|item| {
                let fresh = !seen.contains(item);
                seen.push(item.clone());
                fresh
            });
        }
        value
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        let limit = field.definition().attribute_u64("max_terms")?;
        let count = field.value().as_array().map(Vec::len).unwrap_or_default();
        (count as u64 > limit).then(|| format!("{{{{label}}}} accepts at most {limit} terms"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weekday_from_key_follows_suffix_convention() {
        assert_eq!(weekday_from_key("opening_hours_monday"), Some(Weekday::Monday));
        assert_eq!(weekday_from_key("hours_Sunday"), Some(Weekday::Sunday));
        assert_eq!(weekday_from_key("opening_hours"), None);
        assert_eq!(weekday_from_key("monday"), None);
    }

    #[test]
    fn opening_hours_accepts_prefixed_keys() {
        let definition = FieldDefinition::new("hours", "opening_hours");
        let value = OpeningHoursField.sanitize(
            &definition,
            Some(&json!({
                "hours_monday": { "open": "09:00", "close": "17:00" },
                "tuesday": { "open": "10:00", "close": "12:00" },
                "hours_someday": { "open": "1", "close": "2" }
            })),
        );
        assert_eq!(value["monday"]["open"], "09:00");
        assert_eq!(value["tuesday"]["close"], "12:00");
        assert_eq!(value.as_object().map(Map::len), Some(2));
    }

    #[test]
    fn terms_dedupes_and_drops_invalid_ids() {
        let definition = FieldDefinition::new("category", "terms");
        let value = TermsField.sanitize(&definition, Some(&json!([3, "3", "x", 0, "7"])));
        assert_eq!(value, json!([3, 7]));
    }

    #[test]
    fn geolocation_parses_coordinates() {
        let definition = FieldDefinition::new("location", "geolocation");
        let value = GeolocationField.sanitize(
            &definition,
            Some(&json!({ "address": " Main St ", "lat": "51.5", "lng": -0.12 })),
        );
        assert_eq!(value, json!({ "address": "Main St", "lat": 51.5, "lng": -0.12 }));
    }
}
