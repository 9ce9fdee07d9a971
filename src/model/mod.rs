//! Dataset shape shared by the local store, the remote document and the
//! import/export surface.
//!
//! Everything that crosses a persistence boundary goes through
//! [`Dataset::from_value`], which repairs the shape instead of rejecting it:
//! entries that are not objects or carry no id are dropped, non-numeric
//! `year`/`order` values are treated as absent, and `biographies`/`places` are
//! always maps.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

mod seed;

pub use seed::default_dataset;

/// Prefix used when a source has neither a book nor a title.
pub const SOURCE_LABEL_PREFIX: &str = "مصدر";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dataset root must be a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub book: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
}

impl Source {
    pub fn new(book: impl Into<String>, title: Option<String>, text: impl Into<String>) -> Self {
        Self {
            book: book.into(),
            title,
            text: text.into(),
        }
    }

    /// Label shown on the source tab: book, then title, then a numbered fallback.
    pub fn tab_label(&self, index: usize) -> String {
        if !self.book.trim().is_empty() {
            return self.book.clone();
        }
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title.to_string(),
            _ => numbered_source_label(index),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        Some(Self {
            book: take_string(&mut fields, "book"),
            title: match fields.remove("title") {
                Some(Value::String(title)) => Some(title),
                _ => None,
            },
            text: take_string(&mut fields, "text"),
        })
    }
}

pub fn numbered_source_label(index: usize) -> String {
    format!("{SOURCE_LABEL_PREFIX} {}", index + 1)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    pub tags: Vec<String>,
    pub notes: String,
    pub sources: Vec<Source>,
}

impl Event {
    pub fn new(id: impl Into<String>, title: impl Into<String>, year: Option<i64>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            year,
            ..Self::default()
        }
    }

    /// Every event carries at least one source. Returns `true` when a primary
    /// source had to be synthesised.
    pub fn ensure_primary_source(&mut self) -> bool {
        if !self.sources.is_empty() {
            return false;
        }
        let book = if self.title.trim().is_empty() {
            numbered_source_label(0)
        } else {
            self.title.clone()
        };
        self.sources.push(Source::new(book, None, ""));
        true
    }

    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id.trim().to_string(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return None,
        };
        if id.is_empty() {
            return None;
        }
        let year = fields.get("year").and_then(integral_number);
        let order = fields
            .get("order")
            .and_then(integral_number)
            .filter(|order| *order >= 1)
            .and_then(|order| u32::try_from(order).ok());
        let tags = match fields.remove("tags") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(tag) => Some(tag),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        let sources = match fields.remove("sources") {
            Some(Value::Array(items)) => items.into_iter().filter_map(Source::from_value).collect(),
            _ => Vec::new(),
        };
        Some(Self {
            id,
            title: take_string(&mut fields, "title"),
            year,
            order,
            tags,
            notes: take_string(&mut fields, "notes"),
            sources,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Biography {
    pub short: String,
    pub full: String,
    pub img: String,
}

impl Biography {
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        Some(Self {
            short: take_string(&mut fields, "short"),
            full: take_string(&mut fields, "full"),
            img: take_string(&mut fields, "img"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Place {
    pub desc: String,
    pub image: String,
}

impl Place {
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        Some(Self {
            desc: take_string(&mut fields, "desc"),
            image: take_string(&mut fields, "image"),
        })
    }
}

pub type Biographies = IndexMap<String, Biography>;
pub type Places = IndexMap<String, Place>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub events: Vec<Event>,
    pub biographies: Biographies,
    pub places: Places,
}

impl Dataset {
    pub fn from_json_str(raw: &str) -> Result<Self, DatasetError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Repairs any JSON object into a well-formed dataset. Only a non-object
    /// root is rejected.
    pub fn from_value(value: Value) -> Result<Self, DatasetError> {
        let Value::Object(mut root) = value else {
            return Err(DatasetError::NotAnObject);
        };

        let mut seen = HashSet::new();
        let events = match root.remove("events") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(Event::from_value)
                .filter(|event| {
                    let fresh = seen.insert(event.id.clone());
                    if !fresh {
                        tracing::warn!(id = %event.id, "dropping event with duplicate id");
                    }
                    fresh
                })
                .collect(),
            _ => Vec::new(),
        };

        let biographies = match root.remove("biographies") {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter_map(|(name, value)| Biography::from_value(value).map(|bio| (name, bio)))
                .collect(),
            _ => IndexMap::new(),
        };

        let places = match root.remove("places") {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter_map(|(name, value)| Place::from_value(value).map(|place| (name, place)))
                .collect(),
            _ => IndexMap::new(),
        };

        Ok(Self {
            events,
            biographies,
            places,
        })
    }

    /// True when `events` is an array and both glossaries are objects; the
    /// bar a remote snapshot must clear before it replaces local state.
    pub fn is_valid_snapshot(value: &Value) -> bool {
        value.get("events").map(Value::is_array).unwrap_or(false)
            && value.get("biographies").map(Value::is_object).unwrap_or(false)
            && value.get("places").map(Value::is_object).unwrap_or(false)
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn event(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.id == id)
    }

    pub fn event_mut(&mut self, id: &str) -> Option<&mut Event> {
        self.events.iter_mut().find(|event| event.id == id)
    }

    pub fn contains_event(&self, id: &str) -> bool {
        self.event(id).is_some()
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> String {
    match fields.remove(key) {
        Some(Value::String(value)) => value,
        _ => String::new(),
    }
}

fn integral_number(value: &Value) -> Option<i64> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(int) = number.as_i64() {
        return Some(int);
    }
    let float = number.as_f64()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repairs_malformed_entries() -> anyhow::Result<()> {
        let value = json!({
            "events": [
                "not an event",
                null,
                { "title": "no id" },
                { "id": "  ", "title": "blank id" },
                { "id": "badr", "title": "Badr", "year": 2, "order": "first" },
                { "id": "uhud", "title": "Uhud", "year": "3", "order": 0 },
                { "id": "badr", "title": "duplicate" }
            ],
            "biographies": [],
            "places": null
        });
        let dataset = Dataset::from_value(value)?;
        let ids: Vec<_> = dataset.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["badr", "uhud"]);
        assert_eq!(dataset.events[0].year, Some(2));
        assert_eq!(dataset.events[0].order, None);
        assert_eq!(dataset.events[1].year, None);
        assert_eq!(dataset.events[1].order, None);
        assert!(dataset.biographies.is_empty());
        assert!(dataset.places.is_empty());
        Ok(())
    }

    #[test]
    fn accepts_integral_floats_and_rejects_fractions() -> anyhow::Result<()> {
        let dataset = Dataset::from_value(json!({
            "events": [
                { "id": "a", "year": 5.0, "order": 2.0 },
                { "id": "b", "year": 5.5, "order": 1.5 }
            ]
        }))?;
        assert_eq!(dataset.events[0].year, Some(5));
        assert_eq!(dataset.events[0].order, Some(2));
        assert_eq!(dataset.events[1].year, None);
        assert_eq!(dataset.events[1].order, None);
        Ok(())
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(matches!(
            Dataset::from_value(json!([1, 2, 3])),
            Err(DatasetError::NotAnObject)
        ));
    }

    #[test]
    fn primary_source_is_named_after_title() {
        let mut event = Event::new("hijra", "الهجرة", Some(1));
        assert!(event.ensure_primary_source());
        assert_eq!(event.sources.len(), 1);
        assert_eq!(event.sources[0].book, "الهجرة");
        assert!(!event.ensure_primary_source());

        let mut untitled = Event::new("x", "", None);
        untitled.ensure_primary_source();
        assert_eq!(untitled.sources[0].book, "مصدر 1");
    }

    #[test]
    fn tab_label_falls_back_to_numbered() {
        let titled = Source::new("", Some("رواية".into()), "نص");
        assert_eq!(titled.tab_label(0), "رواية");
        let bare = Source::new("  ", None, "نص");
        assert_eq!(bare.tab_label(2), "مصدر 3");
    }

    #[test]
    fn snapshot_validity_requires_all_sections() {
        assert!(Dataset::is_valid_snapshot(
            &json!({ "events": [], "biographies": {}, "places": {} })
        ));
        assert!(!Dataset::is_valid_snapshot(
            &json!({ "events": {}, "biographies": {}, "places": {} })
        ));
        assert!(!Dataset::is_valid_snapshot(
            &json!({ "events": [], "biographies": {} })
        ));
    }

    #[test]
    fn serialises_null_year_and_omits_missing_order() -> anyhow::Result<()> {
        let event = Event::new("x", "t", None);
        let value = serde_json::to_value(&event)?;
        assert_eq!(value["year"], Value::Null);
        assert!(value.get("order").is_none());
        Ok(())
    }
}
