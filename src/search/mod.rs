//! Case-insensitive substring search over events and both glossaries.
//!
//! Query syntax: free words form one phrase; `tag:NAME` requires a tag;
//! `year:N`, `year:A..B` (either side optional) or `year:none` restrict the
//! year. Filters narrow event hits only and suppress glossary hits.

use std::cmp::{max, min};

use strum::{AsRefStr, Display};

use crate::model::{Dataset, Event};
use crate::ordering::GroupKey;
use crate::timeline::year_label;

pub const PERSON_FALLBACK_META: &str = "ترجمة";
pub const PLACE_FALLBACK_META: &str = "مكان";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearFilter {
    pub from: Option<i64>,
    /// Inclusive.
    pub to: Option<i64>,
    pub undated: bool,
}

impl YearFilter {
    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some() || self.undated
    }

    pub fn merge(&mut self, other: YearFilter) {
        if let Some(from) = other.from {
            self.from = Some(match self.from {
                Some(existing) => max(existing, from),
                None => from,
            });
        }
        if let Some(to) = other.to {
            self.to = Some(match self.to {
                Some(existing) => min(existing, to),
                None => to,
            });
        }
        self.undated |= other.undated;
    }

    fn accepts(&self, year: Option<i64>) -> bool {
        match year {
            None => self.undated,
            Some(_) if self.undated && self.from.is_none() && self.to.is_none() => false,
            Some(year) => {
                self.from.map_or(true, |from| year >= from) && self.to.map_or(true, |to| year <= to)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Lowercased phrase, empty when only filters were given.
    pub phrase: String,
    pub tags: Vec<String>,
    pub years: YearFilter,
}

impl SearchQuery {
    pub fn has_phrase(&self) -> bool {
        !self.phrase.is_empty()
    }

    pub fn has_filters(&self) -> bool {
        !self.tags.is_empty() || self.years.is_active()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_phrase() && !self.has_filters()
    }
}

pub fn parse_query(input: &str) -> SearchQuery {
    let mut query = SearchQuery::default();
    let mut words = Vec::new();
    for raw in input.split_whitespace() {
        if let Some(tag) = raw.strip_prefix("tag:") {
            if !tag.is_empty() {
                query.tags.push(tag.to_lowercase());
            }
            continue;
        }
        if let Some(spec) = raw.strip_prefix("year:") {
            query.years.merge(parse_year_filter(spec));
            continue;
        }
        words.push(raw);
    }
    query.phrase = words.join(" ").to_lowercase();
    query
}

fn parse_year_filter(spec: &str) -> YearFilter {
    let mut filter = YearFilter::default();
    if matches!(spec, "none" | "undated" | "-") {
        filter.undated = true;
        return filter;
    }
    let parts: Vec<&str> = spec.split("..").collect();
    match parts.as_slice() {
        [single] => {
            if let Ok(year) = single.parse::<i64>() {
                filter.from = Some(year);
                filter.to = Some(year);
            }
        }
        [from, to] => {
            filter.from = from.parse().ok();
            filter.to = to.parse().ok();
        }
        _ => {}
    }
    filter
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ResultKind {
    Event,
    Person,
    Place,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub kind: ResultKind,
    /// Event id, or the glossary name.
    pub id: String,
    pub title: String,
    pub meta: String,
}

/// Events first (display order), then people, then places, capped at `limit`.
pub fn search(dataset: &Dataset, query: &SearchQuery, limit: usize) -> Vec<SearchResult> {
    if query.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut results = Vec::new();

    for event in &dataset.events {
        if event_matches(event, query) {
            results.push(SearchResult {
                kind: ResultKind::Event,
                id: event.id.clone(),
                title: event.title.clone(),
                meta: event
                    .year
                    .map(|year| year_label(GroupKey::Year(year)))
                    .unwrap_or_default(),
            });
        }
    }

    if query.has_phrase() && !query.has_filters() {
        for (name, bio) in &dataset.biographies {
            if contains(&[name.as_str(), bio.short.as_str(), bio.full.as_str()], &query.phrase) {
                results.push(SearchResult {
                    kind: ResultKind::Person,
                    id: name.clone(),
                    title: name.clone(),
                    meta: fallback(&bio.short, PERSON_FALLBACK_META),
                });
            }
        }
        for (name, place) in &dataset.places {
            if contains(&[name.as_str(), place.desc.as_str()], &query.phrase) {
                results.push(SearchResult {
                    kind: ResultKind::Place,
                    id: name.clone(),
                    title: name.clone(),
                    meta: fallback(&place.desc, PLACE_FALLBACK_META),
                });
            }
        }
    }

    results.truncate(limit);
    results
}

fn event_matches(event: &Event, query: &SearchQuery) -> bool {
    if query.years.is_active() && !query.years.accepts(event.year) {
        return false;
    }
    if !query.tags.is_empty() {
        let tags: Vec<String> = event.tags.iter().map(|tag| tag.to_lowercase()).collect();
        if !query.tags.iter().all(|wanted| tags.contains(wanted)) {
            return false;
        }
    }
    if !query.has_phrase() {
        return true;
    }
    let mut fields: Vec<&str> = vec![event.title.as_str(), event.notes.as_str()];
    fields.extend(event.tags.iter().map(String::as_str));
    fields.extend(event.sources.iter().map(|source| source.text.as_str()));
    contains(&fields, &query.phrase)
}

fn contains(fields: &[&str], phrase: &str) -> bool {
    let blob = fields
        .iter()
        .filter(|field| !field.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    blob.contains(phrase)
}

fn fallback(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
