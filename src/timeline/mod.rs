//! Timeline Presenter: year sections, entry labels and selection state.
//!
//! Nothing here mutates the dataset. Actions that change it go through
//! [`crate::editor::Editor`] or [`crate::ordering`]; this module only derives
//! what to show and what an insert action should reserve.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::editor::{EventForm, PendingInsert, Placement};
use crate::model::{Dataset, Event};
use crate::ordering::{self, GroupKey};

pub const UNDATED_LABEL: &str = "أحداث بلا تاريخ";
pub const EMPTY_YEAR_PLACEHOLDER: &str = "لا أحداث بعد في هذه السنة.";
pub const EMPTY_DETAIL_TITLE: &str = "اختر حدثاً من الخط الزمني";

/// Hijri label for a section heading.
pub fn year_label(key: GroupKey) -> String {
    match key {
        GroupKey::Undated => UNDATED_LABEL.to_string(),
        GroupKey::Year(0) => "بداية الهجرة".to_string(),
        GroupKey::Year(year) if year < 0 => format!("السنة {} ق هـ", year.unsigned_abs()),
        GroupKey::Year(year) => format!("السنة {year} هـ"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub id: String,
    pub title: String,
    /// `section.index`, both 1-based.
    pub position: String,
    pub can_move_up: bool,
    pub can_move_down: bool,
}

impl TimelineEntry {
    pub fn display(&self) -> String {
        format!("{} {}", self.position, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearSection {
    pub number: usize,
    pub key: GroupKey,
    pub label: String,
    pub entries: Vec<TimelineEntry>,
}

impl YearSection {
    pub fn heading(&self) -> String {
        format!("{}. {}", self.number, self.label)
    }

    /// Dated sections with no events render a placeholder with an add action.
    pub fn is_placeholder(&self) -> bool {
        self.entries.is_empty() && matches!(self.key, GroupKey::Year(_))
    }
}

/// Groups events into numbered sections. With a `range`, every year in it
/// gets a section even when empty; years outside it and the undated bucket
/// follow in ascending order. Without one only occupied groups appear.
pub fn build_sections(events: &[Event], range: Option<RangeInclusive<i64>>) -> Vec<YearSection> {
    let mut grouped: BTreeMap<GroupKey, Vec<&Event>> = BTreeMap::new();
    for event in events {
        grouped.entry(GroupKey::of(event)).or_default().push(event);
    }

    let mut keys: Vec<GroupKey> = Vec::new();
    if let Some(range) = range {
        keys.extend(range.map(GroupKey::Year));
    }
    for key in grouped.keys() {
        if !keys.contains(key) {
            keys.push(*key);
        }
    }

    keys.iter()
        .enumerate()
        .map(|(index, key)| {
            let number = index + 1;
            let mut members = grouped.remove(key).unwrap_or_default();
            members.sort_by(|a, b| ordering::compare_within_group(a, b));
            let last = members.len().saturating_sub(1);
            let entries = members
                .into_iter()
                .enumerate()
                .map(|(position, event)| TimelineEntry {
                    id: event.id.clone(),
                    title: event.title.clone(),
                    position: format!("{number}.{}", position + 1),
                    can_move_up: position > 0,
                    can_move_down: position < last,
                })
                .collect();
            YearSection {
                number,
                key: *key,
                label: year_label(*key),
                entries,
            }
        })
        .collect()
}

/// Pre-filled form plus the slot it reserves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertDraft {
    pub form: EventForm,
    pub pending: Option<PendingInsert>,
}

fn draft_for(year: Option<i64>, pending: Option<PendingInsert>) -> InsertDraft {
    InsertDraft {
        form: EventForm {
            year: year.map(|year| year.to_string()).unwrap_or_default(),
            ..EventForm::default()
        },
        pending,
    }
}

fn anchor_draft(
    events: &[Event],
    anchor_id: &str,
    placement: fn(String) -> Placement,
) -> Option<InsertDraft> {
    let anchor = events.iter().find(|event| event.id == anchor_id)?;
    Some(draft_for(
        anchor.year,
        Some(PendingInsert {
            year: anchor.year,
            placement: placement(anchor.id.clone()),
        }),
    ))
}

/// Reserves the anchor's own slot; saving shifts the anchor down.
pub fn prepare_insert_before(events: &[Event], anchor_id: &str) -> Option<InsertDraft> {
    anchor_draft(events, anchor_id, Placement::Before)
}

pub fn prepare_insert_after(events: &[Event], anchor_id: &str) -> Option<InsertDraft> {
    anchor_draft(events, anchor_id, Placement::After)
}

/// The placeholder's add action. Undated sections reserve nothing.
pub fn prepare_insert_for_year(key: GroupKey) -> InsertDraft {
    match key {
        GroupKey::Year(year) => draft_for(
            Some(year),
            Some(PendingInsert {
                year: Some(year),
                placement: Placement::End,
            }),
        ),
        GroupKey::Undated => draft_for(None, None),
    }
}

/// Blank form carrying the current event's year, if any.
pub fn prepare_new_event(current: Option<&Event>) -> InsertDraft {
    draft_for(current.and_then(|event| event.year), None)
}

/// Which event and source tab are on screen. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    event_id: Option<String>,
    source_index: usize,
}

impl Selection {
    /// Starts on the first event in display order, if any.
    pub fn first(dataset: &Dataset) -> Self {
        let mut selection = Self::default();
        selection.reset_to_first(dataset);
        selection
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn is_empty(&self) -> bool {
        self.event_id.is_none()
    }

    /// Re-selecting the same event keeps the source tab.
    pub fn select(&mut self, id: &str) {
        if self.event_id.as_deref() != Some(id) {
            self.source_index = 0;
        }
        self.event_id = Some(id.to_string());
    }

    pub fn select_source(&mut self, index: usize) {
        self.source_index = index;
    }

    pub fn clear(&mut self) {
        self.event_id = None;
        self.source_index = 0;
    }

    pub fn current<'d>(&self, dataset: &'d Dataset) -> Option<&'d Event> {
        self.event_id.as_deref().and_then(|id| dataset.event(id))
    }

    /// Source tab to show, clamped to what the event has.
    pub fn clamped_source_index(&self, event: &Event) -> usize {
        if self.source_index < event.sources.len() {
            self.source_index
        } else {
            0
        }
    }

    /// After the dataset changed underneath: keep the selection if it still
    /// exists, otherwise fall back to the first event or the empty state.
    pub fn reconcile(&mut self, dataset: &Dataset) {
        match self.event_id.as_deref() {
            Some(id) if dataset.contains_event(id) => {}
            _ => self.reset_to_first(dataset),
        }
    }

    /// Deleting the selected event moves to the first remaining one.
    pub fn after_delete(&mut self, dataset: &Dataset, removed_id: &str) {
        if self.event_id.as_deref() == Some(removed_id) {
            self.reset_to_first(dataset);
        }
    }

    fn reset_to_first(&mut self, dataset: &Dataset) {
        match first_in_display_order(dataset) {
            Some(id) => {
                self.event_id = Some(id.to_string());
                self.source_index = 0;
            }
            None => self.clear(),
        }
    }
}

fn first_in_display_order(dataset: &Dataset) -> Option<&str> {
    dataset
        .events
        .iter()
        .min_by(|a, b| ordering::compare_display(a, b))
        .map(|event| event.id.as_str())
}

/// What the detail pane shows for the current selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailView<'d> {
    Empty,
    Event {
        event: &'d Event,
        source_index: usize,
    },
}

impl<'d> DetailView<'d> {
    pub fn of(selection: &Selection, dataset: &'d Dataset) -> Self {
        match selection.current(dataset) {
            Some(event) => DetailView::Event {
                event,
                source_index: selection.clamped_source_index(event),
            },
            None => DetailView::Empty,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            DetailView::Empty => EMPTY_DETAIL_TITLE,
            DetailView::Event { event, .. } => &event.title,
        }
    }
}
