//! Read-only session over the dataset: timeline sections, the selected
//! event's source tabs and its annotated text.
//!
//! The session never edits the dataset. Remote pulls still replace it
//! through the store, and [`ReaderSession::refresh`] picks that up.

use crossbeam_channel::Receiver;

use crate::model::Dataset;
use crate::smartlinks::{dispatch, Annotator, Link, LinkRequest, Pointer, Segment};
use crate::store::{DatasetStore, StoreEvent};
use crate::timeline::{build_sections, DetailView, Selection, YearSection};

pub const EMPTY_TEXT: &str = "لا يوجد نص متاح.";

pub struct ReaderSession {
    store: DatasetStore,
    changes: Receiver<StoreEvent>,
    annotator: Annotator,
    sections: Vec<YearSection>,
    selection: Selection,
}

impl ReaderSession {
    pub fn new(mut store: DatasetStore) -> Self {
        let changes = store.subscribe();
        let selection = Selection::first(store.dataset());
        let mut session = Self {
            store,
            changes,
            annotator: Annotator::default(),
            sections: Vec::new(),
            selection,
        };
        session.rebuild();
        session
    }

    pub fn dataset(&self) -> &Dataset {
        self.store.dataset()
    }

    /// Handed to the sync controller so pulls land in the same store.
    pub fn store_mut(&mut self) -> &mut DatasetStore {
        &mut self.store
    }

    /// Applies pending store notifications. Returns whether anything changed.
    pub fn refresh(&mut self) -> bool {
        let changed = self.changes.try_iter().count() > 0;
        if changed {
            self.rebuild();
            self.selection.reconcile(self.store.dataset());
        }
        changed
    }

    fn rebuild(&mut self) {
        let dataset = self.store.dataset();
        self.annotator = Annotator::new(&dataset.biographies, &dataset.places);
        self.sections = build_sections(&dataset.events, None);
    }

    pub fn sections(&self) -> &[YearSection] {
        &self.sections
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn detail(&self) -> DetailView<'_> {
        DetailView::of(&self.selection, self.store.dataset())
    }

    /// Event ids in the order the timeline lists them.
    pub fn entry_ids(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .flat_map(|section| section.entries.iter().map(|entry| entry.id.as_str()))
    }

    pub fn select(&mut self, id: &str) -> bool {
        if !self.store.dataset().contains_event(id) {
            return false;
        }
        self.selection.select(id);
        true
    }

    pub fn select_next(&mut self) {
        self.step_selection(1);
    }

    pub fn select_previous(&mut self) {
        self.step_selection(-1);
    }

    fn step_selection(&mut self, delta: isize) {
        let ids: Vec<String> = self.entry_ids().map(str::to_string).collect();
        if ids.is_empty() {
            return;
        }
        let current = self
            .selection
            .event_id()
            .and_then(|id| ids.iter().position(|candidate| candidate == id));
        let next = match current {
            Some(index) => index
                .checked_add_signed(delta)
                .filter(|index| *index < ids.len())
                .unwrap_or(index),
            None => 0,
        };
        self.selection.select(&ids[next]);
    }

    pub fn source_tabs(&self) -> Vec<String> {
        match self.detail() {
            DetailView::Event { event, .. } => event
                .sources
                .iter()
                .enumerate()
                .map(|(index, source)| source.tab_label(index))
                .collect(),
            DetailView::Empty => Vec::new(),
        }
    }

    /// Cycles through the current event's source tabs.
    pub fn next_source(&mut self) {
        let count = self.source_tabs().len();
        if count == 0 {
            return;
        }
        let current = match self.detail() {
            DetailView::Event { source_index, .. } => source_index,
            DetailView::Empty => 0,
        };
        self.selection.select_source((current + 1) % count);
    }

    fn current_text(&self) -> Option<&str> {
        match self.detail() {
            DetailView::Event {
                event,
                source_index,
            } => event
                .sources
                .get(source_index)
                .map(|source| source.text.as_str()),
            DetailView::Empty => None,
        }
    }

    /// Styled runs of the selected source's text.
    pub fn segments(&self) -> Vec<Segment> {
        match self.current_text() {
            Some(text) if !text.trim().is_empty() => self.annotator.segments(text),
            _ => vec![Segment {
                text: EMPTY_TEXT.to_string(),
                link: None,
            }],
        }
    }

    pub fn html(&self) -> String {
        match self.current_text() {
            Some(text) if !text.trim().is_empty() => self.annotator.annotate(text),
            _ => format!("<p>{EMPTY_TEXT}</p>"),
        }
    }

    /// Links in the selected text, in reading order.
    pub fn links(&self) -> Vec<Link> {
        self.segments()
            .into_iter()
            .filter_map(|segment| segment.link)
            .collect()
    }

    pub fn pointer(&self, link: &Link, pointer: Pointer) -> Option<LinkRequest> {
        let dataset = self.store.dataset();
        dispatch(link, pointer, &dataset.biographies, &dataset.places)
    }
}
