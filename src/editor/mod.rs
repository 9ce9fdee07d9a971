//! Event, source and glossary editing on top of the [`DatasetStore`].
//!
//! Validation failures are raised as [`ValidationError`] (wrapped in
//! `anyhow::Error`) before anything is touched. Operations naming an event
//! that does not exist return `false`/`None` instead of failing.

use anyhow::Result;
use thiserror::Error;

use crate::config::GlossaryOptions;
use crate::model::{numbered_source_label, Biography, Event, Place, Source};
use crate::ordering::{self, Direction, GroupKey};
use crate::store::DatasetStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("event id is required")]
    MissingId,
    #[error("event title is required")]
    MissingTitle,
    #[error("source text cannot be empty")]
    EmptySourceText,
    #[error("a name is required")]
    MissingName,
    #[error("source {index} does not exist (event has {len})")]
    SourceOutOfRange { index: usize, len: usize },
}

/// Where a newly created event lands within its year group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Immediately before the anchor, in the anchor's year.
    Before(String),
    /// Immediately after the anchor, in the anchor's year.
    After(String),
    /// At the end of the event's own year.
    End,
}

/// Slot reserved by an insert-before/after/for-year action. Applies to the
/// next created event only if the form's year still matches `year`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInsert {
    pub year: Option<i64>,
    pub placement: Placement,
}

/// Raw contents of the event form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventForm {
    pub id: String,
    pub title: String,
    pub year: String,
}

impl EventForm {
    pub fn new(id: impl Into<String>, title: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            year: year.into(),
        }
    }

    pub fn from_event(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            year: event.year.map(|year| year.to_string()).unwrap_or_default(),
        }
    }

    /// Blank or non-integral text means undated.
    pub fn parsed_year(&self) -> Option<i64> {
        parse_year(&self.year)
    }
}

pub fn parse_year(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(year) = trimmed.parse::<i64>() {
        return Some(year);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .map(|value| value as i64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created { id: String, order: u32 },
    Updated { id: String, regrouped: bool },
}

impl SaveOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Created { id, .. } | Self::Updated { id, .. } => id,
        }
    }
}

fn validate_form(form: &EventForm) -> Result<(&str, &str), ValidationError> {
    let id = form.id.trim();
    let title = form.title.trim();
    if id.is_empty() {
        return Err(ValidationError::MissingId);
    }
    if title.is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    Ok((id, title))
}

pub struct Editor<'a> {
    store: &'a mut DatasetStore,
    glossary: &'a GlossaryOptions,
}

impl<'a> Editor<'a> {
    pub fn new(store: &'a mut DatasetStore, glossary: &'a GlossaryOptions) -> Self {
        Self { store, glossary }
    }

    /// Creates the event when its id is new, otherwise updates title and
    /// year. A year change moves the event to the end of its new group.
    pub fn save_event(
        &mut self,
        form: &EventForm,
        pending: Option<PendingInsert>,
    ) -> Result<SaveOutcome> {
        let (id, title) = validate_form(form)?;
        let year = form.parsed_year();
        if !self.store.dataset().contains_event(id) {
            let key = GroupKey::from(year);
            let placement = pending
                .filter(|slot| GroupKey::from(slot.year) == key)
                .map(|slot| slot.placement)
                .unwrap_or(Placement::End);
            // An anchor deleted since the slot was reserved falls back to the end.
            if let Some(outcome) = self.create_event(form, &placement)? {
                return Ok(outcome);
            }
            if let Some(outcome) = self.create_event(form, &Placement::End)? {
                return Ok(outcome);
            }
        }

        let dataset = self.store.dataset_mut();
        let Some(event) = dataset.event_mut(id) else {
            return Err(ValidationError::MissingId.into());
        };
        let regrouped = GroupKey::of(event) != GroupKey::from(year);
        event.title = title.to_string();
        event.ensure_primary_source();
        if regrouped {
            ordering::change_year(&mut dataset.events, id, year);
        }
        let outcome = SaveOutcome::Updated {
            id: id.to_string(),
            regrouped,
        };
        self.store.commit()?;
        tracing::info!(id = outcome.id(), ?outcome, "event saved");
        Ok(outcome)
    }

    /// Adds a new event and never touches an existing one: a taken id fails
    /// with [`ordering::InsertError::DuplicateId`]. Returns `None` when the
    /// placement's anchor does not exist. Anchored placements take the
    /// anchor's year.
    pub fn create_event(
        &mut self,
        form: &EventForm,
        placement: &Placement,
    ) -> Result<Option<SaveOutcome>> {
        let (id, title) = validate_form(form)?;
        let mut event = Event::new(id, title, form.parsed_year());
        event.ensure_primary_source();
        let events = &mut self.store.dataset_mut().events;
        let placed = match placement {
            Placement::Before(anchor) => ordering::insert_before(events, anchor, event)?,
            Placement::After(anchor) => ordering::insert_after(events, anchor, event)?,
            Placement::End => {
                ordering::append(events, event)?;
                true
            }
        };
        if !placed {
            return Ok(None);
        }
        let order = self
            .store
            .dataset()
            .event(id)
            .and_then(|event| event.order)
            .unwrap_or_default();
        let outcome = SaveOutcome::Created {
            id: id.to_string(),
            order,
        };
        self.store.commit()?;
        tracing::info!(id, ?placement, order, "event created");
        Ok(Some(outcome))
    }

    pub fn delete_event(&mut self, id: &str) -> Result<bool> {
        if ordering::remove_event(&mut self.store.dataset_mut().events, id).is_none() {
            return Ok(false);
        }
        self.store.commit()?;
        tracing::info!(id, "event deleted");
        Ok(true)
    }

    /// Swaps the event with its neighbour in the same year. Returns false at
    /// either end of the group or for an unknown id.
    pub fn move_event(&mut self, id: &str, direction: Direction) -> Result<bool> {
        if !ordering::move_event(&mut self.store.dataset_mut().events, id, direction) {
            return Ok(false);
        }
        self.store.commit()?;
        tracing::debug!(id, %direction, "event moved");
        Ok(true)
    }

    pub fn set_notes(&mut self, id: &str, notes: &str) -> Result<bool> {
        let Some(event) = self.store.dataset_mut().event_mut(id) else {
            return Ok(false);
        };
        event.notes = notes.to_string();
        self.store.commit()?;
        Ok(true)
    }

    /// Blank tags are dropped and duplicates collapse to their first spelling.
    pub fn set_tags(&mut self, id: &str, tags: &[String]) -> Result<bool> {
        let Some(event) = self.store.dataset_mut().event_mut(id) else {
            return Ok(false);
        };
        let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags.iter().map(|tag| tag.trim()).filter(|tag| !tag.is_empty()) {
            if !cleaned.iter().any(|existing| existing == tag) {
                cleaned.push(tag.to_string());
            }
        }
        event.tags = cleaned;
        self.store.commit()?;
        Ok(true)
    }

    /// Appends a source and returns its index.
    pub fn add_source(&mut self, id: &str, title: &str, text: &str) -> Result<Option<usize>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptySourceText.into());
        }
        let Some(event) = self.store.dataset_mut().event_mut(id) else {
            return Ok(None);
        };
        let title = title.trim();
        event.sources.push(Source::new(
            "",
            (!title.is_empty()).then(|| title.to_string()),
            text,
        ));
        let index = event.sources.len() - 1;
        self.store.commit()?;
        Ok(Some(index))
    }

    /// Removes a source and returns the index that should be selected next.
    /// Removing the last source leaves a fresh primary source behind.
    pub fn remove_source(&mut self, id: &str, index: usize) -> Result<Option<usize>> {
        let Some(event) = self.store.dataset_mut().event_mut(id) else {
            return Ok(None);
        };
        let len = event.sources.len();
        if index >= len {
            return Err(ValidationError::SourceOutOfRange { index, len }.into());
        }
        event.sources.remove(index);
        event.ensure_primary_source();
        let next = index.min(event.sources.len() - 1);
        self.store.commit()?;
        Ok(Some(next))
    }

    /// A blank book name falls back to the numbered label for that slot.
    pub fn rename_source_book(&mut self, id: &str, index: usize, book: &str) -> Result<bool> {
        let Some(source) = self.source_mut(id, index)? else {
            return Ok(false);
        };
        let book = book.trim();
        source.book = if book.is_empty() {
            numbered_source_label(index)
        } else {
            book.to_string()
        };
        self.store.commit()?;
        Ok(true)
    }

    pub fn set_source_text(&mut self, id: &str, index: usize, text: &str) -> Result<bool> {
        let Some(source) = self.source_mut(id, index)? else {
            return Ok(false);
        };
        source.text = text.to_string();
        self.store.commit()?;
        Ok(true)
    }

    pub fn save_person(&mut self, name: &str, short: &str, full: &str, img: &str) -> Result<()> {
        let name = require_name(name)?;
        let img = non_blank_or(img, &self.glossary.default_person_image);
        self.store.dataset_mut().biographies.insert(
            name.to_string(),
            Biography {
                short: short.to_string(),
                full: full.to_string(),
                img,
            },
        );
        self.store.commit()?;
        Ok(())
    }

    pub fn remove_person(&mut self, name: &str) -> Result<bool> {
        if self
            .store
            .dataset_mut()
            .biographies
            .shift_remove(name)
            .is_none()
        {
            return Ok(false);
        }
        self.store.commit()?;
        Ok(true)
    }

    pub fn save_place(&mut self, name: &str, desc: &str, image: &str) -> Result<()> {
        let name = require_name(name)?;
        let image = non_blank_or(image, &self.glossary.default_place_image);
        self.store.dataset_mut().places.insert(
            name.to_string(),
            Place {
                desc: desc.to_string(),
                image,
            },
        );
        self.store.commit()?;
        Ok(())
    }

    pub fn remove_place(&mut self, name: &str) -> Result<bool> {
        if self.store.dataset_mut().places.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.store.commit()?;
        Ok(true)
    }

    /// Repairs the primary source before handing out the slot.
    fn source_mut(&mut self, id: &str, index: usize) -> Result<Option<&mut Source>> {
        let Some(event) = self.store.dataset_mut().event_mut(id) else {
            return Ok(None);
        };
        event.ensure_primary_source();
        let len = event.sources.len();
        match event.sources.get_mut(index) {
            Some(source) => Ok(Some(source)),
            None => Err(ValidationError::SourceOutOfRange { index, len }.into()),
        }
    }
}

fn require_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingName.into());
    }
    Ok(name)
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::init_storage;
    use crate::ordering::InsertError;
    use crate::store::DATASET_KEY;
    use assert_matches::assert_matches;

    fn store() -> anyhow::Result<(tempfile::TempDir, DatasetStore)> {
        let (temp, storage) = init_storage()?;
        Ok((temp, DatasetStore::load(storage)?))
    }

    fn validation(err: &anyhow::Error) -> Option<&ValidationError> {
        err.downcast_ref::<ValidationError>()
    }

    #[test]
    fn parse_year_accepts_integers_only() {
        assert_eq!(parse_year(" 3 "), Some(3));
        assert_eq!(parse_year("-13"), Some(-13));
        assert_eq!(parse_year("4.0"), Some(4));
        assert_eq!(parse_year("4.5"), None);
        assert_eq!(parse_year("abc"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn create_requires_id_and_title() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let before = store.dataset().clone();
        let mut editor = Editor::new(&mut store, &glossary);

        let err = editor
            .save_event(&EventForm::new(" ", "t", "1"), None)
            .unwrap_err();
        assert_matches!(validation(&err), Some(ValidationError::MissingId));
        let err = editor
            .save_event(&EventForm::new("x", "", "1"), None)
            .unwrap_err();
        assert_matches!(validation(&err), Some(ValidationError::MissingTitle));
        assert_eq!(store.dataset(), &before);
        Ok(())
    }

    #[test]
    fn create_appends_and_repairs_primary_source() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let outcome = Editor::new(&mut store, &glossary)
            .save_event(&EventForm::new("trench", "غزوة الخندق", "2"), None)?;
        assert_eq!(
            outcome,
            SaveOutcome::Created {
                id: "trench".into(),
                order: 2
            }
        );
        let event = store.dataset().event("trench").cloned().unwrap_or_default();
        assert_eq!(event.sources.len(), 1);
        assert_eq!(event.sources[0].book, "غزوة الخندق");

        let persisted = store.storage().get(DATASET_KEY)?.unwrap_or_default();
        assert!(persisted.contains("trench"));
        Ok(())
    }

    #[test]
    fn pending_insert_applies_only_for_matching_year() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let mut editor = Editor::new(&mut store, &glossary);
        let before_badr = PendingInsert {
            year: Some(2),
            placement: Placement::Before("badr".into()),
        };

        editor.save_event(&EventForm::new("a", "أ", "2"), Some(before_badr.clone()))?;
        editor.save_event(&EventForm::new("b", "ب", "3"), Some(before_badr))?;

        let orders = |id: &str| store.dataset().event(id).and_then(|event| event.order);
        assert_eq!(orders("a"), Some(1));
        assert_eq!(orders("badr"), Some(2));
        assert_eq!(orders("uhud"), Some(1));
        assert_eq!(orders("b"), Some(2));
        Ok(())
    }

    #[test]
    fn create_never_overwrites_an_existing_event() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let before = store.dataset().clone();
        let err = Editor::new(&mut store, &glossary)
            .create_event(&EventForm::new("badr", "عنوان آخر", ""), &Placement::End)
            .unwrap_err();
        assert_matches!(
            err.downcast_ref::<InsertError>(),
            Some(InsertError::DuplicateId(id)) if id == "badr"
        );
        assert_eq!(store.dataset(), &before);
        Ok(())
    }

    #[test]
    fn create_places_relative_to_anchor_in_its_year() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let mut editor = Editor::new(&mut store, &glossary);

        let outcome = editor.create_event(
            &EventForm::new("hamra", "حمراء الأسد", ""),
            &Placement::After("uhud".into()),
        )?;
        assert_eq!(
            outcome,
            Some(SaveOutcome::Created {
                id: "hamra".into(),
                order: 2
            })
        );
        editor.create_event(
            &EventForm::new("raji", "الرجيع", "9"),
            &Placement::Before("uhud".into()),
        )?;
        assert_eq!(
            editor.create_event(&EventForm::new("x", "x", ""), &Placement::After("nope".into()))?,
            None
        );

        let placed = |id: &str| {
            store
                .dataset()
                .event(id)
                .map(|event| (event.year, event.order))
        };
        assert_eq!(placed("raji"), Some((Some(3), Some(1))));
        assert_eq!(placed("uhud"), Some((Some(3), Some(2))));
        assert_eq!(placed("hamra"), Some((Some(3), Some(3))));
        assert_eq!(placed("x"), None);
        Ok(())
    }

    #[test]
    fn update_with_new_year_moves_to_end_of_group() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let outcome = Editor::new(&mut store, &glossary)
            .save_event(&EventForm::new("badr", "بدر", "3"), None)?;
        assert_eq!(
            outcome,
            SaveOutcome::Updated {
                id: "badr".into(),
                regrouped: true
            }
        );
        let badr = store.dataset().event("badr").cloned().unwrap_or_default();
        assert_eq!((badr.year, badr.order), (Some(3), Some(2)));
        assert_eq!(badr.title, "بدر");
        Ok(())
    }

    #[test]
    fn sources_are_added_renamed_and_removed() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let mut editor = Editor::new(&mut store, &glossary);

        let err = editor.add_source("uhud", "t", "   ").unwrap_err();
        assert_matches!(validation(&err), Some(ValidationError::EmptySourceText));
        assert_eq!(editor.add_source("uhud", "الواقدي", "نص")?, Some(1));
        assert_eq!(editor.add_source("missing", "", "نص")?, None);

        assert!(editor.rename_source_book("uhud", 1, "  ")?);
        assert!(editor.set_source_text("uhud", 1, "نص جديد")?);
        let err = editor.set_source_text("uhud", 5, "x").unwrap_err();
        assert_matches!(
            validation(&err),
            Some(ValidationError::SourceOutOfRange { index: 5, len: 2 })
        );

        {
            let uhud = store.dataset().event("uhud").cloned().unwrap_or_default();
            assert_eq!(uhud.sources[1].book, "مصدر 2");
            assert_eq!(uhud.sources[1].title.as_deref(), Some("الواقدي"));
            assert_eq!(uhud.sources[1].text, "نص جديد");
        }

        let mut editor = Editor::new(&mut store, &glossary);
        assert_eq!(editor.remove_source("uhud", 1)?, Some(0));
        assert_eq!(editor.remove_source("uhud", 0)?, Some(0));
        let uhud = store.dataset().event("uhud").cloned().unwrap_or_default();
        assert_eq!(uhud.sources.len(), 1);
        assert_eq!(uhud.sources[0].book, "غزوة أحد");
        Ok(())
    }

    #[test]
    fn glossary_entries_get_default_images() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let mut editor = Editor::new(&mut store, &glossary);

        let err = editor.save_person(" ", "", "", "").unwrap_err();
        assert_matches!(validation(&err), Some(ValidationError::MissingName));
        editor.save_person("أبو بكر", "الصديق", "", "")?;
        editor.save_place("مكة", "", " ")?;
        assert!(editor.remove_place("اليرموك")?);
        assert!(!editor.remove_person("غير موجود")?);

        let data = store.dataset();
        assert_eq!(data.biographies["أبو بكر"].img, "persons/default.png");
        assert_eq!(data.places["مكة"].image, "maps/example.png");
        assert!(!data.places.contains_key("اليرموك"));
        Ok(())
    }

    #[test]
    fn delete_closes_gaps_and_ignores_unknown_ids() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let mut editor = Editor::new(&mut store, &glossary);
        editor.save_event(&EventForm::new("a", "أ", "2"), None)?;
        assert!(editor.delete_event("badr")?);
        assert!(!editor.delete_event("badr")?);
        assert_eq!(store.dataset().event("a").and_then(|e| e.order), Some(1));
        Ok(())
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let tags = vec![" غزوات".to_string(), "".into(), "غزوات".into(), "بدر".into()];
        assert!(Editor::new(&mut store, &glossary).set_tags("badr", &tags)?);
        assert_eq!(
            store.dataset().event("badr").map(|e| e.tags.clone()),
            Some(vec!["غزوات".to_string(), "بدر".to_string()])
        );
        Ok(())
    }

    #[test]
    fn move_swaps_within_year_and_persists() -> anyhow::Result<()> {
        let (_temp, mut store) = store()?;
        let glossary = GlossaryOptions::default();
        let mut editor = Editor::new(&mut store, &glossary);
        editor.save_event(&EventForm::new("nakhla", "سرية نخلة", "2"), None)?;
        assert!(!editor.move_event("badr", Direction::Up)?);
        assert!(editor.move_event("nakhla", Direction::Up)?);
        assert!(!editor.move_event("missing", Direction::Down)?);

        let order_of = |store: &DatasetStore, id: &str| store.dataset().event(id).and_then(|e| e.order);
        assert_eq!(order_of(&store, "nakhla"), Some(1));
        assert_eq!(order_of(&store, "badr"), Some(2));
        let reloaded = DatasetStore::load(store.storage().clone())?;
        assert_eq!(order_of(&reloaded, "nakhla"), Some(1));
        Ok(())
    }
}
