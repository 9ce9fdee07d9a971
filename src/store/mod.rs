//! Dataset Store: the single owner of the in-memory dataset.
//!
//! Components borrow the dataset through [`DatasetStore::dataset_mut`], mutate
//! it in place and then call [`DatasetStore::commit`], which normalizes event
//! ordering, persists synchronously and notifies subscribers.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use thiserror::Error;

use crate::model::{default_dataset, Dataset, DatasetError};
use crate::ordering;
use crate::storage::StorageHandle;

/// Storage key holding the serialized dataset.
pub const DATASET_KEY: &str = "dataset.v1";

const REQUIRED_SECTIONS: [&str; 3] = ["events", "biographies", "places"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// The dataset was edited in place.
    Mutated,
    /// The dataset was swapped wholesale (import, remote pull, reset).
    Replaced,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("import must be a JSON object")]
    NotAnObject,
    #[error("import is missing the '{0}' section")]
    MissingSection(&'static str),
}

impl From<DatasetError> for ImportError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Json(err) => Self::Json(err),
            DatasetError::NotAnObject => Self::NotAnObject,
        }
    }
}

/// Strict parse used by the import surface: all three sections must be
/// present before the dataset is accepted.
pub fn parse_import(raw: &str) -> Result<Dataset, ImportError> {
    let value: Value = serde_json::from_str(raw)?;
    let Some(root) = value.as_object() else {
        return Err(ImportError::NotAnObject);
    };
    if let Some(missing) = REQUIRED_SECTIONS
        .iter()
        .find(|section| !root.contains_key(**section))
    {
        return Err(ImportError::MissingSection(*missing));
    }
    Ok(Dataset::from_value(value)?)
}

pub struct DatasetStore {
    storage: StorageHandle,
    dataset: Dataset,
    subscribers: Vec<Sender<StoreEvent>>,
}

impl DatasetStore {
    /// Reads the persisted dataset. A missing or unreadable snapshot is
    /// replaced by the seeded default, which is written back immediately.
    pub fn load(storage: StorageHandle) -> Result<Self> {
        let stored = storage.get(DATASET_KEY)?;
        let parsed = match stored.as_deref() {
            Some(raw) => match Dataset::from_json_str(raw) {
                Ok(dataset) => Some(dataset),
                Err(err) => {
                    tracing::warn!(?err, "stored dataset is unreadable, using default data");
                    None
                }
            },
            None => {
                tracing::info!("no stored dataset, seeding default data");
                None
            }
        };
        let seeded = parsed.is_none();
        let mut store = Self {
            storage,
            dataset: parsed.unwrap_or_else(default_dataset),
            subscribers: Vec::new(),
        };
        ordering::normalize(&mut store.dataset.events);
        if seeded {
            store.save()?;
        }
        Ok(store)
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.dataset
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    pub fn subscribe(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn save(&self) -> Result<()> {
        let raw = self.dataset.to_json().context("serializing dataset")?;
        self.storage.put(DATASET_KEY, &raw)?;
        tracing::debug!(events = self.dataset.events.len(), "dataset persisted");
        Ok(())
    }

    /// Closes an in-place edit: normalize, persist, notify.
    pub fn commit(&mut self) -> Result<()> {
        ordering::normalize(&mut self.dataset.events);
        self.save()?;
        self.notify(StoreEvent::Mutated);
        Ok(())
    }

    pub fn replace(&mut self, dataset: Dataset) -> Result<()> {
        self.dataset = dataset;
        ordering::normalize(&mut self.dataset.events);
        self.save()?;
        self.notify(StoreEvent::Replaced);
        Ok(())
    }

    /// Accepts a remote snapshot only when its shape is valid; returns
    /// whether local state was overwritten.
    pub fn replace_from_remote(&mut self, snapshot: Value) -> Result<bool> {
        if !Dataset::is_valid_snapshot(&snapshot) {
            tracing::warn!("remote snapshot has an invalid shape, keeping local data");
            return Ok(false);
        }
        let dataset = Dataset::from_value(snapshot).context("reading remote snapshot")?;
        self.replace(dataset)?;
        Ok(true)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.replace(default_dataset())
    }

    /// Replaces the whole dataset from import text. A rejected import leaves
    /// the current dataset untouched; the error downcasts to [`ImportError`].
    pub fn import_json(&mut self, raw: &str) -> Result<()> {
        let dataset = parse_import(raw)?;
        tracing::info!(events = dataset.events.len(), "importing dataset");
        self.replace(dataset)
    }

    pub fn export_json(&self) -> Result<String> {
        self.dataset
            .to_pretty_json()
            .context("serializing dataset for export")
    }

    fn notify(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Event;
    use crate::storage::tests::init_storage;
    use assert_matches::assert_matches;

    #[test]
    fn first_load_seeds_and_persists_default() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let store = DatasetStore::load(storage.clone())?;
        assert!(store.dataset().contains_event("badr"));
        assert!(storage.get(DATASET_KEY)?.is_some());
        Ok(())
    }

    #[test]
    fn unreadable_snapshot_falls_back_to_seed() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.put(DATASET_KEY, "{not json")?;
        let store = DatasetStore::load(storage.clone())?;
        assert!(store.dataset().contains_event("uhud"));
        let repaired = storage.get(DATASET_KEY)?.unwrap_or_default();
        assert!(Dataset::from_json_str(&repaired).is_ok());
        Ok(())
    }

    #[test]
    fn load_repairs_shape_and_ordering() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.put(
            DATASET_KEY,
            r#"{"events":[{"id":"a","year":1,"order":7},{"id":"b","year":1,"order":"x"},5],
                "biographies":null,"places":[]}"#,
        )?;
        let store = DatasetStore::load(storage)?;
        let orders: Vec<_> = store
            .dataset()
            .events
            .iter()
            .map(|event| (event.id.as_str(), event.order))
            .collect();
        assert_eq!(orders, vec![("a", Some(1)), ("b", Some(2))]);
        assert!(store.dataset().biographies.is_empty());
        Ok(())
    }

    #[test]
    fn commit_persists_and_notifies() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut store = DatasetStore::load(storage.clone())?;
        let events = store.subscribe();
        store
            .dataset_mut()
            .events
            .push(Event::new("hijra", "الهجرة", Some(1)));
        store.commit()?;
        assert_eq!(events.try_recv().ok(), Some(StoreEvent::Mutated));

        let reloaded = DatasetStore::load(storage)?;
        assert_eq!(
            reloaded.dataset().event("hijra").and_then(|e| e.order),
            Some(1)
        );
        Ok(())
    }

    #[test]
    fn import_missing_places_is_rejected_without_change() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut store = DatasetStore::load(storage)?;
        let events = store.subscribe();
        let before = store.dataset().clone();

        let err = store
            .import_json(r#"{"events":[],"biographies":{}}"#)
            .unwrap_err();
        assert_matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::MissingSection("places"))
        );
        assert_eq!(store.dataset(), &before);
        assert!(events.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn import_rejects_non_object_and_bad_json() {
        assert_matches!(parse_import("[]"), Err(ImportError::NotAnObject));
        assert_matches!(parse_import("{"), Err(ImportError::Json(_)));
    }

    #[test]
    fn import_replaces_everything() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut store = DatasetStore::load(storage)?;
        let events = store.subscribe();
        store.import_json(
            r#"{"events":[{"id":"x","title":"حدث","year":null}],"biographies":{},"places":{}}"#,
        )?;
        assert_eq!(store.dataset().events.len(), 1);
        assert_eq!(store.dataset().events[0].order, Some(1));
        assert!(store.dataset().places.is_empty());
        assert_eq!(events.try_recv().ok(), Some(StoreEvent::Replaced));
        Ok(())
    }

    #[test]
    fn export_is_pretty_and_reimportable() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut store = DatasetStore::load(storage)?;
        let exported = store.export_json()?;
        assert!(exported.contains("\n  "));
        let before = store.dataset().clone();
        store.import_json(&exported)?;
        assert_eq!(store.dataset(), &before);
        Ok(())
    }

    #[test]
    fn invalid_remote_snapshot_is_ignored() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut store = DatasetStore::load(storage)?;
        let snapshot = serde_json::json!({"events": {}, "biographies": {}, "places": {}});
        assert!(!store.replace_from_remote(snapshot)?);
        assert!(store.dataset().contains_event("badr"));

        let snapshot = serde_json::json!({"events": [], "biographies": {}, "places": {}});
        assert!(store.replace_from_remote(snapshot)?);
        assert!(store.dataset().events.is_empty());
        Ok(())
    }

    #[test]
    fn dropped_subscribers_are_pruned() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut store = DatasetStore::load(storage)?;
        drop(store.subscribe());
        let live = store.subscribe();
        store.commit()?;
        assert_eq!(store.subscribers.len(), 1);
        assert_eq!(live.try_recv().ok(), Some(StoreEvent::Mutated));
        Ok(())
    }
}
