//! Legacy annotation workspace.
//!
//! An older editing surface that keeps its own three storage entries: the
//! sidebar outline, rich-text content per outline entry, and link records
//! keyed by generated `link_<uuid>` ids. Keywords are matched with the same
//! [`crate::smartlinks::Matcher`] the main annotator uses.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::macros::format_description;
use time::Date;
use uuid::Uuid;

use crate::storage::StorageHandle;

mod document;
mod outline;

pub use document::{
    apply_smart_links, link_ids, merge_text, plain_text, to_html, unwrap_links, RichNode,
};
pub use outline::{new_event_id, Outline, OutlineEvent, OutlineYear, NEW_EVENT_TITLE, NEW_YEAR_TITLE};

pub const SIDEBAR_KEY: &str = "sira_sidebar_html";
pub const EVENTS_KEY: &str = "sira_events_content";
pub const TARAJIM_KEY: &str = "sira_tarajim_data";

pub const EMPTY_TOOLTIP: &str = "لا توجد بيانات.";

/// Annotation attached to a keyword. Field names match existing backups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    #[serde(rename = "كلمة_مفتاحية", default)]
    pub keyword: String,
    #[serde(rename = "العنوان", default)]
    pub title: String,
    #[serde(rename = "المحتوى", default)]
    pub content: String,
    #[serde(rename = "صورة", default)]
    pub image: Option<String>,
}

impl LinkRecord {
    /// Tooltip body: title line then content, or a placeholder.
    pub fn tooltip(&self) -> String {
        let parts: Vec<&str> = [self.title.trim(), self.content.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            EMPTY_TOOLTIP.to_string()
        } else {
            parts.join("\n")
        }
    }
}

pub type LinkRecords = IndexMap<String, LinkRecord>;
pub type EventContents = IndexMap<String, Vec<RichNode>>;

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("a link needs a keyword")]
    MissingKeyword,
    #[error("no outline entry with id '{0}'")]
    UnknownEvent(String),
    #[error("backup file is not valid: {0}")]
    InvalidBackup(String),
}

pub fn new_link_id() -> String {
    format!("link_{}", Uuid::new_v4().simple())
}

/// Name of the backup bundle written on `date`.
pub fn backup_file_name(date: Date) -> Result<String> {
    let day = date
        .format(format_description!("[year]-[month]-[day]"))
        .context("formatting backup date")?;
    Ok(format!("sira-backup-{day}.json"))
}

/// What a backup import changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupImport {
    pub sidebar: bool,
    pub events: bool,
    pub tarajim: bool,
}

#[derive(Debug, Serialize)]
struct BackupBundle<'a> {
    sidebar: &'a Outline,
    events: &'a EventContents,
    tarajim: &'a LinkRecords,
}

pub struct LegacyWorkspace {
    storage: StorageHandle,
    outline: Outline,
    events: EventContents,
    records: LinkRecords,
}

impl LegacyWorkspace {
    /// Reads all three entries. Each one that is missing or unreadable starts
    /// empty on its own.
    pub fn load(storage: StorageHandle) -> Result<Self> {
        let outline = read_entry(&storage, SIDEBAR_KEY)?;
        let events = read_entry(&storage, EVENTS_KEY)?;
        let records = read_entry(&storage, TARAJIM_KEY)?;
        Ok(Self {
            storage,
            outline,
            events,
            records,
        })
    }

    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    pub fn records(&self) -> &LinkRecords {
        &self.records
    }

    pub fn content(&self, event_id: &str) -> Option<&[RichNode]> {
        self.events.get(event_id).map(Vec::as_slice)
    }

    pub fn add_year(&mut self, title: Option<&str>, after: Option<usize>) -> Result<usize> {
        let index = self.outline.add_year(title, after);
        self.save_outline()?;
        Ok(index)
    }

    /// New entry at the end of heading `year`, or right after `after` when
    /// given. Returns `None` when the target does not exist.
    pub fn add_event(&mut self, year: usize, after: Option<&str>) -> Result<Option<String>> {
        let id = match after {
            Some(anchor) => self.outline.add_event_after(anchor),
            None => self.outline.add_event_to_year(year),
        };
        if id.is_some() {
            self.save_outline()?;
        }
        Ok(id)
    }

    pub fn rename_year(&mut self, index: usize, title: &str) -> Result<bool> {
        let renamed = self.outline.rename_year(index, title);
        if renamed {
            self.save_outline()?;
        }
        Ok(renamed)
    }

    pub fn rename_event(&mut self, id: &str, title: &str) -> Result<bool> {
        let renamed = self.outline.rename_event(id, title);
        if renamed {
            self.save_outline()?;
        }
        Ok(renamed)
    }

    /// Removes the entry and its content.
    pub fn remove_event(&mut self, id: &str) -> Result<bool> {
        if self.outline.remove_event(id).is_none() {
            return Ok(false);
        }
        self.events.shift_remove(id);
        self.save_outline_and_events()?;
        Ok(true)
    }

    /// Removes a heading with every entry under it.
    pub fn remove_year(&mut self, index: usize) -> Result<bool> {
        let Some(removed) = self.outline.remove_year(index) else {
            return Ok(false);
        };
        for id in &removed {
            self.events.shift_remove(id);
        }
        self.save_outline_and_events()?;
        Ok(true)
    }

    /// Stores the entry's content with links re-derived from the current
    /// records. Returns the number of links.
    pub fn set_content(&mut self, event_id: &str, mut nodes: Vec<RichNode>) -> Result<usize> {
        if self.outline.find_event(event_id).is_none() {
            return Err(LegacyError::UnknownEvent(event_id.to_string()).into());
        }
        let count = apply_smart_links(&mut nodes, &self.records);
        self.events.insert(event_id.to_string(), nodes);
        self.save_events()?;
        Ok(count)
    }

    /// Creates a record (`link_id` is `None`) or updates one. An existing
    /// record keeps its keyword. Every entry is re-linked afterwards.
    pub fn save_link(
        &mut self,
        link_id: Option<&str>,
        keyword: &str,
        title: &str,
        content: &str,
        image: Option<String>,
    ) -> Result<String> {
        let (id, mut record) = match link_id.and_then(|id| self.records.get(id).map(|r| (id, r))) {
            Some((id, existing)) => (id.to_string(), existing.clone()),
            None => (
                link_id.map_or_else(new_link_id, str::to_string),
                LinkRecord::default(),
            ),
        };
        if record.keyword.trim().is_empty() {
            record.keyword = keyword.trim().to_string();
        }
        if record.keyword.is_empty() {
            return Err(LegacyError::MissingKeyword.into());
        }
        record.title = title.trim().to_string();
        record.content = content.trim().to_string();
        record.image = image.filter(|image| !image.trim().is_empty());

        self.records.insert(id.clone(), record);
        self.persist_records_and_relink()?;
        tracing::debug!(link = %id, "link record saved");
        Ok(id)
    }

    pub fn remove_link(&mut self, link_id: &str) -> Result<bool> {
        if self.records.shift_remove(link_id).is_none() {
            return Ok(false);
        }
        self.persist_records_and_relink()?;
        Ok(true)
    }

    pub fn tooltip(&self, link_id: &str) -> Option<String> {
        self.records.get(link_id).map(LinkRecord::tooltip)
    }

    /// Writes the three entries as one bundle into `dir` and records it.
    pub fn export_backup(&self, dir: &Path, date: Date) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating backup directory {}", dir.display()))?;
        let path = dir.join(backup_file_name(date)?);
        let bundle = BackupBundle {
            sidebar: &self.outline,
            events: &self.events,
            tarajim: &self.records,
        };
        let json = serde_json::to_string_pretty(&bundle).context("serialising backup")?;
        fs::write(&path, json).with_context(|| format!("writing backup {}", path.display()))?;
        self.storage.record_backup(&path)?;
        tracing::info!(path = %path.display(), "legacy backup written");
        Ok(path)
    }

    /// Restores whichever sections the bundle carries. Sections may be
    /// nested JSON or JSON encoded as a string. Nothing is written unless the
    /// whole bundle parses.
    pub fn import_backup(&mut self, path: &Path) -> Result<BackupImport> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading backup {}", path.display()))?;
        let bundle: Value = serde_json::from_str(&raw)
            .map_err(|err| LegacyError::InvalidBackup(err.to_string()))?;
        let Value::Object(mut sections) = bundle else {
            return Err(LegacyError::InvalidBackup("expected a JSON object".into()).into());
        };

        let outline: Option<Outline> = take_section(&mut sections, "sidebar")?;
        let events: Option<EventContents> = take_section(&mut sections, "events")?;
        let records: Option<LinkRecords> = take_section(&mut sections, "tarajim")?;

        let mut entries: Vec<(&str, String)> = Vec::new();
        let summary = BackupImport {
            sidebar: outline.is_some(),
            events: events.is_some(),
            tarajim: records.is_some(),
        };
        if let Some(outline) = outline {
            entries.push((SIDEBAR_KEY, serde_json::to_string(&outline)?));
            self.outline = outline;
        }
        if let Some(events) = events {
            entries.push((EVENTS_KEY, serde_json::to_string_pretty(&events)?));
            self.events = events;
        }
        if let Some(records) = records {
            entries.push((TARAJIM_KEY, serde_json::to_string_pretty(&records)?));
            self.records = records;
        }
        self.storage.put_many(&entries)?;
        tracing::info!(?summary, "legacy backup imported");
        Ok(summary)
    }

    fn persist_records_and_relink(&mut self) -> Result<()> {
        for nodes in self.events.values_mut() {
            apply_smart_links(nodes, &self.records);
        }
        let entries = [
            (TARAJIM_KEY, serde_json::to_string_pretty(&self.records)?),
            (EVENTS_KEY, serde_json::to_string_pretty(&self.events)?),
        ];
        self.storage.put_many(&entries)
    }

    fn save_outline(&self) -> Result<()> {
        self.storage
            .put(SIDEBAR_KEY, &serde_json::to_string(&self.outline)?)
    }

    fn save_events(&self) -> Result<()> {
        self.storage
            .put(EVENTS_KEY, &serde_json::to_string_pretty(&self.events)?)
    }

    fn save_outline_and_events(&self) -> Result<()> {
        let entries = [
            (SIDEBAR_KEY, serde_json::to_string(&self.outline)?),
            (EVENTS_KEY, serde_json::to_string_pretty(&self.events)?),
        ];
        self.storage.put_many(&entries)
    }
}

fn read_entry<T: DeserializeOwned + Default>(storage: &StorageHandle, key: &str) -> Result<T> {
    let Some(raw) = storage.get(key)? else {
        return Ok(T::default());
    };
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(%key, ?err, "legacy entry is unreadable, starting empty");
            Ok(T::default())
        }
    }
}

fn take_section<T: DeserializeOwned>(
    sections: &mut serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<T>, LegacyError> {
    let value = match sections.remove(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => return Ok(None),
        Some(Value::String(text)) => serde_json::from_str(&text)
            .map_err(|err| LegacyError::InvalidBackup(format!("{name}: {err}")))?,
        Some(value) => value,
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| LegacyError::InvalidBackup(format!("{name}: {err}")))
}
