//! Remote document-store collaborator.
//!
//! The remote side holds one JSON document with the same shape as the local
//! snapshot. Pushes overwrite it wholesale; pulls read it back. Transport
//! failures are the caller's to log and swallow.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::SyncOptions;

mod controller;
mod scheduler;

pub use controller::{SyncController, SyncOutcome};
pub use scheduler::PushScheduler;

pub trait RemoteStore: Send + Sync {
    /// Reads the whole document. `None` when nothing has been pushed yet.
    fn pull(&self) -> Result<Option<Value>>;

    /// Overwrites the whole document.
    fn push(&self, snapshot: &Value) -> Result<()>;

    fn describe(&self) -> String;
}

/// Controller for the configured remote, or `None` when sync is off.
pub fn controller_from_options(options: &SyncOptions) -> Option<SyncController> {
    let path = options.remote_path.as_ref()?;
    let remote: Arc<dyn RemoteStore> = Arc::new(FileRemote::new(path));
    Some(SyncController::new(remote, options.debounce()))
}

/// A JSON file standing in for the remote document.
#[derive(Debug, Clone)]
pub struct FileRemote {
    path: PathBuf,
}

impl FileRemote {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RemoteStore for FileRemote {
    fn pull(&self) -> Result<Option<Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading remote document {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() || raw.trim() == "null" {
            return Ok(None);
        }
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing remote document {}", self.path.display()))?;
        Ok(Some(value))
    }

    fn push(&self, snapshot: &Value) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("serialising remote snapshot")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("ensuring remote dir {}", parent.display()))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)
            .with_context(|| format!("writing temporary remote document {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("atomically replacing remote document {}", self.path.display())
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    document: Option<Value>,
    pushes: usize,
    failing: bool,
}

/// In-process remote, used by tests and by the reader when sync is off.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Value) -> Self {
        let remote = Self::default();
        remote.state.lock().document = Some(document);
        remote
    }

    pub fn document(&self) -> Option<Value> {
        self.state.lock().document.clone()
    }

    pub fn set_document(&self, document: Value) {
        self.state.lock().document = Some(document);
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().pushes
    }

    /// Makes every subsequent call fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl RemoteStore for MemoryRemote {
    fn pull(&self) -> Result<Option<Value>> {
        let state = self.state.lock();
        if state.failing {
            bail!("remote unavailable");
        }
        Ok(state.document.clone())
    }

    fn push(&self, snapshot: &Value) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing {
            bail!("remote unavailable");
        }
        state.document = Some(snapshot.clone());
        state.pushes += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
