//! Local key-value persistence on SQLite.
//!
//! Values are opaque strings addressed by key; callers own their encoding.
//! Every call opens its own connection so handles can be cloned freely.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

mod schema;

#[derive(Debug, Clone, Copy)]
pub struct WalCheckpointStats {
    pub busy_frames: i64,
    pub wal_frames: i64,
    pub checkpointed_frames: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub id: i64,
    pub created_at: i64,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.options.backup_dir
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("reading entry '{key}'"))
        })
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        if key.trim().is_empty() {
            bail!("storage key cannot be empty");
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing entry '{key}'"))?;
            Ok(())
        })
    }

    /// Writes several entries in one transaction; either all land or none do.
    pub fn put_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing entry '{key}'"))?;
        }
        tx.commit().context("committing entries")?;
        Ok(())
    }

    pub fn record_backup(&self, path: &Path) -> Result<i64> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO backups (created_at, path) VALUES (?1, ?2)",
                params![now, path.to_string_lossy()],
            )
            .context("recording backup")?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_backups(&self, limit: usize) -> Result<Vec<BackupRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, path FROM backups ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], |row| {
                Ok(BackupRecord {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    path: PathBuf::from(row.get::<_, String>(2)?),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
                .context("fetching backups")
        })
    }

    pub fn run_wal_health_check(&self) -> Result<WalCheckpointStats> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("PRAGMA wal_checkpoint(PASSIVE)")
                .context("preparing wal checkpoint pragma")?;
            let mut rows = stmt.query([]).context("executing wal checkpoint pragma")?;
            if let Some(row) = rows.next()? {
                Ok(WalCheckpointStats {
                    busy_frames: row.get(0)?,
                    wal_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            } else {
                bail!("wal checkpoint returned no rows");
            }
        })
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    let mut options = storage.clone();
    if options.backup_dir.as_os_str().is_empty() {
        options.backup_dir = paths.backup_dir.clone();
    }
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(options),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        let config_dir = base.join("config");
        ConfigPaths::rooted(
            config_dir.clone(),
            config_dir.join("config.toml"),
            base.join("data"),
        )
    }

    pub(crate) fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        options.backup_dir = paths.backup_dir.clone();
        let storage = init(&paths, &options)?;
        Ok((temp, storage))
    }

    #[test]
    fn put_overwrites_previous_value() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert_eq!(storage.get("events")?, None);

        storage.put("events", "[]")?;
        storage.put("events", "[1]")?;
        assert_eq!(storage.get("events")?.as_deref(), Some("[1]"));
        assert_eq!(storage.get("other")?, None);
        Ok(())
    }

    #[test]
    fn empty_key_is_rejected() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert!(storage.put("  ", "x").is_err());
        Ok(())
    }

    #[test]
    fn put_many_writes_all_entries() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.put_many(&[("a", "1".to_string()), ("b", "2".to_string())])?;
        assert_eq!(storage.get("a")?.as_deref(), Some("1"));
        assert_eq!(storage.get("b")?.as_deref(), Some("2"));
        Ok(())
    }

    #[test]
    fn backups_are_listed_newest_first() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let first = storage.record_backup(Path::new("/tmp/one.json"))?;
        let second = storage.record_backup(Path::new("/tmp/two.json"))?;
        let backups = storage.list_backups(10)?;
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].id, second);
        assert_eq!(backups[1].id, first);
        assert_eq!(backups[1].path, PathBuf::from("/tmp/one.json"));
        Ok(())
    }

    #[test]
    fn wal_health_check_runs() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let stats = storage.run_wal_health_check()?;
        assert!(
            stats.busy_frames >= 0 && stats.wal_frames >= 0 && stats.checkpointed_frames >= 0,
            "expected non-negative wal stats, got {:?}",
            stats
        );
        Ok(())
    }
}
