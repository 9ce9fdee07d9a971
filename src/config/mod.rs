use std::env;
use std::fs;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_DOMAIN: &str = "org";
const APP_ORG: &str = "Annals";
const APP_NAME: &str = "annals";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("ANNALS_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("ANNALS_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_root))
    }

    /// Lays out every path under explicit config and data roots.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            config_file,
            database_path: data_dir.join("annals.db"),
            backup_dir: data_dir.join("backups"),
            data_dir,
        }
    }

    /// Re-roots the data directory, keeping the config location.
    pub fn with_data_dir(self, data_dir: PathBuf) -> Self {
        Self::rooted(self.config_dir, self.config_file, data_dir)
    }

    /// Points at an explicit config file, keeping the data location.
    pub fn with_config_file(self, config_file: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config_dir.clone());
        Self::rooted(config_dir, config_file, self.data_dir)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.backup_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageOptions,
    pub sync: SyncOptions,
    pub timeline: TimelineOptions,
    pub search: SearchOptions,
    pub glossary: GlossaryOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        if self.timeline.year_start > self.timeline.year_end {
            tracing::warn!(
                start = self.timeline.year_start,
                end = self.timeline.year_end,
                "timeline year range is inverted, swapping bounds"
            );
            std::mem::swap(&mut self.timeline.year_start, &mut self.timeline.year_end);
        }
        if let Some(remote) = self.sync.remote_path.take() {
            self.sync.remote_path = Some(if remote.is_relative() {
                paths.data_dir.join(remote)
            } else {
                remote
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    #[serde(skip)]
    pub backup_dir: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            backup_dir: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        if self.backup_dir.as_os_str().is_empty() {
            self.backup_dir = paths.backup_dir.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// JSON document standing in for the remote store. Relative paths are
    /// resolved against the data directory; unset disables sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<PathBuf>,
    pub debounce_ms: u64,
    pub pull_on_start: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remote_path: None,
            debounce_ms: 1200,
            pull_on_start: true,
        }
    }
}

impl SyncOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineOptions {
    pub year_start: i64,
    pub year_end: i64,
}

impl TimelineOptions {
    pub fn range(&self) -> RangeInclusive<i64> {
        self.year_start..=self.year_end
    }
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            year_start: -53,
            year_end: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { max_results: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlossaryOptions {
    pub default_person_image: String,
    pub default_place_image: String,
}

impl Default for GlossaryOptions {
    fn default() -> Self {
        Self {
            default_person_image: "persons/default.png".into(),
            default_place_image: "maps/example.png".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let config_dir = root.path().join("config");
        ConfigPaths::rooted(
            config_dir.clone(),
            config_dir.join("config.toml"),
            root.path().join("data"),
        )
    }

    #[test]
    fn first_run_writes_default_config() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(temp_paths(&temp));
        let cfg = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.sync.debounce_ms, 1200);
        assert_eq!(cfg.timeline.year_start, -53);
        assert_eq!(cfg.storage.database_path, loader.paths().database_path);

        let reloaded = loader.load()?;
        assert_eq!(reloaded.search.max_results, 50);
        assert_eq!(reloaded.glossary.default_place_image, "maps/example.png");
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_and_resolves_remote() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(temp_paths(&temp));
        loader.paths().ensure_directories()?;
        fs::write(
            &loader.paths().config_file,
            "[sync]\nremote_path = \"remote.json\"\n\n[timeline]\nyear_start = 20\nyear_end = 1\n",
        )?;
        let cfg = loader.load()?;
        assert_eq!(cfg.sync.debounce_ms, 1200);
        assert_eq!(
            cfg.sync.remote_path.as_deref(),
            Some(loader.paths().data_dir.join("remote.json").as_path())
        );
        assert_eq!((cfg.timeline.year_start, cfg.timeline.year_end), (1, 20));
        Ok(())
    }
}
