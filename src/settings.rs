use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BooktallyError, Result};

const APP_DIR: &str = "booktally";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_PAGE_SIZE: usize = 20;

/// User settings, stored as JSON under `~/.config/booktally/settings.json`.
/// Fields missing from the file take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: String,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: home().join("Documents").join(APP_DIR).to_string_lossy().into_owned(),
            cache_enabled: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn settings_file() -> PathBuf {
    home().join(".config").join(APP_DIR).join("settings.json")
}

impl Settings {
    /// Settings from the user's config file, or defaults when there is none.
    /// An unreadable file is logged and replaced by defaults.
    pub fn load() -> Self {
        Self::load_from(&settings_file())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_file())
    }

    pub fn is_saved() -> bool {
        settings_file().exists()
    }

    fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(BooktallyError::from)
            .and_then(|content| serde_json::from_str::<Self>(&content).map_err(BooktallyError::from));
        match parsed {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
                Self::default()
            }
        }
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BooktallyError::Settings(e.to_string()))?;
        std::fs::write(path, format!("{json}\n"))?;
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        if self.page_size == 0 {
            tracing::warn!("page_size must be positive, using {DEFAULT_PAGE_SIZE}");
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self
    }

    /// Point the data directory at `raw`, expanding a leading `~`.
    pub fn set_data_dir(&mut self, raw: &str) {
        self.data_dir = match raw.strip_prefix('~') {
            Some(rest) => format!("{}{rest}", home().to_string_lossy()),
            None => std::fs::canonicalize(raw)
                .unwrap_or_else(|_| PathBuf::from(raw))
                .to_string_lossy()
                .into_owned(),
        };
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}
