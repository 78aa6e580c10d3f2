use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AppConfig, ConfigError, ConfigStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("button '{0}' is not mapped to a label file")]
    NotConfigured(String),
    #[error("no printer has been selected")]
    Unset,
}

/// Looks up what a button prints and where.
/// 查詢按鈕對應的標籤檔案與目標印表機。
pub trait MappingResolver: Send + Sync {
    fn resolve(&self, button_id: &str) -> Result<PathBuf, ResolveError>;

    fn selected_device(&self) -> Result<String, ResolveError>;

    fn mapping_count(&self) -> usize;
}

impl MappingResolver for AppConfig {
    fn resolve(&self, button_id: &str) -> Result<PathBuf, ResolveError> {
        self.button_mappings
            .get(button_id)
            .cloned()
            .ok_or_else(|| ResolveError::NotConfigured(button_id.to_string()))
    }

    fn selected_device(&self) -> Result<String, ResolveError> {
        if self.selected_printer.is_empty() {
            Err(ResolveError::Unset)
        } else {
            Ok(self.selected_printer.clone())
        }
    }

    fn mapping_count(&self) -> usize {
        self.button_mappings.len()
    }
}

impl MappingResolver for ConfigStore {
    fn resolve(&self, button_id: &str) -> Result<PathBuf, ResolveError> {
        self.config().resolve(button_id)
    }

    fn selected_device(&self) -> Result<String, ResolveError> {
        self.config().selected_device()
    }

    fn mapping_count(&self) -> usize {
        self.config().mapping_count()
    }
}

/// Resolver over a configuration file that may be edited while the server runs.
/// 讀取可能在服務執行中被修改的設定檔的解析器。
///
/// Every lookup checks the file's modification time and size and reloads it
/// when either changed. A reload that fails keeps serving the last good
/// configuration.
/// 每次查詢都會比對檔案的修改時間與大小，有變動即重新載入；載入失敗時沿用上一份有效設定。
#[derive(Debug)]
pub struct ReloadingResolver {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

#[derive(Debug)]
struct Snapshot {
    stamp: Option<FileStamp>,
    config: AppConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }
}

impl ReloadingResolver {
    /// Loads `path` once up front so a malformed file is reported at startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let stamp = FileStamp::of(&path);
        let config = ConfigStore::load(&path)?.config().clone();
        Ok(Self {
            path,
            snapshot: RwLock::new(Snapshot { stamp, config }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration, reloaded first if the file changed.
    pub fn current(&self) -> AppConfig {
        self.with_config(AppConfig::clone)
    }

    fn with_config<R>(&self, read: impl FnOnce(&AppConfig) -> R) -> R {
        self.refresh();
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        read(&snapshot.config)
    }

    fn refresh(&self) {
        let stamp = FileStamp::of(&self.path);
        {
            let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
            if snapshot.stamp == stamp {
                return;
            }
        }

        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if snapshot.stamp == stamp {
            return;
        }
        match ConfigStore::load(&self.path) {
            Ok(store) => {
                debug!(path = %self.path.display(), "configuration reloaded");
                snapshot.config = store.config().clone();
                snapshot.stamp = stamp;
            }
            Err(err) => {
                warn!(error = %err, "configuration reload failed; keeping previous settings");
                snapshot.stamp = stamp;
            }
        }
    }
}

impl MappingResolver for ReloadingResolver {
    fn resolve(&self, button_id: &str) -> Result<PathBuf, ResolveError> {
        self.with_config(|config| config.resolve(button_id))
    }

    fn selected_device(&self) -> Result<String, ResolveError> {
        self.with_config(|config| config.selected_device())
    }

    fn mapping_count(&self) -> usize {
        self.with_config(|config| config.mapping_count())
    }
}
