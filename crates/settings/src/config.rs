use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use labelbridge_printing::{BackendChoice, Orientation, PrintableArea, DEFAULT_OUTPUT_DIR};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 9000;
pub const DEFAULT_PRINT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize configuration {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persistent bridge configuration.
/// 橋接服務的持久化設定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Empty until a printer has been chosen.
    #[serde(default)]
    pub selected_printer: String,
    /// Button identifier to label file path.
    #[serde(default)]
    pub button_mappings: BTreeMap<String, PathBuf>,
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default)]
    pub backend: BackendChoice,
    #[serde(default = "default_mock_print_dir")]
    pub mock_print_dir: PathBuf,
    #[serde(default)]
    pub simulated_area: AreaConfig,
    #[serde(default)]
    pub default_orientation: Orientation,
    /// Raster pixels per SVG user unit.
    #[serde(default = "default_svg_scale")]
    pub svg_scale: f32,
    #[serde(default = "default_print_timeout")]
    pub print_timeout_secs: u64,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_mock_print_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_svg_scale() -> f32 {
    1.0
}

fn default_print_timeout() -> u64 {
    DEFAULT_PRINT_TIMEOUT_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            selected_printer: String::new(),
            button_mappings: BTreeMap::new(),
            server_host: default_server_host(),
            server_port: default_server_port(),
            backend: BackendChoice::default(),
            mock_print_dir: default_mock_print_dir(),
            simulated_area: AreaConfig::default(),
            default_orientation: Orientation::default(),
            svg_scale: default_svg_scale(),
            print_timeout_secs: default_print_timeout(),
        }
    }
}

impl AppConfig {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        self.selected_printer = self.selected_printer.trim().to_string();
        self.button_mappings
            .retain(|id, path| !id.trim().is_empty() && !path.as_os_str().is_empty());
        if self.server_host.trim().is_empty() {
            self.server_host = default_server_host();
        }
        if self.server_port == 0 {
            self.server_port = default_server_port();
        }
        if self.mock_print_dir.as_os_str().is_empty() {
            self.mock_print_dir = default_mock_print_dir();
        }
        self.simulated_area.sanitize();
        if !self.svg_scale.is_finite() || self.svg_scale <= 0.0 {
            self.svg_scale = default_svg_scale();
        }
        if self.print_timeout_secs == 0 {
            self.print_timeout_secs = default_print_timeout();
        }
    }
}

/// Page size reported by the simulation backend, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    #[serde(default = "default_area_width")]
    pub width: u32,
    #[serde(default = "default_area_height")]
    pub height: u32,
}

fn default_area_width() -> u32 {
    labelbridge_printing::DEFAULT_SIMULATED_AREA.width_units
}

fn default_area_height() -> u32 {
    labelbridge_printing::DEFAULT_SIMULATED_AREA.height_units
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            width: default_area_width(),
            height: default_area_height(),
        }
    }
}

impl AreaConfig {
    fn sanitize(&mut self) {
        if self.width == 0 || self.height == 0 {
            *self = Self::default();
        }
    }

    pub fn to_printable_area(self) -> PrintableArea {
        PrintableArea::new(self.width, self.height)
    }
}

/// JSON-backed store for [`AppConfig`]; every mutation is written through.
/// 以 JSON 保存的 [`AppConfig`]；每次修改都會立即寫回檔案。
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: AppConfig,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            path: path.into(),
            data: config,
        }
    }

    /// Loads `path`, or defaults when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!(path = %path.display(), "configuration file absent; using defaults");
            return Ok(Self {
                path,
                data: AppConfig::default(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: AppConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn config(&self) -> &AppConfig {
        &self.data
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update<F>(&mut self, op: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn set_selected_printer(&mut self, name: &str) -> Result<(), ConfigError> {
        self.update(|config| config.selected_printer = name.to_string())
    }

    /// Adds or replaces the mapping for `button_id`.
    pub fn add_mapping(
        &mut self,
        button_id: &str,
        label: impl Into<PathBuf>,
    ) -> Result<(), ConfigError> {
        let label = label.into();
        self.update(|config| {
            config
                .button_mappings
                .insert(button_id.trim().to_string(), label);
        })
    }

    /// Returns `false` without touching the file when nothing was mapped.
    pub fn remove_mapping(&mut self, button_id: &str) -> Result<bool, ConfigError> {
        if !self.data.button_mappings.contains_key(button_id) {
            return Ok(false);
        }
        self.update(|config| {
            config.button_mappings.remove(button_id);
        })?;
        Ok(true)
    }

    /// Writes via a sibling `.tmp` file and a rename.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload =
            serde_json::to_string_pretty(&self.data).map_err(|source| ConfigError::Serialize {
                path: self.path.clone(),
                source,
            })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| ConfigError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_restores_unusable_values() {
        let mut config = AppConfig {
            version: 0,
            selected_printer: "  DYMO LabelWriter 450 ".into(),
            server_host: " ".into(),
            server_port: 0,
            simulated_area: AreaConfig {
                width: 0,
                height: 10,
            },
            svg_scale: f32::NAN,
            print_timeout_secs: 0,
            ..AppConfig::default()
        };
        config.button_mappings.insert(" ".into(), "a.png".into());
        config.button_mappings.insert("1".into(), PathBuf::new());
        config.button_mappings.insert("2".into(), "b.png".into());
        config.sanitize();

        assert_eq!(config.version, 1);
        assert_eq!(config.selected_printer, "DYMO LabelWriter 450");
        assert_eq!(config.server_host, DEFAULT_SERVER_HOST);
        assert_eq!(config.server_port, DEFAULT_SERVER_PORT);
        assert_eq!(config.simulated_area, AreaConfig::default());
        assert_eq!(config.svg_scale, 1.0);
        assert_eq!(config.print_timeout_secs, DEFAULT_PRINT_TIMEOUT_SECS);
        assert_eq!(config.button_mappings.len(), 1);
        assert!(config.button_mappings.contains_key("2"));
    }

    #[test]
    fn area_converts_to_printable_area() {
        assert_eq!(
            AreaConfig {
                width: 600,
                height: 400
            }
            .to_printable_area(),
            PrintableArea::new(600, 400)
        );
    }
}
