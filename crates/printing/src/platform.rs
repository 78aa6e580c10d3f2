use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::catalog::DeviceIdentity;
use crate::cups::CupsBackend;
use crate::job::Orientation;
use crate::layout::{Placement, PrintableArea};
use crate::simulation::SimulationBackend;

/// Which family of backend is serving print jobs.
/// 目前負責列印作業的後端類型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Native,
    Simulation,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => f.write_str("native"),
            BackendKind::Simulation => f.write_str("simulation"),
        }
    }
}

/// Errors raised by a backend. Any of them fails the emit step.
/// 後端回報的錯誤；任何一種都會使輸出步驟失敗。
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("print spooler is unavailable: {0}")]
    Unavailable(String),
    #[error("spooler command `{command}` failed: {detail}")]
    Command { command: String, detail: String },
    #[error("job for '{0}' finished without a page")]
    EmptyJob(String),
    #[error("failed to encode page: {0}")]
    Encode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rendered page handed to a job, already scaled to its placement.
/// 已縮放至配置大小、準備交給列印作業的頁面。
#[derive(Debug, Clone)]
pub struct PlacedPage {
    pub raster: RgbImage,
    pub placement: Placement,
    pub area: PrintableArea,
}

/// Per-job metadata passed to [`PrintBackend::begin_job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub device: String,
    /// File stem of the label the job was created for.
    pub title: String,
    pub orientation: Orientation,
}

/// Handle returned when a backend begins a job.
/// 後端開始作業時回傳的控制物件。
pub trait JobHandle {
    fn blit(&mut self, page: PlacedPage) -> Result<(), BackendError>;
    /// Completes the job, returning the artifact path or spooler reference if any.
    fn finish(self: Box<Self>) -> Result<Option<String>, BackendError>;
    fn abort(self: Box<Self>, reason: &str);
}

/// Abstraction over the native spooler and the simulation path.
/// 原生列印佇列與模擬路徑的抽象介面。
pub trait PrintBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn list_devices(&self) -> Result<Vec<DeviceIdentity>, BackendError>;

    /// Queried fresh for every request.
    fn printable_area(&self, device: &str) -> Result<PrintableArea, BackendError>;

    fn begin_job(&self, ticket: &JobTicket) -> Result<Box<dyn JobHandle>, BackendError>;
}

/// Startup choice between backends.
/// 啟動時的後端選擇。
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Use the spooler when one is reachable, otherwise simulate.
    #[default]
    Auto,
    Native,
    Simulation,
}

impl FromStr for BackendChoice {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "native" => Ok(BackendChoice::Native),
            "simulation" | "mock" => Ok(BackendChoice::Simulation),
            other => Err(format!(
                "unknown backend '{other}' (expected auto, native or simulation)"
            )),
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for BackendChoice {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        crate::job::deserialize_from_str(deserializer)
    }
}

/// Resolves a [`BackendChoice`] to a backend instance, checking the spooler once.
/// 依選擇建立後端；僅探測一次。
pub fn select_backend(choice: BackendChoice, simulation: SimulationBackend) -> Arc<dyn PrintBackend> {
    match choice {
        BackendChoice::Simulation => Arc::new(simulation),
        BackendChoice::Native => Arc::new(CupsBackend::new()),
        BackendChoice::Auto => {
            let native = CupsBackend::new();
            match native.detect() {
                Ok(()) => {
                    info!("print spooler detected; using native backend");
                    Arc::new(native)
                }
                Err(reason) => {
                    info!(%reason, "no reachable print spooler; using simulation backend");
                    Arc::new(simulation)
                }
            }
        }
    }
}
