use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageOutputFormat;
use tracing::{info, warn};

use crate::catalog::DeviceIdentity;
use crate::job::Orientation;
use crate::layout::PrintableArea;
use crate::platform::{
    BackendError, BackendKind, JobHandle, JobTicket, PlacedPage, PrintBackend,
};

/// Device names offered when no spooler is reachable.
/// 無法連線列印佇列時提供的裝置名稱。
pub const SIMULATED_DEVICES: [&str; 6] = [
    "DYMO LabelWriter 4XL",
    "DYMO LabelWriter 450",
    "DYMO LabelWriter 450 Turbo",
    "DYMO LabelWriter 450 Duo",
    "HP LaserJet Pro",
    "Canon PIXMA",
];

/// 4x6 inch label at 300 dpi.
pub const DEFAULT_SIMULATED_AREA: PrintableArea = PrintableArea::new(1200, 1800);

pub const DEFAULT_OUTPUT_DIR: &str = "mock_prints";

pub fn simulated_devices() -> Vec<DeviceIdentity> {
    SIMULATED_DEVICES
        .iter()
        .map(|name| DeviceIdentity::new(*name))
        .collect()
}

/// Backend that writes each job to a PNG in an output directory.
/// 將每個作業寫成輸出資料夾中 PNG 檔的後端。
#[derive(Debug, Clone)]
pub struct SimulationBackend {
    output_dir: PathBuf,
    area: PrintableArea,
}

impl SimulationBackend {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            area: DEFAULT_SIMULATED_AREA,
        }
    }

    pub fn with_area(mut self, area: PrintableArea) -> Self {
        self.area = area;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl PrintBackend for SimulationBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulation
    }

    fn list_devices(&self) -> Result<Vec<DeviceIdentity>, BackendError> {
        Ok(simulated_devices())
    }

    fn printable_area(&self, _device: &str) -> Result<PrintableArea, BackendError> {
        Ok(self.area)
    }

    fn begin_job(&self, ticket: &JobTicket) -> Result<Box<dyn JobHandle>, BackendError> {
        Ok(Box::new(SimulationJob {
            ticket: ticket.clone(),
            output_dir: self.output_dir.clone(),
            page: None,
        }))
    }
}

struct SimulationJob {
    ticket: JobTicket,
    output_dir: PathBuf,
    page: Option<PlacedPage>,
}

impl JobHandle for SimulationJob {
    fn blit(&mut self, page: PlacedPage) -> Result<(), BackendError> {
        self.page = Some(page);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Option<String>, BackendError> {
        let SimulationJob {
            ticket,
            output_dir,
            page,
        } = *self;
        let page = page.ok_or_else(|| BackendError::EmptyJob(ticket.device.clone()))?;
        fs::create_dir_all(&output_dir)?;
        let stem = artifact_stem(
            &ticket.title,
            chrono::Utc::now().timestamp(),
            ticket.orientation,
        );
        let (target, file) = create_unique(&output_dir, &stem)?;
        let mut writer = BufWriter::new(file);
        page.raster.write_to(&mut writer, ImageOutputFormat::Png)?;
        writer.flush()?;

        info!(
            device = %ticket.device,
            orientation = %ticket.orientation,
            output = %target.display(),
            "simulated print written"
        );
        Ok(Some(target.display().to_string()))
    }

    fn abort(self: Box<Self>, reason: &str) {
        warn!(device = %self.ticket.device, %reason, "simulated job aborted");
    }
}

/// `{stem}_printed_{unix_ts}_{orientation}`, without the `.png` extension.
pub fn artifact_stem(stem: &str, timestamp: i64, orientation: Orientation) -> String {
    format!("{stem}_printed_{timestamp}_{orientation}")
}

/// Creates `{stem}.png`, or `{stem}-1.png`, `{stem}-2.png`, ... when taken.
/// Never replaces an existing artifact.
fn create_unique(dir: &Path, stem: &str) -> io::Result<(PathBuf, File)> {
    for attempt in 0u32.. {
        let name = match attempt {
            0 => format!("{stem}.png"),
            n => format!("{stem}-{n}.png"),
        };
        let target = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => return Ok((target, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free artifact name for {stem}"),
    ))
}
