//! Native backend driving the CUPS command-line spooler tools.
//! 透過 CUPS 命令列工具操作的原生列印後端。
//!
//! `lpstat` enumerates destinations, `lpoptions` reports the default media
//! and resolution, and `lp` submits the composed page.
//! `lpstat` 列出目的地，`lpoptions` 回報預設紙張與解析度，`lp` 負責送出頁面。

use std::io;
use std::process::Command;

use image::ImageFormat;
use tracing::{debug, info, warn};

use crate::artifact::TemporaryArtifact;
use crate::catalog::DeviceIdentity;
use crate::layout::{compose_page, PrintableArea};
use crate::platform::{
    BackendError, BackendKind, JobHandle, JobTicket, PlacedPage, PrintBackend,
};

const DEFAULT_DPI: u32 = 300;

/// Used when the driver reports no parsable default page size.
pub const FALLBACK_AREA: PrintableArea = PrintableArea::new(1200, 1800);

/// Backend that submits jobs through `lp`.
#[derive(Debug, Clone, Default)]
pub struct CupsBackend;

impl CupsBackend {
    pub fn new() -> Self {
        Self
    }

    /// Succeeds only when the scheduler answers and reports itself running.
    pub fn detect(&self) -> Result<(), String> {
        let status = run("lpstat", &["-r"]).map_err(|err| err.to_string())?;
        if scheduler_running(&status) {
            Ok(())
        } else {
            Err(format!("scheduler not running: {}", status.trim()))
        }
    }
}

impl PrintBackend for CupsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn list_devices(&self) -> Result<Vec<DeviceIdentity>, BackendError> {
        let listing = run("lpstat", &["-e"])?;
        Ok(parse_destinations(&listing))
    }

    fn printable_area(&self, device: &str) -> Result<PrintableArea, BackendError> {
        let options = run("lpoptions", &["-p", device, "-l"])?;
        match parse_printable_area(&options) {
            Some(area) => Ok(area),
            None => {
                warn!(%device, "driver reported no default page size; using fallback area");
                Ok(FALLBACK_AREA)
            }
        }
    }

    fn begin_job(&self, ticket: &JobTicket) -> Result<Box<dyn JobHandle>, BackendError> {
        Ok(Box::new(CupsJob {
            ticket: ticket.clone(),
            spool_file: None,
        }))
    }
}

struct CupsJob {
    ticket: JobTicket,
    spool_file: Option<TemporaryArtifact>,
}

impl JobHandle for CupsJob {
    fn blit(&mut self, page: PlacedPage) -> Result<(), BackendError> {
        let composed = compose_page(&page.raster, page.placement, page.area);
        let artifact = TemporaryArtifact::create(".png")?;
        composed.save_with_format(artifact.path(), ImageFormat::Png)?;
        debug!(
            device = %self.ticket.device,
            path = %artifact.path().display(),
            "page written for spooler"
        );
        self.spool_file = Some(artifact);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Option<String>, BackendError> {
        let CupsJob { ticket, spool_file } = *self;
        let spool_file = spool_file.ok_or_else(|| BackendError::EmptyJob(ticket.device.clone()))?;
        let path = spool_file.path().to_string_lossy().into_owned();
        let output = run(
            "lp",
            &[
                "-d",
                &ticket.device,
                "-t",
                &ticket.title,
                "-o",
                "fit-to-page",
                &path,
            ],
        )?;
        let job_id = parse_request_id(&output);
        info!(
            device = %ticket.device,
            orientation = %ticket.orientation,
            job = job_id.as_deref().unwrap_or("unknown"),
            "print job submitted to spooler"
        );
        Ok(job_id)
    }

    fn abort(self: Box<Self>, reason: &str) {
        warn!(device = %self.ticket.device, %reason, "spooler job aborted before submission");
    }
}

fn run(program: &str, args: &[&str]) -> Result<String, BackendError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => BackendError::Unavailable(format!("`{program}` not found")),
            _ => BackendError::Command {
                command: program.to_string(),
                detail: err.to_string(),
            },
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendError::Command {
            command: format!("{program} {}", args.join(" ")),
            detail: format!("{} ({})", stderr.trim(), output.status),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn scheduler_running(status: &str) -> bool {
    let status = status.to_ascii_lowercase();
    status.contains("scheduler is running") && !status.contains("not running")
}

/// One destination name per line, as printed by `lpstat -e`.
pub fn parse_destinations(listing: &str) -> Vec<DeviceIdentity> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(DeviceIdentity::new)
        .collect()
}

/// Extracts the default page size and resolution from `lpoptions -l` output.
/// 從 `lpoptions -l` 的輸出取出預設紙張大小與解析度。
pub fn parse_printable_area(options: &str) -> Option<PrintableArea> {
    let mut page_points = None;
    let mut dpi = None;
    for line in options.lines() {
        let Some((key, values)) = line.split_once(':') else {
            continue;
        };
        let name = key.split('/').next().unwrap_or_default().trim();
        let Some(default) = values
            .split_whitespace()
            .find_map(|value| value.strip_prefix('*'))
        else {
            continue;
        };
        match name {
            "PageSize" | "media" => page_points = page_points.or_else(|| page_size_points(default)),
            "Resolution" => dpi = dpi.or_else(|| parse_dpi(default)),
            _ => {}
        }
    }
    let (width_pt, height_pt) = page_points?;
    let area = PrintableArea::from_points(width_pt, height_pt, dpi.unwrap_or(DEFAULT_DPI));
    (!area.is_empty()).then_some(area)
}

fn page_size_points(value: &str) -> Option<(f64, f64)> {
    // Adobe-style "w288h432" in points.
    if let Some(rest) = value.strip_prefix('w') {
        if let Some((width, height)) = rest.split_once('h') {
            if let (Ok(width), Ok(height)) = (width.parse(), height.parse()) {
                return Some((width, height));
            }
        }
    }
    // PWG self-describing names end in "_<w>x<h>in" or "_<w>x<h>mm".
    if let Some(dimensions) = value.rsplit('_').next() {
        if let Some(size) = pwg_dimensions(dimensions) {
            return Some(size);
        }
    }
    match value.to_ascii_lowercase().as_str() {
        "letter" => Some((612.0, 792.0)),
        "legal" => Some((612.0, 1008.0)),
        "a4" => Some((595.0, 842.0)),
        "a6" => Some((297.0, 420.0)),
        _ => None,
    }
}

fn pwg_dimensions(value: &str) -> Option<(f64, f64)> {
    let (numbers, points_per_unit) = if let Some(inches) = value.strip_suffix("in") {
        (inches, 72.0)
    } else if let Some(millimetres) = value.strip_suffix("mm") {
        (millimetres, 72.0 / 25.4)
    } else {
        return None;
    };
    let (width, height) = numbers.split_once('x')?;
    let width: f64 = width.parse().ok()?;
    let height: f64 = height.parse().ok()?;
    Some((width * points_per_unit, height * points_per_unit))
}

fn parse_dpi(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok().filter(|dpi| *dpi > 0)
}

/// `lp` prints "request id is <dest>-<n> (1 file(s))".
fn parse_request_id(output: &str) -> Option<String> {
    output
        .split("request id is ")
        .nth(1)?
        .split_whitespace()
        .next()
        .map(str::to_string)
}
