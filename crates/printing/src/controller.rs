use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, info_span};

use crate::artifact::TemporaryArtifact;
use crate::catalog::DeviceCatalog;
use crate::job::{DispatchState, JobReceipt, Orientation, PrintRequest};
use crate::layout::{layout, render_placed, LayoutError};
use crate::platform::{BackendError, JobTicket, PlacedPage, PrintBackend};
use crate::raster::{ImagePreparer, PrepareError, Prepared, PreparedRaster};

const TEST_PAGE_WIDTH: u32 = 200;
const TEST_PAGE_HEIGHT: u32 = 100;

/// Errors raised while dispatching one request.
/// 派送單一請求時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("printer '{0}' is not available")]
    DeviceUnavailable(String),
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    #[error("layout failed: {0}")]
    Layout(#[from] LayoutError),
    #[error("print backend failed: {0}")]
    Emit(#[from] BackendError),
}

impl DispatchError {
    /// State the request was in when it failed.
    pub fn state(&self) -> DispatchState {
        match self {
            DispatchError::DeviceUnavailable(_) => DispatchState::Validate,
            DispatchError::Prepare(_) => DispatchState::Prepare,
            DispatchError::Layout(_) => DispatchState::Layout,
            DispatchError::Emit(_) => DispatchState::Emit,
        }
    }
}

/// Runs print requests end to end against the selected backend.
/// 依選定的後端端到端執行列印請求。
///
/// Holds no per-request state, so one dispatcher can serve concurrent callers.
/// 不保存任何請求層級的狀態，可同時供多個呼叫端使用。
#[derive(Debug)]
pub struct PrintDispatcher {
    catalog: DeviceCatalog,
    preparer: ImagePreparer,
}

impl PrintDispatcher {
    pub fn new(backend: Arc<dyn PrintBackend>, preparer: ImagePreparer) -> Self {
        Self {
            catalog: DeviceCatalog::new(backend),
            preparer,
        }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Returns `true` once the backend accepted the job; failures are logged.
    pub fn print(&self, request: &PrintRequest) -> bool {
        match self.execute(request) {
            Ok(receipt) => {
                info!(
                    device = %receipt.device,
                    backend = %receipt.backend,
                    output = receipt.output.as_deref().unwrap_or("-"),
                    "print job completed"
                );
                true
            }
            Err(err) => {
                error!(
                    source = %request.source_path().display(),
                    device = request.device_name(),
                    state = %err.state(),
                    error = %err,
                    "print job failed"
                );
                false
            }
        }
    }

    /// Fallible form of [`print`](Self::print).
    pub fn execute(&self, request: &PrintRequest) -> Result<JobReceipt, DispatchError> {
        let span = info_span!(
            "print",
            device = request.device_name(),
            orientation = %request.orientation()
        );
        let _entered = span.enter();

        debug!(state = %DispatchState::Validate);
        if !self.catalog.is_available(request.device_name()) {
            return Err(DispatchError::DeviceUnavailable(
                request.device_name().to_string(),
            ));
        }

        debug!(state = %DispatchState::Prepare, source = %request.source_path().display());
        let Prepared { raster, artifact } = self.preparer.prepare(request.source_path())?;

        let outcome = self.layout_and_emit(request, &raster);

        debug!(state = %DispatchState::Cleanup);
        drop(raster);
        if let Some(artifact) = artifact {
            artifact.release();
        }

        debug!(state = %DispatchState::Done, success = outcome.is_ok());
        outcome
    }

    /// Prints a blank 200x100 page through the normal path as a health check.
    pub fn test_print(&self, device: &str) -> bool {
        let page = match write_test_page() {
            Ok(page) => page,
            Err(err) => {
                error!(error = %err, "failed to create test page");
                return false;
            }
        };
        let request = PrintRequest::new(page.path(), device, Orientation::Portrait);
        self.print(&request)
    }

    fn layout_and_emit(
        &self,
        request: &PrintRequest,
        raster: &PreparedRaster,
    ) -> Result<JobReceipt, DispatchError> {
        let backend = self.catalog.backend();
        let device = request.device_name();
        let orientation = request.orientation();

        debug!(state = %DispatchState::Layout);
        let area = backend.printable_area(device)?;
        let placement = layout(raster.pixel_width(), raster.pixel_height(), area, orientation)?;
        debug!(?area, ?placement, "label placed");

        debug!(state = %DispatchState::Emit, backend = %backend.kind());
        let ticket = JobTicket {
            device: device.to_string(),
            title: label_title(request.source_path()),
            orientation,
        };
        let mut job = backend.begin_job(&ticket)?;
        let page = PlacedPage {
            raster: render_placed(raster.pixels(), placement, orientation),
            placement,
            area,
        };
        if let Err(err) = job.blit(page) {
            job.abort(&err.to_string());
            return Err(err.into());
        }
        let output = job.finish()?;

        Ok(JobReceipt {
            device: ticket.device,
            backend: backend.kind(),
            placement,
            output,
        })
    }
}

fn label_title(source: &Path) -> String {
    source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "label".to_string())
}

fn write_test_page() -> Result<TemporaryArtifact, BackendError> {
    let page = TemporaryArtifact::create(".png")?;
    RgbImage::from_pixel(TEST_PAGE_WIDTH, TEST_PAGE_HEIGHT, Rgb([255, 255, 255]))
        .save_with_format(page.path(), ImageFormat::Png)?;
    Ok(page)
}
