//! Label printing pipeline: image preparation, page placement, printer
//! discovery and job dispatch to the native spooler or a simulation backend.
//! 標籤列印流程：影像準備、頁面配置、印表機探索，以及送往原生佇列或模擬後端的作業派送。

pub mod artifact;
pub mod catalog;
pub mod controller;
pub mod cups;
pub mod job;
pub mod layout;
pub mod platform;
pub mod raster;
pub mod simulation;

pub use artifact::TemporaryArtifact;
pub use catalog::{DeviceCatalog, DeviceIdentity};
pub use controller::{DispatchError, PrintDispatcher};
pub use cups::CupsBackend;
pub use job::{DispatchState, JobReceipt, Orientation, ParseOrientationError, PrintRequest};
pub use layout::{compose_page, layout, render_placed, LayoutError, Placement, PrintableArea};
pub use platform::{
    select_backend, BackendChoice, BackendError, BackendKind, JobHandle, JobTicket, PlacedPage,
    PrintBackend,
};
#[cfg(feature = "svg")]
pub use raster::ResvgRenderer;
pub use raster::{
    is_vector, ColorMode, ImagePreparer, PrepareError, Prepared, PreparedRaster,
    VectorRenderError, VectorRenderer,
};
pub use simulation::{
    simulated_devices, SimulationBackend, DEFAULT_OUTPUT_DIR, DEFAULT_SIMULATED_AREA,
    SIMULATED_DEVICES,
};
