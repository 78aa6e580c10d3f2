use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::platform::{BackendError, BackendKind, PrintBackend};
use crate::simulation::simulated_devices;

static SIMULATION_NOTICE: OnceCell<()> = OnceCell::new();

/// Printer name as reported by an enumeration. A snapshot, not a live handle.
/// 列舉時回報的印表機名稱；僅為快照，並非即時控制代碼。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity {
    name: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Lists printers through the selected backend; never fails.
/// 透過選定的後端列出印表機，不會回傳錯誤。
///
/// A native enumeration error degrades to the fixed simulation catalog.
/// 原生列舉失敗時改用固定的模擬清單。
#[derive(Clone)]
pub struct DeviceCatalog {
    backend: Arc<dyn PrintBackend>,
}

impl fmt::Debug for DeviceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCatalog")
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl DeviceCatalog {
    pub fn new(backend: Arc<dyn PrintBackend>) -> Self {
        if backend.kind() == BackendKind::Simulation {
            SIMULATION_NOTICE.get_or_init(|| {
                info!("no native print spooler in use; serving simulated printers");
            });
        }
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn PrintBackend> {
        &self.backend
    }

    pub fn list_devices(&self) -> Vec<DeviceIdentity> {
        match self.backend.list_devices() {
            Ok(devices) => devices,
            Err(err) => {
                log_enumeration_failure(&err);
                simulated_devices()
            }
        }
    }

    /// Exact, case-sensitive match against a fresh enumeration.
    pub fn is_available(&self, name: &str) -> bool {
        !name.is_empty() && self.list_devices().iter().any(|device| device.name() == name)
    }
}

fn log_enumeration_failure(err: &BackendError) {
    error!(error = %err, "printer enumeration failed; falling back to simulated printers");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PrintableArea;
    use crate::platform::{JobHandle, JobTicket};
    use crate::simulation::{SimulationBackend, SIMULATED_DEVICES};

    struct UnreachableSpooler;

    impl PrintBackend for UnreachableSpooler {
        fn kind(&self) -> BackendKind {
            BackendKind::Native
        }

        fn list_devices(&self) -> Result<Vec<DeviceIdentity>, BackendError> {
            Err(BackendError::Unavailable("permission denied".into()))
        }

        fn printable_area(&self, _device: &str) -> Result<PrintableArea, BackendError> {
            Err(BackendError::Unavailable("permission denied".into()))
        }

        fn begin_job(&self, _ticket: &JobTicket) -> Result<Box<dyn JobHandle>, BackendError> {
            Err(BackendError::Unavailable("permission denied".into()))
        }
    }

    fn simulation_catalog() -> DeviceCatalog {
        DeviceCatalog::new(Arc::new(SimulationBackend::new("unused")))
    }

    #[test]
    fn availability_is_exact_match() {
        let catalog = simulation_catalog();
        assert!(catalog.is_available("DYMO LabelWriter 450"));
        assert!(!catalog.is_available("dymo labelwriter 450"));
        assert!(!catalog.is_available("DYMO LabelWriter"));
        assert!(!catalog.is_available(""));
    }

    #[test]
    fn every_listed_device_is_available() {
        let catalog = simulation_catalog();
        for device in catalog.list_devices() {
            assert!(catalog.is_available(device.name()));
        }
    }

    #[test]
    fn enumeration_failure_falls_back_to_simulation_list() {
        let catalog = DeviceCatalog::new(Arc::new(UnreachableSpooler));
        let names: Vec<_> = catalog
            .list_devices()
            .into_iter()
            .map(|device| device.name().to_string())
            .collect();
        assert_eq!(names, SIMULATED_DEVICES);
        assert!(catalog.is_available("Canon PIXMA"));
    }
}
