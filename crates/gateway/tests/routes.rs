use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use image::{Rgb, RgbImage};
use labelbridge_gateway::{build_router, AppState};
use labelbridge_printing::{ImagePreparer, PrintDispatcher, SimulationBackend, SIMULATED_DEVICES};
use labelbridge_settings::{AppConfig, ConfigStore, ReloadingResolver};
use serde_json::Value;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

struct Harness {
    dir: TempDir,
    config: AppConfig,
}

impl Harness {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let label = dir.path().join("shipping.png");
        RgbImage::from_pixel(400, 200, Rgb([0, 0, 0]))
            .save(&label)
            .expect("write label");

        let mut config = AppConfig::default();
        config.selected_printer = SIMULATED_DEVICES[1].to_string();
        config.button_mappings.insert("1".into(), label);
        config
            .button_mappings
            .insert("2".into(), dir.path().join("missing.png"));
        Self { dir, config }
    }

    fn output_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("mock_prints")
    }

    fn router(&self) -> Router {
        let backend = SimulationBackend::new(self.output_dir());
        let dispatcher = PrintDispatcher::new(Arc::new(backend), ImagePreparer::new());
        let state = AppState::new(dispatcher, Arc::new(self.config.clone()))
            .with_print_timeout(Duration::from_secs(10));
        build_router(state)
    }
}

async fn call(router: Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn artifacts(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn health_and_index_respond() {
    let harness = Harness::new();

    let (status, body) = call(harness.router(), Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(harness.router(), Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Label Printer Automation API");
    assert_eq!(body["endpoints"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn status_reports_printer_and_button_count() {
    let harness = Harness::new();
    let (status, body) = call(harness.router(), Method::GET, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "running");
    assert_eq!(body["printer"], SIMULATED_DEVICES[1]);
    assert_eq!(body["button_count"], 2);
}

#[tokio::test]
async fn unmapped_button_is_not_found() {
    let harness = Harness::new();
    let (status, body) = call(harness.router(), Method::POST, "/print/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Button ID \"99\" not configured");
}

#[tokio::test]
async fn missing_printer_selection_is_a_server_error() {
    let mut harness = Harness::new();
    harness.config.selected_printer.clear();
    let (status, body) = call(harness.router(), Method::GET, "/print/1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "No printer selected");
    assert!(artifacts(&harness.output_dir()).is_empty());
}

#[tokio::test]
async fn failed_print_is_a_server_error() {
    let harness = Harness::new();
    let (status, body) = call(harness.router(), Method::GET, "/print/2").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .is_some_and(|error| error.starts_with("Failed to print label")));
}

#[tokio::test]
async fn mapped_button_prints_through_simulation() {
    let harness = Harness::new();
    let (status, body) = call(harness.router(), Method::POST, "/print/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Print job sent for button 1");
    assert_eq!(body["printer"], SIMULATED_DEVICES[1]);

    let written = artifacts(&harness.output_dir());
    assert_eq!(written.len(), 1);
    assert!(written[0].starts_with("shipping_printed_"));
    assert!(written[0].ends_with("_portrait.png"));
}

#[tokio::test]
async fn orientation_query_overrides_default() {
    let harness = Harness::new();
    let (status, _) = call(
        harness.router(),
        Method::GET,
        "/print/1?orientation=landscape",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let written = artifacts(&harness.output_dir());
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("_landscape.png"));
}

#[tokio::test]
async fn unknown_orientation_is_rejected() {
    let harness = Harness::new();
    let (status, _) = call(harness.router(), Method::GET, "/print/1?orientation=diagonal").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(artifacts(&harness.output_dir()).is_empty());
}

#[tokio::test]
async fn orientation_query_ignores_case() {
    let harness = Harness::new();
    let (status, _) = call(
        harness.router(),
        Method::GET,
        "/print/1?orientation=Landscape",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let written = artifacts(&harness.output_dir());
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("_landscape.png"));
}

#[tokio::test]
async fn config_edits_apply_without_restart() {
    let harness = Harness::new();
    let path = harness.dir.path().join("config.json");
    let mut store = ConfigStore::new(path.clone(), AppConfig::default());
    store.save().expect("initial save");

    let backend = SimulationBackend::new(harness.output_dir());
    let dispatcher = PrintDispatcher::new(Arc::new(backend), ImagePreparer::new());
    let resolver = ReloadingResolver::open(&path).expect("open config");
    let router = build_router(AppState::new(dispatcher, Arc::new(resolver)));

    let (status, _) = call(router.clone(), Method::POST, "/print/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    store
        .set_selected_printer(SIMULATED_DEVICES[1])
        .expect("select printer");
    store
        .add_mapping("1", harness.dir.path().join("shipping.png"))
        .expect("map button");

    let (status, body) = call(router.clone(), Method::POST, "/print/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["printer"], SIMULATED_DEVICES[1]);
    assert_eq!(artifacts(&harness.output_dir()).len(), 1);

    let (_, body) = call(router, Method::GET, "/status").await;
    assert_eq!(body["button_count"], 1);
}
