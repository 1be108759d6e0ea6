use anyhow::Result;
use image::RgbImage;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use trafficcam::annotate::InMemoryAnnotationStore;
use trafficcam::api::{ApiConfig, ApiHandle, ApiServer};
use trafficcam::detect::{BoundingBox, ModelDetection, ScriptedBackend};
use trafficcam::directory::StaticDirectory;
use trafficcam::ingest::StaticImageSource;
use trafficcam::{
    AnnotationStore, CameraProcessor, FrameAnnotator, Location, RawCameraRecord,
    RefreshCoordinator, SnapshotStore, VehicleClasses, VehicleDetector,
};

const CAMERA_URL: &str = "https://images.test/cte/0.jpg";

fn request(handle: &ApiHandle, method: &str, path: &str) -> Result<(String, Vec<u8>)> {
    let mut stream = TcpStream::connect(handle.addr)?;
    let request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    stream.write_all(request.as_bytes())?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(response.len());
    let headers = String::from_utf8_lossy(&response[..split]).to_string();
    let body = response.get(split + 4..).unwrap_or_default().to_vec();
    Ok((headers, body))
}

fn get_json(handle: &ApiHandle, path: &str) -> Result<(String, Value)> {
    let (headers, body) = request(handle, "GET", path)?;
    Ok((headers, serde_json::from_slice(&body)?))
}

struct TestApi {
    coordinator: RefreshCoordinator,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new() -> Result<Self> {
        let annotations: Arc<dyn AnnotationStore> = Arc::new(InMemoryAnnotationStore::new());
        let directory = StaticDirectory::new(vec![Location::new("cte", "CTE")]).with_cameras(
            "cte",
            vec![RawCameraRecord::new("Braddell Flyover", "10:20", CAMERA_URL)],
        );
        let images = StaticImageSource::new().with_frame(CAMERA_URL, RgbImage::new(120, 80));
        let backend = ScriptedBackend::fixed(vec![ModelDetection::new(
            "truck",
            0.88,
            BoundingBox::new(10.0, 20.0, 80.0, 70.0),
        )]);
        let detector = VehicleDetector::spawn(
            Box::new(backend),
            VehicleClasses::default(),
            Duration::from_secs(5),
        )?;
        let processor = CameraProcessor::new(
            Arc::new(images),
            detector,
            FrameAnnotator::new(annotations.clone()),
        );
        let store = Arc::new(SnapshotStore::new());
        let coordinator = RefreshCoordinator::new(Arc::new(directory), processor, store.clone());

        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let api_handle = ApiServer::new(api_config, store, annotations).spawn()?;

        Ok(Self {
            coordinator,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn snapshot_is_unavailable_before_first_cycle() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, body) = get_json(api.handle(), "/api/snapshot")?;
    assert!(headers.contains("503 Service Unavailable"));
    assert_eq!(body["error"], "not_yet_available");

    let (headers, body) = get_json(api.handle(), "/api/last-updated")?;
    assert!(headers.contains("200 OK"));
    assert!(body["last_updated"].is_null());

    let (headers, page) = request(api.handle(), "GET", "/")?;
    assert!(headers.contains("text/html"));
    assert!(String::from_utf8_lossy(&page).contains("First refresh in progress"));

    Ok(())
}

#[test]
fn serves_published_snapshot_and_annotated_image() -> Result<()> {
    let api = TestApi::new()?;
    api.coordinator.run_cycle()?;

    let (headers, body) = get_json(api.handle(), "/api/snapshot")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Cache-Control: no-store"));
    assert_eq!(body["cycle"], 1);
    let camera = &body["locations"][0]["cameras"][0];
    assert_eq!(body["locations"][0]["location"]["id"], "cte");
    assert_eq!(camera["vehicle_counts"]["truck"], 1);
    assert_eq!(camera["vehicle_counts"]["total"], 1);
    assert_eq!(camera["annotated_image_ref"], "cte_0.jpg");

    let (_, body) = get_json(api.handle(), "/api/last-updated")?;
    assert!(body["last_updated"].is_string());

    let (headers, jpeg) = request(api.handle(), "GET", "/static/cte_0.jpg")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("image/jpeg"));
    assert!(image::load_from_memory(&jpeg).is_ok());

    let (_, page) = request(api.handle(), "GET", "/")?;
    let page = String::from_utf8_lossy(&page);
    assert!(page.contains("Braddell Flyover"));
    assert!(page.contains("/static/cte_0.jpg"));

    Ok(())
}

#[test]
fn rejects_unknown_paths_and_methods() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, _) = request(api.handle(), "GET", "/events")?;
    assert!(headers.contains("404 Not Found"));

    let (headers, _) = request(api.handle(), "GET", "/static/../Cargo.toml")?;
    assert!(headers.contains("404 Not Found"));

    let (headers, _) = request(api.handle(), "GET", "/static/pie_9.jpg")?;
    assert!(headers.contains("404 Not Found"));

    let (headers, _) = request(api.handle(), "POST", "/api/snapshot")?;
    assert!(headers.contains("405 Method Not Allowed"));

    let (headers, body) = get_json(api.handle(), "/health")?;
    assert!(headers.contains("200 OK"));
    assert_eq!(body["status"], "ok");

    Ok(())
}
