use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotate::DEFAULT_STATIC_DIR;
use crate::detect::{VehicleClasses, DEFAULT_VEHICLE_CLASSES};
use crate::directory::onemotoring::{DEFAULT_CAMERA_PAGE_BASE, DEFAULT_INDEX_URL};

const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_REFRESH_SECS: u64 = 300;
const DEFAULT_CAMERA_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug, Deserialize, Default)]
struct TrafficConfigFile {
    refresh_secs: Option<u64>,
    camera_timeout_secs: Option<u64>,
    vehicle_classes: Option<Vec<String>>,
    static_dir: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    index_url: Option<String>,
    camera_page_base: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct TrafficConfig {
    pub api_addr: String,
    pub refresh_interval: Duration,
    pub camera_timeout: Duration,
    pub vehicle_classes: Vec<String>,
    pub static_dir: PathBuf,
    pub source: SourceSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub index_url: String,
    pub camera_page_base: String,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl TrafficConfig {
    /// Load from `TRAFFIC_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRAFFIC_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The validated vehicle class set.
    pub fn classes(&self) -> Result<VehicleClasses> {
        VehicleClasses::new(self.vehicle_classes.iter())
    }

    fn from_file(file: TrafficConfigFile) -> Self {
        let source = SourceSettings {
            index_url: file
                .source
                .as_ref()
                .and_then(|source| source.index_url.clone())
                .unwrap_or_else(|| DEFAULT_INDEX_URL.to_string()),
            camera_page_base: file
                .source
                .as_ref()
                .and_then(|source| source.camera_page_base.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_PAGE_BASE.to_string()),
        };
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            model_path: detector_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: detector_file.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            iou_threshold: detector_file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
        };
        Self {
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            refresh_interval: Duration::from_secs(
                file.refresh_secs.unwrap_or(DEFAULT_REFRESH_SECS),
            ),
            camera_timeout: Duration::from_secs(
                file.camera_timeout_secs
                    .unwrap_or(DEFAULT_CAMERA_TIMEOUT_SECS),
            ),
            vehicle_classes: file.vehicle_classes.unwrap_or_else(|| {
                DEFAULT_VEHICLE_CLASSES
                    .iter()
                    .map(|class| class.to_string())
                    .collect()
            }),
            static_dir: file
                .static_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            source,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("TRAFFIC_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(secs) = std::env::var("TRAFFIC_REFRESH_SECS") {
            self.refresh_interval = Duration::from_secs(parse_secs("TRAFFIC_REFRESH_SECS", &secs)?);
        }
        if let Ok(secs) = std::env::var("TRAFFIC_CAMERA_TIMEOUT_SECS") {
            self.camera_timeout =
                Duration::from_secs(parse_secs("TRAFFIC_CAMERA_TIMEOUT_SECS", &secs)?);
        }
        if let Ok(classes) = std::env::var("TRAFFIC_VEHICLE_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.vehicle_classes = parsed;
            }
        }
        if let Ok(dir) = std::env::var("TRAFFIC_STATIC_DIR") {
            if !dir.trim().is_empty() {
                self.static_dir = PathBuf::from(dir);
            }
        }
        if let Ok(backend) = std::env::var("TRAFFIC_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("TRAFFIC_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var("TRAFFIC_INDEX_URL") {
            if !url.trim().is_empty() {
                self.source.index_url = url;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(anyhow!("refresh interval must be greater than zero"));
        }
        if self.camera_timeout.is_zero() {
            return Err(anyhow!("camera timeout must be greater than zero"));
        }
        self.vehicle_classes = self.classes()?.names().to_vec();

        let confidence = self.detector.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                confidence
            ));
        }
        let iou = self.detector.iou_threshold;
        if !(0.0..=1.0).contains(&iou) {
            return Err(anyhow!("IoU threshold must be within [0, 1], got {}", iou));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<TrafficConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_secs(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of seconds", var))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
