//! Vehicle detection.
//!
//! - `backend`: the [`DetectorBackend`] capability wrapping one inference runtime
//! - `backends`: stub, scripted and (feature `backend-tract`) YOLOv8 ONNX backends
//! - `adapter`: [`VehicleDetector`], which runs a backend off-thread with a
//!   timeout and restricts its output to the vehicle class set

mod adapter;
mod backend;
pub mod backends;
mod result;

use anyhow::{anyhow, Result};

pub use adapter::VehicleDetector;
pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, ScriptedReply, StubBackend};
pub use result::{BoundingBox, Detection, ModelDetection, VehicleClasses, DEFAULT_VEHICLE_CLASSES};

use crate::config::DetectorSettings;

/// Build the backend named in the configuration.
pub fn backend_from_settings(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => {
            log::warn!("detector backend 'stub' selected; every camera will count zero vehicles");
            Ok(Box::new(StubBackend::new()))
        }
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let backend = backends::TractBackend::new(&settings.model_path, settings.input_size)?
                .with_thresholds(settings.confidence_threshold, settings.iou_threshold);
            Ok(Box::new(backend))
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(anyhow!(
            "detector backend 'tract' requires the backend-tract feature"
        )),
        other => Err(anyhow!(
            "unknown detector backend '{}'; expected 'stub' or 'tract'",
            other
        )),
    }
}
