//! Failure taxonomy of the refresh pipeline.
//!
//! Every failure is scoped to the smallest unit it affects. A camera-scoped
//! failure drops that camera from the cycle, a location-scoped failure drops
//! that location, and only cycle-scoped failures prevent publication.

/// How much of a cycle a failure invalidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureScope {
    Camera,
    Location,
    Cycle,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("location discovery failed: {0:#}")]
    LocationFetch(anyhow::Error),

    #[error("camera list for location '{location_id}' unavailable: {reason:#}")]
    CameraListFetch {
        location_id: String,
        reason: anyhow::Error,
    },

    #[error("image acquisition from {url} failed: {reason:#}")]
    ImageAcquisition { url: String, reason: anyhow::Error },

    #[error("vehicle detection failed: {0:#}")]
    Detection(anyhow::Error),

    #[error("detection carried class '{class_name}' outside the vehicle class set")]
    UnknownVehicleClass { class_name: String },

    #[error("annotated image could not be stored: {0:#}")]
    Annotation(anyhow::Error),

    #[error("cycle cancelled by shutdown")]
    Cancelled,
}

impl PipelineError {
    pub fn scope(&self) -> FailureScope {
        match self {
            PipelineError::LocationFetch(_) | PipelineError::Cancelled => FailureScope::Cycle,
            PipelineError::CameraListFetch { .. } => FailureScope::Location,
            PipelineError::ImageAcquisition { .. }
            | PipelineError::Detection(_)
            | PipelineError::UnknownVehicleClass { .. }
            | PipelineError::Annotation(_) => FailureScope::Camera,
        }
    }

    /// Short machine-readable tag, used in gap records and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::LocationFetch(_) => "location_fetch",
            PipelineError::CameraListFetch { .. } => "camera_list_fetch",
            PipelineError::ImageAcquisition { .. } => "image_acquisition",
            PipelineError::Detection(_) => "detection",
            PipelineError::UnknownVehicleClass { .. } => "unknown_vehicle_class",
            PipelineError::Annotation(_) => "annotation",
            PipelineError::Cancelled => "cancelled",
        }
    }
}
