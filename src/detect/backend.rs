use anyhow::Result;
use image::RgbImage;

use crate::detect::result::ModelDetection;

/// Detector backend trait.
///
/// A backend wraps one inference runtime. It reports every object the model
/// recognises under the model's own class names; filtering to vehicle
/// classes happens in [`crate::detect::VehicleDetector`], not here.
///
/// `detect` takes `&mut self` because most runtimes keep scratch buffers.
/// The adapter owns the backend on a single inference thread, so
/// implementations never see concurrent calls.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on a decoded RGB image.
    ///
    /// Boxes are in pixel coordinates of `image`. Confidences are reported
    /// as produced by the model.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<ModelDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
