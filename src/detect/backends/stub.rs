use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::ModelDetection;

/// Backend that never detects anything.
///
/// Used when no model is configured so the rest of the pipeline (image
/// acquisition, annotation, publication) still runs end to end.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<ModelDetection>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_reports_nothing() {
        let mut backend = StubBackend::new();
        let image = RgbImage::new(8, 8);
        assert!(backend.detect(&image).unwrap().is_empty());
        assert_eq!(backend.name(), "stub");
    }
}
