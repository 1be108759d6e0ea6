//! Per-camera processing: acquire, detect, annotate, count.

use std::sync::Arc;

use crate::annotate::{AnnotationKey, FrameAnnotator};
use crate::counts::aggregate;
use crate::detect::{VehicleClasses, VehicleDetector};
use crate::directory::RawCameraRecord;
use crate::error::PipelineError;
use crate::ingest::ImageSource;
use crate::snapshot::EnrichedCameraRecord;

/// Where a camera sits within a cycle.
#[derive(Clone, Copy, Debug)]
pub struct CameraSlot<'a> {
    pub location_id: &'a str,
    pub camera_index: usize,
    pub cycle: u64,
}

/// Turns one raw camera record into an enriched record.
///
/// Any failure is returned for this camera alone; nothing is written to the
/// snapshot here.
pub struct CameraProcessor {
    images: Arc<dyn ImageSource>,
    detector: VehicleDetector,
    counted: VehicleClasses,
    annotator: FrameAnnotator,
}

impl CameraProcessor {
    pub fn new(
        images: Arc<dyn ImageSource>,
        detector: VehicleDetector,
        annotator: FrameAnnotator,
    ) -> Self {
        let counted = detector.classes().clone();
        Self {
            images,
            detector,
            counted,
            annotator,
        }
    }

    /// Count against `classes` instead of the detector's class set.
    ///
    /// A detection the detector lets through but `classes` lacks fails that
    /// camera with `UnknownVehicleClass`.
    pub fn with_counted_classes(mut self, classes: VehicleClasses) -> Self {
        self.counted = classes;
        self
    }

    pub fn process(
        &self,
        slot: CameraSlot<'_>,
        raw: &RawCameraRecord,
    ) -> Result<EnrichedCameraRecord, PipelineError> {
        let image = self
            .images
            .fetch(&raw.image_url)
            .map_err(|reason| PipelineError::ImageAcquisition {
                url: raw.image_url.clone(),
                reason,
            })?;
        let image = Arc::new(image);

        let detections = self.detector.detect(&image)?;
        let counts = aggregate(&self.counted, &detections)?;

        let key = AnnotationKey::new(slot.location_id, slot.camera_index);
        let annotated = self.annotator.annotate(&key, &image, &detections)?;

        log::debug!(
            "camera {}#{} counted {} vehicles ({} boxes drawn)",
            slot.location_id,
            slot.camera_index,
            counts.total(),
            annotated.boxes_drawn
        );

        Ok(EnrichedCameraRecord::from_raw(
            raw,
            slot.camera_index,
            counts,
            annotated.image_ref,
            slot.cycle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::InMemoryAnnotationStore;
    use crate::detect::{BoundingBox, ModelDetection, ScriptedBackend, VehicleClasses};
    use crate::ingest::StaticImageSource;
    use image::RgbImage;
    use std::time::Duration;

    const URL: &str = "https://images.test/cte/1.jpg";

    fn processor(backend: ScriptedBackend, images: StaticImageSource) -> CameraProcessor {
        let detector = VehicleDetector::spawn(
            Box::new(backend),
            VehicleClasses::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        CameraProcessor::new(
            Arc::new(images),
            detector,
            FrameAnnotator::new(Arc::new(InMemoryAnnotationStore::new())),
        )
    }

    fn slot() -> CameraSlot<'static> {
        CameraSlot {
            location_id: "cte",
            camera_index: 0,
            cycle: 7,
        }
    }

    #[test]
    fn enriches_record_with_counts_and_image_ref() {
        let backend = ScriptedBackend::fixed(vec![
            ModelDetection::new("car", 0.9, BoundingBox::new(5.0, 20.0, 40.0, 50.0)),
            ModelDetection::new("car", 0.8, BoundingBox::new(50.0, 20.0, 90.0, 50.0)),
            ModelDetection::new("bus", 0.7, BoundingBox::new(100.0, 20.0, 150.0, 70.0)),
            ModelDetection::new("person", 0.95, BoundingBox::new(2.0, 2.0, 6.0, 18.0)),
        ]);
        let images = StaticImageSource::new().with_frame(URL, RgbImage::new(160, 90));
        let raw = RawCameraRecord::new("Braddell Flyover", "10:20", URL);

        let record = processor(backend, images).process(slot(), &raw).unwrap();
        assert_eq!(record.vehicle_counts.get("car"), Some(2));
        assert_eq!(record.vehicle_counts.get("bus"), Some(1));
        assert_eq!(record.vehicle_counts.total(), 3);
        assert_eq!(record.annotated_image_ref, "cte_0.jpg");
        assert_eq!(record.description, "Braddell Flyover");
        assert_eq!(record.cycle, 7);
    }

    #[test]
    fn unreachable_image_is_acquisition_failure() {
        let backend = ScriptedBackend::fixed(Vec::new());
        let raw = RawCameraRecord::new("offline", "-", URL);
        let err = processor(backend, StaticImageSource::new())
            .process(slot(), &raw)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ImageAcquisition { .. }));
    }

    #[test]
    fn detection_outside_counted_classes_fails_the_camera() {
        let backend = ScriptedBackend::fixed(vec![ModelDetection::new(
            "truck",
            0.8,
            BoundingBox::new(5.0, 5.0, 60.0, 40.0),
        )]);
        let images = StaticImageSource::new().with_frame(URL, RgbImage::new(80, 60));
        let raw = RawCameraRecord::new("Braddell Flyover", "10:20", URL);
        let counted = VehicleClasses::new(["car", "bus"]).unwrap();

        let err = processor(backend, images)
            .with_counted_classes(counted)
            .process(slot(), &raw)
            .unwrap_err();
        match err {
            PipelineError::UnknownVehicleClass { class_name } => assert_eq!(class_name, "truck"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
