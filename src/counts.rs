//! Reduction of detections to per-class vehicle counts.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::detect::{Detection, VehicleClasses};
use crate::error::PipelineError;

/// Count per vehicle class plus their total.
///
/// Every class of the set is present, in set order, even when zero.
/// `total` always equals the sum of the per-class counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VehicleCounts {
    counts: Vec<(String, u32)>,
    total: u32,
}

impl VehicleCounts {
    /// All-zero counts for `classes`.
    pub fn zero(classes: &VehicleClasses) -> Self {
        Self {
            counts: classes.names().iter().map(|c| (c.clone(), 0)).collect(),
            total: 0,
        }
    }

    pub fn get(&self, class_name: &str) -> Option<u32> {
        self.counts
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, count)| *count)
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

/// Serialises as `{"car": 2, "motorcycle": 0, ..., "total": 3}`.
impl Serialize for VehicleCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len() + 1))?;
        for (name, count) in &self.counts {
            map.serialize_entry(name, count)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

/// Count `detections` by class.
///
/// A detection outside `classes` means the detector's filter is broken; it
/// fails the whole aggregation rather than being dropped or counted.
pub fn aggregate(
    classes: &VehicleClasses,
    detections: &[Detection],
) -> Result<VehicleCounts, PipelineError> {
    let mut counts = VehicleCounts::zero(classes);
    for det in detections {
        let idx = classes
            .position(&det.class_name)
            .ok_or_else(|| PipelineError::UnknownVehicleClass {
                class_name: det.class_name.clone(),
            })?;
        counts.counts[idx].1 += 1;
    }
    counts.total = counts.counts.iter().map(|(_, count)| count).sum();
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(class: &str) -> Detection {
        Detection::new(class, 0.5, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn empty_detections_give_all_zero_counts() {
        let counts = aggregate(&VehicleClasses::default(), &[]).unwrap();
        assert_eq!(counts.total(), 0);
        for class in ["car", "motorcycle", "bus", "truck"] {
            assert_eq!(counts.get(class), Some(0));
        }
    }

    #[test]
    fn two_cars_and_a_bus() {
        let counts =
            aggregate(&VehicleClasses::default(), &[det("car"), det("bus"), det("car")]).unwrap();
        assert_eq!(counts.get("car"), Some(2));
        assert_eq!(counts.get("motorcycle"), Some(0));
        assert_eq!(counts.get("bus"), Some(1));
        assert_eq!(counts.get("truck"), Some(0));
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn total_matches_sum_for_mixed_lists() {
        let classes = VehicleClasses::default();
        let pool = ["car", "motorcycle", "bus", "truck"];
        for n in 0..40usize {
            let detections: Vec<Detection> = (0..n).map(|i| det(pool[(i * 7 + n) % 4])).collect();
            let counts = aggregate(&classes, &detections).unwrap();
            let sum: u32 = counts.iter().map(|(_, c)| c).sum();
            assert_eq!(counts.total(), sum);
            assert_eq!(counts.total() as usize, n);
        }
    }

    #[test]
    fn unknown_class_fails_loudly() {
        let err = aggregate(&VehicleClasses::default(), &[det("car"), det("person")]).unwrap_err();
        match err {
            PipelineError::UnknownVehicleClass { class_name } => assert_eq!(class_name, "person"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn serialises_with_total_last() {
        let counts = aggregate(&VehicleClasses::default(), &[det("truck")]).unwrap();
        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(
            json,
            r#"{"car":0,"motorcycle":0,"bus":0,"truck":1,"total":1}"#
        );
    }
}
