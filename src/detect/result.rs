use anyhow::{anyhow, Result};
use serde::Serialize;

/// Vehicle classes counted when no configuration overrides them.
pub const DEFAULT_VEHICLE_CLASSES: [&str; 4] = ["car", "motorcycle", "bus", "truck"];

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// True when every coordinate is finite and the box has positive area.
    pub fn is_proper(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    /// Clamp the box into a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let max_x = width as f32;
        let max_y = height as f32;
        Self {
            x1: self.x1.clamp(0.0, max_x),
            y1: self.y1.clamp(0.0, max_y),
            x2: self.x2.clamp(0.0, max_x),
            y2: self.y2.clamp(0.0, max_y),
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.width() * self.height() + other.width() * other.height() - inter;
        inter / union
    }
}

/// Raw model output before the vehicle-class filter.
///
/// `label` is whatever class name the model uses (COCO names for YOLO).
#[derive(Clone, Debug, PartialEq)]
pub struct ModelDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl ModelDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// One vehicle reported by the detector adapter.
///
/// `class_name` is a member of the configured vehicle class set and
/// `confidence` is in `0.0..=1.0`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    /// Text drawn next to the box: class and confidence to two decimals.
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class_name, self.confidence)
    }
}

/// Closed, ordered set of class names that are counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VehicleClasses {
    names: Vec<String>,
}

impl VehicleClasses {
    /// Build a class set. Names are trimmed and lowercased; order is kept and
    /// duplicates are dropped.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if name.is_empty() {
                return Err(anyhow!("vehicle class names cannot be empty"));
            }
            if name == "total" {
                return Err(anyhow!("'total' is reserved and cannot be a vehicle class"));
            }
            if !out.contains(&name) {
                out.push(name);
            }
        }
        if out.is_empty() {
            return Err(anyhow!("at least one vehicle class is required"));
        }
        Ok(Self { names: out })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for VehicleClasses {
    fn default() -> Self {
        Self {
            names: DEFAULT_VEHICLE_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
