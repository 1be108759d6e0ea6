//! Location and camera discovery.
//!
//! A [`TrafficDirectory`] answers two questions: which road locations exist,
//! and which cameras a location currently shows. Structurally invalid source
//! data is an error, never a guess.

pub mod onemotoring;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde::Serialize;

pub use onemotoring::OneMotoringDirectory;

/// A road segment with its own camera page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: String,
    pub name: String,
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Camera metadata as listed on a location page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawCameraRecord {
    pub description: String,
    pub timestamp_text: String,
    pub image_url: String,
}

impl RawCameraRecord {
    pub fn new(
        description: impl Into<String>,
        timestamp_text: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            timestamp_text: timestamp_text.into(),
            image_url: image_url.into(),
        }
    }
}

pub trait TrafficDirectory: Send + Sync {
    fn locations(&self) -> Result<Vec<Location>>;

    fn cameras(&self, location_id: &str) -> Result<Vec<RawCameraRecord>>;
}

/// Directory with fixed contents, editable between cycles.
///
/// A location registered without a camera list reports a fetch error for
/// its cameras. Clearing the location list makes discovery fail.
#[derive(Default)]
pub struct StaticDirectory {
    inner: Mutex<StaticContents>,
}

#[derive(Default)]
struct StaticContents {
    locations: Option<Vec<Location>>,
    cameras: HashMap<String, Vec<RawCameraRecord>>,
}

impl StaticDirectory {
    pub fn new(locations: Vec<Location>) -> Self {
        Self {
            inner: Mutex::new(StaticContents {
                locations: Some(locations),
                cameras: HashMap::new(),
            }),
        }
    }

    pub fn with_cameras(self, location_id: &str, cameras: Vec<RawCameraRecord>) -> Self {
        self.set_cameras(location_id, cameras);
        self
    }

    pub fn set_cameras(&self, location_id: &str, cameras: Vec<RawCameraRecord>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cameras.insert(location_id.to_string(), cameras);
        }
    }

    pub fn remove_cameras(&self, location_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cameras.remove(location_id);
        }
    }

    pub fn set_locations(&self, locations: Option<Vec<Location>>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.locations = locations;
        }
    }
}

impl TrafficDirectory for StaticDirectory {
    fn locations(&self) -> Result<Vec<Location>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("directory lock poisoned"))?
            .locations
            .clone()
            .ok_or_else(|| anyhow!("location index unavailable"))
    }

    fn cameras(&self, location_id: &str) -> Result<Vec<RawCameraRecord>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("directory lock poisoned"))?
            .cameras
            .get(location_id)
            .cloned()
            .ok_or_else(|| anyhow!("no camera page for location '{}'", location_id))
    }
}
