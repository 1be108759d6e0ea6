//! Published dataset and the store readers take it from.
//!
//! A [`Snapshot`] is assembled privately by the refresh coordinator and
//! then handed to [`SnapshotStore::publish`], which swaps one pointer.
//! Readers load that pointer without locking and keep their `Arc` for as
//! long as they render, so they always see one whole cycle.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::counts::VehicleCounts;
use crate::directory::{Location, RawCameraRecord};

/// One camera after detection, annotation and counting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnrichedCameraRecord {
    pub description: String,
    pub timestamp_text: String,
    pub image_url: String,
    pub vehicle_counts: VehicleCounts,
    pub annotated_image_ref: String,
    pub camera_index: usize,
    pub cycle: u64,
}

impl EnrichedCameraRecord {
    pub fn from_raw(
        raw: &RawCameraRecord,
        camera_index: usize,
        vehicle_counts: VehicleCounts,
        annotated_image_ref: String,
        cycle: u64,
    ) -> Self {
        Self {
            description: raw.description.clone(),
            timestamp_text: raw.timestamp_text.clone(),
            image_url: raw.image_url.clone(),
            vehicle_counts,
            annotated_image_ref,
            camera_index,
            cycle,
        }
    }
}

/// A location and its cameras as processed in one cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocationEntry {
    pub location: Location,
    pub cameras: Vec<EnrichedCameraRecord>,
}

/// Something a cycle had to leave out.
///
/// `camera_index` is `None` when the whole location was skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CycleGap {
    pub location_id: String,
    pub camera_index: Option<usize>,
    pub kind: String,
    pub reason: String,
}

/// Complete dataset of one refresh cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub cycle: u64,
    pub published_at: DateTime<Local>,
    pub locations: Vec<LocationEntry>,
    pub gaps: Vec<CycleGap>,
}

impl Snapshot {
    /// Cameras of `location_id`; `None` when the location is not in this cycle.
    pub fn cameras(&self, location_id: &str) -> Option<&[EnrichedCameraRecord]> {
        self.locations
            .iter()
            .find(|entry| entry.location.id == location_id)
            .map(|entry| entry.cameras.as_slice())
    }

    pub fn camera_count(&self) -> usize {
        self.locations.iter().map(|entry| entry.cameras.len()).sum()
    }

    /// True when every record was produced by this snapshot's cycle.
    pub fn is_coherent(&self) -> bool {
        self.locations
            .iter()
            .flat_map(|entry| &entry.cameras)
            .all(|camera| camera.cycle == self.cycle)
    }
}

/// Holder of the current snapshot.
///
/// Single writer (the refresh coordinator), any number of readers. Before
/// the first publication there is no snapshot.
#[derive(Default)]
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published snapshot, or `None` before the first
    /// cycle completes.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    pub fn last_updated(&self) -> Option<DateTime<Local>> {
        self.current.load().as_ref().map(|snapshot| snapshot.published_at)
    }

    /// Replace the current snapshot. The previous one is released once the
    /// last reader holding it lets go.
    pub(crate) fn publish(&self, snapshot: Snapshot) {
        self.current.store(Some(Arc::new(snapshot)));
    }
}
