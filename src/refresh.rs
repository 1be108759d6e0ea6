//! Refresh coordinator: one cycle over every location and camera.
//!
//! A cycle walks `FetchingLocations -> ProcessingCameras -> Publishing` and
//! returns to `Idle`. The next snapshot is assembled in a local workspace and
//! handed to the store in a single publish; failures are scoped to the
//! smallest unit (camera, then location) and recorded as gaps.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Serialize;

use crate::directory::{Location, TrafficDirectory};
use crate::error::{FailureScope, PipelineError};
use crate::processor::{CameraProcessor, CameraSlot};
use crate::snapshot::{CycleGap, LocationEntry, Snapshot, SnapshotStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    FetchingLocations,
    ProcessingCameras,
    Publishing,
}

impl CycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CycleState::FetchingLocations,
            2 => CycleState::ProcessingCameras,
            3 => CycleState::Publishing,
            _ => CycleState::Idle,
        }
    }
}

/// Summary of a published cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub locations: usize,
    pub cameras: usize,
    pub gaps: Vec<CycleGap>,
    pub elapsed_ms: u128,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Published(CycleReport),
    /// Another caller holds the cycle; nothing was done.
    AlreadyRunning,
}

pub struct RefreshCoordinator {
    directory: Arc<dyn TrafficDirectory>,
    processor: CameraProcessor,
    store: Arc<SnapshotStore>,
    in_flight: AtomicBool,
    state: AtomicU8,
    cycles: AtomicU64,
    shutdown: Option<Arc<AtomicBool>>,
}

/// Releases the single-flight flag and resets the state on every exit path.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.coordinator.set_state(CycleState::Idle);
        self.coordinator.in_flight.store(false, Ordering::SeqCst);
    }
}

impl RefreshCoordinator {
    pub fn new(
        directory: Arc<dyn TrafficDirectory>,
        processor: CameraProcessor,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            directory,
            processor,
            store,
            in_flight: AtomicBool::new(false),
            state: AtomicU8::new(CycleState::Idle as u8),
            cycles: AtomicU64::new(0),
            shutdown: None,
        }
    }

    /// Abandon a running cycle, without publishing, once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn state(&self) -> CycleState {
        CycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of cycles started so far.
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: CycleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Run one full cycle and publish its snapshot.
    ///
    /// Returns `AlreadyRunning` immediately when a cycle is in flight. A
    /// `LocationFetch` or `Cancelled` error leaves the current snapshot in
    /// place.
    pub fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("refresh already in flight; not starting another");
            return Ok(CycleOutcome::AlreadyRunning);
        }
        let _guard = InFlight { coordinator: self };
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        self.set_state(CycleState::FetchingLocations);
        let locations = self.directory.locations().map_err(|err| {
            log::error!("cycle {}: location discovery failed: {:#}", cycle, err);
            PipelineError::LocationFetch(err)
        })?;
        log::info!("cycle {}: refreshing {} locations", cycle, locations.len());

        self.set_state(CycleState::ProcessingCameras);
        let mut entries = Vec::with_capacity(locations.len());
        let mut gaps = Vec::new();
        for location in locations {
            if self.cancelled() {
                log::info!("cycle {}: shutdown requested, abandoning", cycle);
                return Err(PipelineError::Cancelled);
            }
            if let Some(entry) = self.process_location(cycle, location, &mut gaps)? {
                entries.push(entry);
            }
        }

        self.set_state(CycleState::Publishing);
        let snapshot = Snapshot {
            cycle,
            published_at: Local::now(),
            locations: entries,
            gaps,
        };
        let report = CycleReport {
            cycle,
            locations: snapshot.locations.len(),
            cameras: snapshot.camera_count(),
            gaps: snapshot.gaps.clone(),
            elapsed_ms: started.elapsed().as_millis(),
        };
        self.store.publish(snapshot);
        log::info!(
            "cycle {} published: {} locations, {} cameras, {} gaps in {:?}",
            cycle,
            report.locations,
            report.cameras,
            report.gaps.len(),
            Duration::from_millis(report.elapsed_ms as u64)
        );
        Ok(CycleOutcome::Published(report))
    }

    fn process_location(
        &self,
        cycle: u64,
        location: Location,
        gaps: &mut Vec<CycleGap>,
    ) -> Result<Option<LocationEntry>, PipelineError> {
        let records = match self.directory.cameras(&location.id) {
            Ok(records) => records,
            Err(reason) => {
                let err = PipelineError::CameraListFetch {
                    location_id: location.id.clone(),
                    reason,
                };
                self.absorb(cycle, &location.id, None, err, gaps)?;
                return Ok(None);
            }
        };

        let mut cameras = Vec::with_capacity(records.len());
        for (camera_index, raw) in records.iter().enumerate() {
            if self.cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let slot = CameraSlot {
                location_id: &location.id,
                camera_index,
                cycle,
            };
            match self.processor.process(slot, raw) {
                Ok(record) => cameras.push(record),
                Err(err) => self.absorb(cycle, &location.id, Some(camera_index), err, gaps)?,
            }
        }
        Ok(Some(LocationEntry { location, cameras }))
    }

    /// Record a camera- or location-scoped failure as a gap; a cycle-scoped
    /// one is handed back to abort the cycle.
    fn absorb(
        &self,
        cycle: u64,
        location_id: &str,
        camera_index: Option<usize>,
        err: PipelineError,
        gaps: &mut Vec<CycleGap>,
    ) -> Result<(), PipelineError> {
        let unit = match camera_index {
            Some(idx) => format!("camera {}#{}", location_id, idx),
            None => format!("location {}", location_id),
        };
        match err.scope() {
            FailureScope::Cycle => return Err(err),
            FailureScope::Camera | FailureScope::Location => {
                let level = match err {
                    PipelineError::UnknownVehicleClass { .. } => log::Level::Error,
                    _ => log::Level::Warn,
                };
                log::log!(level, "cycle {}: skipping {}: {:#}", cycle, unit, err);
            }
        }
        gaps.push(gap(location_id, camera_index, &err));
        Ok(())
    }
}

fn gap(location_id: &str, camera_index: Option<usize>, err: &PipelineError) -> CycleGap {
    CycleGap {
        location_id: location_id.to_string(),
        camera_index,
        kind: err.kind().to_string(),
        reason: format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{FrameAnnotator, InMemoryAnnotationStore};
    use crate::detect::{ScriptedBackend, VehicleClasses, VehicleDetector};
    use crate::directory::{RawCameraRecord, StaticDirectory};
    use crate::ingest::StaticImageSource;
    use image::RgbImage;

    fn coordinator(directory: StaticDirectory, images: StaticImageSource) -> RefreshCoordinator {
        let detector = VehicleDetector::spawn(
            Box::new(ScriptedBackend::fixed(Vec::new())),
            VehicleClasses::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        let processor = CameraProcessor::new(
            Arc::new(images),
            detector,
            FrameAnnotator::new(Arc::new(InMemoryAnnotationStore::new())),
        );
        RefreshCoordinator::new(Arc::new(directory), processor, Arc::new(SnapshotStore::new()))
    }

    #[test]
    fn state_returns_to_idle_after_cycle() {
        let directory = StaticDirectory::new(vec![Location::new("cte", "CTE")])
            .with_cameras("cte", Vec::new());
        let coordinator = coordinator(directory, StaticImageSource::new());
        assert_eq!(coordinator.state(), CycleState::Idle);
        let outcome = coordinator.run_cycle().unwrap();
        assert!(matches!(outcome, CycleOutcome::Published(ref r) if r.cycle == 1));
        assert_eq!(coordinator.state(), CycleState::Idle);
        assert_eq!(coordinator.cycles_started(), 1);
    }

    #[test]
    fn location_without_camera_page_becomes_gap() {
        let url = "https://img.test/pie/0.jpg";
        let directory = StaticDirectory::new(vec![
            Location::new("cte", "CTE"),
            Location::new("pie", "PIE"),
        ])
        .with_cameras("pie", vec![RawCameraRecord::new("a", "b", url)]);
        let images = StaticImageSource::new().with_frame(url, RgbImage::new(32, 32));
        let coordinator = coordinator(directory, images);

        coordinator.run_cycle().unwrap();
        let snapshot = coordinator.store().current_snapshot().unwrap();
        assert!(snapshot.cameras("cte").is_none());
        assert_eq!(snapshot.cameras("pie").unwrap().len(), 1);
        assert_eq!(snapshot.gaps.len(), 1);
        assert_eq!(snapshot.gaps[0].kind, "camera_list_fetch");
        assert_eq!(snapshot.gaps[0].camera_index, None);
    }

    #[test]
    fn shutdown_abandons_cycle_without_publishing() {
        let directory = StaticDirectory::new(vec![Location::new("cte", "CTE")])
            .with_cameras("cte", Vec::new());
        let flag = Arc::new(AtomicBool::new(true));
        let coordinator =
            coordinator(directory, StaticImageSource::new()).with_shutdown(flag);
        let err = coordinator.run_cycle().unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(coordinator.store().current_snapshot().is_none());
        assert_eq!(coordinator.state(), CycleState::Idle);
    }

    #[test]
    fn failure_scope_decides_gap_or_abort() {
        let coordinator = coordinator(StaticDirectory::new(Vec::new()), StaticImageSource::new());
        let mut gaps = Vec::new();

        coordinator
            .absorb(
                4,
                "cte",
                Some(2),
                PipelineError::Detection(anyhow::anyhow!("backend crashed")),
                &mut gaps,
            )
            .unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, "detection");
        assert_eq!(gaps[0].camera_index, Some(2));

        let err = coordinator
            .absorb(4, "cte", Some(3), PipelineError::Cancelled, &mut gaps)
            .unwrap_err();
        assert_eq!(err.scope(), FailureScope::Cycle);
        assert_eq!(gaps.len(), 1);
    }
}
