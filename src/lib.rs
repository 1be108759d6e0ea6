//! Traffic camera vehicle counter.
//!
//! A background producer periodically walks every road location, fetches
//! each camera image, detects and counts vehicles, draws the detections onto
//! a copy of the image and publishes the whole dataset as one immutable
//! [`Snapshot`]. Readers (the HTTP viewer) take the current snapshot without
//! locking and never observe a partially built cycle.
//!
//! # Module Structure
//!
//! - `directory`: location and camera discovery (OneMotoring scraper, static)
//! - `ingest`: camera image acquisition and decoding
//! - `detect`: detector backends and the vehicle detection adapter
//! - `annotate`: box/label drawing and the annotated image store
//! - `counts`: per-class vehicle count aggregation
//! - `processor`: one camera end to end
//! - `refresh`: one cycle over all locations, ending in a single publish
//! - `snapshot`: the published dataset and its store
//! - `schedule`: fixed-interval, non-overlapping cycle driver
//! - `api`: read-only HTTP viewer and JSON endpoints
//! - `config`: file + environment configuration

pub mod annotate;
pub mod api;
pub mod config;
pub mod counts;
pub mod detect;
pub mod directory;
pub mod error;
pub mod ingest;
pub mod processor;
pub mod refresh;
pub mod schedule;
pub mod snapshot;

pub use annotate::{AnnotationKey, AnnotationStore, FilesystemAnnotationStore, FrameAnnotator};
pub use counts::{aggregate, VehicleCounts};
pub use detect::{Detection, DetectorBackend, VehicleClasses, VehicleDetector};
pub use directory::{Location, RawCameraRecord, TrafficDirectory};
pub use error::{FailureScope, PipelineError};
pub use ingest::ImageSource;
pub use processor::{CameraProcessor, CameraSlot};
pub use refresh::{CycleOutcome, CycleReport, CycleState, RefreshCoordinator};
pub use schedule::{plan_next_tick, Scheduler, SchedulerHandle, TickPlan};
pub use snapshot::{CycleGap, EnrichedCameraRecord, LocationEntry, Snapshot, SnapshotStore};
