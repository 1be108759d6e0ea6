use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, ModelDetection, VehicleClasses};
use crate::error::PipelineError;

struct InferenceJob {
    image: Arc<RgbImage>,
    deadline: Instant,
    reply: mpsc::SyncSender<Result<Vec<ModelDetection>>>,
}

/// Vehicle detector adapter.
///
/// Owns a [`DetectorBackend`] on a dedicated inference thread. Calls are
/// queued, so inference is serialised no matter how many callers share the
/// adapter. Each call waits at most `timeout`; a job whose caller already
/// gave up is dropped by the worker instead of being run.
///
/// Only detections whose label is in the configured [`VehicleClasses`] are
/// returned. Boxes are clamped to the image and dropped when that leaves no
/// area. Confidences pass through untouched but must be finite and in
/// `0.0..=1.0`, otherwise the whole call fails.
pub struct VehicleDetector {
    jobs: Mutex<mpsc::Sender<InferenceJob>>,
    classes: VehicleClasses,
    timeout: Duration,
    backend_name: &'static str,
}

impl VehicleDetector {
    /// Warm the backend up and move it onto the inference thread.
    pub fn spawn(
        mut backend: Box<dyn DetectorBackend>,
        classes: VehicleClasses,
        timeout: Duration,
    ) -> Result<Self> {
        let backend_name = backend.name();
        backend
            .warm_up()
            .with_context(|| format!("warm up detector backend '{}'", backend_name))?;

        let (tx, rx) = mpsc::channel::<InferenceJob>();
        std::thread::Builder::new()
            .name(format!("inference-{}", backend_name))
            .spawn(move || {
                for job in rx {
                    if Instant::now() >= job.deadline {
                        log::debug!("dropping inference job abandoned by its caller");
                        continue;
                    }
                    let result = backend.detect(&job.image);
                    let _ = job.reply.send(result);
                }
                log::debug!("inference worker for '{}' stopped", backend.name());
            })
            .context("spawn inference thread")?;

        log::info!(
            "detector backend '{}' ready; counting classes {:?}",
            backend_name,
            classes.names()
        );
        Ok(Self {
            jobs: Mutex::new(tx),
            classes,
            timeout,
            backend_name,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn classes(&self) -> &VehicleClasses {
        &self.classes
    }

    /// Detect vehicles in `image`.
    pub fn detect(&self, image: &Arc<RgbImage>) -> Result<Vec<Detection>, PipelineError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job = InferenceJob {
            image: image.clone(),
            deadline: Instant::now() + self.timeout,
            reply: reply_tx,
        };
        self.jobs
            .lock()
            .map_err(|_| PipelineError::Detection(anyhow!("inference queue lock poisoned")))?
            .send(job)
            .map_err(|_| PipelineError::Detection(anyhow!("inference worker is not running")))?;

        let raw = match reply_rx.recv_timeout(self.timeout) {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(PipelineError::Detection(err)),
            Err(RecvTimeoutError::Timeout) => {
                return Err(PipelineError::Detection(anyhow!(
                    "inference did not finish within {:?}",
                    self.timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PipelineError::Detection(anyhow!(
                    "inference worker exited before replying"
                )))
            }
        };
        self.filter(raw, image.width(), image.height())
    }

    /// Apply the vehicle-class filter and box sanity rules to raw model output.
    pub fn filter(
        &self,
        raw: Vec<ModelDetection>,
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, PipelineError> {
        let mut out = Vec::with_capacity(raw.len());
        for det in raw {
            if !self.classes.contains(&det.label) {
                continue;
            }
            if !det.confidence.is_finite() || !(0.0..=1.0).contains(&det.confidence) {
                return Err(PipelineError::Detection(anyhow!(
                    "backend '{}' reported confidence {} for '{}'",
                    self.backend_name,
                    det.confidence,
                    det.label
                )));
            }
            let bbox = det.bbox.clamp_to(width, height);
            if !bbox.is_proper() {
                log::debug!("dropping degenerate '{}' box {:?}", det.label, det.bbox);
                continue;
            }
            out.push(Detection::new(det.label, det.confidence, bbox));
        }
        Ok(out)
    }
}
