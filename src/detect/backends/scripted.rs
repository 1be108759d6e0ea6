use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::ModelDetection;

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Detections(Vec<ModelDetection>),
    Fail(String),
}

/// Backend that replays fixed detections instead of running a model.
///
/// Replies are consumed in order; once the queue is empty the fallback
/// reply is repeated. An optional delay simulates slow inference.
pub struct ScriptedBackend {
    queue: VecDeque<ScriptedReply>,
    fallback: ScriptedReply,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    /// Always answer with `detections`.
    pub fn fixed(detections: Vec<ModelDetection>) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: ScriptedReply::Detections(detections),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer with the queued replies in order, then with no detections.
    pub fn sequence(replies: Vec<ScriptedReply>) -> Self {
        Self {
            queue: replies.into(),
            fallback: ScriptedReply::Detections(Vec::new()),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared counter of `detect` invocations.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<ModelDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let reply = self
            .queue
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            ScriptedReply::Detections(detections) => Ok(detections),
            ScriptedReply::Fail(reason) => Err(anyhow!(reason)),
        }
    }
}
