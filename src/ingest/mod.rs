//! Camera image acquisition.
//!
//! An [`ImageSource`] turns a camera's image URL into a decoded RGB frame.
//! Sources are responsible for:
//! - Bounding the time spent on one image
//! - Bounding the number of bytes read
//! - Decoding in memory (nothing is written to disk here)

pub mod http;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use image::RgbImage;

pub use http::{HttpImageSource, MAX_IMAGE_BYTES};

/// Fetch and decode one camera image.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<RgbImage>;
}

/// Decode encoded image bytes (JPEG, PNG) into RGB8.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(anyhow!("empty image body"));
    }
    let image = image::load_from_memory(bytes).map_err(|e| anyhow!("decode image: {}", e))?;
    Ok(image.into_rgb8())
}

/// Image source backed by a fixed url -> frame table.
///
/// Unknown urls fail the same way an unreachable camera does.
#[derive(Default)]
pub struct StaticImageSource {
    frames: Mutex<HashMap<String, RgbImage>>,
}

impl StaticImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(self, url: impl Into<String>, frame: RgbImage) -> Self {
        self.insert(url, frame);
        self
    }

    pub fn insert(&self, url: impl Into<String>, frame: RgbImage) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.insert(url.into(), frame);
        }
    }

    pub fn remove(&self, url: &str) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.remove(url);
        }
    }
}

impl ImageSource for StaticImageSource {
    fn fetch(&self, url: &str) -> Result<RgbImage> {
        self.frames
            .lock()
            .map_err(|_| anyhow!("image table lock poisoned"))?
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no image published at {}", url))
    }
}
