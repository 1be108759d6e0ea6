//! HTTP camera image source.

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::{decode_image, ImageSource};

/// Largest image body accepted from a camera.
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Fetches camera snapshots over HTTP(S) with a whole-request timeout.
pub struct HttpImageSource {
    agent: ureq::Agent,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { agent }
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<RgbImage> {
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("fetch camera image from {}", url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_IMAGE_BYTES + 1)
            .read_to_end(&mut bytes)
            .context("read camera image body")?;
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(anyhow!(
                "camera image exceeds {} bytes",
                MAX_IMAGE_BYTES
            ));
        }
        decode_image(&bytes)
    }
}
