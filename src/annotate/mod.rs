//! Frame annotation.
//!
//! Draws detection boxes and `"<class> <confidence>"` labels onto a copy of
//! the source image, encodes it as JPEG and hands it to an
//! [`AnnotationStore`] under the camera's [`AnnotationKey`].

mod glyphs;
mod store;

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

pub use store::{
    AnnotationKey, AnnotationStore, FilesystemAnnotationStore, InMemoryAnnotationStore,
    DEFAULT_STATIC_DIR,
};

use crate::detect::Detection;
use crate::error::PipelineError;
use glyphs::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_PAD: u32 = 1;
const JPEG_QUALITY: u8 = 90;

/// Annotated copy of a frame.
pub struct Annotation {
    pub image: RgbImage,
    pub boxes_drawn: usize,
}

/// Result of annotating and persisting one camera frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedFrame {
    pub image_ref: String,
    pub boxes_drawn: usize,
}

/// Draw every detection onto a copy of `image`. `image` is left untouched.
pub fn draw(image: &RgbImage, detections: &[Detection]) -> Annotation {
    let mut canvas = image.clone();
    let mut boxes_drawn = 0;
    for det in detections {
        if draw_detection(&mut canvas, det) {
            boxes_drawn += 1;
        }
    }
    Annotation {
        image: canvas,
        boxes_drawn,
    }
}

fn draw_detection(canvas: &mut RgbImage, det: &Detection) -> bool {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return false;
    }
    let bbox = det.bbox.clamp_to(width, height);
    let x1 = (bbox.x1 as u32).min(width - 1);
    let y1 = (bbox.y1 as u32).min(height - 1);
    let x2 = (bbox.x2 as u32).clamp(x1 + 1, width);
    let y2 = (bbox.y2 as u32).clamp(y1 + 1, height);

    for inset in 0..BOX_THICKNESS {
        let w = (x2 - x1).saturating_sub(2 * inset);
        let h = (y2 - y1).saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((x1 + inset) as i32, (y1 + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }

    draw_label(canvas, &det.label(), x1, y1);
    true
}

/// Label tab sits above the box's top-left corner, or just inside the box
/// when there is no room above it.
fn draw_label(canvas: &mut RgbImage, text: &str, x: u32, box_top: u32) {
    let tab_w = text.chars().count() as u32 * GLYPH_WIDTH + 2 * LABEL_PAD;
    let tab_h = GLYPH_HEIGHT + 2 * LABEL_PAD;
    let tab_y = if box_top >= tab_h { box_top - tab_h } else { box_top };
    draw_filled_rect_mut(
        canvas,
        Rect::at(x as i32, tab_y as i32).of_size(tab_w, tab_h),
        BOX_COLOR,
    );

    let (width, height) = canvas.dimensions();
    let mut pen_x = x + LABEL_PAD;
    let pen_y = tab_y + LABEL_PAD;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                let py = pen_y + row as u32;
                if py >= height {
                    break;
                }
                for col in 0..GLYPH_WIDTH {
                    let px = pen_x + col;
                    if px >= width {
                        break;
                    }
                    if (bits >> (7 - col)) & 1 == 1 {
                        canvas.put_pixel(px, py, TEXT_COLOR);
                    }
                }
            }
        }
        pen_x += GLYPH_WIDTH;
        if pen_x >= width {
            break;
        }
    }
}

/// Draws detections and persists the result for the presentation layer.
pub struct FrameAnnotator {
    store: Arc<dyn AnnotationStore>,
}

impl FrameAnnotator {
    pub fn new(store: Arc<dyn AnnotationStore>) -> Self {
        Self { store }
    }

    /// Annotate `image` and store it under `key`, replacing the previous
    /// image for that key.
    pub fn annotate(
        &self,
        key: &AnnotationKey,
        image: &RgbImage,
        detections: &[Detection],
    ) -> Result<AnnotatedFrame, PipelineError> {
        let annotation = draw(image, detections);
        let jpeg = encode_jpeg(&annotation.image).map_err(PipelineError::Annotation)?;
        let image_ref = self
            .store
            .save(key, &jpeg)
            .map_err(PipelineError::Annotation)?;
        Ok(AnnotatedFrame {
            image_ref,
            boxes_drawn: annotation.boxes_drawn,
        })
    }
}

fn encode_jpeg(image: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(image)
        .context("encode annotated jpeg")?;
    Ok(buf.into_inner())
}
