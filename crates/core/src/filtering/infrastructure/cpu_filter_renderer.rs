use std::cell::RefCell;

use image::imageops::{self, FilterType};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::filtering::domain::face_filter::FaceFilter;
use crate::filtering::domain::filter_renderer::FilterRenderer;
use crate::shared::color::Color;
use crate::shared::frame::Frame;

use super::gaussian::GaussianBlur;

/// CPU backend interpreting [`FaceFilter`] descriptors on RGB patches.
///
/// Blur reuses one scratch buffer across calls; everything else goes
/// through the `image`/`imageproc` primitives.
pub struct CpuFilterRenderer {
    blur_temp: RefCell<Vec<f32>>,
}

impl CpuFilterRenderer {
    pub fn new() -> Self {
        Self {
            blur_temp: RefCell::new(Vec::new()),
        }
    }

    fn blur(&self, patch: &mut Frame, radius: f32) {
        let (w, h) = (patch.width() as usize, patch.height() as usize);
        let channels = patch.channels() as usize;
        let mut temp = self.blur_temp.borrow_mut();
        GaussianBlur::new(radius).apply(patch.data_mut(), w, h, channels, &mut temp);
    }
}

impl Default for CpuFilterRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRenderer for CpuFilterRenderer {
    fn render(
        &self,
        patch: &mut Frame,
        filter: &FaceFilter,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if patch.width() == 0 || patch.height() == 0 {
            return Ok(());
        }
        if patch.channels() != 3 {
            return Err(format!("expected an RGB patch, got {} channels", patch.channels()).into());
        }

        match filter {
            FaceFilter::Blur { radius } => self.blur(patch, *radius),
            FaceFilter::Outline { color, width } => outline(patch, *color, *width)?,
            FaceFilter::Greyscale => self.greyscale(patch)?,
            FaceFilter::Pixelate { block } => pixelate(patch, *block as usize),
            FaceFilter::Replace { image } => {
                let resized =
                    imageops::resize(&**image, patch.width(), patch.height(), FilterType::Triangle);
                patch.data_mut().copy_from_slice(resized.as_raw());
            }
        }
        Ok(())
    }

    fn greyscale(&self, frame: &mut Frame) -> Result<(), Box<dyn std::error::Error>> {
        let rgb = frame
            .to_rgb_image()
            .ok_or("greyscale requires an RGB frame")?;
        let luma = imageops::grayscale(&rgb);
        for (px, l) in frame.data_mut().chunks_exact_mut(3).zip(luma.as_raw()) {
            px.fill(*l);
        }
        Ok(())
    }
}

/// Strokes `width` concentric one-pixel rectangles inward from the patch edge.
fn outline(patch: &mut Frame, color: Color, width: u32) -> Result<(), Box<dyn std::error::Error>> {
    let mut canvas = patch
        .to_rgb_image()
        .ok_or("outline requires an RGB patch")?;
    let (w, h) = canvas.dimensions();
    let stroke = Rgb(color.to_array());

    for inset in 0..width {
        if w <= inset * 2 || h <= inset * 2 {
            break;
        }
        let rect = Rect::at(inset as i32, inset as i32).of_size(w - inset * 2, h - inset * 2);
        draw_hollow_rect_mut(&mut canvas, rect, stroke);
    }
    patch.data_mut().copy_from_slice(canvas.as_raw());
    Ok(())
}

/// Fills each `block` x `block` cell with its mean color. Edge cells may be smaller.
fn pixelate(patch: &mut Frame, block: usize) {
    let (w, h) = (patch.width() as usize, patch.height() as usize);
    let data = patch.data_mut();
    let block = block.clamp(1, w.max(h).max(1));

    for cy in (0..h).step_by(block) {
        for cx in (0..w).step_by(block) {
            let (ey, ex) = ((cy + block).min(h), (cx + block).min(w));
            let count = ((ey - cy) * (ex - cx)) as u64;
            let mut sum = [0u64; 3];
            for y in cy..ey {
                for x in cx..ex {
                    let i = (y * w + x) * 3;
                    for c in 0..3 {
                        sum[c] += data[i + c] as u64;
                    }
                }
            }
            let mean = sum.map(|s| ((s + count / 2) / count) as u8);
            for y in cy..ey {
                for x in cx..ex {
                    let i = (y * w + x) * 3;
                    data[i..i + 3].copy_from_slice(&mean);
                }
            }
        }
    }
}
