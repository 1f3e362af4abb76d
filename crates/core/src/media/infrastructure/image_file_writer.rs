use std::path::Path;

use image::imageops::{self, FilterType};

use crate::media::domain::image_writer::ImageWriter;
use crate::shared::frame::Frame;

/// Encodes frames with the `image` crate; the format follows the extension.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let img = frame
            .to_rgb_image()
            .ok_or("cannot encode a non-RGB frame")?;
        let img = match size {
            Some((w, h)) => imageops::resize(&img, w, h, FilterType::Triangle),
            None => img,
        };

        img.save(path)
            .map_err(|e| format!("cannot write image {}: {e}", path.display()))?;
        Ok(())
    }
}
