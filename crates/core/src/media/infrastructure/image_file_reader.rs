use std::path::Path;

use crate::media::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;

/// Adapts a single image file to the [`FrameSource`] interface.
///
/// The image is decoded on `open` and yielded as the only frame. Any pixel
/// format the `image` crate understands is converted to RGB8.
pub struct ImageFileReader {
    frame: Option<Frame>,
}

impl ImageFileReader {
    pub fn new() -> Self {
        Self { frame: None }
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes `path` into an RGB frame with the given sequence index.
pub(crate) fn decode_rgb(path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)
        .map_err(|e| format!("cannot read image {}: {e}", path.display()))?
        .into_rgb8();
    Ok(Frame::from_rgb_image(img, index))
}

impl FrameSource for ImageFileReader {
    fn open(&mut self, path: &Path) -> Result<SourceMetadata, Box<dyn std::error::Error>> {
        let frame = decode_rgb(path, 0)?;
        let metadata = SourceMetadata {
            width: frame.width(),
            height: frame.height(),
            total_frames: 1,
            source_path: Some(path.to_path_buf()),
        };
        log::debug!(
            "Opened image {} ({}x{})",
            path.display(),
            metadata.width,
            metadata.height
        );
        self.frame = Some(frame);
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        if self.frame.is_none() {
            return Box::new(std::iter::once(Err("ImageFileReader: not opened".into())));
        }
        Box::new(self.frame.take().into_iter().map(Ok))
    }

    fn close(&mut self) {
        self.frame = None;
    }
}
