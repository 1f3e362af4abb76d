use std::path::{Path, PathBuf};

use crate::media::domain::frame_sink::FrameSink;
use crate::media::domain::image_writer::ImageWriter;
use crate::media::infrastructure::image_file_writer::ImageFileWriter;
use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;

/// Writes each frame as `frame_NNNNNN.<ext>` into an output directory.
pub struct ImageSequenceWriter {
    writer: Box<dyn ImageWriter>,
    extension: String,
    dir: Option<PathBuf>,
    written: usize,
}

impl ImageSequenceWriter {
    pub fn new() -> Self {
        Self::with_extension("png")
    }

    pub fn with_extension(extension: &str) -> Self {
        Self {
            writer: Box::new(ImageFileWriter::new()),
            extension: extension.trim_start_matches('.').to_string(),
            dir: None,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn frame_path(&self, dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("frame_{index:06}.{}", self.extension))
    }
}

impl Default for ImageSequenceWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for ImageSequenceWriter {
    fn open(
        &mut self,
        path: &Path,
        metadata: &SourceMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(path)?;
        log::debug!(
            "Writing up to {} frame(s) to {}",
            metadata.total_frames,
            path.display()
        );
        self.dir = Some(path.to_path_buf());
        self.written = 0;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let dir = self.dir.as_deref().ok_or("ImageSequenceWriter: not opened")?;
        let path = self.frame_path(dir, frame.index());
        self.writer.write(&path, frame, None)?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(dir) = self.dir.take() {
            log::info!("Wrote {} frame(s) to {}", self.written, dir.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(total_frames: usize) -> SourceMetadata {
        SourceMetadata {
            width: 4,
            height: 4,
            total_frames,
            source_path: None,
        }
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![index as u8; 4 * 4 * 3], 4, 4, 3, index)
    }

    #[test]
    fn test_writes_numbered_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut writer = ImageSequenceWriter::new();
        writer.open(&out, &metadata(2)).unwrap();
        writer.write(&frame(0)).unwrap();
        writer.write(&frame(1)).unwrap();
        assert_eq!(writer.written(), 2);
        writer.close().unwrap();

        assert!(out.join("frame_000000.png").is_file());
        let second = image::open(out.join("frame_000001.png")).unwrap().to_rgb8();
        assert_eq!(second.get_pixel(0, 0).0, [1, 1, 1]);
    }

    #[test]
    fn test_extension_is_normalized() {
        let writer = ImageSequenceWriter::with_extension(".jpg");
        assert_eq!(
            writer.frame_path(Path::new("d"), 7),
            PathBuf::from("d/frame_000007.jpg")
        );
    }

    #[test]
    fn test_write_before_open_is_error() {
        let mut writer = ImageSequenceWriter::new();
        assert!(writer.write(&frame(0)).is_err());
    }
}
