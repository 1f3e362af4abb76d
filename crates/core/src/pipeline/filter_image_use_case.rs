use std::path::Path;

use crate::media::domain::frame_source::FrameSource;
use crate::media::domain::image_writer::ImageWriter;
use crate::pipeline::frame_stage::{process_frame, FrameStage};
use crate::session::face_filter_session::FaceFilterSession;

/// Single-image pipeline: read → stages → write.
pub struct FilterImageUseCase {
    reader: Box<dyn FrameSource>,
    image_writer: Box<dyn ImageWriter>,
    session: FaceFilterSession,
    stages: Vec<Box<dyn FrameStage>>,
}

impl FilterImageUseCase {
    pub fn new(
        reader: Box<dyn FrameSource>,
        image_writer: Box<dyn ImageWriter>,
        session: FaceFilterSession,
        stages: Vec<Box<dyn FrameStage>>,
    ) -> Self {
        Self {
            reader,
            image_writer,
            session,
            stages,
        }
    }

    /// Reads one image, runs every stage on it and writes the result.
    /// Returns the number of faces found.
    pub fn execute(
        &mut self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        self.reader.open(input_path)?;
        let frame = self.reader.frames().next().ok_or("No frames in image")??;
        self.reader.close();

        let out = process_frame(&mut self.session, &mut self.stages, frame)?;
        self.image_writer.write(output_path, &out, None)?;
        self.session.finish();

        log::info!(
            "Filtered {} face(s) in {}",
            self.session.face_count(),
            input_path.display()
        );
        Ok(self.session.face_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::filtering::domain::face_filter::FaceFilter;
    use crate::filtering::infrastructure::cpu_filter_renderer::CpuFilterRenderer;
    use crate::pipeline::frame_stage::standard_stages;
    use crate::shared::frame::Frame;
    use crate::shared::region::Region;
    use crate::shared::source_metadata::SourceMetadata;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    struct StubImageReader {
        frame: Option<Frame>,
    }

    impl FrameSource for StubImageReader {
        fn open(&mut self, _path: &Path) -> Result<SourceMetadata, Box<dyn std::error::Error>> {
            let frame = self.frame.as_ref().ok_or("empty stub")?;
            Ok(SourceMetadata {
                width: frame.width(),
                height: frame.height(),
                total_frames: 1,
                source_path: None,
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            Box::new(self.frame.take().into_iter().map(Ok))
        }

        fn close(&mut self) {
            self.frame = None;
        }
    }

    struct StubImageWriter {
        written: Arc<Mutex<Vec<(PathBuf, Frame)>>>,
    }

    impl ImageWriter for StubImageWriter {
        fn write(
            &self,
            path: &Path,
            frame: &Frame,
            _size: Option<(u32, u32)>,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), frame.clone()));
            Ok(())
        }
    }

    struct StubDetector {
        regions: Vec<Region>,
        calls: Arc<Mutex<usize>>,
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.regions.clone())
        }
    }

    // --- Helpers ---

    fn red_frame() -> Frame {
        Frame::new([200u8, 20, 20].repeat(20 * 20), 20, 20, 3, 0)
    }

    fn use_case(
        frame: Option<Frame>,
        regions: Vec<Region>,
        filters: Vec<FaceFilter>,
    ) -> (
        FilterImageUseCase,
        Arc<Mutex<Vec<(PathBuf, Frame)>>>,
        Arc<Mutex<usize>>,
    ) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(Mutex::new(0));
        let session = FaceFilterSession::new(
            Box::new(StubDetector {
                regions,
                calls: calls.clone(),
            }),
            Box::new(CpuFilterRenderer::new()),
        );
        let uc = FilterImageUseCase::new(
            Box::new(StubImageReader { frame }),
            Box::new(StubImageWriter {
                written: written.clone(),
            }),
            session,
            standard_stages(filters, false),
        );
        (uc, written, calls)
    }

    // --- Tests ---

    #[test]
    fn test_writes_filtered_image_to_output() {
        let face = Region::new(5, 5, 10, 10);
        let (mut uc, written, calls) =
            use_case(Some(red_frame()), vec![face], vec![FaceFilter::Greyscale]);

        let faces = uc.execute(Path::new("in.png"), Path::new("out.png")).unwrap();

        assert_eq!(faces, 1);
        assert_eq!(*calls.lock().unwrap(), 1);
        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        let (path, frame) = &written[0];
        assert_eq!(path, &PathBuf::from("out.png"));
        let inside = frame.pixel(8, 8);
        assert!(inside[0] == inside[1] && inside[1] == inside[2]);
        assert_eq!(frame.pixel(0, 0), &[200, 20, 20]);
    }

    #[test]
    fn test_no_faces_writes_unchanged_image() {
        let (mut uc, written, _) = use_case(Some(red_frame()), Vec::new(), vec![FaceFilter::blur(3.0)]);
        assert_eq!(uc.execute(Path::new("in.png"), Path::new("out.png")).unwrap(), 0);
        assert_eq!(written.lock().unwrap()[0].1, red_frame());
    }

    #[test]
    fn test_empty_reader_is_error() {
        let (mut uc, written, _) = use_case(None, Vec::new(), Vec::new());
        assert!(uc.execute(Path::new("in.png"), Path::new("out.png")).is_err());
        assert!(written.lock().unwrap().is_empty());
    }
}
