use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::media::domain::frame_sink::FrameSink;
use crate::media::domain::frame_source::FrameSource;
use crate::pipeline::frame_stage::FrameStage;
use crate::session::face_filter_session::FaceFilterSession;
use crate::shared::source_metadata::SourceMetadata;

use super::pipeline_executor::{PipelineConfig, PipelineExecutor, ProgressFn};

/// Streams every frame of a source through the stages into a sink.
///
/// Wires the components together and delegates execution to a
/// `PipelineExecutor`. Single-use: `execute` consumes the reader and
/// writer, so a second call fails.
pub struct FilterFramesUseCase {
    reader: Option<Box<dyn FrameSource>>,
    writer: Option<Box<dyn FrameSink>>,
    session: FaceFilterSession,
    stages: Vec<Box<dyn FrameStage>>,
    executor: Box<dyn PipelineExecutor>,
    on_progress: Option<ProgressFn>,
    cancelled: Arc<AtomicBool>,
}

impl FilterFramesUseCase {
    pub fn new(
        reader: Box<dyn FrameSource>,
        writer: Box<dyn FrameSink>,
        session: FaceFilterSession,
        stages: Vec<Box<dyn FrameStage>>,
        executor: Box<dyn PipelineExecutor>,
        on_progress: Option<ProgressFn>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            session,
            stages,
            executor,
            on_progress,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    /// `metadata` comes from the reader, which the caller has already opened.
    pub fn execute(
        &mut self,
        metadata: &SourceMetadata,
        output_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let config = PipelineConfig {
            on_progress: self.on_progress.take(),
            cancelled: self.cancelled.clone(),
        };

        self.executor.execute(
            self.reader.take().ok_or("Pipeline already executed")?,
            self.writer.take().ok_or("Pipeline already executed")?,
            &mut self.session,
            &mut self.stages,
            metadata,
            output_path,
            config,
        )
    }
}
