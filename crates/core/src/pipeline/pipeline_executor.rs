use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::media::domain::frame_sink::FrameSink;
use crate::media::domain::frame_source::FrameSource;
use crate::pipeline::frame_stage::FrameStage;
use crate::session::face_filter_session::FaceFilterSession;
use crate::shared::source_metadata::SourceMetadata;

/// Progress callback `(frames_done, total_frames)`. Returning `false`
/// cancels the run.
pub type ProgressFn = Box<dyn Fn(usize, usize) -> bool + Send>;

/// Configuration for a pipeline execution run.
pub struct PipelineConfig {
    pub on_progress: Option<ProgressFn>,
    pub cancelled: Arc<AtomicBool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Abstracts how the read → stages → write pipeline is executed.
pub trait PipelineExecutor: Send {
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        reader: Box<dyn FrameSource>,
        writer: Box<dyn FrameSink>,
        session: &mut FaceFilterSession,
        stages: &mut [Box<dyn FrameStage>],
        metadata: &SourceMetadata,
        output_path: &Path,
        config: PipelineConfig,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
