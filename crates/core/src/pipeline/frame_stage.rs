use crate::filtering::domain::face_filter::FaceFilter;
use crate::session::face_filter_session::FaceFilterSession;
use crate::session::session_error::SessionError;
use crate::shared::frame::Frame;

/// One step of per-frame processing against a session's current image.
///
/// Stages run strictly in order for every frame; each sees the session
/// state left by the previous one.
pub trait FrameStage: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, session: &mut FaceFilterSession) -> Result<(), SessionError>;
}

/// Replaces the session's faces with the ones detected in the current image.
pub struct DetectStage;

impl FrameStage for DetectStage {
    fn name(&self) -> &'static str {
        "detect"
    }

    fn process(&mut self, session: &mut FaceFilterSession) -> Result<(), SessionError> {
        let frame = session.take_image().ok_or(SessionError::NoImage)?;
        session.clear_faces();
        session.detect(frame)?;
        Ok(())
    }
}

/// Queues the same filter list on every registered face.
pub struct QueueFiltersStage {
    filters: Vec<FaceFilter>,
}

impl QueueFiltersStage {
    pub fn new(filters: Vec<FaceFilter>) -> Self {
        Self { filters }
    }
}

impl FrameStage for QueueFiltersStage {
    fn name(&self) -> &'static str {
        "queue_filters"
    }

    fn process(&mut self, session: &mut FaceFilterSession) -> Result<(), SessionError> {
        let faces: Vec<_> = session.faces().collect();
        for face in faces {
            for filter in &self.filters {
                session.add_filter(filter.clone(), face)?;
            }
        }
        Ok(())
    }
}

/// Renders the queued filters, then optionally greys out the background.
pub struct ApplyFiltersStage {
    color_pop: bool,
}

impl ApplyFiltersStage {
    pub fn new(color_pop: bool) -> Self {
        Self { color_pop }
    }
}

impl FrameStage for ApplyFiltersStage {
    fn name(&self) -> &'static str {
        "apply_filters"
    }

    fn process(&mut self, session: &mut FaceFilterSession) -> Result<(), SessionError> {
        session.apply_filters()?;
        if self.color_pop {
            session.color_pop()?;
        }
        Ok(())
    }
}

/// detect → queue `filters` → apply (→ color pop).
pub fn standard_stages(filters: Vec<FaceFilter>, color_pop: bool) -> Vec<Box<dyn FrameStage>> {
    vec![
        Box::new(DetectStage),
        Box::new(QueueFiltersStage::new(filters)),
        Box::new(ApplyFiltersStage::new(color_pop)),
    ]
}

/// Runs `frame` through every stage and hands back the resulting image.
pub fn process_frame(
    session: &mut FaceFilterSession,
    stages: &mut [Box<dyn FrameStage>],
    frame: Frame,
) -> Result<Frame, SessionError> {
    session.set_image(frame);
    for stage in stages.iter_mut() {
        log::trace!("Running stage {}", stage.name());
        stage.process(session)?;
    }
    session.take_image().ok_or(SessionError::NoImage)
}
