use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Reports the same configured face boxes for every frame.
///
/// Used when face positions are already known (e.g. passed on the command
/// line) so no model is needed. Boxes are clamped to each frame and boxes
/// that fall entirely outside it are dropped.
pub struct FixedFaceDetector {
    regions: Vec<Region>,
}

impl FixedFaceDetector {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }
}

impl FaceDetector for FixedFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        Ok(self
            .regions
            .iter()
            .map(|r| r.clamp_to(frame.width(), frame.height()))
            .filter(|r| !r.is_empty())
            .collect())
    }
}
