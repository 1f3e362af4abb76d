use crate::filtering::domain::face_filter::FaceFilter;
use crate::shared::frame::Frame;

/// Domain interface for interpreting filter descriptors.
///
/// `render` receives a crop of a single face box and modifies it in place;
/// cropping and compositing back into the full frame is the caller's job,
/// so an implementation can never touch pixels outside the face.
pub trait FilterRenderer: Send {
    fn render(&self, patch: &mut Frame, filter: &FaceFilter)
        -> Result<(), Box<dyn std::error::Error>>;

    /// Desaturates a whole frame in place (color-pop background).
    fn greyscale(&self, frame: &mut Frame) -> Result<(), Box<dyn std::error::Error>>;
}
