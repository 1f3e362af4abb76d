use std::path::PathBuf;

/// Describes an opened frame source (single image or image sequence).
///
/// Dimensions come from the first frame; later frames of a sequence may
/// differ and are processed at their own size.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub total_frames: usize,
    pub source_path: Option<PathBuf>,
}
