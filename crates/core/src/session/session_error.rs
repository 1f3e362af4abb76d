use thiserror::Error;

use crate::filtering::domain::face_filter::FilterError;
use crate::session::face_id::FaceId;

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("{0} is not a known face")]
    UnknownFace(FaceId),
    #[error("no image has been set")]
    NoImage,
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("rendering {filter} on {face} failed: {message}")]
    Render {
        face: FaceId,
        filter: String,
        message: String,
    },
    #[error("greyscale conversion failed: {0}")]
    Greyscale(String),
}
