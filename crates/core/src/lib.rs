//! Per-face filter composition: detect faces in a frame, queue filters per
//! face, and composite the rendered face boxes back into the image.

pub mod detection;
pub mod filtering;
pub mod media;
pub mod pipeline;
pub mod session;
pub mod shared;
