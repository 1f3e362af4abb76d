pub mod face_filter;
pub mod filter_renderer;
