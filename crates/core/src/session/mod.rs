pub mod face_filter_session;
pub mod face_id;
pub mod filter_event;
pub mod session_error;
