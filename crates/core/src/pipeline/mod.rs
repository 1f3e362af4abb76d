pub mod filter_frames_use_case;
pub mod filter_image_use_case;
pub mod filter_recipe;
pub mod frame_stage;
pub mod infrastructure;
pub mod pipeline_executor;
