/// BlazeFace short-range model file name looked up in the model cache.
pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";

/// Upper bound on faces reported per frame.
pub const DEFAULT_MAX_FACES: usize = 5;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Default outline ("track") stroke width in pixels.
pub const DEFAULT_TRACK_LINE_WIDTH: u32 = 3;

/// Largest accepted blur standard deviation, in pixels.
pub const MAX_BLUR_RADIUS: f32 = 250.0;

/// Directory name used under the platform config/cache directories.
pub const APP_DIR_NAME: &str = "ShakeFace";

pub const RECIPE_FILE_NAME: &str = "recipe.json";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
