/// Fallback model input resolution when neither the config nor the model specifies one.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Minimum score for a decoded candidate to survive.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.3;

/// IoU above which a lower-scored candidate inside the same ROI is suppressed.
pub const DEFAULT_NMS_IOU_THRESHOLD: f64 = 0.45;

/// Letterbox fill, normalized (114/255 gray, YOLO convention).
pub const DEFAULT_PAD_VALUE: f32 = 114.0 / 255.0;

/// File name prefix for debug renders.
pub const DEBUG_IMAGE_PREFIX: &str = "nn_detect";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
