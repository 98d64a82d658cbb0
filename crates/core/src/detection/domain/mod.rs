pub mod debug_renderer;
pub mod detection_result;
pub mod detector_config;
pub mod detector_error;
pub mod inference_session;
pub mod result_aggregator;
pub mod vision_detector;
