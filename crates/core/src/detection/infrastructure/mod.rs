pub mod image_debug_renderer;
pub mod neural_network_detector;
pub mod ort_session;
pub mod preprocess;
pub mod region_processor;
pub mod yolo_decoder;
