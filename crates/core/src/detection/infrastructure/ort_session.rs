//! ONNX Runtime implementation of [`InferenceSession`].
//!
//! `ort` needs `&mut Session` to run, so the session sits behind a mutex; any
//! number of detectors may share one `Arc<OrtSession>` and their inference
//! calls are serialized here.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array4, ArrayD};

use crate::detection::domain::inference_session::{InferenceSession, SessionError};

pub struct OrtSession {
    session: Mutex<ort::session::Session>,
    input_size: Option<(u32, u32)>,
}

impl OrtSession {
    /// Loads an ONNX model with the platform's preferred execution providers.
    ///
    /// The input resolution is read from the model's NCHW input shape when it
    /// is static.
    pub fn from_file(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        Ok(Self::from_session(session))
    }

    /// Wraps a session built elsewhere.
    pub fn from_session(session: ort::session::Session) -> Self {
        let input_size = declared_input_size(&session);
        match input_size {
            Some((w, h)) => log::info!("Model input size {w}x{h}"),
            None => log::info!("Model input size is dynamic"),
        }
        Self {
            session: Mutex::new(session),
            input_size,
        }
    }
}

impl InferenceSession for OrtSession {
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, SessionError> {
        let input_value = ort::value::Tensor::from_array(input)?;
        let mut session = self.session.lock().map_err(|_| SessionError::Poisoned)?;
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(SessionError::NoOutputs);
        }
        let array = outputs[0].try_extract_array::<f32>()?.to_owned();
        Ok(array)
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }
}

impl From<ort::Error> for SessionError {
    fn from(e: ort::Error) -> Self {
        SessionError::Runtime(e.to_string())
    }
}

/// `(width, height)` from an `[N, C, H, W]` input with positive spatial dims.
fn declared_input_size(session: &ort::session::Session) -> Option<(u32, u32)> {
    session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            if shape.len() >= 4 && shape[2] > 0 && shape[3] > 0 {
                Some((shape[3] as u32, shape[2] as u32))
            } else {
                None
            }
        } else {
            None
        }
    })
}

/// CoreML on macOS, DirectML on Windows, plain CPU elsewhere.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
