//! Trained color model served by ONNX Runtime.

use std::{path::Path, sync::Mutex};

use ndarray::Array4;
use ort::{session::Session, value::TensorRef};

use crate::{
    classifier::model::ColorModel,
    error::{GradingError, Result},
    types::ColorClass,
};

/// Color CNN exported to ONNX, fed the same `[1, H, W, 3]` tensor as every
/// other [`ColorModel`].
///
/// `Session::run` needs `&mut self`, so the session sits behind a mutex and
/// concurrent beans take turns.
pub struct OnnxColorModel {
    session: Mutex<Session>,
}

impl OnnxColorModel {
    pub fn load(path: &Path) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e: ort::Error| GradingError::ModelLoad(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| GradingError::ModelLoad(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e: ort::Error| GradingError::ModelLoad(format!("ONNX load failed: {e}")))?;

        tracing::info!(path = %path.display(), "ONNX color model loaded");

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl ColorModel for OnnxColorModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let tensor = TensorRef::from_array_view(input)
            .map_err(|e| GradingError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| GradingError::Inference("session lock poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| GradingError::Inference(format!("ONNX inference failed: {e}")))?;

        let (shape, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| GradingError::Inference(format!("output extraction: {e}")))?;

        // Output shape: [1, classes]
        if scores.len() != ColorClass::ORDERED.len() {
            return Err(GradingError::Inference(format!(
                "unexpected output shape {shape:?}, expected [1, {}]",
                ColorClass::ORDERED.len()
            )));
        }

        Ok(scores.to_vec())
    }

    fn name(&self) -> &str {
        "onnx"
    }
}
