//! Color/ripeness classification of bean crops.
//!
//! The trained model is an external artifact reached through a
//! [`ModelProvider`]; this module only normalizes crops, calls the model and
//! turns its raw outputs into [`ColorScores`].

pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod provider;

use std::sync::Arc;

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;

use crate::{config::ClassifierConfig, types::{ColorClass, ColorScores}};

pub use model::{ChannelStatsModel, ChannelStatsWeights, ColorModel};
#[cfg(feature = "onnx")]
pub use onnx::OnnxColorModel;
pub use provider::{load_model_file, LocalModelProvider, ModelProvider, RemoteFallbackModelProvider};

/// Adapter between bean crops and a shared [`ColorModel`].
#[derive(Clone)]
pub struct ColorClassifier {
    model: Option<Arc<dyn ColorModel>>,
    input_size: u32,
}

impl std::fmt::Debug for ColorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorClassifier")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("input_size", &self.input_size)
            .finish()
    }
}

impl ColorClassifier {
    pub fn new(model: Arc<dyn ColorModel>, config: &ClassifierConfig) -> Self {
        Self {
            model: Some(model),
            input_size: config.input_size,
        }
    }

    /// A classifier with no model; every prediction is absent.
    pub fn unavailable(config: &ClassifierConfig) -> Self {
        Self {
            model: None,
            input_size: config.input_size,
        }
    }

    /// Load the model once through `provider`.
    ///
    /// A failed load is logged and produces an unavailable classifier rather
    /// than an error, so grading can continue on shape alone.
    pub fn from_provider(provider: &dyn ModelProvider, config: &ClassifierConfig) -> Self {
        match provider.load() {
            Ok(model) => Self::new(model, config),
            Err(err) => {
                tracing::warn!(
                    provider = %provider.describe(),
                    error = %err,
                    "color model unavailable, beans will use the fallback base score"
                );
                Self::unavailable(config)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Resize to the model input, scale to [0, 1] and add the batch axis.
    pub fn prepare_input(&self, crop: &DynamicImage) -> Array4<f32> {
        let side = self.input_size;
        let rgb = crop.resize_exact(side, side, FilterType::Triangle).to_rgb8();
        Array4::from_shape_fn((1, side as usize, side as usize, 3), |(_, y, x, c)| {
            rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
    }

    /// Color percentages for one crop, or `None` when the model is missing or fails.
    pub fn predict(&self, crop: &DynamicImage) -> Option<ColorScores> {
        let model = self.model.as_ref()?;

        if crop.width() == 0 || crop.height() == 0 {
            tracing::warn!("empty crop passed to color classifier");
            return None;
        }

        let input = self.prepare_input(crop);
        let raw = match model.predict(&input) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(model = model.name(), error = %err, "color inference failed");
                return None;
            }
        };

        if raw.len() != ColorClass::ORDERED.len() || raw.iter().any(|v| !v.is_finite()) {
            tracing::warn!(
                model = model.name(),
                outputs = raw.len(),
                "color model returned malformed scores"
            );
            return None;
        }

        Some(ColorScores::from_raw(&raw))
    }
}
