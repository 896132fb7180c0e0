use std::path::Path;

use ndarray::{Array4, Axis};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GradingError, Result},
    types::ColorClass,
};

/// Black-box color scorer.
///
/// Takes a `[1, height, width, 3]` RGB tensor with intensities in [0, 1] and
/// returns one raw score per class in [`ColorClass::ORDERED`] order.
/// Implementations are shared across concurrent pipeline runs and must be
/// safe to call from several threads at once.
pub trait ColorModel: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>>;

    fn name(&self) -> &str {
        "color-model"
    }
}

/// Serialized parameters of a [`ChannelStatsModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelStatsWeights {
    /// Output classes; must list every color class in model order
    pub classes: Vec<ColorClass>,
    /// One row of mean-R, mean-G, mean-B coefficients per class
    pub weights: Vec<[f32; 3]>,
    pub bias: Vec<f32>,
}

/// Softmax-linear classifier over the mean RGB intensity of a crop.
#[derive(Debug, Clone)]
pub struct ChannelStatsModel {
    weights: ChannelStatsWeights,
}

impl ChannelStatsModel {
    pub fn new(weights: ChannelStatsWeights) -> Result<Self> {
        if weights.classes.as_slice() != ColorClass::ORDERED.as_slice() {
            return Err(GradingError::ModelLoad(format!(
                "model classes {:?} do not match expected order {:?}",
                weights.classes,
                ColorClass::ORDERED
            )));
        }
        let classes = weights.classes.len();
        if weights.weights.len() != classes || weights.bias.len() != classes {
            return Err(GradingError::ModelLoad(format!(
                "expected {} weight rows and biases, got {} and {}",
                classes,
                weights.weights.len(),
                weights.bias.len()
            )));
        }
        Ok(Self { weights })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let weights: ChannelStatsWeights = serde_json::from_str(content)
            .map_err(|e| GradingError::ModelLoad(e.to_string()))?;
        Self::new(weights)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn weights(&self) -> &ChannelStatsWeights {
        &self.weights
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl ColorModel for ChannelStatsModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let shape = input.shape();
        if shape[0] != 1 || shape[3] != 3 {
            return Err(GradingError::Inference(format!(
                "expected input shape [1, H, W, 3], got {:?}",
                shape
            )));
        }

        let sample = input.index_axis(Axis(0), 0);
        let mut means = [0.0f32; 3];
        for (channel, mean) in means.iter_mut().enumerate() {
            *mean = sample
                .index_axis(Axis(2), channel)
                .mean()
                .ok_or_else(|| GradingError::Inference("empty input tensor".into()))?;
        }

        let logits: Vec<f32> = self
            .weights
            .weights
            .iter()
            .zip(&self.weights.bias)
            .map(|(row, bias)| row.iter().zip(&means).map(|(w, m)| w * m).sum::<f32>() + bias)
            .collect();

        Ok(softmax(&logits))
    }

    fn name(&self) -> &str {
        "channel-stats"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Brightness-driven weights: dark crops score Dark, bright crops Light,
    /// green-dominant crops Green.
    pub(crate) fn sample_weights() -> ChannelStatsWeights {
        ChannelStatsWeights {
            classes: ColorClass::ORDERED.to_vec(),
            weights: vec![
                [-6.0, -6.0, -6.0],
                [-4.0, 10.0, -4.0],
                [6.0, 6.0, 6.0],
                [2.0, 2.0, 2.0],
            ],
            bias: vec![6.0, 0.0, -9.0, -2.0],
        }
    }

    fn uniform_input(r: f32, g: f32, b: f32) -> Array4<f32> {
        Array4::from_shape_fn((1, 8, 8, 3), |(_, _, _, c)| [r, g, b][c])
    }

    #[test]
    fn test_outputs_sum_to_one() {
        let model = ChannelStatsModel::new(sample_weights()).unwrap();
        let scores = model.predict(&uniform_input(0.5, 0.4, 0.3)).unwrap();
        assert_eq!(scores.len(), 4);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_bright_crop_is_light() {
        let model = ChannelStatsModel::new(sample_weights()).unwrap();
        let scores = model.predict(&uniform_input(0.95, 0.9, 0.85)).unwrap();
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| ColorClass::ORDERED[i]);
        assert_eq!(best, Some(ColorClass::Light));
    }

    #[test]
    fn test_dark_crop_is_dark() {
        let model = ChannelStatsModel::new(sample_weights()).unwrap();
        let scores = model.predict(&uniform_input(0.05, 0.05, 0.05)).unwrap();
        assert!(scores[0] > 0.9);
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let model = ChannelStatsModel::new(sample_weights()).unwrap();
        let input = Array4::<f32>::zeros((2, 4, 4, 3));
        assert!(matches!(model.predict(&input), Err(GradingError::Inference(_))));
    }

    #[test]
    fn test_rejects_class_mismatch() {
        let mut weights = sample_weights();
        weights.classes.swap(0, 1);
        assert!(matches!(ChannelStatsModel::new(weights), Err(GradingError::ModelLoad(_))));

        let mut weights = sample_weights();
        weights.bias.pop();
        assert!(ChannelStatsModel::new(weights).is_err());
    }

    #[test]
    fn test_json_round_trip_loads() {
        let json = serde_json::to_string(&sample_weights()).unwrap();
        let model = ChannelStatsModel::from_json(&json).unwrap();
        assert_eq!(model.weights(), &sample_weights());
        assert!(ChannelStatsModel::from_json("{not json").is_err());
    }
}
