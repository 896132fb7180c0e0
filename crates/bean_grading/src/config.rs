use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{GradingError, Result};

/// Tunable constants of the grading pipeline.
///
/// `Default` reproduces the reference grading behaviour; changing any value
/// changes which beans are detected and how they are graded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GradingConfig {
    pub segmentation: SegmentationConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub grading: GraderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Contours must enclose strictly more than this many pixels
    pub min_bean_area: f64,
    /// Side of the square closing element, odd
    #[schemars(range(min = 1, max = 31))]
    pub close_kernel_size: u8,
    #[schemars(range(min = 0, max = 10))]
    pub close_iterations: u8,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_bean_area: 500.0,
            close_kernel_size: 5,
            close_iterations: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FeatureConfig {
    /// Pre-blur sigma; 1.1 matches a 5x5 kernel with automatic sigma. Canny
    /// adds its own sigma 1.4 smoothing on top. 0 disables the pre-blur.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Crack flag is raised when edge density is strictly above this
    #[schemars(range(min = 0.0, max = 1.0))]
    pub crack_edge_density: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
            crack_edge_density: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Square side the crop is resized to before inference
    #[schemars(range(min = 1, max = 4096))]
    pub input_size: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { input_size: 224 }
    }
}

/// How a color distribution is reduced to a single base score.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BaseScoreMapping {
    /// Base score of the most likely class
    #[default]
    DominantClass,
    /// Percentage-weighted mean of every class's base score
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GraderConfig {
    pub color_weight: f64,
    pub shape_weight: f64,
    pub min_circularity: f64,
    pub circularity_penalty: f64,
    pub crack_penalty: f64,
    /// Base score used when the color model cannot score a bean
    #[schemars(range(min = 0.0, max = 1.0))]
    pub fallback_base_score: f64,
    pub base_score_mapping: BaseScoreMapping,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            color_weight: 0.7,
            shape_weight: 0.3,
            min_circularity: 0.7,
            circularity_penalty: 0.3,
            crack_penalty: 0.2,
            fallback_base_score: 0.5,
            base_score_mapping: BaseScoreMapping::DominantClass,
        }
    }
}

impl GradingConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmentation;
        if seg.close_kernel_size == 0 || seg.close_kernel_size % 2 == 0 {
            return Err(GradingError::Config(format!(
                "close_kernel_size must be odd, got {}",
                seg.close_kernel_size
            )));
        }
        if seg.min_bean_area < 0.0 {
            return Err(GradingError::Config("min_bean_area must not be negative".into()));
        }

        let feat = &self.features;
        if feat.blur_sigma.is_nan() || feat.blur_sigma < 0.0 {
            return Err(GradingError::Config("blur_sigma must not be negative".into()));
        }
        if feat.canny_low > feat.canny_high {
            return Err(GradingError::Config(format!(
                "canny_low ({}) exceeds canny_high ({})",
                feat.canny_low, feat.canny_high
            )));
        }

        if self.classifier.input_size == 0 {
            return Err(GradingError::Config("input_size must be positive".into()));
        }

        let grad = &self.grading;
        if !(0.0..=1.0).contains(&grad.fallback_base_score) {
            return Err(GradingError::Config(
                "fallback_base_score must lie in [0, 1]".into(),
            ));
        }
        if (grad.color_weight + grad.shape_weight - 1.0).abs() > 1e-9 {
            return Err(GradingError::Config(format!(
                "color_weight + shape_weight must equal 1, got {}",
                grad.color_weight + grad.shape_weight
            )));
        }

        Ok(())
    }

    /// JSON schema of the configuration
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(GradingConfig)
    }
}
