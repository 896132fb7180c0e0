use std::collections::BTreeMap;

use image::DynamicImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

/// Round to three decimal places.
///
/// Rounds the exact binary value, so 0.7725 (stored just below the tie)
/// becomes 0.772. Scaling by 1000 first would round it up.
pub fn round3(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.3}").parse::<f64>().unwrap_or(value)
}

/// Color/ripeness classes produced by the color model, in model output order.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash, PartialOrd, Ord
)]
pub enum ColorClass {
    Dark,
    Green,
    Light,
    Medium,
}

impl ColorClass {
    /// All classes in the order the model emits scores.
    pub const ORDERED: [ColorClass; 4] = [
        ColorClass::Dark,
        ColorClass::Green,
        ColorClass::Light,
        ColorClass::Medium,
    ];

    /// Base quality contribution of a bean whose color is this class.
    pub fn base_score(self) -> f64 {
        match self {
            ColorClass::Light => 0.95,
            ColorClass::Medium => 0.85,
            ColorClass::Dark => 0.40,
            ColorClass::Green => 0.40,
        }
    }
}

/// Quality categories, best first.
///
/// The derived `Ord` follows declaration order (`Specialty` sorts first) so maps
/// keyed by category list the best grade first. Use [`QualityCategory::rank`]
/// to compare grades by quality.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash, PartialOrd, Ord
)]
pub enum QualityCategory {
    Specialty,
    Premium,
    A,
    B,
    C,
}

impl QualityCategory {
    /// Categories in threshold-walk order.
    pub const ORDERED: [QualityCategory; 5] = [
        QualityCategory::Specialty,
        QualityCategory::Premium,
        QualityCategory::A,
        QualityCategory::B,
        QualityCategory::C,
    ];

    /// Minimum final score required for this category.
    pub fn min_score(self) -> f64 {
        match self {
            QualityCategory::Specialty => 0.9,
            QualityCategory::Premium => 0.8,
            QualityCategory::A => 0.7,
            QualityCategory::B => 0.6,
            QualityCategory::C => 0.0,
        }
    }

    /// Highest category whose minimum score is met by `score`.
    pub fn from_score(score: f64) -> Self {
        Self::ORDERED
            .into_iter()
            .find(|category| score >= category.min_score())
            .unwrap_or(QualityCategory::C)
    }

    /// Quality rank, higher is better (`C` = 0, `Specialty` = 4).
    pub fn rank(self) -> u8 {
        match self {
            QualityCategory::Specialty => 4,
            QualityCategory::Premium => 3,
            QualityCategory::A => 2,
            QualityCategory::B => 1,
            QualityCategory::C => 0,
        }
    }

    /// A zero-filled count map holding every category.
    pub fn empty_distribution() -> BTreeMap<QualityCategory, usize> {
        Self::ORDERED.into_iter().map(|category| (category, 0)).collect()
    }
}

/// Axis-aligned bounding box in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Smallest box containing every contour point, clipped to the image.
    pub fn from_contour(contour: &[[f32; 2]], image_width: u32, image_height: u32) -> Option<Self> {
        if contour.is_empty() || image_width == 0 || image_height == 0 {
            return None;
        }

        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;

        for &[x, y] in contour {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let x = (min_x.max(0.0) as u32).min(image_width - 1);
        let y = (min_y.max(0.0) as u32).min(image_height - 1);
        let right = (max_x.max(0.0) as u32).min(image_width - 1);
        let bottom = (max_y.max(0.0) as u32).min(image_height - 1);

        Some(Self {
            x,
            y,
            width: right - x + 1,
            height: bottom - y + 1,
        })
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One segmented candidate bean.
#[derive(Debug, Clone)]
pub struct BeanRegion {
    /// Outer boundary in source image coordinates
    pub contour: Vec<[f32; 2]>,
    pub bbox: BoundingBox,
    /// Crop of the original (non-binarized) image under `bbox`
    pub crop: DynamicImage,
}

/// Shape and surface-defect features of one bean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeFeatures {
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    /// Fraction of edge pixels in the blurred crop, in [0, 1]
    pub edge_density: f64,
    pub has_cracks: bool,
}

/// Color class percentages (0-100) predicted for one bean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ColorScores(BTreeMap<ColorClass, f64>);

impl ColorScores {
    /// Build percentages from raw per-class model outputs given in
    /// [`ColorClass::ORDERED`] order.
    ///
    /// Each raw score is rounded to three decimals and the vector is rescaled
    /// to sum to 100 when its total is positive. Missing trailing outputs count
    /// as zero.
    pub fn from_raw(raw: &[f32]) -> Self {
        let rounded: BTreeMap<ColorClass, f64> = ColorClass::ORDERED
            .into_iter()
            .enumerate()
            .map(|(i, class)| {
                let value = raw.get(i).copied().unwrap_or(0.0) as f64;
                (class, round3(value))
            })
            .collect();

        let total: f64 = rounded.values().sum();
        if total > 0.0 {
            Self(
                rounded
                    .into_iter()
                    .map(|(class, value)| (class, value / total * 100.0))
                    .collect(),
            )
        } else {
            Self(rounded)
        }
    }

    pub fn get(&self, class: ColorClass) -> f64 {
        self.0.get(&class).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColorClass, f64)> + '_ {
        self.0.iter().map(|(class, value)| (*class, *value))
    }

    /// Class with the highest percentage; ties go to the earlier class.
    pub fn dominant(&self) -> Option<(ColorClass, f64)> {
        self.iter().fold(None, |best, (class, value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ => Some((class, value)),
        })
    }
}

/// Fused grade for one bean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BeanAssessment {
    pub quality_category: QualityCategory,
    pub final_score: f64,
    pub base_quality_score: f64,
    pub shape_score: f64,
    /// Color class that produced the base score, absent without a color signal
    pub source_category: Option<ColorClass>,
    /// Set when the color model could not score this bean
    #[serde(default)]
    pub color_unavailable: bool,
}

/// Lot-level aggregate over every bean of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LotReport {
    pub total_beans_analyzed: usize,
    pub category_distribution: BTreeMap<QualityCategory, usize>,
    pub average_quality_score: f64,
    pub lot_quality: QualityCategory,
}

/// Per-bean detail kept for traceability.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BeanResult {
    pub index: usize,
    pub bbox: BoundingBox,
    pub contour: Vec<[f32; 2]>,
    pub features: ShapeFeatures,
    pub color_scores: Option<ColorScores>,
    pub assessment: BeanAssessment,
}

/// Everything produced by one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GradingOutcome {
    pub report: LotReport,
    pub beans: Vec<BeanResult>,
    pub image_width: u32,
    pub image_height: u32,
    pub processing_time_seconds: f64,
}

impl GradingOutcome {
    /// Number of beans graded without a color signal.
    pub fn color_fallback_count(&self) -> usize {
        self.beans
            .iter()
            .filter(|bean| bean.assessment.color_unavailable)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_walk_is_greedy() {
        assert_eq!(QualityCategory::from_score(0.9), QualityCategory::Specialty);
        assert_eq!(QualityCategory::from_score(0.899), QualityCategory::Premium);
        assert_eq!(QualityCategory::from_score(0.8), QualityCategory::Premium);
        assert_eq!(QualityCategory::from_score(0.7), QualityCategory::A);
        assert_eq!(QualityCategory::from_score(0.6), QualityCategory::B);
        assert_eq!(QualityCategory::from_score(0.0), QualityCategory::C);
        assert_eq!(QualityCategory::from_score(-1.0), QualityCategory::C);
    }

    #[test]
    fn test_category_is_monotonic_in_score() {
        let mut previous = QualityCategory::from_score(0.0).rank();
        for step in 0..=1000 {
            let rank = QualityCategory::from_score(step as f64 / 1000.0).rank();
            assert!(rank >= previous, "rank dropped at score {}", step as f64 / 1000.0);
            previous = rank;
        }
    }

    #[test]
    fn test_category_names() {
        let names: Vec<String> = QualityCategory::ORDERED.iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["Specialty", "Premium", "A", "B", "C"]);
        assert_eq!(serde_json::to_string(&QualityCategory::Premium).unwrap(), "\"Premium\"");
        assert_eq!("Light".parse::<ColorClass>().unwrap(), ColorClass::Light);
    }

    #[test]
    fn test_color_scores_renormalize_to_100() {
        let scores = ColorScores::from_raw(&[0.1, 0.2, 0.6, 0.3]);
        assert!((scores.total() - 100.0).abs() < 1e-6);
        assert!((scores.get(ColorClass::Light) - 50.0).abs() < 1e-9);
        assert_eq!(scores.dominant().map(|(c, _)| c), Some(ColorClass::Light));
    }

    #[test]
    fn test_color_scores_round_before_renormalizing() {
        // 0.0004 rounds to zero and drops out entirely
        let scores = ColorScores::from_raw(&[0.0004, 0.5, 0.5, 0.0]);
        assert_eq!(scores.get(ColorClass::Dark), 0.0);
        assert!((scores.get(ColorClass::Green) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_color_scores_all_zero_left_as_is() {
        let scores = ColorScores::from_raw(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(scores.total(), 0.0);
        assert_eq!(scores.iter().count(), 4);
    }

    #[test]
    fn test_dominant_tie_prefers_first_class() {
        let scores = ColorScores::from_raw(&[0.5, 0.5, 0.0, 0.0]);
        assert_eq!(scores.dominant().map(|(c, _)| c), Some(ColorClass::Dark));
    }

    #[test]
    fn test_color_scores_serialize_by_class_name() {
        let scores = ColorScores::from_raw(&[0.0, 0.0, 1.0, 0.0]);
        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json["Light"], 100.0);
        assert_eq!(json["Dark"], 0.0);
    }

    #[test]
    fn test_bounding_box_from_contour() {
        let contour = vec![[2.0, 3.0], [10.0, 3.0], [10.0, 7.0], [2.0, 7.0]];
        let bbox = BoundingBox::from_contour(&contour, 20, 20).unwrap();
        assert_eq!(bbox, BoundingBox { x: 2, y: 3, width: 9, height: 5 });
        assert!(BoundingBox::from_contour(&[], 20, 20).is_none());
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.81666), 0.817);
        assert_eq!(round3(0.7 * 0.95 + 0.3 * 1.0), 0.965);
    }

    #[test]
    fn test_round3_uses_exact_binary_value() {
        assert_eq!(round3(0.7725), 0.772);
        assert_eq!(round3(0.9195), 0.919);
        assert_eq!(round3((0.965 + 0.58) / 2.0), 0.772);
        assert_eq!(round3(-0.0004), 0.0);
        assert!(round3(f64::NAN).is_nan());
    }
}
