use crate::{
    config::{BaseScoreMapping, GraderConfig},
    error::{GradingError, Result},
    types::{round3, BeanAssessment, ColorClass, ColorScores, LotReport, QualityCategory, ShapeFeatures},
};

/// Color-derived input to [`QualityGrader::grade_one_bean`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSignal {
    pub base_score: f64,
    pub source_category: Option<ColorClass>,
    pub unavailable: bool,
}

/// Fuses color and shape signals per bean and aggregates lots.
#[derive(Debug, Clone, Default)]
pub struct QualityGrader {
    config: GraderConfig,
}

impl QualityGrader {
    pub fn new(config: GraderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Shape score: 1.0 minus the circularity and crack penalties, never negative.
    pub fn shape_score(&self, features: &ShapeFeatures) -> f64 {
        let mut score = 1.0;
        if features.circularity < self.config.min_circularity {
            score -= self.config.circularity_penalty;
        }
        if features.has_cracks {
            score -= self.config.crack_penalty;
        }
        f64::max(0.0, score)
    }

    /// Reduce a color distribution to the grader's base score.
    ///
    /// The dominant class is always reported as the source category. Absent
    /// or all-zero scores fall back to the configured neutral base score.
    pub fn color_signal(&self, scores: Option<&ColorScores>) -> ColorSignal {
        let dominant = scores.and_then(|s| s.dominant().filter(|(_, pct)| *pct > 0.0));

        match (scores, dominant) {
            (Some(scores), Some((class, _))) => {
                let base_score = match self.config.base_score_mapping {
                    BaseScoreMapping::DominantClass => class.base_score(),
                    BaseScoreMapping::Weighted => scores
                        .iter()
                        .map(|(c, pct)| pct / 100.0 * c.base_score())
                        .sum(),
                };
                ColorSignal {
                    base_score,
                    source_category: Some(class),
                    unavailable: false,
                }
            }
            _ => ColorSignal {
                base_score: self.config.fallback_base_score,
                source_category: None,
                unavailable: true,
            },
        }
    }

    /// Grade one bean from its color signal and shape features.
    pub fn grade_one_bean(&self, color: ColorSignal, features: &ShapeFeatures) -> BeanAssessment {
        let shape_score = self.shape_score(features);
        let fused =
            color.base_score * self.config.color_weight + shape_score * self.config.shape_weight;

        // Category from the unrounded score, same as the lot level
        BeanAssessment {
            quality_category: QualityCategory::from_score(fused),
            final_score: round3(fused),
            base_quality_score: color.base_score,
            shape_score,
            source_category: color.source_category,
            color_unavailable: color.unavailable,
        }
    }

    /// Lot report over every assessment of one image.
    ///
    /// The lot category is derived from the mean score, not by majority vote.
    pub fn aggregate(&self, assessments: &[BeanAssessment]) -> Result<LotReport> {
        if assessments.is_empty() {
            return Err(GradingError::AggregationEmpty);
        }

        let mut category_distribution = QualityCategory::empty_distribution();
        for assessment in assessments {
            *category_distribution
                .entry(assessment.quality_category)
                .or_insert(0) += 1;
        }

        let total = assessments.len();
        let mean = assessments.iter().map(|a| a.final_score).sum::<f64>() / total as f64;

        Ok(LotReport {
            total_beans_analyzed: total,
            category_distribution,
            average_quality_score: round3(mean),
            lot_quality: QualityCategory::from_score(mean),
        })
    }
}
