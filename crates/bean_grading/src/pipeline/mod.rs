pub mod builder;

use std::{sync::Arc, time::Instant};

use image::DynamicImage;
use crate::{
    algorithms::{BeanSegmenter, FeatureExtractor},
    classifier::ColorClassifier,
    error::{GradingError, Result},
    grading::QualityGrader,
    types::{BeanResult, GradingOutcome},
};

/// Drives one image through segmentation, feature extraction, color
/// classification and grading.
pub struct GradingPipeline {
    segmenter: BeanSegmenter,
    feature_extractor: FeatureExtractor,
    classifier: Arc<ColorClassifier>,
    grader: QualityGrader,
}

impl GradingPipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::GradingPipelineBuilder {
        builder::GradingPipelineBuilder::new()
    }

    /// Create a new pipeline with the given components
    pub fn new(
        segmenter: BeanSegmenter,
        feature_extractor: FeatureExtractor,
        classifier: Arc<ColorClassifier>,
        grader: QualityGrader,
    ) -> Self {
        Self {
            segmenter,
            feature_extractor,
            classifier,
            grader,
        }
    }

    pub fn classifier(&self) -> &ColorClassifier {
        &self.classifier
    }

    /// Decode encoded image bytes (JPEG/PNG/TIFF) and grade them.
    pub fn run(&self, image_bytes: &[u8]) -> Result<GradingOutcome> {
        let started = Instant::now();
        let image = image::load_from_memory(image_bytes)?;
        self.grade(&image, started)
    }

    /// Grade an already decoded image.
    pub fn run_image(&self, image: &DynamicImage) -> Result<GradingOutcome> {
        self.grade(image, Instant::now())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    fn grade(&self, image: &DynamicImage, started: Instant) -> Result<GradingOutcome> {
        if image.width() == 0 || image.height() == 0 {
            return Err(GradingError::InvalidImage("image has no pixels".into()));
        }

        // Step 1: Isolate beans
        let regions = self.segmenter.segment(image)?;
        if regions.is_empty() {
            return Err(GradingError::NoBeansDetected);
        }

        // Step 2: Per-bean features, color and grade, in segmentation order
        let mut beans = Vec::with_capacity(regions.len());
        for (index, region) in regions.into_iter().enumerate() {
            let features = self.feature_extractor.extract(&region.crop, &region.contour)?;
            let color_scores = self.classifier.predict(&region.crop);
            let signal = self.grader.color_signal(color_scores.as_ref());
            let assessment = self.grader.grade_one_bean(signal, &features);

            tracing::debug!(
                index,
                area = features.area,
                circularity = features.circularity,
                has_cracks = features.has_cracks,
                color_unavailable = assessment.color_unavailable,
                final_score = assessment.final_score,
                category = %assessment.quality_category,
                "graded bean"
            );

            beans.push(BeanResult {
                index,
                bbox: region.bbox,
                contour: region.contour,
                features,
                color_scores,
                assessment,
            });
        }

        // Step 3: Lot report
        let assessments: Vec<_> = beans.iter().map(|b| b.assessment.clone()).collect();
        let report = self.grader.aggregate(&assessments)?;

        let outcome = GradingOutcome {
            report,
            beans,
            image_width: image.width(),
            image_height: image.height(),
            processing_time_seconds: started.elapsed().as_secs_f64(),
        };

        let fallbacks = outcome.color_fallback_count();
        if fallbacks > 0 {
            tracing::warn!(
                beans = outcome.beans.len(),
                fallbacks,
                "graded beans without a color signal"
            );
        }
        tracing::info!(
            beans = outcome.report.total_beans_analyzed,
            average = outcome.report.average_quality_score,
            lot_quality = %outcome.report.lot_quality,
            seconds = outcome.processing_time_seconds,
            "lot graded"
        );

        Ok(outcome)
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "GradingPipeline: {}, color model {}",
            self.segmenter.info(),
            if self.classifier.is_available() { "loaded" } else { "unavailable" }
        )
    }
}
