use std::sync::Arc;

use crate::{
    algorithms::{BeanSegmenter, FeatureExtractor},
    classifier::{ColorClassifier, ColorModel},
    config::GradingConfig,
    grading::QualityGrader,
    pipeline::GradingPipeline,
};

/// Builder for creating grading pipelines with a fluent API
pub struct GradingPipelineBuilder {
    config: GradingConfig,
    segmenter: Option<BeanSegmenter>,
    classifier: Option<Arc<ColorClassifier>>,
}

impl GradingPipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: GradingConfig::default(),
            segmenter: None,
            classifier: None,
        }
    }

    /// Use the given tunables for every stage
    pub fn with_config(mut self, config: GradingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a custom segmenter (replaces the configured one)
    pub fn set_segmenter(mut self, segmenter: BeanSegmenter) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// Share an already loaded classifier
    pub fn set_classifier(mut self, classifier: Arc<ColorClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Wrap a color model in a classifier using the configured input size
    pub fn with_color_model(mut self, model: Arc<dyn ColorModel>) -> Self {
        self.classifier = Some(Arc::new(ColorClassifier::new(model, &self.config.classifier)));
        self
    }

    /// Build the pipeline with default components if not specified
    pub fn build(self) -> GradingPipeline {
        let segmenter = self
            .segmenter
            .unwrap_or_else(|| BeanSegmenter::new(&self.config.segmentation));

        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(ColorClassifier::unavailable(&self.config.classifier)));

        GradingPipeline::new(
            segmenter,
            FeatureExtractor::new(self.config.features.clone()),
            classifier,
            QualityGrader::new(self.config.grading.clone()),
        )
    }
}

impl Default for GradingPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
