use std::{path::Path, sync::Arc};

use image::DynamicImage;
use crate::{
    classifier::{ColorClassifier, ColorModel, ModelProvider},
    config::GradingConfig,
    error::Result,
    pipeline::GradingPipeline,
    types::GradingOutcome,
};

/// Process-wide grading state, built once at start-up.
///
/// Owns the loaded color model and a ready pipeline. Cloning is cheap and
/// every clone shares the same model, so concurrent runs never reload it.
#[derive(Clone)]
pub struct GradingContext {
    config: Arc<GradingConfig>,
    pipeline: Arc<GradingPipeline>,
}

impl GradingContext {
    /// Validate `config` and load the color model through `provider`.
    ///
    /// A model that cannot be loaded leaves the context usable; beans are
    /// then graded with the fallback base score.
    pub fn new(config: GradingConfig, provider: &dyn ModelProvider) -> Result<Self> {
        config.validate()?;
        let classifier = ColorClassifier::from_provider(provider, &config.classifier);
        Ok(Self::assemble(config, classifier))
    }

    /// Context around an in-memory model
    pub fn with_model(config: GradingConfig, model: Arc<dyn ColorModel>) -> Result<Self> {
        config.validate()?;
        let classifier = ColorClassifier::new(model, &config.classifier);
        Ok(Self::assemble(config, classifier))
    }

    /// Context that grades on shape alone
    pub fn without_model(config: GradingConfig) -> Result<Self> {
        config.validate()?;
        let classifier = ColorClassifier::unavailable(&config.classifier);
        Ok(Self::assemble(config, classifier))
    }

    fn assemble(config: GradingConfig, classifier: ColorClassifier) -> Self {
        let pipeline = GradingPipeline::builder()
            .with_config(config.clone())
            .set_classifier(Arc::new(classifier))
            .build();

        tracing::debug!(pipeline = %pipeline.info(), "grading context ready");

        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &GradingPipeline {
        &self.pipeline
    }

    pub fn color_model_available(&self) -> bool {
        self.pipeline.classifier().is_available()
    }

    /// Grade encoded image bytes
    pub fn grade_bytes(&self, image_bytes: &[u8]) -> Result<GradingOutcome> {
        self.pipeline.run(image_bytes)
    }

    /// Grade a decoded image
    pub fn grade_image(&self, image: &DynamicImage) -> Result<GradingOutcome> {
        self.pipeline.run_image(image)
    }

    /// Read and grade an image file
    pub fn grade_file<P: AsRef<Path>>(&self, path: P) -> Result<GradingOutcome> {
        let bytes = std::fs::read(path)?;
        self.grade_bytes(&bytes)
    }
}
