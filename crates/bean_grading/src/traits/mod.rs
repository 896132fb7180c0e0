use image::GrayImage;
use crate::error::Result;

/// Trait for image preprocessing algorithms
pub trait ImagePreprocessor: Send + Sync  {
    /// Preprocess the input image (e.g., threshold, morphology)
    fn preprocess(&self, image: &GrayImage) -> Result<GrayImage>;
}

/// Trait for contour extraction algorithms
pub trait ContourExtractor: Send + Sync  {
    /// Extract contours from a binary image
    fn extract_contours(&self, image: &GrayImage) -> Result<Vec<Vec<[f32; 2]>>>;
}
