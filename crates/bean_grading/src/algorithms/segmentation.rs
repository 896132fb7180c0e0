use image::DynamicImage;
use crate::{
    algorithms::{
        features::contour_area, ExternalContourExtractor, MorphologicalClosePreprocessor,
        OtsuThresholdPreprocessor,
    },
    config::SegmentationConfig,
    error::Result,
    traits::{ContourExtractor, ImagePreprocessor},
    types::{BeanRegion, BoundingBox},
};

/// Isolates candidate bean regions from a photograph.
pub struct BeanSegmenter {
    preprocessors: Vec<Box<dyn ImagePreprocessor>>,
    contour_extractor: Box<dyn ContourExtractor>,
    min_bean_area: f64,
}

impl BeanSegmenter {
    /// Otsu threshold, closing and external contours as configured
    pub fn new(config: &SegmentationConfig) -> Self {
        Self::with_components(
            vec![
                Box::new(OtsuThresholdPreprocessor),
                Box::new(MorphologicalClosePreprocessor {
                    kernel_size: config.close_kernel_size,
                    iterations: config.close_iterations,
                }),
            ],
            Box::new(ExternalContourExtractor),
            config.min_bean_area,
        )
    }

    pub fn with_components(
        preprocessors: Vec<Box<dyn ImagePreprocessor>>,
        contour_extractor: Box<dyn ContourExtractor>,
        min_bean_area: f64,
    ) -> Self {
        Self {
            preprocessors,
            contour_extractor,
            min_bean_area,
        }
    }

    /// Noise filter: only contours enclosing strictly more than the minimum area survive.
    pub fn keeps(&self, contour: &[[f32; 2]]) -> bool {
        contour_area(contour) > self.min_bean_area
    }

    /// Segment `image` into bean regions, in contour-finder order.
    ///
    /// Returns an empty vector when nothing survives the area filter.
    pub fn segment(&self, image: &DynamicImage) -> Result<Vec<BeanRegion>> {
        let mut binary = image.to_luma8();
        for preprocessor in &self.preprocessors {
            binary = preprocessor.preprocess(&binary)?;
        }

        let contours = self.contour_extractor.extract_contours(&binary)?;
        let found = contours.len();

        let regions: Vec<BeanRegion> = contours
            .into_iter()
            .filter(|contour| self.keeps(contour))
            .filter_map(|contour| {
                let bbox = BoundingBox::from_contour(&contour, image.width(), image.height())?;
                let crop = image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
                Some(BeanRegion { contour, bbox, crop })
            })
            .collect();

        tracing::debug!(
            contours = found,
            regions = regions.len(),
            min_area = self.min_bean_area,
            "segmentation finished"
        );

        Ok(regions)
    }

    /// Get information about the segmenter configuration
    pub fn info(&self) -> String {
        format!(
            "BeanSegmenter: {} preprocessors, 1 contour extractor, min area {}",
            self.preprocessors.len(),
            self.min_bean_area
        )
    }
}

impl Default for BeanSegmenter {
    fn default() -> Self {
        Self::new(&SegmentationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    fn backdrop() -> RgbImage {
        RgbImage::from_pixel(200, 120, Rgb([235, 235, 230]))
    }

    #[test]
    fn test_area_filter_is_strict() {
        let segmenter = BeanSegmenter::default();
        let exactly_500 = vec![[0.0, 0.0], [20.0, 0.0], [20.0, 25.0], [0.0, 25.0]];
        let just_above = vec![[0.0, 0.0], [501.0, 0.0], [501.0, 1.0], [0.0, 1.0]];
        assert!(!segmenter.keeps(&exactly_500));
        assert!(segmenter.keeps(&just_above));
    }

    #[test]
    fn test_segments_dark_beans_on_light_background() {
        let mut img = backdrop();
        draw_filled_circle_mut(&mut img, (50, 60), 25, Rgb([70, 45, 30]));
        draw_filled_circle_mut(&mut img, (140, 60), 25, Rgb([80, 50, 35]));

        let regions = BeanSegmenter::default()
            .segment(&DynamicImage::ImageRgb8(img))
            .unwrap();

        assert_eq!(regions.len(), 2);
        for region in &regions {
            assert_eq!(region.crop.width(), region.bbox.width);
            assert_eq!(region.crop.height(), region.bbox.height);
            assert!(region.bbox.width >= 45 && region.bbox.width <= 55);
        }
    }

    #[test]
    fn test_small_specks_are_dropped() {
        let mut img = backdrop();
        draw_filled_circle_mut(&mut img, (60, 60), 28, Rgb([60, 40, 30]));
        // 8x8 speck encloses far less than 500 pixels
        draw_filled_rect_mut(&mut img, Rect::at(160, 20).of_size(8, 8), Rgb([60, 40, 30]));

        let regions = BeanSegmenter::default()
            .segment(&DynamicImage::ImageRgb8(img))
            .unwrap();
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn test_blank_image_yields_no_regions() {
        let regions = BeanSegmenter::default()
            .segment(&DynamicImage::ImageRgb8(backdrop()))
            .unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_crop_comes_from_original_pixels() {
        let mut img = backdrop();
        draw_filled_rect_mut(&mut img, Rect::at(40, 30).of_size(50, 40), Rgb([90, 60, 20]));

        let regions = BeanSegmenter::default()
            .segment(&DynamicImage::ImageRgb8(img))
            .unwrap();
        assert_eq!(regions.len(), 1);

        let bbox = regions[0].bbox;
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (40, 30, 50, 40));
        let center = regions[0].crop.to_rgb8().get_pixel(25, 20).0;
        assert_eq!(center, [90, 60, 20]);
    }
}
