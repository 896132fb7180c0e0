use image::GrayImage;
use imageproc::{
    contrast::{threshold, ThresholdType},
    distance_transform::Norm,
};
use crate::{error::Result, traits::ImagePreprocessor};

/// Global Otsu threshold with beans as foreground.
///
/// Pixels brighter than the Otsu level become background (0); the rest
/// become foreground (255). Beans are expected darker than the backdrop.
#[derive(Debug, Clone, Default)]
pub struct OtsuThresholdPreprocessor;

impl ImagePreprocessor for OtsuThresholdPreprocessor {
    fn preprocess(&self, image: &GrayImage) -> Result<GrayImage> {
        let level = imageproc::contrast::otsu_level(image);
        tracing::trace!(level, "otsu threshold level");

        Ok(threshold(image, level, ThresholdType::BinaryInverted))
    }
}

/// Morphological closing with a square structuring element.
///
/// `iterations` repeated dilations are followed by as many erosions, which is
/// a single closing with a square of side `iterations * (kernel_size - 1) + 1`.
#[derive(Debug, Clone)]
pub struct MorphologicalClosePreprocessor {
    pub kernel_size: u8,
    pub iterations: u8,
}

impl Default for MorphologicalClosePreprocessor {
    fn default() -> Self {
        Self {
            kernel_size: 5,
            iterations: 2,
        }
    }
}

impl MorphologicalClosePreprocessor {
    fn radius(&self) -> u8 {
        (self.kernel_size / 2).saturating_mul(self.iterations)
    }
}

impl ImagePreprocessor for MorphologicalClosePreprocessor {
    fn preprocess(&self, image: &GrayImage) -> Result<GrayImage> {
        let radius = self.radius();
        if radius == 0 {
            return Ok(image.clone());
        }
        Ok(imageproc::morphology::close(image, Norm::LInf, radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_otsu_marks_dark_objects_as_foreground() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([220u8]));
        for y in 10..30 {
            for x in 10..30 {
                img.put_pixel(x, y, Luma([30u8]));
            }
        }

        let binary = OtsuThresholdPreprocessor.preprocess(&img).unwrap();
        assert_eq!(binary.get_pixel(20, 20)[0], 255);
        assert_eq!(binary.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn test_close_fills_small_gap() {
        let mut img = GrayImage::new(60, 60);
        for y in 10..50 {
            for x in 10..50 {
                // two-pixel vertical crack through the middle
                if x != 29 && x != 30 {
                    img.put_pixel(x, y, Luma([255u8]));
                }
            }
        }

        let closed = MorphologicalClosePreprocessor::default().preprocess(&img).unwrap();
        assert_eq!(closed.get_pixel(29, 30)[0], 255);
        assert_eq!(closed.get_pixel(30, 30)[0], 255);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let mut img = GrayImage::new(10, 10);
        img.put_pixel(5, 5, Luma([255u8]));
        let pre = MorphologicalClosePreprocessor { kernel_size: 5, iterations: 0 };
        assert_eq!(pre.preprocess(&img).unwrap(), img);
    }
}
