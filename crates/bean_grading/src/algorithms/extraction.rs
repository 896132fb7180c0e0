use image::GrayImage;
use imageproc::contours::BorderType;
use crate::{error::Result, traits::ContourExtractor};

/// Imageproc-based extractor that keeps only outermost borders.
///
/// Hole borders and anything nested inside a hole are dropped, so each
/// returned contour outlines one connected foreground blob.
#[derive(Debug, Clone, Default)]
pub struct ExternalContourExtractor;

impl ContourExtractor for ExternalContourExtractor {
    fn extract_contours(&self, binary_image: &GrayImage) -> Result<Vec<Vec<[f32; 2]>>> {
        let contours = imageproc::contours::find_contours::<i32>(binary_image);

        let result = contours
            .into_iter()
            .filter(|contour| matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none())
            .map(|contour| {
                contour.points
                    .iter()
                    .map(|p| [p.x as f32, p.y as f32])
                    .collect()
            })
            .collect();

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_ring_yields_single_outer_contour() {
        let mut img = GrayImage::new(50, 50);
        for y in 5..45 {
            for x in 5..45 {
                let inside_hole = (15..35).contains(&x) && (15..35).contains(&y);
                if !inside_hole {
                    img.put_pixel(x, y, Luma([255u8]));
                }
            }
        }
        // island inside the hole must not be reported either
        for y in 22..28 {
            for x in 22..28 {
                img.put_pixel(x, y, Luma([255u8]));
            }
        }

        let contours = ExternalContourExtractor.extract_contours(&img).unwrap();
        assert_eq!(contours.len(), 1);
        assert!(contours[0].iter().any(|&[x, y]| x == 5.0 && y == 5.0));
    }

    #[test]
    fn test_separate_blobs() {
        let mut img = GrayImage::new(60, 20);
        for y in 5..15 {
            for x in 5..15 {
                img.put_pixel(x, y, Luma([255u8]));
                img.put_pixel(x + 30, y, Luma([255u8]));
            }
        }

        let contours = ExternalContourExtractor.extract_contours(&img).unwrap();
        assert_eq!(contours.len(), 2);
    }

    #[test]
    fn test_empty_image() {
        let img = GrayImage::new(10, 10);
        assert!(ExternalContourExtractor.extract_contours(&img).unwrap().is_empty());
    }
}
