//! Per-bean shape metrics and the edge-density crack heuristic.

use std::f64::consts::PI;

use geo::{Area, EuclideanLength};
use geo_types::{Coord, LineString, Polygon};
use image::{DynamicImage, GrayImage};

use crate::{config::FeatureConfig, error::Result, types::ShapeFeatures};

fn contour_ring(contour: &[[f32; 2]]) -> LineString<f64> {
    let coords: Vec<Coord<f64>> = contour
        .iter()
        .map(|&[x, y]| Coord { x: x as f64, y: y as f64 })
        .collect();
    let mut ring = LineString::new(coords);
    ring.close();
    ring
}

/// Area enclosed by the contour (shoelace), in square pixels.
pub fn contour_area(contour: &[[f32; 2]]) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    Polygon::new(contour_ring(contour), vec![]).unsigned_area()
}

/// Length of the contour treated as a closed curve.
pub fn arc_length(contour: &[[f32; 2]]) -> f64 {
    if contour.len() < 2 {
        return 0.0;
    }
    contour_ring(contour).euclidean_length()
}

/// `4π·area / perimeter²`, or 0 for a zero perimeter.
pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter > 0.0 {
        4.0 * PI * area / (perimeter * perimeter)
    } else {
        0.0
    }
}

/// Share of edge pixels after blur + Canny, in [0, 1].
///
/// `canny` smooths with its own sigma 1.4 Gaussian, so a pre-blur of `sigma`
/// gives an effective sigma of `sqrt(sigma² + 1.4²)` (about 1.8 at the
/// default 1.1). A `sigma` of 0 skips the pre-blur.
pub fn edge_density(gray: &GrayImage, sigma: f32, low: f32, high: f32) -> f64 {
    let pixel_count = gray.width() as u64 * gray.height() as u64;
    if pixel_count == 0 {
        return 0.0;
    }

    let edges = if sigma > 0.0 {
        let blurred = imageproc::filter::gaussian_blur_f32(gray, sigma);
        imageproc::edges::canny(&blurred, low, high)
    } else {
        imageproc::edges::canny(gray, low, high)
    };
    let edge_sum: u64 = edges.pixels().map(|p| p[0] as u64).sum();

    edge_sum as f64 / (255.0 * pixel_count as f64)
}

/// Computes [`ShapeFeatures`] for one segmented bean.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn extract(&self, crop: &DynamicImage, contour: &[[f32; 2]]) -> Result<ShapeFeatures> {
        let area = contour_area(contour);
        let perimeter = arc_length(contour);

        let gray = crop.to_luma8();
        let density = edge_density(
            &gray,
            self.config.blur_sigma,
            self.config.canny_low,
            self.config.canny_high,
        );

        Ok(ShapeFeatures {
            area,
            perimeter,
            circularity: circularity(area, perimeter),
            edge_density: density,
            has_cracks: density > self.config.crack_edge_density,
        })
    }
}
