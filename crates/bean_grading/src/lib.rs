//! # Coffee Bean Grading Library
//!
//! Grades the coffee beans in one photograph: beans are segmented from the
//! backdrop, measured for shape and surface cracks, scored for color by an
//! external model and fused into per-bean grades and a lot report.
//!
//! ## Core Features
//!
//! - **Segmentation**: Otsu threshold, morphological closing and external contours
//! - **Shape Features**: area, perimeter, circularity and an edge-density crack flag
//! - **Color Scores**: pluggable [`ColorModel`] loaded once through a [`ModelProvider`]
//!   (JSON channel-stats weights, or an ONNX network with the `onnx` feature)
//! - **Grading**: 70/30 color/shape fusion, greedy category walk, lot aggregation
//! - **Export**: JSON reports and GeoJSON bean outlines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bean_grading::{GradingConfig, GradingContext, LocalModelProvider};
//!
//! let provider = LocalModelProvider::new("models/color_model.json");
//! let context = GradingContext::new(GradingConfig::default(), &provider)?;
//!
//! let outcome = context.grade_file("lot-42.jpg")?;
//! println!("{} beans, lot grade {}", outcome.report.total_beans_analyzed, outcome.report.lot_quality);
//! outcome.save_json("lot-42.report.json")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod config;
pub mod traits;
pub mod algorithms;
pub mod classifier;
pub mod grading;
pub mod pipeline;
pub mod context;
pub mod io;

// Re-exports for convenience
pub use error::{GradingError, Result};
pub use types::*;
pub use config::{BaseScoreMapping, ClassifierConfig, FeatureConfig, GraderConfig, GradingConfig, SegmentationConfig};
pub use traits::*;
pub use algorithms::*;
pub use classifier::{
    load_model_file, ChannelStatsModel, ChannelStatsWeights, ColorClassifier, ColorModel,
    LocalModelProvider, ModelProvider, RemoteFallbackModelProvider,
};
#[cfg(feature = "onnx")]
pub use classifier::OnnxColorModel;
pub use grading::{ColorSignal, QualityGrader};
pub use pipeline::{GradingPipeline, builder::GradingPipelineBuilder};
pub use context::GradingContext;

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Cursor, sync::Arc};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_ellipse_mut};

    const BEAN: Rgb<u8> = Rgb([170, 130, 100]);

    fn lot_image() -> RgbImage {
        let mut img = RgbImage::from_pixel(420, 140, Rgb([245, 245, 245]));
        // round, evenly colored bean
        draw_filled_circle_mut(&mut img, (60, 70), 45, BEAN);
        // long, thin bean
        draw_filled_ellipse_mut(&mut img, (200, 70), 60, 10, BEAN);
        // round bean with dark cracks across its surface
        draw_filled_circle_mut(&mut img, (340, 70), 45, BEAN);
        for x0 in (305..380).step_by(10) {
            for x in x0..x0 + 5 {
                for y in 30..110 {
                    let (dx, dy) = (x as i32 - 340, y as i32 - 70);
                    if dx * dx + dy * dy < 40 * 40 {
                        img.put_pixel(x, y, Rgb([0, 0, 0]));
                    }
                }
            }
        }
        img
    }

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("png encoding should succeed");
        bytes.into_inner()
    }

    fn sample_model() -> Arc<dyn ColorModel> {
        let weights = ChannelStatsWeights {
            classes: ColorClass::ORDERED.to_vec(),
            weights: vec![
                [-6.0, -6.0, -6.0],
                [-4.0, 10.0, -4.0],
                [6.0, 6.0, 6.0],
                [2.0, 2.0, 2.0],
            ],
            bias: vec![6.0, 0.0, -9.0, -2.0],
        };
        Arc::new(ChannelStatsModel::new(weights).expect("weights are valid"))
    }

    #[test]
    fn test_pipeline_grades_every_bean() {
        let context = GradingContext::with_model(GradingConfig::default(), sample_model()).unwrap();
        let outcome = context.grade_bytes(&encode_png(&lot_image())).expect("Should grade lot");

        assert_eq!(outcome.beans.len(), 3);
        assert_eq!(outcome.report.total_beans_analyzed, 3);
        assert_eq!(outcome.report.category_distribution.values().sum::<usize>(), 3);
        assert_eq!(outcome.color_fallback_count(), 0);
        assert_eq!((outcome.image_width, outcome.image_height), (420, 140));

        for bean in &outcome.beans {
            let scores = bean.color_scores.as_ref().expect("model is loaded");
            assert!((scores.total() - 100.0).abs() < 1e-6);
            assert!(bean.assessment.source_category.is_some());
            assert!((0.0..=1.0).contains(&bean.assessment.shape_score));
            assert!(bean.features.circularity >= 0.0 && bean.features.circularity <= 1.3);
        }
    }

    #[test]
    fn test_pipeline_shape_signals() {
        let context = GradingContext::without_model(GradingConfig::default()).unwrap();
        let outcome = context.grade_image(&DynamicImage::ImageRgb8(lot_image())).unwrap();

        let mut beans = outcome.beans.clone();
        beans.sort_by_key(|b| b.bbox.x);
        let (round, thin, cracked) = (&beans[0], &beans[1], &beans[2]);

        assert!(round.features.circularity >= 0.7);
        assert!(!round.features.has_cracks);
        assert_eq!(round.assessment.shape_score, 1.0);

        assert!(thin.features.circularity < 0.7);
        assert!(thin.assessment.shape_score < 1.0);

        assert!(cracked.features.has_cracks);
        assert!(cracked.assessment.shape_score < 1.0);
    }

    #[test]
    fn test_missing_model_degrades_to_fallback() {
        let context = GradingContext::without_model(GradingConfig::default()).unwrap();
        let outcome = context.grade_image(&DynamicImage::ImageRgb8(lot_image())).unwrap();

        assert_eq!(outcome.color_fallback_count(), outcome.beans.len());
        for bean in &outcome.beans {
            assert!(bean.color_scores.is_none());
            assert!(bean.assessment.color_unavailable);
            assert_eq!(bean.assessment.base_quality_score, 0.5);
            assert_eq!(bean.assessment.source_category, None);
        }
    }

    #[test]
    fn test_invalid_bytes_are_rejected() {
        let context = GradingContext::without_model(GradingConfig::default()).unwrap();
        assert!(matches!(
            context.grade_bytes(b"definitely not an image"),
            Err(GradingError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let pipeline = GradingPipeline::builder().build();
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(pipeline.run_image(&empty), Err(GradingError::InvalidImage(_))));
    }

    #[test]
    fn test_blank_image_has_no_beans() {
        let pipeline = GradingPipeline::builder().build();
        let blank = RgbImage::from_pixel(100, 100, Rgb([240, 240, 240]));
        assert!(matches!(
            pipeline.run(&encode_png(&blank)),
            Err(GradingError::NoBeansDetected)
        ));
    }

    #[test]
    fn test_concurrent_runs_share_one_model() {
        let context = GradingContext::with_model(GradingConfig::default(), sample_model()).unwrap();
        let image = DynamicImage::ImageRgb8(lot_image());

        let reports: Vec<LotReport> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let context = context.clone();
                    let image = &image;
                    scope.spawn(move || context.grade_image(image).unwrap().report)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(reports.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_outcome_exports() {
        let context = GradingContext::with_model(GradingConfig::default(), sample_model()).unwrap();
        let outcome = context.grade_image(&DynamicImage::ImageRgb8(lot_image())).unwrap();

        let geojson = outcome.to_geojson().expect("Should create GeoJSON");
        assert_eq!(geojson.features.len(), 3);
        let props = geojson.features[0].properties.as_ref().unwrap();
        assert!(props.contains_key("quality_category"));
        assert!(props.contains_key("circularity"));

        let parsed = GradingOutcome::from_json(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(parsed.beans.len(), outcome.beans.len());
        assert_eq!(parsed.report.lot_quality, outcome.report.lot_quality);
        assert_eq!(parsed.report.category_distribution, outcome.report.category_distribution);
    }
}
