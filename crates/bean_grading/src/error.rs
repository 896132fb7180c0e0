use thiserror::Error;

#[derive(Error, Debug)]
pub enum GradingError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No beans detected in image")]
    NoBeansDetected,

    #[error("Cannot aggregate an empty set of bean assessments")]
    AggregationEmpty,

    #[error("Color model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Failed to load color model: {0}")]
    ModelLoad(String),

    #[error("Color model inference failed: {0}")]
    Inference(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl From<image::ImageError> for GradingError {
    fn from(err: image::ImageError) -> Self {
        GradingError::InvalidImage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GradingError>;
