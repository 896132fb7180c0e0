use bean_grading::{GradingConfig, LocalModelProvider, ModelProvider, RemoteFallbackModelProvider};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString, VariantNames};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    GradingError(#[from] bean_grading::GradingError),
    #[error("No images to grade")]
    NoImages,
    #[error("A model URL needs a local 'model.path' to cache the download")]
    MissingModelPath,
    #[error("Images {first} and {second} would write the same report files")]
    DuplicateOutput { first: String, second: String },
    #[error("Timeout must be at least one second")]
    InvalidTimeout,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Where the color model comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum ModelSource {
    /// Grade on shape alone
    None,
    Local,
    RemoteFallback,
}

/// Color model location
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ModelSettings {
    /// Local weights file; also the cache target for downloads
    pub path: Option<String>,
    /// Fetched when `path` does not exist yet
    pub url: Option<String>,
}

impl ModelSettings {
    pub fn source(&self) -> ModelSource {
        match (&self.path, &self.url) {
            (Some(_), Some(_)) => ModelSource::RemoteFallback,
            (Some(_), None) => ModelSource::Local,
            (None, _) => ModelSource::None,
        }
    }

    /// Provider for the configured source, `None` when no model is configured
    pub fn provider(&self) -> Result<Option<Box<dyn ModelProvider>>, CliError> {
        match (&self.path, &self.url) {
            (Some(path), Some(url)) => Ok(Some(Box::new(RemoteFallbackModelProvider::new(
                path.as_str(),
                url.as_str(),
            )))),
            (Some(path), None) => Ok(Some(Box::new(LocalModelProvider::new(path.as_str())))),
            (None, Some(_)) => Err(CliError::MissingModelPath),
            (None, None) => Ok(None),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

/// One grading run: images, model and outputs
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GradingRunConfig {
    pub images: Vec<String>,
    pub output_dir: String,
    #[serde(default)]
    pub model: ModelSettings,
    /// Per-image time limit
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub grading: GradingConfig,
}

impl GradingRunConfig {
    pub fn new(images: Vec<String>, output_dir: impl Into<String>) -> Self {
        Self {
            images,
            output_dir: output_dir.into(),
            model: ModelSettings::default(),
            timeout_secs: default_timeout_secs(),
            grading: GradingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), CliError> {
        if self.images.is_empty() {
            return Err(CliError::NoImages);
        }
        if self.timeout_secs == 0 {
            return Err(CliError::InvalidTimeout);
        }
        if self.model.url.is_some() && self.model.path.is_none() {
            return Err(CliError::MissingModelPath);
        }

        let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
        for image in &self.images {
            let (report, _) = self.output_paths(image);
            if let Some(first) = claimed.insert(report, image.as_str()) {
                return Err(CliError::DuplicateOutput {
                    first: first.to_string(),
                    second: image.clone(),
                });
            }
        }

        self.grading.validate()?;
        Ok(())
    }

    /// Output paths for an image: `<stem>.report.json` and `<stem>.beans.geojson`
    pub fn output_paths<P: AsRef<Path>>(&self, image: P) -> (PathBuf, PathBuf) {
        let stem = image
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let dir = Path::new(&self.output_dir);
        (
            dir.join(format!("{stem}.report.json")),
            dir.join(format!("{stem}.beans.geojson")),
        )
    }

    /// Load a run configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a run configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(GradingRunConfig)
    }
}

/// Load just the grading tunables from a `.toml` or `.json` file
pub fn load_grading_config<P: AsRef<Path>>(path: P) -> Result<GradingConfig, CliError> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(path_ref)?;
    match path_ref.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(toml::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => Err(CliError::UnsupportedFileFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_toml_run_config_with_defaults() {
        let config = GradingRunConfig::from_toml(
            r#"
            images = ["lot-1.jpg", "lot-2.png"]
            output_dir = "out"

            [model]
            path = "models/color.json"

            [grading.segmentation]
            min_bean_area = 800
            "#,
        )
        .unwrap();

        assert_eq!(config.images.len(), 2);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.model.source(), ModelSource::Local);
        assert_eq!(config.grading.segmentation.min_bean_area, 800.0);
        assert_eq!(config.grading.grading.color_weight, 0.7);
        config.validate().unwrap();
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = GradingRunConfig::new(vec!["a.jpg".into()], "out");
        config.model.path = Some("m.json".into());
        config.model.url = Some("https://example.com/m.json".into());
        let parsed = GradingRunConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.model.source(), ModelSource::RemoteFallback);
    }

    #[test]
    fn test_validation_errors() {
        let empty = GradingRunConfig::new(vec![], "out");
        assert!(matches!(empty.validate(), Err(CliError::NoImages)));

        let mut url_only = GradingRunConfig::new(vec!["a.jpg".into()], "out");
        url_only.model.url = Some("https://example.com/m.json".into());
        assert!(matches!(url_only.validate(), Err(CliError::MissingModelPath)));
        assert!(url_only.model.provider().is_err());

        let mut no_time = GradingRunConfig::new(vec!["a.jpg".into()], "out");
        no_time.timeout_secs = 0;
        assert!(matches!(no_time.validate(), Err(CliError::InvalidTimeout)));
    }

    #[test]
    fn test_images_sharing_a_stem_are_rejected() {
        let clash = GradingRunConfig::new(vec!["a/lot.jpg".into(), "b/lot.png".into()], "out");
        match clash.validate() {
            Err(CliError::DuplicateOutput { first, second }) => {
                assert_eq!(first, "a/lot.jpg");
                assert_eq!(second, "b/lot.png");
            }
            other => panic!("expected duplicate output error, got {other:?}"),
        }

        let distinct = GradingRunConfig::new(vec!["a/lot-1.jpg".into(), "b/lot-2.jpg".into()], "out");
        assert!(distinct.validate().is_ok());
    }

    #[test]
    fn test_from_file_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let config = GradingRunConfig::new(vec!["a.jpg".into()], "out");

        let toml_path = dir.path().join("run.toml");
        fs::write(&toml_path, config.to_toml().unwrap()).unwrap();
        assert_eq!(GradingRunConfig::from_file(&toml_path).unwrap(), config);

        let json_path = dir.path().join("run.json");
        fs::write(&json_path, config.to_json().unwrap()).unwrap();
        assert_eq!(GradingRunConfig::from_file(&json_path).unwrap(), config);

        let yaml_path = dir.path().join("run.yaml");
        fs::write(&yaml_path, "images: []").unwrap();
        assert!(matches!(
            GradingRunConfig::from_file(&yaml_path),
            Err(CliError::UnsupportedFileFormat)
        ));
    }

    #[test]
    fn test_output_paths_use_image_stem() {
        let config = GradingRunConfig::new(vec![], "out");
        let (report, geojson) = config.output_paths("photos/lot-7.jpg");
        assert_eq!(report, Path::new("out").join("lot-7.report.json"));
        assert_eq!(geojson, Path::new("out").join("lot-7.beans.geojson"));
    }

    #[test]
    fn test_model_source_names() {
        assert_eq!(ModelSource::RemoteFallback.to_string(), "remote_fallback");
        assert_eq!(ModelSource::from_str("local").unwrap(), ModelSource::Local);
        assert!(ModelSettings::default().provider().unwrap().is_none());
    }

    #[test]
    fn test_schema_names_sections() {
        let schema = serde_json::to_string(&GradingRunConfig::schema()).unwrap();
        assert!(schema.contains("output_dir"));
        assert!(schema.contains("min_bean_area"));
    }
}
