use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    classifier::model::{ChannelStatsModel, ColorModel},
    error::{GradingError, Result},
};

/// Largest model artifact accepted from a download
#[cfg(feature = "download")]
const MAX_MODEL_BYTES: u64 = 512 * 1024 * 1024;

/// Source of the color model artifact.
///
/// Loading may touch disk or network and is expected to happen once, at
/// start-up. The returned model is then shared read-only by every run.
pub trait ModelProvider: Send + Sync {
    /// Cheap check that a load attempt can succeed without doing it
    fn is_available(&self) -> bool;

    fn load(&self) -> Result<Arc<dyn ColorModel>>;

    fn describe(&self) -> String;
}

/// Load a model artifact, choosing the backend by extension: `.onnx` files
/// go to ONNX Runtime, anything else is read as JSON channel-stats weights.
pub fn load_model_file(path: &Path) -> Result<Arc<dyn ColorModel>> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("onnx") => load_onnx(path),
        _ => Ok(Arc::new(ChannelStatsModel::from_file(path)?)),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(path: &Path) -> Result<Arc<dyn ColorModel>> {
    Ok(Arc::new(crate::classifier::onnx::OnnxColorModel::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(path: &Path) -> Result<Arc<dyn ColorModel>> {
    Err(GradingError::ModelUnavailable(format!(
        "{} needs the `onnx` feature",
        path.display()
    )))
}

/// Loads model weights from a file on disk.
#[derive(Debug, Clone)]
pub struct LocalModelProvider {
    path: PathBuf,
}

impl LocalModelProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelProvider for LocalModelProvider {
    fn is_available(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<Arc<dyn ColorModel>> {
        if !self.is_available() {
            return Err(GradingError::ModelUnavailable(format!(
                "no model file at {}",
                self.path.display()
            )));
        }
        let model = load_model_file(&self.path)?;
        tracing::info!(path = %self.path.display(), model = model.name(), "loaded color model");
        Ok(model)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.path.display())
    }
}

/// Local file first; when missing, downloads the artifact, caches it at the
/// local path and loads it from there.
#[derive(Debug, Clone)]
pub struct RemoteFallbackModelProvider {
    local: LocalModelProvider,
    url: String,
    max_attempts: u32,
    backoff: Duration,
}

impl RemoteFallbackModelProvider {
    pub fn new<P: Into<PathBuf>>(path: P, url: impl Into<String>) -> Self {
        Self {
            local: LocalModelProvider::new(path),
            url: url.into(),
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn download(&self) -> Result<()> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match fetch(&self.url).and_then(|body| self.store(&body)) {
                Ok(()) => {
                    tracing::info!(
                        url = %self.url,
                        path = %self.local.path().display(),
                        attempt,
                        "downloaded color model"
                    );
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(url = %self.url, attempt, error = %err, "model download failed");
                    last_error = Some(err);
                    if attempt < self.max_attempts {
                        std::thread::sleep(self.backoff * attempt);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GradingError::ModelUnavailable(format!("could not download {}", self.url))
        }))
    }

    /// Stage the body next to the cache path, load it, and only then move it
    /// into place. A body that is not a model never reaches the cache.
    #[cfg(feature = "download")]
    fn store(&self, body: &[u8]) -> Result<()> {
        use std::io::Write;

        let target = self.local.path();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let suffix = target
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut staged = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(&suffix)
            .tempfile_in(&dir)?;
        staged.write_all(body)?;
        staged.flush()?;

        load_model_file(staged.path())?;

        staged.persist(target).map_err(|e| GradingError::Io(e.error))?;
        Ok(())
    }

    #[cfg(not(feature = "download"))]
    fn store(&self, _body: &[u8]) -> Result<()> {
        Err(GradingError::ModelUnavailable("remote download disabled".into()))
    }
}

#[cfg(feature = "download")]
fn fetch(url: &str) -> Result<Vec<u8>> {
    use std::io::Read;

    let response = ureq::get(url)
        .timeout(Duration::from_secs(30))
        .call()
        .map_err(|e| GradingError::ModelUnavailable(e.to_string()))?;

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_MODEL_BYTES)
        .read_to_end(&mut body)?;
    Ok(body)
}

#[cfg(not(feature = "download"))]
fn fetch(url: &str) -> Result<Vec<u8>> {
    Err(GradingError::ModelUnavailable(format!(
        "remote download disabled, cannot fetch {url}"
    )))
}

impl ModelProvider for RemoteFallbackModelProvider {
    fn is_available(&self) -> bool {
        self.local.is_available() || !self.url.is_empty()
    }

    fn load(&self) -> Result<Arc<dyn ColorModel>> {
        if !self.local.is_available() {
            tracing::info!(
                path = %self.local.path().display(),
                url = %self.url,
                "model not cached locally, fetching"
            );
            self.download()?;
        }
        self.local.load()
    }

    fn describe(&self) -> String {
        format!("{} (fallback: {})", self.local.describe(), self.url)
    }
}
