//! Document loading and the loader registry.
//!
//! The engine never performs I/O itself. Every non-local reference is handed
//! to the [`Loader`] registered for its scheme, which returns the parsed
//! document or `None`. Loader failures are logged and reported as absence.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::normalize_path;
use crate::error::LoadError;
use crate::types::DerefOptions;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves a reference locator into a parsed document.
///
/// Must be deterministic for a given locator and options: results are
/// cached for the rest of the `deref` call. Implemented for any
/// `Fn(&str, &DerefOptions) -> Option<Value>`.
pub trait Loader: Send + Sync {
    fn load(&self, locator: &str, options: &DerefOptions) -> Option<Value>;
}

impl<F> Loader for F
where
    F: Fn(&str, &DerefOptions) -> Option<Value> + Send + Sync,
{
    fn load(&self, locator: &str, options: &DerefOptions) -> Option<Value> {
        self(locator, options)
    }
}

/// Loaders by scheme name.
///
/// The default registry serves `file` and, with the `remote` feature, `web`.
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: BTreeMap<String, Arc<dyn Loader>>,
}

impl LoaderRegistry {
    /// A registry with no loaders at all.
    pub fn empty() -> Self {
        Self {
            loaders: BTreeMap::new(),
        }
    }

    /// Register `loader` for `scheme`, replacing any existing one.
    pub fn register(&mut self, scheme: impl Into<String>, loader: Arc<dyn Loader>) {
        self.loaders.insert(scheme.into(), loader);
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn Loader>> {
        self.loaders.get(scheme)
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.loaders.contains_key(scheme)
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("file", Arc::new(FileLoader));
        #[cfg(feature = "remote")]
        registry.register("web", Arc::new(WebLoader::default()));
        registry
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("schemes", &self.schemes().collect::<Vec<_>>())
            .finish()
    }
}

/// Built-in loader for the `file` scheme.
///
/// Relative locators resolve against `options.base_folder`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl Loader for FileLoader {
    fn load(&self, locator: &str, options: &DerefOptions) -> Option<Value> {
        let path = normalize_path(&options.base_folder, Path::new(locator));
        match load_document(&path) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file reference not loaded");
                None
            }
        }
    }
}

/// Built-in loader for the `web` scheme.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct WebLoader {
    timeout: Duration,
}

#[cfg(feature = "remote")]
impl WebLoader {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[cfg(feature = "remote")]
impl Default for WebLoader {
    fn default() -> Self {
        Self::with_timeout(HTTP_TIMEOUT)
    }
}

#[cfg(feature = "remote")]
impl Loader for WebLoader {
    fn load(&self, locator: &str, _options: &DerefOptions) -> Option<Value> {
        match fetch_document(locator, self.timeout) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(url = locator, error = %e, "web reference not loaded");
                None
            }
        }
    }
}

/// Text format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON, falling back to YAML when the text is not valid JSON.
    Json,
    Yaml,
}

impl Format {
    /// `.yaml`/`.yml` (any case) is YAML, everything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Load a document from a file path, picking the format from the extension.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist, or a parse
/// error if the content is neither valid JSON nor YAML.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content, Format::from_path(path))
}

/// Parse a document from a string.
///
/// # Errors
///
/// `Format::Json` returns `LoadError::InvalidJson` when the text is neither
/// JSON nor YAML; `Format::Yaml` returns `LoadError::InvalidYaml`.
pub fn load_document_str(content: &str, format: Format) -> Result<Value, LoadError> {
    match format {
        Format::Yaml => {
            serde_yaml::from_str(content).map_err(|source| LoadError::InvalidYaml { source })
        }
        Format::Json => serde_json::from_str(content).or_else(|source| {
            serde_yaml::from_str(content).map_err(|_| LoadError::InvalidJson { source })
        }),
    }
}

/// Load a document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the server
/// answers with an error status, or a parse error for a malformed body.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Value, LoadError> {
    fetch_document(url, HTTP_TIMEOUT)
}

#[cfg(feature = "remote")]
fn fetch_document(url: &str, timeout: Duration) -> Result<Value, LoadError> {
    let network_error = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(network_error)?;

    let body = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .map_err(network_error)?;

    let format = if url.ends_with(".yaml") || url.ends_with(".yml") {
        Format::Yaml
    } else {
        Format::Json
    };
    load_document_str(&body, format)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_document_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}
