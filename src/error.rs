//! Error types for document loading and dereferencing.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors while loading a document from a file, string, or URL.
///
/// The engine never sees these: loaders swallow them into "absent".
/// They surface only through the public loading helpers and the CLI.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Failure of a whole `deref` call.
///
/// Problems are aggregated over the entire document before this is
/// returned, so `refs` lists every offending target, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DerefError {
    #[error("circular references found: {}", refs.join(", "))]
    Circular { refs: Vec<String> },

    #[error("missing references: {}", refs.join(", "))]
    Missing { refs: Vec<String> },
}

impl DerefError {
    /// Target identifiers that caused the failure.
    pub fn refs(&self) -> &[String] {
        match self {
            DerefError::Circular { refs } | DerefError::Missing { refs } => refs,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
