//! Core types for reference resolution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::loader::{Loader, LoaderRegistry};

/// Key that marks a reference node.
pub const REF_KEY: &str = "$ref";

/// Schema keywords ignored when comparing a local pointer against the
/// keys of a node's ancestors.
pub const SCHEMA_KEYWORDS: &[&str] = &[
    "member",
    "property",
    "schema",
    "targetschema",
    "type",
    "element",
    "properties",
    "definitions",
];

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Inside the document being resolved (`#/a/b`).
    Local,
    /// A file path, bare or `file:` prefixed.
    File,
    /// An absolute `http`/`https` URL.
    Web,
    /// `<name>:...` with a loader registered under `name`.
    Custom(String),
}

impl Scheme {
    /// Registry name of the loader serving this scheme.
    pub fn name(&self) -> &str {
        match self {
            Scheme::Local => "local",
            Scheme::File => "file",
            Scheme::Web => "web",
            Scheme::Custom(name) => name,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified `$ref` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefTarget {
    pub scheme: Scheme,
    /// File path or URL, prefix stripped and fragment removed.
    /// Empty for local references.
    pub locator: String,
    /// Text after the first `#`, if any. For local references this is
    /// the whole pointer.
    pub pointer: Option<String>,
    /// The `$ref` string exactly as written.
    pub raw: String,
}

impl RefTarget {
    /// `{"$ref": "#"}`: the document referencing itself.
    pub fn is_self_reference(&self) -> bool {
        self.raw == "#"
    }

    /// Last `/`-separated segment of the reference, lowercased.
    pub fn final_segment(&self) -> Option<String> {
        self.raw
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_lowercase)
    }
}

/// Options for dereferencing.
#[derive(Debug, Clone)]
pub struct DerefOptions {
    /// Directory that relative file references resolve against.
    pub base_folder: PathBuf,
    /// When true, references that cannot be resolved fail the call.
    pub fail_on_missing: bool,
    /// Loaders by scheme name.
    pub loaders: LoaderRegistry,
    /// Accepted for compatibility; no post-processing is applied.
    pub merge_additional_properties: bool,
    /// Accepted for compatibility; no post-processing is applied.
    pub remove_ids: bool,
}

impl Default for DerefOptions {
    fn default() -> Self {
        Self {
            base_folder: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            fail_on_missing: false,
            loaders: LoaderRegistry::default(),
            merge_additional_properties: false,
            remove_ids: false,
        }
    }
}

impl DerefOptions {
    /// Default options: working directory as base, built-in loaders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base folder for relative file references.
    pub fn base_folder(mut self, folder: impl AsRef<Path>) -> Self {
        self.base_folder = folder.as_ref().to_path_buf();
        self
    }

    /// Turn unresolved references into a `DerefError::Missing`.
    pub fn fail_on_missing(mut self, fail: bool) -> Self {
        self.fail_on_missing = fail;
        self
    }

    /// Register `loader` for `scheme`, replacing any existing one.
    pub fn loader(mut self, scheme: impl Into<String>, loader: impl Loader + 'static) -> Self {
        self.loaders.register(scheme, Arc::new(loader));
        self
    }

    pub fn merge_additional_properties(mut self, merge: bool) -> Self {
        self.merge_additional_properties = merge;
        self
    }

    pub fn remove_ids(mut self, remove: bool) -> Self {
        self.remove_ids = remove;
        self
    }
}
