//! Schema Dereferencer
//!
//! Replaces `$ref` pointers in JSON Schema documents with the values they
//! point to, producing a self-contained tree.
//!
//! References can be local (`#/definitions/id`), point to files
//! (`common.json`, `file:types/id.yaml#/definitions/id`), to web resources
//! (`https://example.com/schema.json`), or to any custom scheme with a
//! registered loader.
//!
//! # Example
//!
//! ```
//! use schema_deref::{deref, DerefOptions};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "definitions": { "id": { "type": "string" } },
//!     "properties": {
//!         "id": { "$ref": "#/definitions/id" }
//!     }
//! });
//!
//! let resolved = deref(&schema, &DerefOptions::new()).unwrap();
//! assert_eq!(resolved["properties"]["id"], json!({ "type": "string" }));
//! ```
//!
//! # Reference Nodes
//!
//! Only objects of the exact shape `{ "$ref": "<string>" }` are references.
//!
//! | `$ref` value | Scheme | Resolved by |
//! |--------------|--------|-------------|
//! | `#/a/b` | local | pointer lookup in the same document |
//! | `http(s)://...` | web | `web` loader |
//! | `<name>:...` with a `<name>` loader | custom | that loader |
//! | anything else | file | `file` loader, relative to the base folder |
//!
//! # Failures
//!
//! Circular references always fail the call with [`DerefError::Circular`].
//! Unresolvable references are left in place, or reported as
//! [`DerefError::Missing`] when `fail_on_missing` is set.

mod cache;
mod error;
mod loader;
mod pointer;
mod reference;
mod resolver;
mod types;

pub use error::{DerefError, LoadError};
pub use loader::{
    is_url, load_document, load_document_auto, load_document_str, FileLoader, Format, Loader,
    LoaderRegistry,
};
pub use pointer::{get_at_pointer, unescape_segment};
pub use reference::{classify, classify_with, is_web_url, ref_value};
pub use resolver::deref;
pub use types::{DerefOptions, RefTarget, Scheme};

#[cfg(feature = "remote")]
pub use loader::{load_document_url, WebLoader};
