//! Dereferencing engine - replaces `$ref` nodes with the values they point to.
//!
//! Resolution runs in rounds. Each round handles one scheme at a time
//! (file, web, custom, then local) and repeats passes over the whole tree
//! until no reference of that scheme is left to attempt. Rounds repeat
//! until one resolves nothing, which catches references introduced by
//! resolving references of another scheme.
//!
//! External documents are resolved in full, under their own base folder,
//! before being cached and spliced in.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::cache::{absolute_folder, normalize_path, PathCache};
use crate::error::DerefError;
use crate::pointer::get_at_pointer;
use crate::reference::classify_with;
use crate::types::{DerefOptions, RefTarget, Scheme, REF_KEY, SCHEMA_KEYWORDS};

/// Passes per scheme before remaining expansions are treated as cycles.
///
/// Backstop only: external values are resolved before they are spliced,
/// and failed or circular targets are skipped, so a phase settles within
/// a few passes.
const MAX_PASSES: usize = 64;

/// External documents nested inside one another before a new target is
/// treated as circular. Catches loaders that keep producing new targets.
const MAX_DEPTH: usize = 32;

/// Rounds over all schemes per document.
const MAX_ROUNDS: usize = 16;

/// Dereference every `$ref` in `document`.
///
/// Returns a new tree; the input is not modified. Unresolvable references
/// are left in place unless `options.fail_on_missing` is set.
///
/// # Errors
///
/// `DerefError::Circular` if any reference chain loops back on itself,
/// `DerefError::Missing` for unresolved references when
/// `options.fail_on_missing` is set.
pub fn deref(document: &Value, options: &DerefOptions) -> Result<Value, DerefError> {
    let mut state = State::new(options);
    let resolved = state.resolve_document(document);
    state.finish(resolved)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    File,
    Web,
    Custom,
    Local,
}

impl Phase {
    const ORDER: [Phase; 4] = [Phase::File, Phase::Web, Phase::Custom, Phase::Local];

    fn matches(self, scheme: &Scheme) -> bool {
        matches!(
            (self, scheme),
            (Phase::File, Scheme::File)
                | (Phase::Web, Scheme::Web)
                | (Phase::Custom, Scheme::Custom(_))
                | (Phase::Local, Scheme::Local)
        )
    }
}

/// One walk over a document for one scheme.
struct Pass<'a> {
    /// Local pointers resolve against the tree as it was when the pass began.
    root: &'a Value,
    phase: Phase,
    /// Targets that failed earlier in this phase; skipped until the next round.
    failed: &'a mut HashSet<String>,
    attempted: usize,
    expanded: Vec<String>,
}

/// Mutable state of a single `deref` call.
struct State {
    options: DerefOptions,
    /// Identifier of the external document being resolved, if any.
    /// Qualifies local targets so equal pointers in different files differ.
    document: Option<String>,
    /// Number of enclosing external documents.
    depth: usize,
    /// Targets currently being resolved, outermost first.
    visited: Vec<String>,
    circular: Vec<String>,
    missing: Vec<String>,
    cache: PathCache,
}

impl State {
    fn new(options: &DerefOptions) -> Self {
        let mut options = options.clone();
        options.base_folder = absolute_folder(&options.base_folder);
        if options.merge_additional_properties || options.remove_ids {
            debug!("post-processing flags are accepted but not applied");
        }
        debug!(
            base_folder = %options.base_folder.display(),
            loaders = ?options.loaders,
            "starting dereference"
        );
        Self {
            options,
            document: None,
            depth: 0,
            visited: Vec::new(),
            circular: Vec::new(),
            missing: Vec::new(),
            cache: PathCache::new(),
        }
    }

    fn finish(self, document: Value) -> Result<Value, DerefError> {
        debug!(
            cached = self.cache.len(),
            cache_hits = self.cache.hits(),
            circular = self.circular.len(),
            missing = self.missing.len(),
            "dereference finished"
        );
        if !self.circular.is_empty() {
            return Err(DerefError::Circular {
                refs: self.circular,
            });
        }
        if self.options.fail_on_missing && !self.missing.is_empty() {
            return Err(DerefError::Missing { refs: self.missing });
        }
        Ok(document)
    }

    fn resolve_document(&mut self, document: &Value) -> Value {
        let mut current = document.clone();
        for round in 1..=MAX_ROUNDS {
            let mut resolved = 0;
            for phase in Phase::ORDER {
                let (next, count) = self.converge(current, phase);
                current = next;
                resolved += count;
            }
            debug!(document = ?self.document, round, resolved, "round finished");
            if resolved == 0 {
                return current;
            }
        }
        warn!(
            document = ?self.document,
            rounds = MAX_ROUNDS,
            "dereferencing did not settle"
        );
        current
    }

    /// Run passes for `phase` until none attempts a reference.
    fn converge(&mut self, document: Value, phase: Phase) -> (Value, usize) {
        let mut failed = HashSet::new();
        let mut current = document;
        let mut resolved = 0;
        let mut expanded = Vec::new();

        for _ in 0..MAX_PASSES {
            let mut pass = Pass {
                root: &current,
                phase,
                failed: &mut failed,
                attempted: 0,
                expanded: Vec::new(),
            };
            let next = self.walk(&current, &mut Vec::new(), &mut pass);
            let attempted = pass.attempted;
            expanded = pass.expanded;

            current = next;
            resolved += expanded.len();
            if attempted == 0 {
                return (current, resolved);
            }
        }

        warn!(
            ?phase,
            passes = MAX_PASSES,
            targets = ?expanded,
            "references keep expanding, treating them as circular"
        );
        for key in expanded {
            self.mark_circular(key);
        }
        (current, resolved)
    }

    fn walk(&mut self, node: &Value, path: &mut Vec<String>, pass: &mut Pass<'_>) -> Value {
        if let Some(target) = self.classify(node) {
            if pass.phase.matches(&target.scheme) {
                return self.resolve_reference(node, target, path, pass);
            }
            return node.clone();
        }

        match node {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    path.push(key.clone());
                    let value = self.walk(child, path, pass);
                    path.pop();
                    out.insert(key.clone(), value);
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(index.to_string());
                    out.push(self.walk(item, path, pass));
                    path.pop();
                }
                Value::Array(out)
            }
            other => other.clone(),
        }
    }

    fn resolve_reference(
        &mut self,
        node: &Value,
        target: RefTarget,
        path: &mut Vec<String>,
        pass: &mut Pass<'_>,
    ) -> Value {
        let key = self.target_key(&target);
        let reported = target_display(&target, &key);
        if self.circular.contains(&key) || pass.failed.contains(&reported) {
            return node.clone();
        }
        pass.attempted += 1;

        if target.is_self_reference()
            || (target.scheme == Scheme::Local && is_ancestor_cycle(&target, path))
        {
            debug!(reference = %target.raw, "circular reference");
            self.mark_circular(key);
            return node.clone();
        }

        if let Some(pos) = self.visited.iter().position(|v| *v == key) {
            let cycle = self.visited[pos..].to_vec();
            debug!(reference = %target.raw, ?cycle, "circular reference chain");
            for key in cycle {
                self.mark_circular(key);
            }
            return node.clone();
        }

        if target.scheme != Scheme::Local && self.depth >= MAX_DEPTH {
            warn!(
                reference = %target.raw,
                depth = self.depth,
                "external documents nested too deep, treating reference as circular"
            );
            self.mark_circular(key);
            return node.clone();
        }

        self.visited.push(key.clone());
        let value = match target.scheme {
            Scheme::Local => {
                let pointer = target.pointer.as_deref().unwrap_or_default();
                get_at_pointer(pass.root, pointer)
                    .cloned()
                    .map(|value| self.walk(&value, path, pass))
            }
            _ => self.resolve_external(&target, &key),
        };
        self.release(&key);

        match value {
            Some(value) => {
                trace!(reference = %target.raw, target = %reported, "reference resolved");
                self.missing.retain(|m| *m != reported);
                pass.expanded.push(key);
                value
            }
            None => {
                debug!(reference = %target.raw, target = %reported, "reference not resolved");
                if !self.missing.contains(&reported) {
                    self.missing.push(reported.clone());
                }
                pass.failed.insert(reported);
                node.clone()
            }
        }
    }

    /// Load (or fetch from cache) the document behind a non-local target
    /// and apply the target's pointer to it.
    fn resolve_external(&mut self, target: &RefTarget, key: &str) -> Option<Value> {
        let Some(loader) = self.options.loaders.get(target.scheme.name()).cloned() else {
            debug!(scheme = %target.scheme, reference = %target.raw, "no loader for scheme");
            return None;
        };

        let document = match self.cache.get(key) {
            Some(document) => {
                debug!(target = key, "cache hit");
                document
            }
            None => {
                debug!(scheme = %target.scheme, locator = %target.locator, "loading reference");
                let loaded = loader.load(&target.locator, &self.options)?;
                let resolved = self.resolve_loaded(target, key, &loaded);
                self.cache.insert(key, resolved.clone());
                resolved
            }
        };

        match target.pointer.as_deref() {
            Some(pointer) => get_at_pointer(&document, pointer).cloned(),
            None => Some(document),
        }
    }

    /// Fully resolve a freshly loaded document in its own context.
    ///
    /// File documents resolve relative references against their own
    /// folder. References left unresolved are rewritten to absolute form so
    /// the cached tree means the same thing wherever it is spliced.
    fn resolve_loaded(&mut self, target: &RefTarget, key: &str, loaded: &Value) -> Value {
        let folder = match target.scheme {
            Scheme::File => Path::new(key).parent().map(Path::to_path_buf),
            _ => None,
        };

        self.with_document(key, |state| {
            let resolve = |state: &mut State| {
                let mut resolved = state.resolve_document(loaded);
                state.anchor_references(&mut resolved);
                resolved
            };
            match folder {
                Some(folder) => state.with_base_folder(&folder, resolve),
                None => resolve(state),
            }
        })
    }

    /// Run `f` with `folder` as the base folder, restoring the previous one
    /// afterwards. A relative `folder` resolves against the current one.
    fn with_base_folder<T>(&mut self, folder: &Path, f: impl FnOnce(&mut Self) -> T) -> T {
        let folder = normalize_path(&self.options.base_folder, folder);
        if folder != self.options.base_folder {
            debug!(
                from = %self.options.base_folder.display(),
                to = %folder.display(),
                "rebasing"
            );
        }
        let saved: PathBuf = std::mem::replace(&mut self.options.base_folder, folder);
        let out = f(self);
        self.options.base_folder = saved;
        out
    }

    fn with_document<T>(&mut self, id: &str, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.document.replace(id.to_string());
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        self.document = saved;
        out
    }

    /// Rewrite leftover local and file references to absolute targets.
    /// Circular markers are left as written.
    fn anchor_references(&self, value: &mut Value) {
        if let Some(target) = self.classify(value) {
            if !matches!(target.scheme, Scheme::Local | Scheme::File) {
                return;
            }
            let key = self.target_key(&target);
            if self.circular.contains(&key) {
                return;
            }
            let anchored = target_display(&target, &key);
            if anchored != target.raw {
                let mut map = Map::new();
                map.insert(REF_KEY.to_string(), Value::String(anchored));
                *value = Value::Object(map);
            }
            return;
        }

        match value {
            Value::Object(map) => {
                for child in map.values_mut() {
                    self.anchor_references(child);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.anchor_references(item);
                }
            }
            _ => {}
        }
    }

    fn classify(&self, node: &Value) -> Option<RefTarget> {
        classify_with(node, |name| self.options.loaders.contains(name))
    }

    /// Identifier used for cycle detection and caching.
    fn target_key(&self, target: &RefTarget) -> String {
        match &target.scheme {
            Scheme::Local => match &self.document {
                Some(document) => format!("{}{}", document, target.raw),
                None => target.raw.clone(),
            },
            Scheme::File => normalize_path(&self.options.base_folder, Path::new(&target.locator))
                .display()
                .to_string(),
            Scheme::Web | Scheme::Custom(_) => target.locator.clone(),
        }
    }

    fn mark_circular(&mut self, key: String) {
        if !self.circular.contains(&key) {
            self.circular.push(key);
        }
    }

    /// Take `key` off the visited stack unless it was found to be circular.
    fn release(&mut self, key: &str) {
        if self.circular.iter().any(|c| c == key) {
            return;
        }
        if let Some(pos) = self.visited.iter().rposition(|v| v == key) {
            self.visited.remove(pos);
        }
    }
}

/// Identifier used when reporting a missing target: the key plus the
/// pointer for external targets.
fn target_display(target: &RefTarget, key: &str) -> String {
    match (&target.scheme, target.pointer.as_deref()) {
        (Scheme::Local, _) | (_, None) | (_, Some("")) => key.to_string(),
        (_, Some(pointer)) => format!("{}#{}", key, pointer),
    }
}

/// A local reference whose last segment names one of the node's ancestors
/// (schema keywords excluded, case-insensitive) points back into itself.
fn is_ancestor_cycle(target: &RefTarget, path: &[String]) -> bool {
    let Some(segment) = target.final_segment() else {
        return false;
    };
    let ancestors = path.split_last().map(|(_, parents)| parents).unwrap_or(&[]);
    ancestors
        .iter()
        .map(|key| key.to_lowercase())
        .filter(|key| !SCHEMA_KEYWORDS.contains(&key.as_str()))
        .any(|key| key == segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn local(raw: &str) -> RefTarget {
        crate::reference::classify_str(raw, |_| false)
    }

    #[test]
    fn ancestor_cycle_uses_parent_keys_only() {
        let path = vec!["properties".to_string(), "id".to_string()];
        // the node's own key does not count
        assert!(!is_ancestor_cycle(&local("#/definitions/id"), &path));

        let path = vec![
            "definitions".to_string(),
            "Node".to_string(),
            "children".to_string(),
        ];
        assert!(is_ancestor_cycle(&local("#/definitions/node"), &path));
    }

    #[test]
    fn ancestor_cycle_ignores_schema_keywords() {
        let path = vec![
            "definitions".to_string(),
            "properties".to_string(),
            "x".to_string(),
        ];
        assert!(!is_ancestor_cycle(&local("#/properties"), &path));
        assert!(!is_ancestor_cycle(&local("#/definitions"), &path));
    }

    #[test]
    fn display_appends_external_pointer() {
        let target = crate::reference::classify_str("a.json#/defs/x", |_| false);
        assert_eq!(target_display(&target, "/s/a.json"), "/s/a.json#/defs/x");

        let target = crate::reference::classify_str("a.json#", |_| false);
        assert_eq!(target_display(&target, "/s/a.json"), "/s/a.json");

        assert_eq!(target_display(&local("#/a"), "#/a"), "#/a");
    }

    #[test]
    fn local_keys_are_qualified_inside_documents() {
        let mut state = State::new(&DerefOptions::new().base_folder("/schemas"));
        assert_eq!(state.target_key(&local("#/a")), "#/a");

        state.document = Some("/schemas/b.json".into());
        assert_eq!(state.target_key(&local("#/a")), "/schemas/b.json#/a");
    }

    #[test]
    fn base_folder_is_restored() {
        let mut state = State::new(&DerefOptions::new().base_folder("/schemas"));
        let inner = state.with_base_folder(Path::new("nested"), |state| {
            state.options.base_folder.clone()
        });
        assert_eq!(inner, PathBuf::from("/schemas/nested"));
        assert_eq!(state.options.base_folder, PathBuf::from("/schemas"));
    }

    #[test]
    fn nested_documents_raise_depth() {
        let mut state = State::new(&DerefOptions::new());
        let inner = state.with_document("a.json", |state| {
            state.with_document("b.json", |state| (state.depth, state.document.clone()))
        });
        assert_eq!(inner, (2, Some("b.json".to_string())));
        assert_eq!(state.depth, 0);
        assert_eq!(state.document, None);
    }

    #[test]
    fn release_keeps_circular_targets_on_the_stack() {
        let mut state = State::new(&DerefOptions::new());
        state.visited = vec!["#/a".into(), "#/b".into()];
        state.mark_circular("#/a".into());

        state.release("#/a");
        state.release("#/b");
        assert_eq!(state.visited, vec!["#/a".to_string()]);
    }

    #[test]
    fn anchoring_rewrites_relative_leftovers() {
        let mut state = State::new(&DerefOptions::new().base_folder("/schemas/dir"));
        state.document = Some("/schemas/dir/a.json".into());
        state.mark_circular("/schemas/dir/a.json#/loop".into());

        let mut doc = json!({
            "missing": { "$ref": "./nope.json#/x" },
            "local": { "$ref": "#/gone" },
            "loop": { "$ref": "#/loop" },
            "web": { "$ref": "https://example.com/s.json" }
        });
        state.anchor_references(&mut doc);

        assert_eq!(
            doc,
            json!({
                "missing": { "$ref": "/schemas/dir/nope.json#/x" },
                "local": { "$ref": "/schemas/dir/a.json#/gone" },
                "loop": { "$ref": "#/loop" },
                "web": { "$ref": "https://example.com/s.json" }
            })
        );
    }
}
