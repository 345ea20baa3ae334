//! Core [`DocumentLoader`] struct: filesystem-backed document loading with optional hot-reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::schema::{ConfigDocument, DocumentEnvelope, DocumentType};

use super::error::{LoadResult, LoadStatus, Result, RuleError};
use super::watcher::handle_fs_event;

pub(super) type DocumentStore = Arc<RwLock<HashMap<PathBuf, Arc<ConfigDocument>>>>;

/// Filesystem-backed document loader with optional hot-reload.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files, deserializes
/// them into [`ConfigDocument`] instances via two-pass deserialization, and
/// maintains an in-memory map keyed by canonical file path. Documents are
/// shared as `Arc`s so readers never hold the lock while evaluating.
pub struct DocumentLoader {
    /// Root directory containing configuration documents.
    root: PathBuf,
    /// In-memory store keyed by canonical path.
    documents: DocumentStore,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl DocumentLoader {
    /// Create a new loader rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            documents: Arc::new(RwLock::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// Recursively scan the root directory and load all YAML files.
    ///
    /// Dotfiles (filenames starting with `.`) and non-YAML files are skipped.
    /// Parse errors are reported per-file but do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.root, &mut results)?;
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths: Vec<PathBuf> = entries.map(|e| e.map(|e| e.path())).collect::<std::io::Result<_>>()?;
        paths.sort();

        for path in paths {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(doc) => {
                    let id = doc.id().to_string();
                    let doc_type = doc.document_type().unwrap_or(DocumentType::Bootstrap);
                    info!(document_id = %id, doc_type = %doc_type, path = %path.display(), "loaded document");
                    self.insert(&path, doc);
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { id, doc_type },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load document");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse a single YAML file into a [`ConfigDocument`] without caching it.
    ///
    /// First pass: deserialize as [`DocumentEnvelope`] to read `metadata.type`.
    /// Second pass: deserialize the remaining fields into the type-specific body.
    pub fn load_file(&self, path: &Path) -> Result<ConfigDocument> {
        let contents = fs::read_to_string(path)?;
        parse_contents(&contents)
    }

    /// Load a document through the store, parsing it on first access.
    pub fn load(&self, path: &Path) -> Result<Arc<ConfigDocument>> {
        let key = store_key(path);
        if let Some(doc) = self.documents.read().expect("documents lock poisoned").get(&key) {
            debug!(path = %key.display(), "document served from store");
            return Ok(Arc::clone(doc));
        }
        let doc = self.load_file(path)?;
        Ok(self.insert(path, doc))
    }

    /// Load a document and require a specific type.
    pub fn load_typed(&self, path: &Path, expected: DocumentType) -> Result<Arc<ConfigDocument>> {
        let doc = self.load(path)?;
        if doc.document_type() != Some(expected) {
            return Err(RuleError::UnexpectedType {
                path: path.to_path_buf(),
                expected,
                found: doc.metadata.doc_type.clone(),
            });
        }
        Ok(doc)
    }

    pub(super) fn insert(&self, path: &Path, doc: ConfigDocument) -> Arc<ConfigDocument> {
        let doc = Arc::new(doc);
        self.documents
            .write()
            .expect("documents lock poisoned")
            .insert(store_key(path), Arc::clone(&doc));
        doc
    }

    /// Document previously loaded from `path`.
    pub fn get(&self, path: &Path) -> Option<Arc<ConfigDocument>> {
        self.documents
            .read()
            .expect("documents lock poisoned")
            .get(&store_key(path))
            .cloned()
    }

    /// First loaded document whose `metadata.id` matches.
    pub fn by_id(&self, id: &str) -> Option<Arc<ConfigDocument>> {
        self.documents
            .read()
            .expect("documents lock poisoned")
            .values()
            .find(|d| d.id() == id)
            .cloned()
    }

    /// Snapshot of every loaded document, sorted by path.
    pub fn documents(&self) -> Vec<(PathBuf, Arc<ConfigDocument>)> {
        let guard = self.documents.read().expect("documents lock poisoned");
        let mut all: Vec<_> = guard.iter().map(|(p, d)| (p.clone(), Arc::clone(d))).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.documents.read().expect("documents lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop a cached document so the next [`load`](Self::load) re-reads it.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.documents
            .write()
            .expect("documents lock poisoned")
            .remove(&store_key(path))
            .is_some()
    }

    pub fn clear(&self) {
        self.documents.write().expect("documents lock poisoned").clear();
    }

    /// Start a filesystem watcher with 500ms debounce.
    ///
    /// On file create/modify the document is re-parsed and upserted.
    /// On file delete it is removed from the store.
    /// Parse errors are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let documents = Arc::clone(&self.documents);

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => handle_fs_event(&event, &documents),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        let _ = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.root.display(), "watching configuration directory for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    #[cfg(test)]
    pub(super) fn documents_handle(&self) -> DocumentStore {
        Arc::clone(&self.documents)
    }

    /// Get the root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Two-pass parse of YAML text into a typed document.
pub(super) fn parse_contents(contents: &str) -> Result<ConfigDocument> {
    let envelope: DocumentEnvelope = serde_yaml::from_str(contents)?;

    if envelope.metadata.id.trim().is_empty() {
        return Err(RuleError::Validation(
            "document metadata.id must not be empty".to_string(),
        ));
    }

    envelope
        .parse_full()
        .map_err(|e| RuleError::Validation(format!("failed to parse document '{}': {}", envelope.metadata.id, e)))
}

pub(super) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

/// Canonical form of a path, tolerating files that no longer exist.
pub(super) fn store_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
