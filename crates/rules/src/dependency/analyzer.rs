//! Walks configuration files from a root document and records every
//! reference between them.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::graph::{DependencyGraph, DocumentNode, NodeStatus};
use crate::scenario::resolve_relative;
use crate::validation::validate_yaml;

/// Keys whose values are lists of file references.
const LIST_FIELDS: &[&str] = &["rule-configurations", "data-source-refs"];

#[derive(Debug, Clone, Default)]
pub struct DependencyAnalyzer {
    skip_validation: bool,
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only parse failures mark a document invalid.
    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    /// Breadth-first walk from `root`. Unreadable or missing files become
    /// nodes with the matching status rather than errors.
    pub fn analyze(&self, root: &Path) -> DependencyGraph {
        let root = normalize(root);
        let root_dir = root.parent().map(Path::to_path_buf);
        let mut graph = DependencyGraph::new(&root);
        let mut seen: HashSet<PathBuf> = HashSet::from([root.clone()]);
        let mut queue = VecDeque::from([(root, 0usize)]);

        while let Some((path, depth)) = queue.pop_front() {
            let (node, references) = self.inspect(&path, depth);
            graph.add_node(node);

            for (field, reference) in references {
                let target = resolve_reference(&path, root_dir.as_deref(), &reference);
                debug!(source = %path.display(), target = %target.display(), field = %field, "reference");
                graph.add_edge(&path, &target, field);
                if seen.insert(target.clone()) {
                    queue.push_back((target, depth + 1));
                }
            }
        }
        graph
    }

    fn inspect(&self, path: &Path, depth: usize) -> (DocumentNode, Vec<(String, String)>) {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return (DocumentNode::new(path, NodeStatus::Missing, depth), Vec::new());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable configuration file");
                let mut node = DocumentNode::new(path, NodeStatus::Invalid, depth);
                node.error = Some(e.to_string());
                return (node, Vec::new());
            }
        };

        // Non-YAML leaves such as CSV datasets only need to exist.
        if !is_yaml(path) {
            return (DocumentNode::new(path, NodeStatus::Valid, depth), Vec::new());
        }

        let raw: Value = match serde_yaml::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                let mut node = DocumentNode::new(path, NodeStatus::Invalid, depth);
                node.error = Some(format!("YAML parse error: {e}"));
                return (node, Vec::new());
            }
        };

        let mut node = DocumentNode::new(path, NodeStatus::Valid, depth);
        node.document_id = metadata_text(&raw, "id");
        node.doc_type = metadata_text(&raw, "type");
        if !self.skip_validation {
            let validation = validate_yaml(&contents);
            if !validation.is_valid() {
                node.status = NodeStatus::Invalid;
                node.error = validation.error_messages().into_iter().next();
            }
        }

        let mut references = Vec::new();
        collect_references(&raw, None, &mut references);
        (node, references)
    }

    /// YAML files under `dir` that the graph never reached.
    pub fn find_orphans(&self, graph: &DependencyGraph, dir: &Path) -> Vec<PathBuf> {
        let mut orphans = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_yaml(entry.path()) {
                continue;
            }
            let path = normalize(entry.path());
            if !graph.contains(&path) {
                orphans.push(path);
            }
        }
        orphans.sort();
        orphans
    }
}

/// Resolve against the referencing file's directory first, then the root
/// document's directory, which is where dataset paths are anchored.
fn resolve_reference(source: &Path, root_dir: Option<&Path>, reference: &str) -> PathBuf {
    let local = normalize(&resolve_relative(source.parent(), reference));
    if local.exists() {
        return local;
    }
    match root_dir {
        Some(dir) => {
            let anchored = normalize(&resolve_relative(Some(dir), reference));
            if anchored.exists() {
                anchored
            } else {
                local
            }
        }
        None => local,
    }
}

fn collect_references(value: &Value, parent: Option<&str>, out: &mut Vec<(String, String)>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = key.as_str() else {
                    continue;
                };
                match (key, child) {
                    ("config-file", Value::String(s)) => push(out, key, s),
                    ("file-path", Value::String(s)) if parent == Some("lookup-dataset") => push(out, key, s),
                    (k, Value::Sequence(items)) if LIST_FIELDS.contains(&k) => {
                        for s in items.iter().filter_map(Value::as_str) {
                            push(out, key, s);
                        }
                    }
                    // Calculation dependencies name fields, so only file-like entries count.
                    ("dependencies", Value::Sequence(items)) => {
                        for s in items.iter().filter_map(Value::as_str).filter(|s| is_yaml(Path::new(s))) {
                            push(out, key, s);
                        }
                    }
                    _ => {}
                }
                collect_references(child, Some(key), out);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_references(item, parent, out);
            }
        }
        _ => {}
    }
}

fn push(out: &mut Vec<(String, String)>, field: &str, reference: &str) {
    let reference = reference.trim();
    if !reference.is_empty() {
        out.push((field.to_string(), reference.to_string()));
    }
}

fn metadata_text(raw: &Value, key: &str) -> Option<String> {
    raw.get("metadata")?.get(key)?.as_str().map(str::to_string)
}

fn is_yaml(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"))
}

/// Lexically drop `.` and fold `..` so the same file always has one key.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("a/./b/../c.yaml")), PathBuf::from("a/c.yaml"));
        assert_eq!(normalize(Path::new("../x.yaml")), PathBuf::from("../x.yaml"));
    }

    #[test]
    fn collects_reference_fields() {
        let raw: Value = serde_yaml::from_str(
            r#"
scenario:
  processing-stages:
    - stage-name: a
      config-file: rules/a.yaml
  rule-configurations: [rules/b.yaml]
enrichments:
  - id: fx
    lookup-dataset:
      file-path: data/fx.csv
    calculation-config:
      dependencies: [notional, rules/c.yaml]
"#,
        )
        .unwrap();
        let mut refs = Vec::new();
        collect_references(&raw, None, &mut refs);
        let targets: Vec<&str> = refs.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(targets, vec!["rules/a.yaml", "rules/b.yaml", "data/fx.csv", "rules/c.yaml"]);
    }

    #[test]
    fn file_path_outside_lookup_dataset_is_ignored() {
        let raw: Value = serde_yaml::from_str("output:\n  file-path: out.yaml\n").unwrap();
        let mut refs = Vec::new();
        collect_references(&raw, None, &mut refs);
        assert!(refs.is_empty());
    }
}
