//! In-memory graph of cross-document references.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::dag::find_cycles;

/// Load state of a referenced document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    Valid,
    /// Referenced but not present on disk.
    Missing,
    /// Present but fails to parse or validate.
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentNode {
    pub path: PathBuf,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Shortest reference distance from the root document.
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentNode {
    pub fn new(path: impl Into<PathBuf>, status: NodeStatus, depth: usize) -> Self {
        Self {
            path: path.into(),
            status,
            document_id: None,
            doc_type: None,
            depth,
            error: None,
        }
    }
}

/// `source` references `target` through `field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub source: PathBuf,
    pub target: PathBuf,
    pub field: String,
}

/// Serializable digest of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct DependencySummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    pub total_files: usize,
    pub total_references: usize,
    pub max_depth: usize,
    pub missing: Vec<PathBuf>,
    pub invalid: Vec<PathBuf>,
    pub cycles: Vec<Vec<PathBuf>>,
    pub critical: Vec<(PathBuf, usize)>,
}

/// Documents keyed by path with reference edges between them.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    root: Option<PathBuf>,
    nodes: IndexMap<PathBuf, DocumentNode>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Default::default()
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Insert a node, keeping the shallower depth when it is already known.
    pub fn add_node(&mut self, node: DocumentNode) {
        match self.nodes.get_mut(&node.path) {
            Some(existing) => existing.depth = existing.depth.min(node.depth),
            None => {
                self.nodes.insert(node.path.clone(), node);
            }
        }
    }

    /// Record a reference. Duplicate `source -> target` pairs are kept once.
    pub fn add_edge(&mut self, source: impl Into<PathBuf>, target: impl Into<PathBuf>, field: impl Into<String>) {
        let edge = DependencyEdge {
            source: source.into(),
            target: target.into(),
            field: field.into(),
        };
        if !self
            .edges
            .iter()
            .any(|e| e.source == edge.source && e.target == edge.target)
        {
            self.edges.push(edge);
        }
    }

    pub fn node(&self, path: &Path) -> Option<&DocumentNode> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DocumentNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn missing(&self) -> Vec<&Path> {
        self.with_status(NodeStatus::Missing)
    }

    pub fn invalid(&self) -> Vec<&Path> {
        self.with_status(NodeStatus::Invalid)
    }

    fn with_status(&self, status: NodeStatus) -> Vec<&Path> {
        self.nodes
            .values()
            .filter(|n| n.status == status)
            .map(|n| n.path.as_path())
            .collect()
    }

    /// One representative cycle per discovery root, as `[a, b, a]` paths.
    pub fn cycles(&self) -> Vec<Vec<PathBuf>> {
        find_cycles(&self.adjacency(), false)
    }

    pub fn has_cycles(&self) -> bool {
        !find_cycles(&self.adjacency(), true).is_empty()
    }

    fn adjacency(&self) -> IndexMap<PathBuf, Vec<PathBuf>> {
        let mut graph: IndexMap<PathBuf, Vec<PathBuf>> =
            self.nodes.keys().map(|p| (p.clone(), Vec::new())).collect();
        for edge in &self.edges {
            graph.entry(edge.source.clone()).or_default().push(edge.target.clone());
        }
        graph
    }

    /// Documents `path` references directly.
    pub fn dependencies(&self, path: &Path) -> Vec<&Path> {
        self.edges
            .iter()
            .filter(|e| e.source == path)
            .map(|e| e.target.as_path())
            .collect()
    }

    /// Documents that reference `path` directly.
    pub fn dependents(&self, path: &Path) -> Vec<&Path> {
        self.edges
            .iter()
            .filter(|e| e.target == path)
            .map(|e| e.source.as_path())
            .collect()
    }

    /// Everything reachable from `path`, excluding `path` itself.
    pub fn transitive_dependencies(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.reach(path, |g, p| g.dependencies(p))
    }

    /// Everything that reaches `path`, excluding `path` itself.
    pub fn transitive_dependents(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.reach(path, |g, p| g.dependents(p))
    }

    fn reach<'a>(&'a self, start: &Path, next: impl Fn(&'a Self, &Path) -> Vec<&'a Path>) -> BTreeSet<PathBuf> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start.to_path_buf()]);
        while let Some(current) = queue.pop_front() {
            for neighbour in next(self, &current) {
                if neighbour != start && seen.insert(neighbour.to_path_buf()) {
                    queue.push_back(neighbour.to_path_buf());
                }
            }
        }
        seen
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Files with at least `min_dependents` direct dependents, most-referenced first.
    pub fn critical_files(&self, min_dependents: usize) -> Vec<(PathBuf, usize)> {
        let mut counts: HashMap<&Path, usize> = HashMap::new();
        for edge in &self.edges {
            *counts.entry(edge.target.as_path()).or_default() += 1;
        }
        let mut critical: Vec<(PathBuf, usize)> = counts
            .into_iter()
            .filter(|(_, n)| *n >= min_dependents)
            .map(|(p, n)| (p.to_path_buf(), n))
            .collect();
        critical.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        critical
    }

    pub fn summary(&self) -> DependencySummary {
        DependencySummary {
            root: self.root.clone(),
            total_files: self.len(),
            total_references: self.edges.len(),
            max_depth: self.max_depth(),
            missing: self.missing().into_iter().map(Path::to_path_buf).collect(),
            invalid: self.invalid().into_iter().map(Path::to_path_buf).collect(),
            cycles: self.cycles(),
            critical: self.critical_files(2),
        }
    }

    /// Plain-text report: totals, then problem and high-impact files.
    pub fn report(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();
        let _ = writeln!(out, "Dependency report");
        if let Some(root) = &summary.root {
            let _ = writeln!(out, "root: {}", root.display());
        }
        let _ = writeln!(out, "files: {}", summary.total_files);
        let _ = writeln!(out, "references: {}", summary.total_references);
        let _ = writeln!(out, "max depth: {}", summary.max_depth);

        section(&mut out, "missing", summary.missing.iter().map(|p| p.display().to_string()));
        section(
            &mut out,
            "invalid",
            summary.invalid.iter().map(|p| {
                let error = self.node(p).and_then(|n| n.error.clone()).unwrap_or_default();
                format!("{} ({error})", p.display())
            }),
        );
        section(
            &mut out,
            "cycles",
            summary.cycles.iter().map(|c| {
                c.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> ")
            }),
        );
        section(
            &mut out,
            "critical",
            summary
                .critical
                .iter()
                .map(|(p, n)| format!("{} ({n} dependents)", p.display())),
        );
        out
    }
}

fn section(out: &mut String, title: &str, lines: impl Iterator<Item = String>) {
    let lines: Vec<String> = lines.collect();
    if lines.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title} ({}):", lines.len());
    for line in lines {
        let _ = writeln!(out, "  {line}");
    }
}
