//! Compiled-expression cache keyed by expression text.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::Serialize;

use super::{CompiledExpression, ExpressionError, ExpressionEvaluator};

/// Hit/miss counters and current size of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Unbounded, thread-safe map from expression text to its compiled form.
///
/// Entries live until [`clear`](Self::clear); configuration expressions are a
/// closed set loaded from documents.
#[derive(Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, CompiledExpression>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached compilation of `text`, compiling and storing it on a miss.
    ///
    /// Syntax errors are not cached.
    pub fn get_or_compile(
        &self,
        text: &str,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<CompiledExpression, ExpressionError> {
        if let Some(hit) = self.entries.read().expect("expression cache lock poisoned").get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = evaluator.compile(text)?;
        let mut guard = self.entries.write().expect("expression cache lock poisoned");
        Ok(guard.entry(text.to_string()).or_insert(compiled).clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("expression cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().expect("expression cache lock poisoned").clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
