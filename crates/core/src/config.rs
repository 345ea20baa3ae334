use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub documents: DocumentsConfig,
    pub engine: EngineConfig,
    pub enrichment: EnrichmentConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RULEKIT_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RULEKIT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            documents: DocumentsConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p),
            enrichment: EnrichmentConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  documents:   config_dir={}, registry={}, watch={}",
            self.documents.config_dir.display(),
            self.documents.registry_file.display(),
            self.documents.watch
        );
        tracing::info!("  engine:      metrics_capacity={}", self.engine.metrics_capacity);
        tracing::info!("  enrichment:  lookup_cache_ttl_secs={}", self.enrichment.lookup_cache_ttl_secs);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_profile("")
    }
}

// ── Documents ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Root directory scanned for configuration documents.
    pub config_dir: PathBuf,
    /// Scenario registry document used for routing.
    pub registry_file: PathBuf,
    /// Reload documents when files change on disk.
    pub watch: bool,
}

impl DocumentsConfig {
    fn from_env_profiled(p: &str) -> Self {
        let config_dir = PathBuf::from(profiled_env_or(p, "RULEKIT_CONFIG_DIR", "config"));
        let registry_file = profiled_env_opt(p, "RULEKIT_REGISTRY")
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir.join("scenario-registry.yaml"));
        Self {
            config_dir,
            registry_file,
            watch: profiled_env_bool(p, "RULEKIT_WATCH", false),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Evaluation history kept per rule before the oldest entries are dropped.
    pub metrics_capacity: usize,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            metrics_capacity: profiled_env_usize(p, "RULEKIT_METRICS_CAPACITY", 500),
        }
    }
}

// ── Enrichment ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// TTL applied to dataset lookups that do not declare `cache-ttl-seconds`.
    pub lookup_cache_ttl_secs: u64,
}

impl EnrichmentConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            lookup_cache_ttl_secs: profiled_env_u64(p, "RULEKIT_LOOKUP_CACHE_TTL_SECS", 300),
        }
    }
}
