use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator tool for YAML rule configurations.
///
/// Validates documents, reports cross-document dependencies, and routes or
/// runs records through the scenario registry.
#[derive(Parser, Debug)]
#[command(name = "rulekit", version, about = "Validate, analyze and run YAML rule configurations")]
pub struct CliArgs {
    /// Root directory for configuration documents
    #[arg(long, global = true, env = "RULEKIT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate documents (files or directories of *.yaml / *.yml)
    Validate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Report the dependency graph reachable from a root document
    Deps {
        root: PathBuf,

        /// Also list YAML files under this directory that nothing references
        #[arg(long)]
        orphans: Option<PathBuf>,

        /// Show files impacted by a change to this file
        #[arg(long)]
        impact: Option<PathBuf>,
    },

    /// Print the scenario a data type routes to
    Route {
        /// Scenario registry document
        #[arg(long, env = "RULEKIT_REGISTRY")]
        registry: Option<PathBuf>,

        #[arg(long)]
        data_type: String,
    },

    /// Route a JSON record and run its scenario
    Run {
        /// Scenario registry document
        #[arg(long, env = "RULEKIT_REGISTRY")]
        registry: Option<PathBuf>,

        /// JSON object, or `@path` to read it from a file
        #[arg(long)]
        record: String,

        /// Data type of the record; defaults to the record's `type` field
        #[arg(long)]
        data_type: Option<String>,

        /// Run this scenario instead of routing
        #[arg(long)]
        scenario: Option<String>,
    },
}
