mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use rulekit_core::Config;

use crate::cli::{CliArgs, Command};
use crate::commands::RunRequest;

fn load_config(args: &CliArgs) -> Config {
    rulekit_core::config::load_dotenv();
    let mut config = Config::from_env();
    if let Some(dir) = &args.config_dir {
        config.documents.registry_file = dir.join("scenario-registry.yaml");
        config.documents.config_dir = dir.clone();
    }
    config
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args);
    config.log_summary();

    let clean = match &args.command {
        Command::Validate { paths, strict } => commands::validate(paths, *strict, args.json)?,
        Command::Deps { root, orphans, impact } => {
            commands::deps(root, orphans.as_deref(), impact.as_deref(), args.json)?
        }
        Command::Route { registry, data_type } => {
            let registry = registry.as_deref().unwrap_or(&config.documents.registry_file);
            commands::route(&config, registry, data_type, args.json)?
        }
        Command::Run {
            registry,
            record,
            data_type,
            scenario,
        } => {
            let request = RunRequest {
                registry: registry.as_deref().unwrap_or(&config.documents.registry_file),
                record,
                data_type: data_type.as_deref(),
                scenario: scenario.as_deref(),
            };
            commands::run(&config, request, args.json)?
        }
    };

    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
