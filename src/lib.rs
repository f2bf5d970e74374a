//! Mussels: a cross-platform native-dependency build orchestrator driven by
//! recipe and tool definitions pulled from one or more cookbooks.

pub mod archive;
pub mod catalog;
pub mod cli;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod model;
pub mod patch;
pub mod platform;
pub mod planner;
pub mod process;
pub mod registry;
pub mod selector;
pub mod template;
pub mod tools;
pub mod version;
pub mod workspace;

use clap::Parser;
use env_logger::Env;

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Initializes logging, parses arguments, and dispatches to the CLI. `--verbose`
/// raises the default filter level for this invocation without overriding an
/// explicit `RUST_LOG` the user already set.
pub fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let default_level = match args.verbose {
        0 => DEFAULT_LOG_LEVEL,
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    cli::run(args)
}
