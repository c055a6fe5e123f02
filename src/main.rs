//! openapi-analyzer - generate OpenAPI 3.0.3 documentation from Rust web
//! projects by static analysis.
//!
//! # Usage
//!
//! ```bash
//! openapi-analyzer --plugin tide --dir ./server --output docs
//! ```
//!
//! With a configuration file:
//!
//! ```bash
//! openapi-analyzer --config openapi-analyzer.yaml
//! ```

use clap::Parser;
use openapi_analyzer::cli::{self, CliArgs};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // The effective level may also come from the config file; the flag is
    // enough to decide before configuration is loaded.
    let level = args
        .log_level
        .as_deref()
        .map(cli::parse_log_level)
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match cli::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
