//! Command-line interface.
//!
//! Flags mirror the configuration file; explicit flags win over file
//! values, and a `openapi-analyzer.yaml` in the working directory is
//! picked up when no `--config` is given. The `run` function drives the
//! whole pipeline: configuration merge, plugin selection, analysis,
//! normalization and emission of `openapi.json`.

use crate::analyzer::Analyzer;
use crate::config::{self, Config};
use crate::custom_rules::CustomRules;
use crate::diagnostics::DiagnosticKind;
use crate::generators;
use crate::normalizer;
use crate::plugins;
use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Generate OpenAPI documentation from web-service source code by static
/// analysis.
#[derive(Parser, Debug)]
#[command(name = "openapi-analyzer")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Framework plugin to analyze with (tide, salvo)
    #[arg(short = 'p', long = "plugin")]
    pub plugin: Option<String>,

    /// Project directory containing a Cargo.toml
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<PathBuf>,

    /// Output directory for openapi.json
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Dependency crates whose types are indexed as well
    #[arg(long = "depends")]
    pub depends: Vec<String>,

    /// Configuration file (defaults to openapi-analyzer.yaml if present)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Report analysis problems as errors instead of skipping them
    #[arg(short = 's', long = "strict")]
    pub strict: bool,

    /// Log level (silent, error, warn, info, debug)
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the version and exit
    Version,
}

/// Parses a log level name the way the `--log-level` flag documents it.
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "silent" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        _ => LevelFilter::Info,
    }
}

/// Merges the configuration file (explicit or implicit) with command-line
/// flags; flags win.
pub fn merge_config(args: &CliArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => {
            let implicit = Path::new(config::DEFAULT_CONFIG_FILE);
            if implicit.is_file() {
                config::load_config(implicit)?
            } else {
                Config::default()
            }
        }
    };

    if let Some(plugin) = &args.plugin {
        config.plugin = plugin.clone();
    }
    if let Some(dir) = &args.dir {
        config.dir = dir.display().to_string();
    }
    if let Some(output) = &args.output {
        config.output = output.display().to_string();
    }
    if !args.depends.is_empty() {
        config.depends = args.depends.clone();
    }
    if args.strict {
        config.strict_mode = true;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    if config.dir.is_empty() {
        config.dir = ".".to_string();
    }
    if config.output.is_empty() {
        config.output = "docs".to_string();
    }
    if config.log_level.is_empty() {
        config.log_level = "info".to_string();
    }
    if config.plugin.is_empty() {
        bail!("'plugin' is not set");
    }
    Ok(config)
}

/// Serializes the document with the 4-space indentation the emitted
/// `openapi.json` uses.
pub fn serialize_document(doc: &crate::schema::Document) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut serializer)
        .context("failed to serialize the OpenAPI document")?;
    String::from_utf8(buf).context("document serialization produced invalid UTF-8")
}

/// Runs the full pipeline for parsed command-line arguments.
pub fn run(args: CliArgs) -> Result<()> {
    if matches!(args.command, Some(Command::Version)) {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = merge_config(&args)?;
    run_with_config(&config)
}

/// Runs the pipeline for a merged configuration.
pub fn run_with_config(config: &Config) -> Result<()> {
    let dir = PathBuf::from(&config.dir);
    let stat = std::fs::metadata(&dir)
        .with_context(|| format!("cannot read directory {}", dir.display()))?;
    if !stat.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let plugin = plugins::registry()
        .into_iter()
        .find(|p| p.name() == config.plugin)
        .ok_or_else(|| anyhow::anyhow!("plugin {} not exists", config.plugin))?;

    let output_dir = PathBuf::from(&config.output);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;
    info!("output directory: {}", output_dir.display());
    if config.strict_mode {
        warn!("strict mode enabled: analysis problems are reported as errors");
    }

    let mut analyzer = Analyzer::new()
        .plugin(plugin)
        .depends(config.depends.clone())
        .with_strict(config.strict_mode)
        .with_custom_rules(CustomRules::new(config.properties.clone()));
    analyzer.mount(config)?;
    analyzer.process(&dir)?;

    let (mut doc, specialization_errors) = normalizer::normalize(analyzer.document());
    let diagnostics = analyzer.diagnostics();
    for error in specialization_errors {
        diagnostics
            .borrow_mut()
            .report(DiagnosticKind::Specialization, error);
    }
    config.openapi.apply_to_doc(&mut doc);

    let content = serialize_document(&doc)?;
    let output_file = output_dir.join("openapi.json");
    std::fs::write(&output_file, content)
        .with_context(|| format!("cannot write {}", output_file.display()))?;
    info!("wrote {}", output_file.display());

    generators::execute(&config.generators, &doc)?;

    let diagnostics = diagnostics.borrow();
    if diagnostics.has_errors() {
        bail!(
            "analysis completed with {} error(s); see the log above",
            diagnostics.errors().len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse_args(argv: &[&str]) -> CliArgs {
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("silent"), LevelFilter::Off);
        assert_eq!(parse_log_level("ERROR"), LevelFilter::Error);
        assert_eq!(parse_log_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_log_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_log_level("anything"), LevelFilter::Info);
    }

    #[test]
    fn test_merge_defaults() {
        let args = parse_args(&["openapi-analyzer", "--plugin", "tide"]);
        let config = merge_config(&args).unwrap();
        assert_eq!(config.plugin, "tide");
        assert_eq!(config.dir, ".");
        assert_eq!(config.output, "docs");
        assert_eq!(config.log_level, "info");
        assert!(!config.strict_mode);
    }

    #[test]
    fn test_missing_plugin_is_an_error() {
        let args = parse_args(&["openapi-analyzer"]);
        assert!(merge_config(&args).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        fs::write(
            &config_path,
            "plugin: salvo\ndir: ./from-file\nstrictMode: false\n",
        )
        .unwrap();

        let config_str = config_path.display().to_string();
        let args = parse_args(&[
            "openapi-analyzer",
            "--config",
            &config_str,
            "--plugin",
            "tide",
            "--strict",
        ]);
        let config = merge_config(&args).unwrap();
        assert_eq!(config.plugin, "tide");
        assert_eq!(config.dir, "./from-file");
        assert!(config.strict_mode);
    }

    #[test]
    fn test_unknown_plugin_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"demo\"\n",
        )
        .unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/main.rs"), "fn main() {}").unwrap();

        let mut config = Config::default();
        config.plugin = "gin".to_string();
        config.dir = temp.path().display().to_string();
        config.output = temp.path().join("docs").display().to_string();

        let err = run_with_config(&config).unwrap_err();
        assert!(err.to_string().contains("plugin gin not exists"));
    }

    #[test]
    fn test_serialize_document_uses_four_space_indent() {
        let doc = crate::schema::Document::new();
        let json = serialize_document(&doc).unwrap();
        assert!(json.contains("\n    \"openapi\": \"3.0.3\""));
    }

    #[test]
    fn test_run_writes_openapi_json() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"server\"\n",
        )
        .unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(
            temp.path().join("src/main.rs"),
            r#"
            use tide::Request;

            pub async fn goods_list(req: Request<()>) -> tide::Result {
                Ok(tide::Response::new(200))
            }

            fn main() {
                let mut app = tide::new();
                app.at("/api/goods").get(goods_list);
            }
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.plugin = "tide".to_string();
        config.dir = temp.path().display().to_string();
        config.output = temp.path().join("docs").display().to_string();

        run_with_config(&config).unwrap();

        let content =
            fs::read_to_string(temp.path().join("docs").join("openapi.json")).unwrap();
        assert!(content.contains("\"/api/goods\""));
        assert!(content.contains("\"openapi\": \"3.0.3\""));
    }
}
