use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::application::Application;
use crate::config::EngineConfig;
use crate::model::{ScriptPolicy, TestConfigElement, TestConfiguration, TestResult};
use crate::types::{JobStatus, ResultStatus};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Conductor - A test-automation execution engine", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a test configuration and wait for it to finish
    Run {
        /// Configuration file (.json or .toml)
        file: PathBuf,

        /// Print the full result tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a test configuration without running it
    Validate {
        /// Configuration file (.json or .toml)
        file: PathBuf,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load configuration before anything else so errors surface first
    let app = Application::initialize(cli.config.clone())?;
    init_logging(app.config());

    match cli.command {
        Commands::Run { file, json } => {
            let configuration = load_configuration(&file)?;
            let issues = validate_configuration(&configuration);
            for issue in &issues {
                eprintln!("warning: {}", issue);
            }

            let service = &app.execution_service;
            let id = service.start_execution(configuration, service.new_context())?;
            let status = service.wait_for_completion(&id).await?;
            let result = service.get_test_configuration_result(&id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Execution: {}", id);
                println!("Configuration: {}", result.name);
                println!("Status: {:?}", status);
                println!("Result: {}", status_label(result.status));
                if let Some(duration) = result.duration_ms {
                    println!("Duration: {}ms", duration);
                }
                println!();
                for node in &result.results {
                    print_result(node, 1);
                }
            }

            if status == JobStatus::Interrupted
                || result.status.is_some_and(|s| s.is_failure())
            {
                std::process::exit(1);
            }
        }

        Commands::Validate { file } => {
            let configuration = load_configuration(&file)?;
            let issues = validate_configuration(&configuration);
            if issues.is_empty() {
                println!("✓ {} is valid", file.display());
                return Ok(());
            }
            for issue in &issues {
                eprintln!("  {}", issue);
            }
            bail!("{} issue(s) found in {}", issues.len(), file.display());
        }
    }

    Ok(())
}

fn init_logging(config: &EngineConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse a configuration file; TOML by extension, JSON otherwise
pub fn load_configuration(path: &Path) -> Result<TestConfiguration> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let configuration = if is_toml {
        toml::from_str(&source).with_context(|| format!("Invalid TOML in {}", path.display()))?
    } else {
        serde_json::from_str(&source)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?
    };
    Ok(configuration)
}

/// Problems the engine would report as failed elements at run time
pub fn validate_configuration(configuration: &TestConfiguration) -> Vec<String> {
    let mut issues = Vec::new();
    for element in &configuration.elements {
        validate_element(element, &mut issues);
    }
    issues
}

fn validate_element(element: &TestConfigElement, issues: &mut Vec<String>) {
    match &element.schema {
        None => issues.push(format!("element '{}' has no schema", element.name)),
        Some(schema) => match schema.scripts {
            ScriptPolicy::None if !element.scripts.is_empty() => issues.push(format!(
                "element '{}' permits no scripts but has {}",
                element.name,
                element.scripts.len()
            )),
            ScriptPolicy::One if element.scripts.len() > 1 => issues.push(format!(
                "element '{}' permits one script but has {}",
                element.name,
                element.scripts.len()
            )),
            _ => {}
        },
    }
    for child in &element.children {
        validate_element(child, issues);
    }
}

fn status_label(status: Option<ResultStatus>) -> String {
    status.map_or_else(|| "-".to_string(), |s| format!("{:?}", s).to_uppercase())
}

fn print_result(node: &TestResult, depth: usize) {
    let indent = "  ".repeat(depth);
    match &node.error_message {
        Some(message) => println!("{}{} [{}] {}", indent, node.name, status_label(node.status), message),
        None => println!("{}{} [{}]", indent, node.name, status_label(node.status)),
    }
    for child in &node.results {
        print_result(child, depth + 1);
    }
}
