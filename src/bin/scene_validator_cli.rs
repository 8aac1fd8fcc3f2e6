//! SceneValidator CLI
//!
//! Commands: validate, check-config
//! Writes the result to stdout (or --output), logs to stderr.
//! Exit codes: 0 passed, 1 input or config error, 2 validation failed.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use scene_validator::{
    report::render_text,
    rules::load_rule_set_file,
    service::ServiceError,
    ValidationRecord, ValidationService,
};

#[derive(Parser)]
#[command(name = "scene-validator-cli")]
#[command(about = "SceneValidator CLI - validate scene composition and technical requirements")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scene against a rule set
    Validate {
        /// Path to a scene file, or an inline JSON scene
        #[arg(short, long)]
        scene: String,

        /// Path to the rule set file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a rule set and report whether it is valid
    CheckConfig {
        /// Path to the rule set file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { scene, config, format, output } => {
            run_validate(&scene, &config, format, output.as_deref())
        }
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn run_validate(scene: &str, config: &Path, format: OutputFormat, output: Option<&Path>) -> ExitCode {
    let rules = match load_rule_set_file(config) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(config = %config.display(), "{e}");
            println!("{}", serde_json::json!({"valid": false, "error": e.to_string()}));
            return ExitCode::FAILURE;
        }
    };

    let service = ValidationService::new(Arc::new(rules));

    let scene_path = Path::new(scene);
    let result = if scene_path.is_file() {
        service.validate_file(scene_path)
    } else {
        tracing::debug!("scene argument is not a file, treating it as inline JSON");
        service.validate_scene(scene)
    };

    let record = match result {
        Ok(record) => record,
        Err(e) => {
            tracing::error!("{e}");
            println!("{}", serde_json::json!({"valid": false, "error": e.to_string()}));
            return ExitCode::FAILURE;
        }
    };

    let rendered = match render(&record, format) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, &rendered) {
                tracing::error!(output = %path.display(), "failed to write result: {e}");
                return ExitCode::FAILURE;
            }
        }
        None => println!("{}", rendered),
    }

    if record.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

fn render(record: &ValidationRecord, format: OutputFormat) -> Result<String, ServiceError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Text => {
            let mut text = render_text(&record.scene_id, &record.report);
            text.push_str(&format!("\nValidation ID: {}\n", record.validation_id));
            text.push_str(&format!("Element count: {}\n", record.metrics.element_count));
            text.push_str(&format!("Complexity score: {:.2}\n", record.metrics.complexity_score));
            if let Some(reason) = record.aborted {
                text.push_str(&format!("Aborted: {}\n", reason));
            }
            text.push_str(&format!("Validation Time: {} ms\n", record.duration_ms));
            Ok(text)
        }
    }
}

fn run_check_config(config: &Path) -> ExitCode {
    match load_rule_set_file(config) {
        Ok(rules) => {
            let output = serde_json::json!({
                "valid": true,
                "elementTypes": rules.element_types().collect::<Vec<_>>(),
                "strictMode": rules.strict_mode,
                "allowUnknownElements": rules.allow_unknown_elements,
            });
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", serde_json::json!({"valid": false, "error": e.to_string()}));
            ExitCode::FAILURE
        }
    }
}
