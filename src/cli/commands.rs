//! CLI command definitions for insightflow.
//!
//! The CLI never executes agents; it inspects the stage vocabulary and
//! validates workflow submission files against the same checks the engine
//! applies before running anything.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use crate::router::{validate_task_spec, TaskSpec};
use crate::stage::{validate_pipeline_order, Stage};

/// Workflow orchestration engine for pluggable data-analysis agents.
#[derive(Parser)]
#[command(name = "insightflow")]
#[command(about = "Workflow orchestration engine for pluggable data-analysis agents")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Print the canonical pipeline stages and their required agents.
    Stages,

    /// Validate a workflow submission file without executing it.
    Validate(ValidateArgs),
}

/// Arguments for `insightflow validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to a JSON or YAML workflow submission (ordered list of tasks).
    #[arg(short, long)]
    pub workflow: PathBuf,
}

/// Parses the CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses the CLI arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Stages => {
            cmd_stages();
            Ok(())
        }
        Commands::Validate(args) => cmd_validate(&args.workflow),
    }
}

/// Prints the canonical pipeline order with required agents and default
/// operations.
fn cmd_stages() {
    println!("Canonical pipeline order:");
    for (index, stage) in Stage::PIPELINE.iter().enumerate() {
        println!(
            "  {}. {:<18} agent: {:<20} default operation: {}",
            index + 1,
            stage.as_str(),
            stage.agent_name(),
            stage.default_operation()
        );
    }
}

/// Validates a workflow submission file: stage names, canonical order, and
/// stage-specific required parameters.
fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let specs = load_workflow_file(path)?;

    let stages: Vec<Stage> = specs.iter().map(|s| s.stage).collect();
    validate_pipeline_order(&stages)
        .with_context(|| format!("workflow '{}' violates the pipeline order", path.display()))?;

    let mut problems = Vec::new();
    for (index, spec) in specs.iter().enumerate() {
        if let Err(err) = validate_task_spec(spec) {
            problems.push(format!("task {} ({}): {}", index + 1, spec.stage, err));
        }
    }

    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("invalid: {problem}");
        }
        anyhow::bail!(
            "workflow '{}' has {} invalid task(s)",
            path.display(),
            problems.len()
        );
    }

    println!(
        "workflow '{}' is valid: {} task(s) in canonical order",
        path.display(),
        specs.len()
    );
    Ok(())
}

/// Loads a workflow submission from a JSON or YAML file.
fn load_workflow_file(path: &Path) -> anyhow::Result<Vec<TaskSpec>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow file '{}'", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    if is_yaml {
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML workflow '{}'", path.display()))
    } else {
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON workflow '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_workflow(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file should be created");
        file.write_all(contents.as_bytes())
            .expect("workflow fixture should write");
        file
    }

    #[test]
    fn test_validate_accepts_ordered_json() {
        let file = write_workflow(
            r#"[
                {"type": "load_data", "parameters": {"file_path": "x.csv"}},
                {"type": "explore", "parameters": {}}
            ]"#,
            ".json",
        );
        assert!(cmd_validate(file.path()).is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_order() {
        let file = write_workflow(
            r#"[
                {"type": "explore", "parameters": {}},
                {"type": "load_data", "parameters": {"file_path": "x.csv"}}
            ]"#,
            ".json",
        );
        let err = cmd_validate(file.path()).unwrap_err();
        assert!(err.to_string().contains("pipeline order"));
    }

    #[test]
    fn test_validate_rejects_unknown_stage() {
        let file = write_workflow(r#"[{"type": "transmogrify"}]"#, ".json");
        assert!(cmd_validate(file.path()).is_err());
    }

    #[test]
    fn test_validate_reports_missing_parameters() {
        let file = write_workflow(
            r#"[{"type": "aggregate", "parameters": {}}]"#,
            ".json",
        );
        let err = cmd_validate(file.path()).unwrap_err();
        assert!(err.to_string().contains("1 invalid task"));
    }

    #[test]
    fn test_validate_accepts_yaml() {
        let file = write_workflow(
            concat!(
                "- type: load_data\n",
                "  parameters:\n",
                "    file_path: sales.csv\n",
                "- type: detect_anomalies\n",
                "  parameters:\n",
                "    column: revenue\n",
                "    method: zscore\n",
            ),
            ".yaml",
        );
        assert!(cmd_validate(file.path()).is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = cmd_validate(Path::new("/nonexistent/workflow.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
