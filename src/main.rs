use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use console::style;
use remodel::analyzer::{analyze_all, generate_extraction_message};
use remodel::cli::{Cli, Command};
use remodel::config::{self, Config};
use remodel::diff::generate_custom_diff;
use remodel::diff_apply::{apply_diff_with, parse_edit_blocks};
use remodel::executor::apply_operations;
use remodel::files::{expand_paths, read_existing_under, read_source_files, write_source_files};
use remodel::openrouter::OpenRouterModel;
use remodel::operation::Operation;
use remodel::orchestrator::{Orchestrator, RefactorRunResult};
use remodel::source::SourceFile;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = config::load_or_create()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
        config.base_url = backend.config().base_url;
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }

    match cli.command {
        Command::ApplyOp {
            file,
            operation,
            dry_run,
        } => apply_op(&file, &operation, dry_run),
        Command::ApplyDiff {
            edits,
            root,
            dry_run,
        } => apply_edits(&config, &edits, &root, dry_run),
        Command::Analyze { paths } => analyze(&config, &paths),
        Command::Refactor {
            goal,
            paths,
            dry_run,
            resume_out,
            resume,
        } => {
            refactor(
                &config,
                &goal,
                &paths,
                dry_run,
                resume_out.as_deref(),
                resume.as_deref(),
                cli.verbose,
            )
            .await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "remodel=debug" } else { "remodel=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_operations(path: &Path) -> Result<Vec<Operation>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let ops = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(Operation::from_json)
            .collect::<Result<Vec<_>, _>>()?,
        single => vec![Operation::from_json(single)?],
    };
    Ok(ops)
}

fn apply_op(file: &Path, operation: &Path, dry_run: bool) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let ops = read_operations(operation)?;
    let outcome = apply_operations(&source, &ops);

    if !outcome.success {
        let kind = outcome
            .error_kind
            .map(|k| k.to_string())
            .unwrap_or_default();
        bail!(
            "{} [{kind}]",
            outcome.error.unwrap_or_else(|| "operation failed".to_string())
        );
    }

    println!("{}", style(file.display()).bold());
    println!("{}", generate_custom_diff(&source, &outcome.code));
    if !dry_run && outcome.code != source {
        fs::write(file, &outcome.code)?;
        println!("{}", style(format!("Applied {} operation(s).", ops.len())).green());
    }
    Ok(())
}

fn apply_edits(config: &Config, edits: &Path, root: &Path, dry_run: bool) -> Result<()> {
    let text = fs::read_to_string(edits)
        .with_context(|| format!("failed to read '{}'", edits.display()))?;
    let blocks = parse_edit_blocks(&text)?;

    let mut paths: Vec<String> = Vec::new();
    for block in &blocks {
        if !paths.contains(&block.file_path) {
            paths.push(block.file_path.clone());
        }
    }
    let files = read_existing_under(root, &paths)?;
    let originals: BTreeMap<&str, &str> = files
        .iter()
        .map(|f| (f.path.as_str(), f.content.as_str()))
        .collect();

    let result = apply_diff_with(&files, &blocks, &config.engine_settings().diff());

    for file in &result.modified_files {
        let old = originals.get(file.path.as_str()).copied().unwrap_or_default();
        println!("{}", style(&file.path).bold());
        println!("{}", generate_custom_diff(old, &file.content));
    }
    for error in &result.errors {
        if error.starts_with("note:") {
            eprintln!("{}", style(error).dim());
        } else if error.starts_with("warning:") {
            eprintln!("{}", style(error).yellow());
        } else {
            eprintln!("{}", style(error).red());
        }
    }
    if let Some(message) = generate_extraction_message(&result.extraction_suggestions) {
        println!("{}", style(message).dim());
    }

    if !dry_run {
        write_source_files(root, &result.modified_files)?;
        println!(
            "{}",
            style(format!("Updated {} file(s).", result.modified_files.len())).green()
        );
    }
    if result.modified_files.is_empty() && !result.is_clean() {
        bail!("no edit block could be applied");
    }
    Ok(())
}

fn load_files(config: &Config, paths: &[String]) -> Result<Vec<SourceFile>> {
    let expansion = expand_paths(paths, &config.extensions);
    for missing in &expansion.not_found {
        warn!(path = %missing, "path not found, skipping");
    }
    if expansion.files.is_empty() {
        bail!("no source files found");
    }
    read_source_files(&expansion.files)
}

fn analyze(config: &Config, paths: &[String]) -> Result<()> {
    let files = load_files(config, paths)?;
    let analyses = analyze_all(&files, &config.analyzer);
    match generate_extraction_message(&analyses) {
        Some(message) => println!("{message}"),
        None => println!(
            "{}",
            style(format!("{} file(s) analyzed, nothing to extract.", files.len())).green()
        ),
    }
    Ok(())
}

async fn refactor(
    config: &Config,
    goal: &str,
    paths: &[String],
    dry_run: bool,
    resume_out: Option<&Path>,
    resume: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let files = load_files(config, paths)?;
    let model = OpenRouterModel::from_config(config)?.with_echo(verbose);

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let orchestrator = Orchestrator::new(Arc::new(model))
        .with_settings(config.engine_settings().orchestrator())
        .with_cancellation(cancel);

    println!("Backend: {:?}", config.backend);
    println!("Model: {}", config.model);

    let result = match resume {
        Some(path) => {
            let previous = read_run_result(path)?;
            match previous {
                RefactorRunResult::Failed {
                    plan: Some(plan),
                    resume,
                    ..
                } => orchestrator.resume(&plan, &files, &resume).await,
                RefactorRunResult::Failed { plan: None, .. } => {
                    bail!("'{}' failed before planning; nothing to resume", path.display())
                }
                RefactorRunResult::Completed { .. } => {
                    bail!("'{}' is a completed run; nothing to resume", path.display())
                }
            }
        }
        None => orchestrator.run_refactor(goal, &files).await,
    };

    if let Some(plan) = result.plan() {
        println!("{}", style("Plan:").bold());
        println!("{}", plan.summary());
    }
    for step in result.completed_steps() {
        println!("{}", style(step.summary()).green());
    }

    match &result {
        RefactorRunResult::Completed { modified_files, .. } => {
            let originals: BTreeMap<&str, &str> = files
                .iter()
                .map(|f| (f.path.as_str(), f.content.as_str()))
                .collect();
            for file in modified_files {
                let old = originals.get(file.path.as_str()).copied().unwrap_or_default();
                println!("{}", style(&file.path).bold());
                println!("{}", generate_custom_diff(old, &file.content));
            }
            if !dry_run {
                write_source_files(Path::new(""), modified_files)?;
                println!(
                    "{}",
                    style(format!("Updated {} file(s).", modified_files.len())).green()
                );
            }
            Ok(())
        }
        RefactorRunResult::Failed { failure, .. } => {
            eprintln!(
                "{}",
                style(format!("{} [{}]", failure.error, failure.error_kind)).red()
            );
            match resume_out {
                Some(path) => {
                    fs::write(path, serde_json::to_string_pretty(&result)?)?;
                    eprintln!(
                        "{}",
                        style(format!(
                            "Progress saved to '{}'; continue with --resume.",
                            path.display()
                        ))
                        .yellow()
                    );
                }
                None => eprintln!(
                    "{}",
                    style("No files were written. Pass --resume-out to keep progress.").yellow()
                ),
            }
            Err(anyhow!("refactor failed"))
        }
    }
}

fn read_run_result(path: &Path) -> Result<RefactorRunResult> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("'{}' is not a saved run", path.display()))
}
