use crate::backend::Backend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Structured edits, edit-block diffs and multi-file refactors for React components
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log engine decisions at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Overrides the backend from the config file
    #[arg(long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Overrides the model from the config file
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply one structured operation (or a JSON array of them) to a file
    ApplyOp {
        file: PathBuf,
        /// JSON file holding the operation(s)
        operation: PathBuf,
        /// Print the diff instead of writing the file
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply SEARCH/REPLACE edit blocks
    ApplyDiff {
        /// File holding the edit blocks
        edits: PathBuf,
        /// Directory the paths in the edit blocks are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Report components that could be split into smaller ones
    Analyze {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Plan and run a multi-file refactor with the configured model
    Refactor {
        goal: String,
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(long)]
        dry_run: bool,
        /// Where to save the run result when a step fails
        #[arg(long)]
        resume_out: Option<PathBuf>,
        /// Continue a failed run saved with --resume-out
        #[arg(long)]
        resume: Option<PathBuf>,
    },
}
