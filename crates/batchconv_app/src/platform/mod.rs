mod app;
mod config;
mod review;

use std::path::PathBuf;
use std::process::ExitCode;

use batchconv_engine::BatchError;
use clap::{Args, Parser, Subcommand};

pub(crate) use app::run;
pub(crate) use config::Provider;

#[derive(Debug, thiserror::Error)]
pub(crate) enum AppError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("no conversion session is active in {}", .0.display())]
    NoSession(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Batch source conversion with reviewable, reversible replacements.
#[derive(Parser, Debug)]
#[command(name = "batchconv")]
#[command(version)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings that take precedence over `batchconv.ron`.
#[derive(Args, Debug, Default)]
pub(crate) struct Overrides {
    #[arg(long, global = true, env = "BATCHCONV_PROVIDER", value_enum)]
    pub provider: Option<Provider>,

    #[arg(long, global = true, env = "BATCHCONV_MODEL")]
    pub model: Option<String>,

    #[arg(long, global = true, env = "BATCHCONV_BASE_URL")]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Convert files and review each result as it arrives.
    Run {
        #[command(flatten)]
        root: RootArg,

        /// Accept every successful conversion without prompting.
        #[arg(long)]
        accept_all: bool,

        /// Files or directories to convert.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show the active session.
    Status {
        #[command(flatten)]
        root: RootArg,
    },
    /// Keep every accepted file and delete the backups.
    Commit {
        #[command(flatten)]
        root: RootArg,

        /// Version control commit message.
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Restore every original and delete the converted files.
    Reject {
        #[command(flatten)]
        root: RootArg,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
pub(crate) struct RootArg {
    /// Workspace root holding the session record.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

pub(crate) fn exit_code(result: Result<ExitCode, AppError>) -> ExitCode {
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
