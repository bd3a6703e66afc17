use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use batchconv_engine::{detect_vcs, BatchController, LocalFs};
use batchconv_logging::{conv_info, LogDestination};
use log::LevelFilter;

use super::config::AppConfig;
use super::review::{self, Prompt};
use super::{AppError, Cli, Command, Overrides};

pub(crate) async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let root = std::path::absolute(cli.command.root())?;
    let mut config = AppConfig::load(&root)?;
    apply_overrides(&mut config, cli.overrides);
    init_logging(&config, &root, cli.verbose);

    let controller = BatchController::new(
        config.engine_config()?,
        config.generator()?,
        Arc::new(LocalFs),
        detect_vcs(&root),
    );
    if controller.init(&[root.clone()]).await? {
        conv_info!("Resumed session in {}", root.display());
    }

    let result = execute(&controller, &root, cli.command).await;
    controller.dispose();
    result
}

async fn execute(
    controller: &BatchController,
    root: &Path,
    command: Command,
) -> Result<ExitCode, AppError> {
    match command {
        Command::Run {
            accept_all, paths, ..
        } => convert(controller, root, &paths, accept_all).await,
        Command::Status { .. } => status(controller, root).await,
        Command::Commit { message, .. } => {
            require_session(controller, root).await?;
            let outcome = controller.commit(message.as_deref()).await?;
            println!(
                "Committed {} file(s): {}",
                outcome.summary.files.len(),
                outcome.message
            );
            if outcome.summary.cleanup_failures > 0 {
                println!(
                    "{} backup file(s) could not be removed",
                    outcome.summary.cleanup_failures
                );
            }
            match outcome.vcs_error {
                Some(err) => {
                    eprintln!("warning: files were kept but version control failed: {err}");
                    Ok(ExitCode::from(2))
                }
                None => Ok(ExitCode::SUCCESS),
            }
        }
        Command::Reject { yes, .. } => {
            let count = require_session(controller, root).await?;
            if !yes {
                let question = format!("Restore {count} original file(s) and delete the conversions?");
                if !Prompt::new().confirm(&question).await? {
                    println!("Nothing changed");
                    return Ok(ExitCode::SUCCESS);
                }
            }
            let summary = controller.reject().await?;
            println!("Restored {} original file(s)", summary.files.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn convert(
    controller: &BatchController,
    root: &Path,
    paths: &[PathBuf],
    accept_all: bool,
) -> Result<ExitCode, AppError> {
    let selection = paths
        .iter()
        .map(std::path::absolute)
        .collect::<Result<Vec<_>, _>>()?;
    let summary = controller.enqueue(root, &selection).await?;
    for skipped in &summary.skipped {
        println!("already queued {}", skipped.display());
    }
    if summary.enqueued.is_empty() {
        println!("No .{} files to convert", controller.languages().source_ext());
        return Ok(ExitCode::SUCCESS);
    }
    println!("Queued {} file(s)", summary.enqueued.len());

    let tally = review::review_all(controller, accept_all).await?;
    println!(
        "Accepted {}, cancelled {}, failed {}{}",
        tally.accepted,
        tally.cancelled,
        tally.failed,
        if tally.quit { " (stopped early)" } else { "" }
    );

    let state = controller.session_state().await;
    if state.active && !state.accepted.is_empty() {
        println!(
            "{} file(s) pending. Run `batchconv commit` to keep them or `batchconv reject` to restore the originals.",
            state.accepted.len()
        );
    }
    Ok(if tally.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn status(controller: &BatchController, root: &Path) -> Result<ExitCode, AppError> {
    let state = controller.session_state().await;
    if !state.active {
        println!("No active session in {}", root.display());
        return Ok(ExitCode::SUCCESS);
    }

    let session_root = state.workspace_root.as_deref().unwrap_or(root);
    println!(
        "Active session in {} with {} accepted file(s)",
        session_root.display(),
        state.accepted.len()
    );
    for record in &state.accepted {
        println!("  {}", record.replacement.display());
    }
    Ok(ExitCode::SUCCESS)
}

/// Number of accepted files in the active session.
async fn require_session(controller: &BatchController, root: &Path) -> Result<usize, AppError> {
    let state = controller.session_state().await;
    if !state.active {
        return Err(AppError::NoSession(root.to_path_buf()));
    }
    Ok(state.accepted.len())
}

fn apply_overrides(config: &mut AppConfig, overrides: Overrides) {
    if let Some(provider) = overrides.provider {
        config.provider = provider;
    }
    if let Some(model) = overrides.model {
        config.model = model;
    }
    if let Some(base_url) = overrides.base_url {
        config.base_url = Some(base_url);
    }
}

fn init_logging(config: &AppConfig, root: &Path, verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    match &config.log_file {
        Some(file) if verbose => batchconv_logging::initialize(LogDestination::Both(root.join(file)), level),
        Some(file) => batchconv_logging::initialize(LogDestination::File(root.join(file)), level),
        // Keep the review prompt readable unless asked for detail.
        None if verbose => batchconv_logging::initialize(LogDestination::Terminal, level),
        None => batchconv_logging::initialize(LogDestination::Terminal, LevelFilter::Warn),
    }
}

impl Command {
    fn root(&self) -> &Path {
        match self {
            Command::Run { root, .. }
            | Command::Status { root }
            | Command::Commit { root, .. }
            | Command::Reject { root, .. } => &root.root,
        }
    }
}
