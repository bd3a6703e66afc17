use std::path::{Path, PathBuf};
use std::sync::Arc;

use batchconv_logging::{conv_debug, conv_info};
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Version-control hook run after a session has been committed.
#[async_trait::async_trait]
pub trait Vcs: Send + Sync {
    fn name(&self) -> &'static str;

    /// Records the replacements as added and the originals as removed, then commits.
    async fn commit_all(
        &self,
        replacements: &[PathBuf],
        originals: &[PathBuf],
        message: &str,
    ) -> Result<(), VcsError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoVcs;

#[async_trait::async_trait]
impl Vcs for NoVcs {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn commit_all(
        &self,
        _replacements: &[PathBuf],
        _originals: &[PathBuf],
        _message: &str,
    ) -> Result<(), VcsError> {
        Ok(())
    }
}

/// Drives the `git` executable in a working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    program: String,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            program: "git".to_string(),
        }
    }

    /// Uses another executable in place of `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The subset of `paths` git tracks, as paths under the root.
    async fn tracked(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>, VcsError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let stdout = self.git(&["ls-files", "-z"], paths).await?;
        Ok(stdout
            .split(|byte| *byte == 0)
            .filter(|name| !name.is_empty())
            .map(|name| self.root.join(String::from_utf8_lossy(name).into_owned()))
            .collect())
    }

    /// Runs git with `paths` as pathspec and returns its stdout.
    async fn git(&self, args: &[&str], paths: &[PathBuf]) -> Result<Vec<u8>, VcsError> {
        let mut command = Command::new(&self.program);
        command.arg("-C").arg(&self.root).args(args);
        if !paths.is_empty() {
            command.arg("--").args(paths);
        }

        let rendered = format!("{} {}", self.program, args.join(" "));
        conv_debug!("Running {} ({} path(s))", rendered, paths.len());
        let output = command.output().await.map_err(|source| VcsError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(VcsError::Command {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait::async_trait]
impl Vcs for GitCli {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn commit_all(
        &self,
        replacements: &[PathBuf],
        originals: &[PathBuf],
        message: &str,
    ) -> Result<(), VcsError> {
        // Untracked originals would make the commit pathspec fail to match.
        let tracked = self.tracked(originals).await?;
        let mut pathspec = replacements.to_vec();
        pathspec.extend(tracked);
        if pathspec.is_empty() {
            return Ok(());
        }

        if !replacements.is_empty() {
            self.git(&["add"], replacements).await?;
        }
        if !originals.is_empty() {
            self.git(&["rm", "--cached", "--quiet", "--ignore-unmatch"], originals)
                .await?;
        }
        // Only the session's files; other staged changes stay staged.
        self.git(&["commit", "--quiet", "-m", message], &pathspec)
            .await?;
        conv_info!(
            "Committed {} file(s) to git in {}",
            replacements.len(),
            self.root.display()
        );
        Ok(())
    }
}

/// Picks git when `root` is a git working tree, no version control otherwise.
pub fn detect_vcs(root: &Path) -> Arc<dyn Vcs> {
    if root.join(".git").exists() {
        Arc::new(GitCli::new(root))
    } else {
        Arc::new(NoVcs)
    }
}
