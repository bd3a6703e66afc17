//! Interactive review of completed conversions.

use std::io::Write;

use batchconv_core::CompletedJob;
use batchconv_engine::{BatchController, WorkerEvent};
use batchconv_logging::conv_debug;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use super::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Accept,
    Cancel,
    Quit,
}

impl Decision {
    /// Parses a reply; `None` means the reply should be asked again.
    pub(crate) fn parse(reply: &str) -> Option<Self> {
        match reply.trim().to_ascii_lowercase().as_str() {
            "a" | "accept" => Some(Decision::Accept),
            "c" | "cancel" | "s" | "skip" => Some(Decision::Cancel),
            "q" | "quit" => Some(Decision::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    pub accepted: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub quit: bool,
}

pub(crate) struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    pub(crate) fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// End of input counts as quitting.
    pub(crate) async fn decide(&mut self) -> Result<Decision, AppError> {
        loop {
            ask("[a]ccept, [c]ancel, [q]uit? ")?;
            let Some(line) = self.lines.next_line().await? else {
                return Ok(Decision::Quit);
            };
            if let Some(decision) = Decision::parse(&line) {
                return Ok(decision);
            }
        }
    }

    pub(crate) async fn confirm(&mut self, question: &str) -> Result<bool, AppError> {
        ask(&format!("{question} [y/N] "))?;
        let reply = self.lines.next_line().await?.unwrap_or_default();
        Ok(matches!(reply.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

fn ask(text: &str) -> Result<(), AppError> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Reviews every conversion until the queue drains or the reviewer quits.
pub(crate) async fn review_all(
    controller: &BatchController,
    accept_all: bool,
) -> Result<Tally, AppError> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let _subscription = controller.worker().subscribe(move |event: &WorkerEvent| {
        let _ = tx.send(event.clone());
    });

    let mut prompt = Prompt::new();
    let mut tally = Tally::default();
    loop {
        while let Some(entry) = controller.worker().completed().into_iter().next() {
            let job_id = entry.job.id;
            if entry.error {
                println!("failed  {}: {}", entry.job.source.display(), entry.text);
                let _ = controller.cancel(job_id);
                tally.failed += 1;
                continue;
            }

            let decision = if accept_all {
                Decision::Accept
            } else {
                show(&entry, controller);
                prompt.decide().await?
            };
            match decision {
                Decision::Accept => match controller.accept(job_id, None).await {
                    Ok(target) => {
                        println!("accepted {}", target.display());
                        tally.accepted += 1;
                    }
                    Err(err) => {
                        eprintln!("could not accept {}: {err}", entry.job.source.display());
                        let _ = controller.cancel(job_id);
                        tally.failed += 1;
                    }
                },
                Decision::Cancel => {
                    controller.cancel(job_id)?;
                    tally.cancelled += 1;
                }
                Decision::Quit => {
                    controller.cancel_pending();
                    tally.quit = true;
                    return Ok(tally);
                }
            }
        }

        let worker = controller.worker();
        if controller.queue().is_empty() && !worker.is_busy() && worker.completed().is_empty() {
            return Ok(tally);
        }
        match events.recv().await {
            Some(WorkerEvent::Started(_)) => {
                if let Some(job) = worker.current() {
                    println!("converting {}", job.source.display());
                }
            }
            Some(event) => conv_debug!("Worker event {:?}", event),
            None => return Ok(tally),
        }
    }
}

fn show(entry: &CompletedJob, controller: &BatchController) {
    let target = controller.languages().target_path(&entry.job.source);
    println!();
    println!("==== {} -> {}", entry.job.source.display(), target.display());
    println!("{}", entry.text.trim_end());
    println!("====");
}
