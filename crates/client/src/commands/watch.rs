// `docket watch`: keep a document open and auto-save its snapshot file.
//
// The current document is written to FILE, then the file is polled for
// changes and every change is fed to the auto-save runner. Console lines
// on stdin: `save`, `reload`, `overwrite`, `quit`. Ctrl-C stops without
// flushing; `quit` or end of input flushes unsaved edits first.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Args;
use docket_common::types::DocumentKind;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{block_on, parse_snapshot, write_snapshot, Context};
use crate::autosave::{AutoSaveConfig, SaveTrigger};
use crate::http::DocumentClient;
use crate::output::{self, OutputFormat};
use crate::runner::{AutoSaveRunner, RunnerCommand, RunnerEvent};
use crate::session::DocumentSession;

const FILE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Args)]
pub struct WatchArgs {
    pub kind: DocumentKind,
    pub id: Uuid,

    /// Snapshot file to edit. Overwritten with the current document on start.
    #[arg(long, short)]
    pub file: PathBuf,
}

#[derive(Debug)]
enum ConsoleInput {
    Send(RunnerCommand),
    Quit,
}

fn parse_console(line: &str) -> Option<ConsoleInput> {
    match line.trim() {
        "save" | "s" => Some(ConsoleInput::Send(RunnerCommand::SaveNow)),
        "reload" => Some(ConsoleInput::Send(RunnerCommand::Reload)),
        "overwrite" => Some(ConsoleInput::Send(RunnerCommand::Overwrite)),
        "quit" | "q" => Some(ConsoleInput::Quit),
        _ => None,
    }
}

pub fn run(args: WatchArgs, ctx: &Context) -> anyhow::Result<()> {
    let client = Arc::new(ctx.client()?);
    block_on(watch(client, args, ctx.config.autosave(), ctx.format))?
}

async fn watch(
    client: Arc<DocumentClient>,
    args: WatchArgs,
    autosave: AutoSaveConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let document = client
        .get(args.kind, args.id)
        .await
        .with_context(|| format!("failed to open {} {}", args.kind.as_str(), args.id))?;
    let mut last_seen = write_snapshot(&args.file, &document)?;
    output::print_output(format, &document, output::format_document_human)?;

    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let runner =
        AutoSaveRunner::new(Arc::clone(&client), DocumentSession::open(document), autosave, event_tx);
    let runner_task = tokio::spawn(runner.run(command_rx, shutdown.clone()));

    let mut ticker = tokio::time::interval(FILE_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                shutdown.cancel();
                break;
            }
            _ = ticker.tick() => {
                let contents = match tokio::fs::read_to_string(&args.file).await {
                    Ok(contents) => contents,
                    Err(error) => {
                        debug!(error = %error, "snapshot file unreadable, skipping poll");
                        continue;
                    }
                };
                if contents == last_seen {
                    continue;
                }
                match parse_snapshot(&contents) {
                    Ok(draft) => {
                        if command_tx.send(RunnerCommand::Edited(draft)).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        output::print_warning(format, "INVALID_SNAPSHOT", &format!("{error:#}"));
                    }
                }
                last_seen = contents;
            }
            line = console.next_line(), if console_open => match line {
                Ok(Some(line)) => match parse_console(&line) {
                    Some(ConsoleInput::Quit) => break,
                    Some(ConsoleInput::Send(command)) => {
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => output::print_warning(
                        format,
                        "UNKNOWN_COMMAND",
                        &format!("unknown command `{}`; try save, reload, overwrite or quit", line.trim()),
                    ),
                },
                Ok(None) | Err(_) => console_open = false,
            },
            Some(event) = events.recv() => {
                if let Some(written) = report(format, &args.file, event)? {
                    last_seen = written;
                }
            }
        }
    }

    drop(command_tx);
    let session = runner_task.await.context("auto-save runner stopped unexpectedly")?;
    while let Some(event) = events.recv().await {
        report(format, &args.file, event)?;
    }
    info!(
        document_id = %session.id(),
        modified_at = %session.known_modified_at(),
        "stopped watching"
    );
    Ok(())
}

/// Print one runner event. Returns the new file contents when the snapshot
/// file was rewritten from the server's copy.
fn report(format: OutputFormat, path: &Path, event: RunnerEvent) -> anyhow::Result<Option<String>> {
    match event {
        RunnerEvent::Saved { document, trigger, superseded } => {
            let written = if superseded { None } else { Some(write_snapshot(path, &document)?) };
            let trigger = match trigger {
                SaveTrigger::Auto => "auto",
                SaveTrigger::Manual => "manual",
            };
            let value = json!({
                "event": "saved",
                "trigger": trigger,
                "name": document.name,
                "modifiedAt": document.modified_at,
            });
            output::print_output(format, &value, |_| {
                format!("saved ({trigger}) {} at {}", document.name, document.modified_at.to_rfc3339())
            })?;
            Ok(written)
        }
        RunnerEvent::Reloaded(document) => {
            let written = write_snapshot(path, &document)?;
            let value = json!({ "event": "reloaded", "modifiedAt": document.modified_at });
            output::print_output(format, &value, |_| {
                format!("reloaded the server version from {}", document.modified_at.to_rfc3339())
            })?;
            Ok(Some(written))
        }
        RunnerEvent::Conflict { stored } => {
            let when = stored.map(|stamp| format!(" at {}", stamp.to_rfc3339())).unwrap_or_default();
            output::print_warning(
                format,
                "OPTIMISTIC_LOCK_ERROR",
                &format!(
                    "someone else saved this document{when}; auto-save is paused. \
                     Type `reload` to take their version or `overwrite` to keep yours"
                ),
            );
            Ok(None)
        }
        RunnerEvent::Failed { message } => {
            output::print_warning(format, "SAVE_FAILED", &message);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::invoice;
    use super::*;

    #[test]
    fn console_commands() {
        assert!(matches!(parse_console("save"), Some(ConsoleInput::Send(RunnerCommand::SaveNow))));
        assert!(matches!(parse_console(" s \n"), Some(ConsoleInput::Send(RunnerCommand::SaveNow))));
        assert!(matches!(parse_console("reload"), Some(ConsoleInput::Send(RunnerCommand::Reload))));
        assert!(matches!(
            parse_console("overwrite"),
            Some(ConsoleInput::Send(RunnerCommand::Overwrite))
        ));
        assert!(matches!(parse_console("quit"), Some(ConsoleInput::Quit)));
        assert!(parse_console("publish").is_none());
    }

    #[test]
    fn superseded_save_leaves_the_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.json");
        std::fs::write(&path, "local edits").unwrap();

        let event =
            RunnerEvent::Saved { document: invoice(), trigger: SaveTrigger::Auto, superseded: true };
        assert_eq!(report(OutputFormat::Json, &path, event).unwrap(), None);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "local edits");
    }

    #[test]
    fn completed_save_rewrites_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.json");
        let document = invoice();

        let event = RunnerEvent::Saved {
            document: document.clone(),
            trigger: SaveTrigger::Manual,
            superseded: false,
        };
        let written = report(OutputFormat::Json, &path, event).unwrap().unwrap();
        let snapshot = parse_snapshot(&written).unwrap();
        assert_eq!(snapshot.modified_at, Some(document.modified_at));
    }
}
