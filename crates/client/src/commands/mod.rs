// CLI subcommand dispatch.

use std::future::Future;
use std::io::{self, Read};
use std::path::Path;

use anyhow::Context as _;
use clap::Subcommand;
use docket_common::snapshot::DocumentSnapshot;
use docket_common::types::Document;

use crate::config::ClientConfig;
use crate::http::DocumentClient;
use crate::output::OutputFormat;

pub mod create;
pub mod delete;
pub mod get;
pub mod save;
pub mod setup;
pub mod watch;

#[derive(Subcommand)]
pub enum Command {
    /// Fetch a document, optionally into a snapshot file
    Get(get::GetArgs),
    /// Create a document from a snapshot file
    Create(create::CreateArgs),
    /// Save a snapshot file over an existing document
    Save(save::SaveArgs),
    /// Delete a document (soft by default)
    Delete(delete::DeleteArgs),
    /// Open a document and auto-save edits made to its snapshot file
    Watch(watch::WatchArgs),
    /// Show or change ~/.docket/client.toml
    Setup(setup::SetupArgs),
}

/// Settings shared by every command.
pub struct Context {
    pub config: ClientConfig,
    pub format: OutputFormat,
}

impl Context {
    pub fn client(&self) -> anyhow::Result<DocumentClient> {
        DocumentClient::new(&self.config.server_url, self.config.request_timeout())
            .with_context(|| format!("cannot use server url `{}`", self.config.server_url))
    }
}

pub fn run(cmd: Command, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        Command::Get(args) => get::run(args, ctx),
        Command::Create(args) => create::run(args, ctx),
        Command::Save(args) => save::run(args, ctx),
        Command::Delete(args) => delete::run(args, ctx),
        Command::Watch(args) => watch::run(args, ctx),
        Command::Setup(args) => setup::run(args, ctx),
    }
}

/// Run `future` to completion on a fresh current-thread runtime.
pub fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    Ok(runtime.block_on(future))
}

pub fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

/// Read a snapshot from `path`, or from stdin when `path` is `-`.
pub fn read_snapshot(path: &Path) -> anyhow::Result<DocumentSnapshot> {
    let raw = if is_stdio(path) {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw).context("failed to read snapshot from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot file {}", path.display()))?
    };
    parse_snapshot(&raw)
}

pub fn parse_snapshot(raw: &str) -> anyhow::Result<DocumentSnapshot> {
    serde_json::from_str(raw).context("invalid snapshot file")
}

/// Pretty JSON snapshot of `document`, lock token included.
pub fn render_snapshot(document: &Document) -> anyhow::Result<String> {
    let mut rendered = serde_json::to_string_pretty(&DocumentSnapshot::from_document(document))?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write the snapshot of `document` to `path` and return what was written.
pub fn write_snapshot(path: &Path, document: &Document) -> anyhow::Result<String> {
    let rendered = render_snapshot(document)?;
    std::fs::write(path, &rendered)
        .with_context(|| format!("failed to write snapshot file {}", path.display()))?;
    Ok(rendered)
}
