// `docket save`: one-shot save of a snapshot file.
//
// The lock token is the `modifiedAt` inside the file, so a file fetched
// with `docket get --out` conflicts if someone saved since. `--overwrite`
// retries once with the server's current token.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use docket_common::snapshot::DocumentSnapshot;
use docket_common::types::{Document, DocumentKind};
use tracing::warn;
use uuid::Uuid;

use super::{block_on, is_stdio, read_snapshot, write_snapshot, Context};
use crate::http::DocumentClient;
use crate::output::{self, format_document_human};
use crate::session::DocumentSession;

#[derive(Debug, Args)]
pub struct SaveArgs {
    pub kind: DocumentKind,
    pub id: Uuid,

    /// Snapshot JSON. `-` reads stdin.
    #[arg(long, short)]
    pub file: PathBuf,

    /// On conflict, save over the other writer's version.
    #[arg(long)]
    pub overwrite: bool,

    /// Leave the file as it was instead of rewriting it with the stored document.
    #[arg(long)]
    pub no_write_back: bool,
}

pub fn run(args: SaveArgs, ctx: &Context) -> anyhow::Result<()> {
    let snapshot = read_snapshot(&args.file)?;
    let client = ctx.client()?;
    let document = block_on(save(&client, args.kind, args.id, snapshot, args.overwrite))?
        .with_context(|| format!("failed to save {} {}", args.kind.as_str(), args.id))?;

    if !args.no_write_back && !is_stdio(&args.file) {
        write_snapshot(&args.file, &document)?;
    }
    output::print_output(ctx.format, &document, format_document_human)?;
    Ok(())
}

async fn save(
    client: &DocumentClient,
    kind: DocumentKind,
    id: Uuid,
    snapshot: DocumentSnapshot,
    overwrite: bool,
) -> anyhow::Result<Document> {
    match client.update(kind, id, &snapshot).await {
        Err(error) if overwrite && error.is_conflict() => {
            warn!(document_id = %id, "stale snapshot, overwriting the latest version");
            let latest = client.get(kind, id).await.context("failed to load the latest version")?;
            let session = DocumentSession::open(latest);
            Ok(client.update(kind, id, &session.prepare(snapshot)).await?)
        }
        result => Ok(result?),
    }
}
