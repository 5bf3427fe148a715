// `docket create`: create a document from a snapshot file.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use docket_common::types::DocumentKind;

use super::{block_on, is_stdio, read_snapshot, write_snapshot, Context};
use crate::output::{self, format_document_human};

#[derive(Debug, Args)]
pub struct CreateArgs {
    pub kind: DocumentKind,

    /// Snapshot JSON. `-` reads stdin.
    #[arg(long, short)]
    pub file: PathBuf,

    /// Leave the file as it was instead of rewriting it with the stored document.
    #[arg(long)]
    pub no_write_back: bool,
}

pub fn run(args: CreateArgs, ctx: &Context) -> anyhow::Result<()> {
    let snapshot = read_snapshot(&args.file)?;
    let client = ctx.client()?;
    let document = block_on(client.create(args.kind, &snapshot))?
        .with_context(|| format!("failed to create {}", args.kind.as_str()))?;

    if !args.no_write_back && !is_stdio(&args.file) {
        write_snapshot(&args.file, &document)?;
    }
    output::print_output(ctx.format, &document, format_document_human)?;
    Ok(())
}
