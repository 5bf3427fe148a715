// `docket get`: fetch one document.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use docket_common::types::DocumentKind;
use uuid::Uuid;

use super::{block_on, write_snapshot, Context};
use crate::output::{self, format_document_human};

#[derive(Debug, Args)]
pub struct GetArgs {
    /// quotation, invoice or production-ticket (plural forms work too).
    pub kind: DocumentKind,
    pub id: Uuid,

    /// Also write an editable snapshot to this file.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

pub fn run(args: GetArgs, ctx: &Context) -> anyhow::Result<()> {
    let client = ctx.client()?;
    let document = block_on(client.get(args.kind, args.id))?
        .with_context(|| format!("failed to load {} {}", args.kind.as_str(), args.id))?;

    if let Some(path) = &args.out {
        write_snapshot(path, &document)?;
    }
    output::print_output(ctx.format, &document, format_document_human)?;
    Ok(())
}
