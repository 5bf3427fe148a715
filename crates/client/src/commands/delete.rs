// `docket delete`: soft or hard delete.

use anyhow::Context as _;
use clap::Args;
use docket_common::types::DocumentKind;
use serde::Serialize;
use uuid::Uuid;

use super::{block_on, Context};
use crate::output;

#[derive(Debug, Args)]
pub struct DeleteArgs {
    pub kind: DocumentKind,
    pub id: Uuid,

    /// Remove the row and its children instead of marking it deleted.
    #[arg(long)]
    pub hard: bool,
}

#[derive(Debug, Serialize)]
struct Deleted {
    kind: DocumentKind,
    id: Uuid,
    hard: bool,
}

pub fn run(args: DeleteArgs, ctx: &Context) -> anyhow::Result<()> {
    let client = ctx.client()?;
    block_on(client.delete(args.kind, args.id, args.hard))?
        .with_context(|| format!("failed to delete {} {}", args.kind.as_str(), args.id))?;

    let deleted = Deleted { kind: args.kind, id: args.id, hard: args.hard };
    output::print_output(ctx.format, &deleted, |d| {
        let how = if d.hard { "permanently deleted" } else { "deleted" };
        format!("{} {} {how}", d.kind.as_str(), d.id)
    })?;
    Ok(())
}
