// Unique-name resolution against active records of one kind.

use docket_common::naming;
use docket_common::types::DocumentKind;
use uuid::Uuid;

use crate::store::DocumentTx;

/// Resolve `candidate` to a name no other active document of `kind` uses.
///
/// `exclude` is the document being renamed, so keeping an unchanged name
/// never bumps its own suffix. Read-only; the caller persists the result.
pub(crate) async fn resolve_unique_name<T: DocumentTx>(
    tx: &mut T,
    candidate: &str,
    kind: DocumentKind,
    exclude: Option<Uuid>,
) -> anyhow::Result<String> {
    if naming::is_blank(candidate) {
        return Ok(candidate.to_owned());
    }

    let taken = tx.names_in_use(kind, candidate, exclude).await?;
    Ok(naming::resolve_unique_name(candidate, taken.iter().map(String::as_str)))
}
