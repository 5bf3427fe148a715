// Identifier generation.
//
// Document numbers come from a counter scoped by kind and year that the store
// increments atomically; there is no fallback when the counter is unreachable.
// Row ids are opaque v4 UUIDs.

use docket_common::number::DocumentNumber;
use docket_common::types::DocumentKind;
use uuid::Uuid;

use super::error::DocumentError;
use crate::store::DocumentTx;

pub fn new_row_id() -> Uuid {
    Uuid::new_v4()
}

/// Draw the next `<PREFIX>-<YEAR>-<NNNN>` number for `kind`.
pub(crate) async fn generate_number<T: DocumentTx>(
    tx: &mut T,
    kind: DocumentKind,
    year: i32,
) -> Result<String, DocumentError> {
    let sequence =
        tx.next_sequence(kind, year).await.map_err(DocumentError::SequenceUnavailable)?;
    Ok(DocumentNumber::new(kind.number_prefix(), year, sequence).to_string())
}
