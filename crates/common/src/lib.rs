// docket-common: shared types and pure helpers for the Docket workspace

pub mod money;
pub mod naming;
pub mod number;
pub mod snapshot;
pub mod types;
