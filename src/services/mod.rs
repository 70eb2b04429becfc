//! Service layer for mirracquire business logic.
//!
//! Domain logic separated from UI concerns. Services emit events over
//! channels; the CLI (or any other interface) renders them.

pub mod resolve;

pub use resolve::{FetchEvent, FetchOutcome, ResolveService};
