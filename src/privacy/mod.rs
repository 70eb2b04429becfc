//! Anonymizing transport subsystem.
//!
//! Manages an external tor process as an opaque local-proxy collaborator:
//! acquire the binary (locate or download + unpack), write a torrc, spawn,
//! wait for bootstrap, expose the local proxy addresses, and guarantee
//! teardown on every exit path.
//!
//! One session exists per fallback fetch attempt. Sessions are never reused
//! and must be fully stopped before their owning call returns, so repeated
//! fallback invocations cannot leak processes or ports. Explicit
//! [`TorTransport::shutdown`] is backstopped by `Drop`.
//!
//! # Configuration
//!
//! Via `[tor]` in the config file or environment:
//! - `MIRRACQUIRE_TOR_BINARY` - path to an existing tor binary
//! - `MIRRACQUIRE_TOR_BUNDLE_URL` - archive to download when no binary found
//! - `MIRRACQUIRE_NO_TOOL_FETCH=1` - never download, fail instead

mod config;
mod tools;
mod tor;

pub use config::TorConfig;
pub use tools::ensure_tor_binary;
pub use tor::{TorError, TorTransport};
