//! mirracquire - mirror resolution and fallback-fetch tool.
//!
//! Resolves the best-reachable endpoint from a pool of mirror URLs by
//! probing each one's latency, fetches a text resource from the winner,
//! and falls back to fetching through a locally managed tor proxy when no
//! mirror is reachable directly.

pub mod cli;
pub mod config;
pub mod fetch;
pub mod privacy;
pub mod probe;
pub mod services;
