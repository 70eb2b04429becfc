//! Tor transport configuration.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default local HTTP tunnel port exposed to the fetcher.
pub(crate) const DEFAULT_HTTP_TUNNEL_PORT: u16 = 18118;

/// Default local SOCKS port.
pub(crate) const DEFAULT_SOCKS_PORT: u16 = 19050;

/// Default control port.
pub(crate) const DEFAULT_CONTROL_PORT: u16 = 19051;

/// Default bootstrap wait in seconds.
pub(crate) const DEFAULT_BOOTSTRAP_TIMEOUT_SECS: u64 = 120;

/// Configuration for the tor transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorConfig {
    /// Path to tor binary (default: search PATH, then the tools directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tor_binary: Option<PathBuf>,

    /// Directory for downloaded and extracted tool bundles
    /// (default: `~/.local/share/mirracquire/tor-tools`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_dir: Option<PathBuf>,

    /// Directory for tor runtime data (default: a fresh temporary
    /// directory per session).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Download the tor bundle when no binary can be located.
    #[serde(default = "default_true")]
    pub auto_fetch_tools: bool,

    /// Override the bundle archive URL (default: the tor expert bundle
    /// for this platform).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_url: Option<String>,

    /// Local HTTP tunnel port the fetcher routes through.
    #[serde(default = "default_http_tunnel_port")]
    pub http_tunnel_port: u16,

    /// Local SOCKS port.
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,

    /// Control port.
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Seconds to wait for tor to report full bootstrap.
    #[serde(default = "default_bootstrap_timeout_secs")]
    pub bootstrap_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_http_tunnel_port() -> u16 {
    DEFAULT_HTTP_TUNNEL_PORT
}

fn default_socks_port() -> u16 {
    DEFAULT_SOCKS_PORT
}

fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

fn default_bootstrap_timeout_secs() -> u64 {
    DEFAULT_BOOTSTRAP_TIMEOUT_SECS
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            tor_binary: None,
            tools_dir: None,
            data_dir: None,
            auto_fetch_tools: true,
            bundle_url: None,
            http_tunnel_port: DEFAULT_HTTP_TUNNEL_PORT,
            socks_port: DEFAULT_SOCKS_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            bootstrap_timeout_secs: DEFAULT_BOOTSTRAP_TIMEOUT_SECS,
        }
    }
}

impl TorConfig {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = env::var("MIRRACQUIRE_TOR_BINARY") {
            if !path.is_empty() {
                self.tor_binary = Some(PathBuf::from(path));
            }
        }

        if let Ok(url) = env::var("MIRRACQUIRE_TOR_BUNDLE_URL") {
            if !url.is_empty() {
                self.bundle_url = Some(url);
            }
        }

        if env::var("MIRRACQUIRE_NO_TOOL_FETCH")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            self.auto_fetch_tools = false;
        }

        self
    }

    /// Resolved tools directory.
    pub fn tools_dir(&self) -> PathBuf {
        self.tools_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mirracquire")
                .join("tor-tools")
        })
    }
}
