//! Configuration management for mirracquire.
//!
//! Settings come from an optional TOML file plus environment variable
//! overrides. The built-in defaults reproduce the stock mirror lists and the
//! onion fallback endpoint, so the tool works with no config file at all.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::privacy::TorConfig;

/// Default probe timeout in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Default direct/fallback fetch timeout in seconds (5 minutes).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// Fallback index reachable only through the anonymizing transport.
pub const DEFAULT_FALLBACK_URL: &str =
    "http://ethanielragn6ug6op5w3x2f6rawzzzu7qfrsksaaq527oltkmmu7yad.onion/index.txt";

const CHINESE_MIRRORS: &[&str] = &[
    "https://z-lib.100713.xyz/index.txt",
    "https://z-libdomain.100713.xyz/index.txt",
    "https://zlib.100713.xyz/index.txt",
    "https://z-lib.2010hcy.us.kg/index.txt",
    "https://zlib.2010hcy.us.kg/index.txt",
    "https://z-libdomain.2010hcy.us.kg/index.txt",
    "https://z-lib.broker.us.kg/index.txt",
    "https://zlib.broker.us.kg/index.txt",
    "https://z-libdomain.broker.us.kg/index.txt",
    "https://z-librarydomain.pages.dev/index.txt",
];

const ENGLISH_MIRRORS: &[&str] = &[
    "https://z-lib.100713.xyz/index-EN.txt",
    "https://z-libdomain.100713.xyz/index-EN.txt",
    "https://zlib.100713.xyz/index-EN.txt",
    "https://z-lib.2010hcy.us.kg/index-EN.txt",
    "https://zlib.2010hcy.us.kg/index-EN.txt",
    "https://z-libdomain.2010hcy.us.kg/index-EN.txt",
    "https://z-lib.broker.us.kg/index-EN.txt",
    "https://zlib.broker.us.kg/index-EN.txt",
    "https://z-libdomain.broker.us.kg/index-EN.txt",
    "https://z-librarydomain.pages.dev/index-EN.txt",
];

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mirror candidate lists keyed by language tag, probed in list order.
    #[serde(default = "default_mirrors")]
    pub mirrors: HashMap<String, Vec<String>>,

    /// Resource fetched through the anonymizing transport when no mirror
    /// is reachable directly.
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,

    /// Per-candidate probe timeout in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Full-body fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Tor transport settings.
    #[serde(default)]
    pub tor: TorConfig,
}

fn default_mirrors() -> HashMap<String, Vec<String>> {
    let mut mirrors = HashMap::new();
    mirrors.insert(
        "zh".to_string(),
        CHINESE_MIRRORS.iter().map(|s| s.to_string()).collect(),
    );
    mirrors.insert(
        "en".to_string(),
        ENGLISH_MIRRORS.iter().map(|s| s.to_string()).collect(),
    );
    mirrors
}

fn default_fallback_url() -> String {
    DEFAULT_FALLBACK_URL.to_string()
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            fallback_url: default_fallback_url(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            tor: TorConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/mirracquire/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mirracquire")
            .join("config.toml")
    }

    /// Load configuration from an explicit path, or from the default
    /// location if it exists, falling back to built-in defaults.
    ///
    /// Environment overrides are applied last in all cases.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
                Self::from_file(Path::new(&expanded))?
            }
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("MIRRACQUIRE_FALLBACK_URL") {
            if !url.is_empty() {
                self.fallback_url = url;
            }
        }
        if let Ok(secs) = std::env::var("MIRRACQUIRE_PROBE_TIMEOUT") {
            if let Ok(secs) = secs.parse() {
                self.probe_timeout_secs = secs;
            }
        }
        if let Ok(secs) = std::env::var("MIRRACQUIRE_FETCH_TIMEOUT") {
            if let Ok(secs) = secs.parse() {
                self.fetch_timeout_secs = secs;
            }
        }
        self.tor = self.tor.with_env_overrides();
        self
    }

    /// Check that every configured URL actually parses.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (lang, candidates) in &self.mirrors {
            for candidate in candidates {
                url::Url::parse(candidate).map_err(|e| {
                    anyhow::anyhow!("invalid mirror URL for '{}' ({}): {}", lang, candidate, e)
                })?;
            }
        }
        url::Url::parse(&self.fallback_url)
            .map_err(|e| anyhow::anyhow!("invalid fallback URL ({}): {}", self.fallback_url, e))?;
        Ok(())
    }

    /// Look up the candidate list for a language tag.
    ///
    /// Matches the exact tag first, then the primary subtag (`zh-CN` → `zh`).
    pub fn candidates_for(&self, lang: &str) -> Option<&[String]> {
        if let Some(list) = self.mirrors.get(lang) {
            return Some(list.as_slice());
        }
        let primary = lang.split(['-', '_']).next().unwrap_or(lang);
        self.mirrors.get(primary).map(|l| l.as_slice())
    }

    /// Configured language tags, sorted for stable display.
    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.mirrors.keys().map(|s| s.as_str()).collect();
        langs.sort_unstable();
        langs
    }
}
