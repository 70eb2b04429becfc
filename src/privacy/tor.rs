//! Tor transport session.
//!
//! # How it works
//!
//! 1. Acquire a tor binary (see [`super::tools`])
//! 2. Write a generated torrc with fixed local ports
//! 3. Spawn tor and watch its output for "Bootstrapped 100%"
//! 4. Hand out the local HTTP tunnel / SOCKS proxy addresses
//! 5. Tear the process down, on every exit path
//!
//! A single tor process provides both listeners; reqwest can speak to
//! either, so no separate bridging proxy process is needed.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::config::TorConfig;
use super::tools::ensure_tor_binary;

/// Grace period for tor to exit after a kill.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tor transport errors.
#[derive(Debug, Error)]
pub enum TorError {
    /// Locating, downloading, or unpacking the tor tools failed.
    #[error("tor tool acquisition failed: {0}")]
    ToolAcquisition(String),

    /// The tor process failed to launch or to reach full bootstrap.
    #[error("tor failed to start: {0}")]
    Bootstrap(String),

    #[error("tor io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One running tor session.
///
/// Owned exclusively by the caller for the duration of a single fallback
/// fetch. [`shutdown`](Self::shutdown) is idempotent and `Drop` kills the
/// process if it was never called, so the session cannot outlive its scope.
#[derive(Debug)]
pub struct TorTransport {
    child: Option<Child>,
    http_tunnel_port: u16,
    socks_port: u16,
    stopped: bool,
    // Session-scoped runtime state; removed with the session.
    _data_dir: Option<tempfile::TempDir>,
}

impl TorTransport {
    /// Acquire tools, launch tor, and wait until it is fully bootstrapped.
    ///
    /// On any failure the partially started process is killed before the
    /// error is returned; a `TorTransport` is only handed out running.
    pub async fn start(config: &TorConfig) -> Result<Self, TorError> {
        let binary = ensure_tor_binary(config).await?;

        let (data_path, data_dir) = match config.data_dir {
            Some(ref dir) => {
                std::fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let tmp = tempfile::Builder::new().prefix("mirracquire-tor-").tempdir()?;
                (tmp.path().to_path_buf(), Some(tmp))
            }
        };

        let torrc_path = data_path.join("torrc");
        let torrc = generate_torrc(
            &data_path,
            config.socks_port,
            config.http_tunnel_port,
            config.control_port,
        );
        std::fs::write(&torrc_path, &torrc)?;

        info!("starting tor: {} -f {}", binary.display(), torrc_path.display());

        let mut child = Command::new(&binary)
            .arg("-f")
            .arg(&torrc_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TorError::Bootstrap(format!("failed to spawn {}: {}", binary.display(), e)))?;

        let timeout = Duration::from_secs(config.bootstrap_timeout_secs);
        if let Err(e) = wait_for_bootstrap(&mut child, timeout).await {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await;
            return Err(e);
        }

        info!(
            "tor bootstrapped; proxy at 127.0.0.1:{} (http) / 127.0.0.1:{} (socks)",
            config.http_tunnel_port, config.socks_port
        );

        Ok(Self {
            child: Some(child),
            http_tunnel_port: config.http_tunnel_port,
            socks_port: config.socks_port,
            stopped: false,
            _data_dir: data_dir,
        })
    }

    /// Local HTTP proxy address for routing fetches.
    pub fn http_proxy_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_tunnel_port)
    }

    /// Local SOCKS proxy address.
    pub fn socks_url(&self) -> String {
        format!("socks5h://127.0.0.1:{}", self.socks_port)
    }

    /// Whether the session has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop the tor process. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Some(mut child) = self.child.take() {
            info!("stopping tor...");
            let _ = child.start_kill();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!("tor exited with {}", status),
                Ok(Err(e)) => warn!("error waiting for tor to exit: {}", e),
                Err(_) => warn!("tor did not exit within {:?}", SHUTDOWN_TIMEOUT),
            }
        }
    }
}

impl Drop for TorTransport {
    fn drop(&mut self) {
        // kill_on_drop reaps the child; this covers a take()-free path
        // where shutdown was never awaited.
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

/// Watch tor's output until it reports full bootstrap or the timeout hits.
async fn wait_for_bootstrap(child: &mut Child, timeout: Duration) -> Result<(), TorError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TorError::Bootstrap("tor stdout not captured".to_string()))?;

    // Keep the stderr pipe drained so tor can never block on it.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("tor(stderr): {}", line);
            }
        });
    }

    let mut lines = BufReader::new(stdout).lines();
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TorError::Bootstrap(format!(
                "tor did not bootstrap within {} seconds",
                timeout.as_secs()
            )));
        }

        let line = match tokio::time::timeout(remaining, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                return Err(TorError::Bootstrap(
                    "tor exited before completing bootstrap".to_string(),
                ));
            }
            Ok(Err(e)) => {
                return Err(TorError::Bootstrap(format!("failed to read tor output: {}", e)));
            }
            Err(_) => {
                return Err(TorError::Bootstrap(format!(
                    "tor did not bootstrap within {} seconds",
                    timeout.as_secs()
                )));
            }
        };

        if line.contains("Bootstrapped 100%") {
            // Keep draining in the background after readiness.
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("tor: {}", line);
                }
            });
            return Ok(());
        } else if line.contains("[warn]") || line.contains("[err]") {
            warn!("tor: {}", line);
        } else {
            debug!("tor: {}", line);
        }
    }
}

/// Generate a torrc for one session.
fn generate_torrc(data_dir: &Path, socks_port: u16, http_tunnel_port: u16, control_port: u16) -> String {
    format!(
        r#"# mirracquire tor configuration
# Auto-generated - do not edit manually

DataDirectory {data_dir}
SocksPort 127.0.0.1:{socks_port}
HTTPTunnelPort 127.0.0.1:{http_tunnel_port}
ControlPort {control_port}

# Logging
Log notice stdout

# Safety settings
SafeLogging 1
"#,
        data_dir = data_dir.display(),
        socks_port = socks_port,
        http_tunnel_port = http_tunnel_port,
        control_port = control_port,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_generate_torrc() {
        let torrc = generate_torrc(Path::new("/tmp/tor"), 19050, 18118, 19051);

        assert!(torrc.contains("DataDirectory /tmp/tor"));
        assert!(torrc.contains("SocksPort 127.0.0.1:19050"));
        assert!(torrc.contains("HTTPTunnelPort 127.0.0.1:18118"));
        assert!(torrc.contains("ControlPort 19051"));
        assert!(torrc.contains("Log notice stdout"));
    }

    #[cfg(unix)]
    fn fake_tor_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tor");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn config_with_binary(binary: PathBuf, bootstrap_timeout_secs: u64) -> TorConfig {
        TorConfig {
            tor_binary: Some(binary),
            bootstrap_timeout_secs,
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_and_shutdown_with_fake_tor() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_tor_script(
            tmp.path(),
            "echo 'Bootstrapped 100% (done): Done'\nexec sleep 30",
        );

        let mut transport = TorTransport::start(&config_with_binary(script, 10))
            .await
            .unwrap();

        assert_eq!(transport.http_proxy_url(), "http://127.0.0.1:18118");
        assert_eq!(transport.socks_url(), "socks5h://127.0.0.1:19050");
        assert!(!transport.is_stopped());

        transport.shutdown().await;
        assert!(transport.is_stopped());

        // Idempotent.
        transport.shutdown().await;
        assert!(transport.is_stopped());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_immediate_exit_is_bootstrap_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_tor_script(tmp.path(), "exit 1");

        let err = TorTransport::start(&config_with_binary(script, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, TorError::Bootstrap(_)));
        assert!(err.to_string().contains("before completing bootstrap"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bootstrap_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_tor_script(tmp.path(), "echo 'Bootstrapped 5%'\nexec sleep 30");

        let start = Instant::now();
        let err = TorTransport::start(&config_with_binary(script, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, TorError::Bootstrap(_)));
        assert!(err.to_string().contains("did not bootstrap within"));
        // The wait is bounded by the configured timeout, not the sleep.
        assert!(start.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_acquisition_failure() {
        let config = TorConfig {
            tor_binary: Some(PathBuf::from("/nonexistent/tor")),
            ..Default::default()
        };

        let err = TorTransport::start(&config).await.unwrap_err();
        assert!(matches!(err, TorError::ToolAcquisition(_)));
    }
}
