//! Mirror latency probing and selection.
//!
//! Candidates are probed one at a time, in list order, with a short
//! per-probe timeout. The full list is always scanned; the winner is the
//! candidate with the strictly lowest latency among successful probes, so
//! ties resolve to the earliest candidate in configuration order.
//!
//! The serial scan is deliberate: total wall-clock cost is bounded by
//! `N * probe_timeout`, in exchange for never holding more than one
//! connection open and keeping the semantics trivially predictable.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::fetch::USER_AGENT;

/// Outcome of probing one candidate URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub succeeded: bool,
    /// Wall-clock milliseconds from request start to response headers.
    pub latency_ms: u64,
}

/// Result of a full selection pass over a candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The reachable candidate with the lowest recorded latency.
    Selected { url: String, latency_ms: u64 },
    /// No candidate answered a probe successfully.
    NoneFound,
}

/// Issues a single reachability probe against one URL.
///
/// A trait seam so selection logic can be tested without a network.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// HTTP probe client with a fixed short timeout.
pub struct ProbeClient {
    client: reqwest::Client,
}

impl ProbeClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for ProbeClient {
    /// Probe one URL, measuring time to response headers.
    ///
    /// Every failure mode (DNS, refused connection, timeout, non-2xx
    /// status) is reported uniformly as an unsuccessful result; nothing
    /// escapes as an error.
    async fn probe(&self, url: &str) -> ProbeResult {
        let start = Instant::now();
        let outcome = self.client.get(url).send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let succeeded = match outcome {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("probe failed for {}: {}", url, e);
                false
            }
        };

        ProbeResult {
            url: url.to_string(),
            succeeded,
            latency_ms,
        }
    }
}

/// Probe every candidate in list order and pick the fastest reachable one.
///
/// `on_probe` is invoked once per candidate as results arrive, letting the
/// caller surface progress without the selector knowing about presentation.
/// An empty list yields `NoneFound` without issuing any probes.
pub async fn select_fastest<P>(
    prober: &P,
    candidates: &[String],
    mut on_probe: impl FnMut(&ProbeResult),
) -> SelectionOutcome
where
    P: Prober + ?Sized,
{
    let mut best: Option<(String, u64)> = None;

    for url in candidates {
        let result = prober.probe(url).await;

        if result.succeeded {
            let better = match best {
                Some((_, best_latency)) => result.latency_ms < best_latency,
                None => true,
            };
            if better {
                best = Some((result.url.clone(), result.latency_ms));
            }
        }

        on_probe(&result);
    }

    match best {
        Some((url, latency_ms)) => SelectionOutcome::Selected { url, latency_ms },
        None => SelectionOutcome::NoneFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted prober: maps URL -> (succeeded, latency_ms), counts calls.
    struct ScriptedProber {
        outcomes: HashMap<String, (bool, u64)>,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(outcomes: &[(&str, bool, u64)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(url, ok, ms)| (url.to_string(), (*ok, *ms)))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, url: &str) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (succeeded, latency_ms) = self.outcomes.get(url).copied().unwrap_or((false, 0));
            ProbeResult {
                url: url.to_string(),
                succeeded,
                latency_ms,
            }
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_selects_minimum_latency() {
        let prober = ScriptedProber::new(&[
            ("http://a", false, 0),
            ("http://b", true, 200),
            ("http://c", true, 80),
        ]);
        let outcome =
            select_fastest(&prober, &urls(&["http://a", "http://b", "http://c"]), |_| {}).await;

        assert_eq!(
            outcome,
            SelectionOutcome::Selected {
                url: "http://c".to_string(),
                latency_ms: 80,
            }
        );
    }

    #[tokio::test]
    async fn test_tie_resolves_to_first_probed() {
        let prober = ScriptedProber::new(&[("http://a", true, 120), ("http://b", true, 120)]);
        let outcome = select_fastest(&prober, &urls(&["http://a", "http://b"]), |_| {}).await;

        assert_eq!(
            outcome,
            SelectionOutcome::Selected {
                url: "http://a".to_string(),
                latency_ms: 120,
            }
        );
    }

    #[tokio::test]
    async fn test_empty_list_issues_no_probes() {
        let prober = ScriptedProber::new(&[]);
        let outcome = select_fastest(&prober, &[], |_| {}).await;

        assert_eq!(outcome, SelectionOutcome::NoneFound);
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_failures_yields_none_found() {
        let prober = ScriptedProber::new(&[("http://a", false, 0), ("http://b", false, 0)]);
        let outcome = select_fastest(&prober, &urls(&["http://a", "http://b"]), |_| {}).await;

        assert_eq!(outcome, SelectionOutcome::NoneFound);
        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_scan() {
        let prober = ScriptedProber::new(&[
            ("http://a", false, 0),
            ("http://b", true, 300),
            ("http://c", false, 0),
            ("http://d", true, 90),
        ]);
        let candidates = urls(&["http://a", "http://b", "http://c", "http://d"]);

        let mut observed = Vec::new();
        let outcome = select_fastest(&prober, &candidates, |r| observed.push(r.url.clone())).await;

        // Full scan: every candidate probed, in order, despite failures.
        assert_eq!(prober.calls(), 4);
        assert_eq!(observed, candidates);
        assert_eq!(
            outcome,
            SelectionOutcome::Selected {
                url: "http://d".to_string(),
                latency_ms: 90,
            }
        );
    }

    #[tokio::test]
    async fn test_probe_success_against_local_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await;
        });

        let prober = ProbeClient::new(Duration::from_secs(5)).unwrap();
        let result = prober.probe(&format!("http://{}/index.txt", addr)).await;

        assert!(result.succeeded);
    }

    #[tokio::test]
    async fn test_probe_non_2xx_is_failure() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        });

        let prober = ProbeClient::new(Duration::from_secs(5)).unwrap();
        let result = prober.probe(&format!("http://{}/", addr)).await;

        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn test_probe_timeout_is_failure() {
        // Listener that accepts but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let prober = ProbeClient::new(Duration::from_millis(200)).unwrap();
        let result = prober.probe(&format!("http://{}/", addr)).await;

        assert!(!result.succeeded);
        assert!(result.latency_ms >= 200);
    }

    #[tokio::test]
    async fn test_probe_refused_connection_is_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = ProbeClient::new(Duration::from_secs(5)).unwrap();
        let result = prober.probe(&format!("http://{}/", addr)).await;

        assert!(!result.succeeded);
    }
}
