//! Mirror resolution and fallback-fetch orchestration.
//!
//! The resolve service composes the selector, the fetcher, and the tor
//! transport into one tiered delivery flow: probe all mirrors for the
//! requested language, fetch directly from the fastest one, and only when
//! no mirror is reachable at all bring up the anonymizing transport and
//! fetch the fixed fallback resource through it.
//!
//! Every error is converted to a displayable [`FetchOutcome::Failure`] at
//! this boundary; nothing propagates to callers as an `Err`.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::privacy::TorTransport;
use crate::probe::{select_fastest, ProbeClient, ProbeResult, SelectionOutcome};

/// Events emitted during a resolution pass.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    /// Resolution started for a language tag.
    Started { language: String },
    /// One candidate was probed.
    ///
    /// Delivery is best-effort: probe progress is sent without blocking the
    /// scan, so when the receiver lags behind a full channel, `Probed`
    /// events are dropped. The lifecycle events (`Started`,
    /// `MirrorSelected`, `FallbackEngaged`, `Finished`) are always
    /// delivered, awaiting channel capacity if needed.
    Probed { result: ProbeResult },
    /// A mirror won the selection pass.
    MirrorSelected { url: String, latency_ms: u64 },
    /// No mirror was reachable; the anonymizing transport is starting.
    FallbackEngaged,
    /// Resolution finished, successfully or not.
    Finished { success: bool },
}

/// Terminal result of a resolution pass. Never retried internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The fetched resource body.
    Content(String),
    /// A human-readable failure naming the URL attempted.
    Failure(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Content(_))
    }
}

/// Orchestrates mirror selection and tiered fetching.
pub struct ResolveService {
    config: Config,
    // Serializes overlapping resolutions so two tor sessions can never
    // race for the same local ports.
    flight: tokio::sync::Mutex<()>,
}

impl ResolveService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the best mirror for `lang` and fetch the resource.
    ///
    /// Emits lifecycle events on `events` when provided. Always returns an
    /// outcome; every failure mode ends up as `FetchOutcome::Failure`.
    pub async fn resolve_and_fetch(
        &self,
        lang: &str,
        events: Option<mpsc::Sender<FetchEvent>>,
    ) -> FetchOutcome {
        let _guard = self.flight.lock().await;

        emit(
            &events,
            FetchEvent::Started {
                language: lang.to_string(),
            },
        )
        .await;

        let outcome = match self.run(lang, &events).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Failure(format!("fetch failed: {:#}", e)),
        };

        if let FetchOutcome::Failure(ref message) = outcome {
            warn!("{}", message);
        }

        emit(
            &events,
            FetchEvent::Finished {
                success: outcome.is_success(),
            },
        )
        .await;

        outcome
    }

    async fn run(
        &self,
        lang: &str,
        events: &Option<mpsc::Sender<FetchEvent>>,
    ) -> anyhow::Result<FetchOutcome> {
        let candidates = self
            .config
            .candidates_for(lang)
            .ok_or_else(|| anyhow::anyhow!("no mirror list configured for language '{}'", lang))?
            .to_vec();

        let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let fetch_timeout = Duration::from_secs(self.config.fetch_timeout_secs);

        let prober = ProbeClient::new(probe_timeout)?;

        let outcome = select_fastest(&prober, &candidates, |result| {
            // Live progress; a full channel just drops the event.
            if let Some(tx) = events {
                let _ = tx.try_send(FetchEvent::Probed {
                    result: result.clone(),
                });
            }
        })
        .await;

        match outcome {
            SelectionOutcome::Selected { url, latency_ms } => {
                info!("selected mirror {} ({}ms)", url, latency_ms);
                emit(
                    events,
                    FetchEvent::MirrorSelected {
                        url: url.clone(),
                        latency_ms,
                    },
                )
                .await;

                // Single attempt; a direct-fetch failure is final, no
                // second mirror and no fallback.
                let fetcher = Fetcher::new(fetch_timeout)?;
                match fetcher.fetch_text(&url).await {
                    Ok(text) => Ok(FetchOutcome::Content(text)),
                    Err(e) => Ok(FetchOutcome::Failure(format!("direct fetch failed: {}", e))),
                }
            }
            SelectionOutcome::NoneFound => {
                info!("no mirror reachable, engaging anonymizing transport");
                emit(events, FetchEvent::FallbackEngaged).await;
                Ok(self.fetch_via_tor(fetch_timeout).await)
            }
        }
    }

    /// Fallback branch: full tor lifecycle around one proxied fetch.
    ///
    /// The transport is stopped before this returns, on the success and
    /// failure paths alike; `TorTransport`'s `Drop` backstops the rest.
    async fn fetch_via_tor(&self, fetch_timeout: Duration) -> FetchOutcome {
        let mut transport = match TorTransport::start(&self.config.tor).await {
            Ok(transport) => transport,
            Err(e) => {
                return FetchOutcome::Failure(format!(
                    "anonymized fetch of {} failed: {}",
                    self.config.fallback_url, e
                ));
            }
        };

        let result = match Fetcher::with_proxy(fetch_timeout, &transport.http_proxy_url()) {
            Ok(fetcher) => fetcher.fetch_text(&self.config.fallback_url).await,
            Err(e) => Err(e),
        };

        transport.shutdown().await;

        match result {
            Ok(text) => FetchOutcome::Content(text),
            Err(e) => FetchOutcome::Failure(format!("anonymized fetch failed: {}", e)),
        }
    }
}

async fn emit(events: &Option<mpsc::Sender<FetchEvent>>, event: FetchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
