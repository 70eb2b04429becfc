//! Fetch command.

use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::services::{FetchEvent, FetchOutcome, ResolveService};

use super::super::helpers::resolve_language;

/// Resolve the fastest mirror for the language and fetch the resource.
pub async fn cmd_fetch(
    config: Config,
    lang: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let lang = resolve_language(&config, lang);
    let service = ResolveService::new(config);

    let (event_tx, event_rx) = mpsc::channel(64);
    let render = tokio::spawn(render_events(event_rx));

    let outcome = service.resolve_and_fetch(&lang, Some(event_tx)).await;
    let _ = render.await;

    match outcome {
        FetchOutcome::Content(text) => {
            match output {
                Some(path) => {
                    std::fs::write(path, &text)?;
                    println!(
                        "{} Saved {} bytes to {}",
                        style("✓").green(),
                        text.len(),
                        path.display()
                    );
                }
                None => print!("{}", text),
            }
            Ok(())
        }
        FetchOutcome::Failure(message) => {
            eprintln!("{} {}", style("✗").red(), message);
            anyhow::bail!("fetch failed");
        }
    }
}

/// Render service events as a spinner with status messages.
async fn render_events(mut event_rx: mpsc::Receiver<FetchEvent>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    while let Some(event) = event_rx.recv().await {
        match event {
            FetchEvent::Started { language } => {
                spinner.set_message(format!("probing mirrors ({})...", language));
            }
            FetchEvent::Probed { result } => {
                if result.succeeded {
                    spinner.println(format!(
                        "  {} {} ({}ms)",
                        style("✓").green(),
                        result.url,
                        result.latency_ms
                    ));
                } else {
                    spinner.println(format!(
                        "  {} {} unreachable",
                        style("✗").dim(),
                        result.url
                    ));
                }
            }
            FetchEvent::MirrorSelected { url, latency_ms } => {
                spinner.set_message(format!("fetching from {} ({}ms)...", url, latency_ms));
            }
            FetchEvent::FallbackEngaged => {
                spinner.set_message("no mirror reachable, starting tor (this can take a while)...");
            }
            FetchEvent::Finished { .. } => break,
        }
    }

    spinner.finish_and_clear();
}
