//! Probe command.

use std::time::Duration;

use console::style;

use crate::config::Config;
use crate::probe::{select_fastest, ProbeClient, SelectionOutcome};

use super::super::helpers::resolve_language;

/// Probe every mirror for the language and report latencies.
pub async fn cmd_probe(config: Config, lang: Option<&str>) -> anyhow::Result<()> {
    let lang = resolve_language(&config, lang);
    let candidates = config
        .candidates_for(&lang)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no mirror list configured for language '{}' (available: {})",
                lang,
                config.languages().join(", ")
            )
        })?
        .to_vec();

    println!("Probing {} mirrors ({})...", candidates.len(), lang);

    let prober = ProbeClient::new(Duration::from_secs(config.probe_timeout_secs))?;
    let outcome = select_fastest(&prober, &candidates, |result| {
        if result.succeeded {
            println!(
                "  {} {} {}",
                style("✓").green(),
                result.url,
                style(format!("{}ms", result.latency_ms)).dim()
            );
        } else {
            println!("  {} {}", style("✗").red(), result.url);
        }
    })
    .await;

    match outcome {
        SelectionOutcome::Selected { url, latency_ms } => {
            println!(
                "\n{} Fastest mirror: {} ({}ms)",
                style("✓").green(),
                url,
                latency_ms
            );
        }
        SelectionOutcome::NoneFound => {
            println!(
                "\n{} No mirror reachable; `mirra fetch` would fall back to tor",
                style("!").yellow()
            );
        }
    }

    Ok(())
}
