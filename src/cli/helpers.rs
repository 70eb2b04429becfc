//! Shared helper functions for CLI commands.

use crate::config::Config;

/// Pick the language tag to use: an explicit flag wins, then the process
/// locale, then "en".
///
/// The core takes the tag explicitly; sniffing the environment is a CLI
/// concern only.
pub fn resolve_language(config: &Config, flag: Option<&str>) -> String {
    if let Some(lang) = flag {
        return lang.to_string();
    }

    if let Some(tag) = locale_tag() {
        if config.candidates_for(&tag).is_some() {
            return tag;
        }
    }

    "en".to_string()
}

/// Primary language subtag from the locale environment (`zh_CN.UTF-8` → `zh`).
fn locale_tag() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
        .and_then(|value| {
            value
                .split(['_', '-', '.'])
                .next()
                .map(|tag| tag.to_lowercase())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_flag_wins() {
        let config = Config::default();
        assert_eq!(resolve_language(&config, Some("zh")), "zh");
        // Even a tag with no configured list is passed through; the
        // service reports the configuration failure.
        assert_eq!(resolve_language(&config, Some("fr")), "fr");
    }
}
