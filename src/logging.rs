//! Namespaced debug channels on top of `tracing`.
//!
//! Three channels cover the dev loop: `dev:timing` (reconcile timings),
//! `dev:watcher` (event filtering and classification), `dev:sql` (statements
//! sent to either database). They are regular tracing targets; the `DEBUG`
//! environment variable enables them by name.

use tracing_subscriber::EnvFilter;

/// Tracing targets for the three debug channels. The macros need string
/// literals, so these exist for filter construction and documentation.
pub const TIMING_TARGET: &str = "dev::timing";
pub const WATCHER_TARGET: &str = "dev::watcher";
pub const SQL_TARGET: &str = "dev::sql";

const CHANNELS: [(&str, &str); 3] = [
    ("dev:timing", TIMING_TARGET),
    ("dev:watcher", WATCHER_TARGET),
    ("dev:sql", SQL_TARGET),
];

/// Build the env filter for a session.
///
/// Precedence: `RUST_LOG` wins outright; otherwise the CLI verbosity flags
/// pick the base level and `DEBUG=dev:watcher,dev:sql` (comma- or
/// colon-separated, `dev:*` for everything) turns individual channels on.
pub fn env_filter(debug: bool, verbose: bool, quiet: bool) -> EnvFilter {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter = EnvFilter::new(level);
    let spec = std::env::var("DEBUG").unwrap_or_default();
    for channel in channels_from_spec(&spec) {
        if let Ok(directive) = format!("{channel}=debug").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

pub fn initialize_logging(debug: bool, verbose: bool, quiet: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug, verbose, quiet))
        .with_target(false)
        .init();
}

/// Channel names are matched as whole tokens wherever they appear in the
/// spec, so every separator convention (`,`, `:`, whitespace) works even
/// though the names themselves contain a colon.
fn channels_from_spec(spec: &str) -> Vec<&'static str> {
    if spec.contains("dev:*") || spec.trim() == "*" {
        return CHANNELS.iter().map(|(_, target)| *target).collect();
    }

    CHANNELS
        .iter()
        .filter(|(name, _)| contains_token(spec, name))
        .map(|(_, target)| *target)
        .collect()
}

fn contains_token(spec: &str, name: &str) -> bool {
    spec.match_indices(name).any(|(start, _)| {
        let end = start + name.len();
        let before = spec[..start].chars().next_back();
        let after = spec[end..].chars().next();
        // A token boundary is a separator or the ends of the string; this
        // keeps `dev:sql` from matching inside `dev:sqlx`.
        before.is_none_or(|c| !c.is_alphanumeric())
            && after.is_none_or(|c| !c.is_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_channel() {
        assert_eq!(channels_from_spec("dev:watcher"), vec![WATCHER_TARGET]);
    }

    #[test]
    fn test_comma_separated() {
        assert_eq!(
            channels_from_spec("dev:timing,dev:sql"),
            vec![TIMING_TARGET, SQL_TARGET]
        );
    }

    #[test]
    fn test_colon_separated() {
        assert_eq!(
            channels_from_spec("dev:watcher:dev:sql"),
            vec![WATCHER_TARGET, SQL_TARGET]
        );
    }

    #[test]
    fn test_wildcard_enables_all() {
        assert_eq!(channels_from_spec("dev:*").len(), 3);
        assert_eq!(channels_from_spec("*").len(), 3);
    }

    #[test]
    fn test_unknown_names_ignored() {
        assert!(channels_from_spec("http,express").is_empty());
    }

    #[test]
    fn test_no_partial_token_match() {
        assert!(channels_from_spec("dev:sqlx").is_empty());
    }

    #[test]
    fn test_empty_spec() {
        assert!(channels_from_spec("").is_empty());
    }
}
