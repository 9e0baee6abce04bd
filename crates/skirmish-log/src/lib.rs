//! Structured logging for the Skirmish server and sessions.
//!
//! Console output with uptime timestamps and module paths, plus JSON file
//! logging in debug builds. The level comes from `RUST_LOG` when set,
//! otherwise from the config's `debug.log_level`.

use skirmish_config::Config;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
/// Per-message hub traffic is noisy, so the transport stays at `warn`.
pub const DEFAULT_FILTER: &str = "info,skirmish_net=warn";

/// Name of the JSON log inside the log directory.
pub const LOG_FILE: &str = "skirmish.log";

/// Install the global tracing subscriber. Call once, before the match starts.
///
/// The JSON file layer is only added for `debug_build` and only when
/// `log_dir` can be created; otherwise logging is console-only.
///
/// ```no_run
/// use skirmish_log::init_logging;
///
/// init_logging(None, false, None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter = filter_string(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let log_file = log_dir.filter(|_| debug_build).and_then(open_log_file);
    match log_file {
        Some(file) => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_timer(fmt::time::uptime()),
                )
                .init();
            tracing::debug!(filter = %filter, "logging to console and {LOG_FILE}");
        }
        None => {
            registry.init();
            tracing::debug!(filter = %filter, "logging to console");
        }
    }
}

/// The filter string derived from `config`, falling back to [`DEFAULT_FILTER`].
pub fn filter_string(config: Option<&Config>) -> String {
    config
        .map(|config| config.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Creates `log_dir` if needed and truncates [`LOG_FILE`] inside it.
fn open_log_file(log_dir: &Path) -> Option<File> {
    std::fs::create_dir_all(log_dir).ok()?;
    File::create(log_dir.join(LOG_FILE)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).unwrap().to_string();
        assert!(filter.contains("skirmish_net=warn"));
        assert!(filter.contains("info"));
    }

    #[test]
    fn test_config_level_wins_over_default() {
        let mut config = Config::default();
        config.debug.log_level = "debug,skirmish_core=trace".to_string();
        assert_eq!(filter_string(Some(&config)), "debug,skirmish_core=trace");
    }

    #[test]
    fn test_blank_config_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = "  ".to_string();
        assert_eq!(filter_string(Some(&config)), DEFAULT_FILTER);
        assert_eq!(filter_string(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_module_filters_parse() {
        for filter in [
            "info",
            "debug,skirmish_core=trace",
            "warn,skirmish_core::projectile=debug",
            "error,skirmish_net::hub=trace",
        ] {
            assert!(EnvFilter::try_new(filter).is_ok(), "bad filter: {filter}");
        }
    }

    #[test]
    fn test_log_file_created_in_nested_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs").join("match");
        assert!(open_log_file(&log_dir).is_some());
        assert!(log_dir.join(LOG_FILE).exists());
    }
}
