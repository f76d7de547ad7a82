//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Settings;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `DEBUG=true` means `debug`, else the
/// `LOG_LEVEL` setting. Logs go to stderr so JSON payloads on stdout stay
/// machine-readable. Calling this more than once is harmless.
pub fn init(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(settings)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter used when `RUST_LOG` is unset.
fn default_directive(settings: &Settings) -> &str {
    if settings.debug { "debug" } else { settings.log_level.as_str() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_overrides_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::for_base_dir(dir.path()).unwrap();
        settings.log_level = "warn".to_string();
        assert_eq!(default_directive(&settings), "warn");
        settings.debug = true;
        assert_eq!(default_directive(&settings), "debug");
    }
}
