//! Process-wide tracing subscriber setup

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::router_config::RouterConfig;
use crate::settings::{LogFormat, LoggingSettings};

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Build the filter: `RUST_LOG` wins when set, otherwise the configured
/// level plus `directives`. Invalid directives are skipped.
pub fn build_filter(settings: &LoggingSettings, directives: &[String]) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut filter = EnvFilter::try_new(&settings.level).unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in directives {
        match directive.parse::<Directive>() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(e) => eprintln!("ignoring invalid log directive `{directive}`: {e}"),
        }
    }
    filter
}

/// Install the global subscriber once.
///
/// Returns `true` only for the call that installed it; later calls (or a
/// subscriber installed elsewhere) leave the existing one in place.
pub fn init_logging(settings: &LoggingSettings, directives: &[String]) -> bool {
    let mut installed_now = false;
    INSTALLED.get_or_init(|| {
        let filter = build_filter(settings, directives);
        let result = match settings.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init(),
        };
        installed_now = result.is_ok();
        installed_now
    });
    installed_now
}

/// [`init_logging`] with the router's logging section and per-worker levels.
pub fn init_router_logging(config: &RouterConfig) -> bool {
    init_logging(&config.logging, &config.logging_directives())
}
