//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Module path prefixes of the TokSlides crates (the CLI binary is `tokslides`).
const TOKSLIDES_TARGETS: [&str; 5] = [
    "tokslides",
    "tokslides_common",
    "tokslides_project_model",
    "tokslides_render_engine",
    "tokslides_capture_engine",
];

/// Filter directives for a configured level.
///
/// A bare level (`"debug"`) applies to the TokSlides crates only and keeps
/// dependencies at `warn`. Anything with a `=` or `,` is used verbatim.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut directives = String::from("warn");
    for target in TOKSLIDES_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(level)))
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// command output.
///
/// `RUST_LOG` wins over the configured level when set. Returns `false` when a
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(&config.level));
    let installed = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    installed.is_ok()
}

/// Route logs through the test harness's captured output. Safe to call from
/// every test.
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}
