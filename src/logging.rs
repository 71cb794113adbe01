//! Logging initialization.
//!
//! Diagnostics go to stderr through `tracing`. The default level is `warn`
//! so log lines do not interleave with the live progress display; `--verbose`
//! lowers it to `debug`. `RUST_LOG` always wins.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub struct LogConfig {
    pub verbose: bool,
}

pub fn init(config: LogConfig) {
    let default_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("vip={}", default_level.as_str().to_lowercase()))
    });

    // A second init (tests, re-entry) is harmless; ignore the error.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.verbose)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init();
}
