use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the console subscriber. `RUST_LOG` wins; otherwise `-v` raises
/// the crate's level from info to debug (one flag) or trace (two or more).
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("race_ledger={}", level)));

    // diagnostics go to stderr, report output stays on stdout
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    // a second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}
