use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the stderr subscriber
///
/// `RUST_LOG` wins when set; otherwise `-v` selects debug and `-q` warn.
pub fn init_logging(verbose: bool, quiet: bool, ansi: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is reserved for summaries and JSON
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(verbose);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
