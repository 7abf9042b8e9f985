use tracing_subscriber::EnvFilter;

/// Initialise logging on stderr. Without `verbose` the level is fixed at `info`
/// so a stray `RUST_LOG` does not flood the terminal while keys are being typed.
/// With `verbose` the default is `debug` and `RUST_LOG` may override it.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
