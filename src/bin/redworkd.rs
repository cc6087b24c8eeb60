//! Binary entry point: loads configuration from the environment, wires up
//! the handler registry, and runs the supervisor until shutdown.

use redwork::prelude::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// `LOGGING`/`VERBOSE` map to `info`, `VVERBOSE` to `debug`, matching the
/// external-interface env vars; `RUST_LOG` still wins if set explicitly.
fn init_logging() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else if std::env::var("VVERBOSE").is_ok() {
        EnvFilter::new("debug")
    } else if std::env::var("VERBOSE").is_ok() || std::env::var("LOGGING").is_ok() {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Daemonize before touching anything thread-based (logging's writer,
    // the eventual heartbeat and signal-watcher threads): fork only carries
    // the calling thread forward, so this has to happen first.
    if config.process.background {
        if let Err(e) = daemonize() {
            eprintln!("failed to daemonize: {e}");
            std::process::exit(2);
        }
    }

    init_logging();

    // Job classes are registered here before the supervisor takes over;
    // an unregistered class surfaces as JobError::NoHandler at execution time.
    let registry = HandlerRegistry::new();

    let mut supervisor = Supervisor::new(config, registry);
    match supervisor.work(Duration::from_secs(1)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("worker exited with an error during teardown: {e}");
            std::process::exit(1);
        }
    }
}
