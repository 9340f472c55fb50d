//! Log output for applications that do not install their own subscriber.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed, either by the application or through [`init`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "redforester=debug"
    } else {
        "redforester=error"
    }
}

/// Install a formatting subscriber. `RUST_LOG` takes precedence over
/// `verbose`. Returns `false` when a global subscriber already exists.
pub fn init(verbose: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
