//! Feature-gated diagnostics.
//!
//! Built with `--features tracing`, the slow paths (construction, blocking
//! waits, interruption) emit `tracing` events. Without the feature the macros
//! expand to nothing, so the lock-free fast path carries no logging cost.

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `handoff=trace`).
///
/// Safe to call more than once; only the first call installs the subscriber.
/// A no-op unless the `tracing` feature is enabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("handoff=trace"));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_timer(fmt::time::uptime()),
            )
            .with(filter)
            .try_init();
    });
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace};

#[cfg(not(feature = "tracing"))]
macro_rules! noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use noop as trace;
