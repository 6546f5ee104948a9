//! Tokio-based host runtime for `syntonic`.
//!
//! The workspace separates the protocol core (`crates/syntonic`) from this
//! IO-facing integration layer. The core performs no IO; this crate supplies
//! the pieces it expects from its host:
//! - UDP multicast sockets and in-process loopback pairs ([`net`]),
//! - tokio timers behind the core's timeout boundary ([`node`]),
//! - a virtual disciplinable clock ([`virtualclock`]),
//! - egress/ingress timestamping ([`timestamping`]), and
//! - `tracing` sinks for the core's log and metrics events ([`log`]).
//!
//! [`node::OrdinaryNode`] wires all of that around a single-port clock and
//! runs it on a current-thread runtime.

pub mod log;
pub mod net;
pub mod node;
pub mod timestamping;
pub mod virtualclock;

use std::fmt;
use std::time::Instant;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Tracing `FormatTime` that prints process uptime with millisecond
/// precision, e.g. `ptp[12.034s]`.
struct MillisecondUptime {
    start: Instant,
}

impl MillisecondUptime {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl FormatTime for MillisecondUptime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let elapsed = self.start.elapsed();
        write!(w, "ptp[{}.{:03}s]", elapsed.as_secs(), elapsed.subsec_millis())
    }
}

/// Install the default tracing subscriber for binaries embedding the daemon
/// components: honor `RUST_LOG` with a default of `info`, emit to stdout,
/// and ignore the error if a subscriber is already set (e.g. tests).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_level(false)
        .with_timer(MillisecondUptime::new())
        .try_init();
}
