//! `tracing` sinks for the core's log and metrics boundaries.

use syntonic::log::{ClockMetrics, PortEvent, PortLog};
use syntonic::port::PortIdentity;
use syntonic::time::TimeInterval;

/// Forwards [`PortEvent`]s to `tracing`, keeping the port identity as
/// context. State recommendations and faults land at `info`/`warn`;
/// per-message traffic at `debug`.
#[derive(Clone, Copy, Debug)]
pub struct TracingPortLog {
    port_identity: PortIdentity,
}

impl TracingPortLog {
    pub fn new(port_identity: PortIdentity) -> Self {
        Self { port_identity }
    }
}

impl PortLog for TracingPortLog {
    fn event(&self, event: PortEvent) {
        match event {
            PortEvent::Initialized => {
                tracing::info!("{}: Initialized", self.port_identity);
            }
            PortEvent::RecommendedSlave { parent } => {
                tracing::info!(
                    "{}: Recommended Slave, parent {}",
                    self.port_identity,
                    parent.identity()
                );
            }
            PortEvent::RecommendedMaster => {
                tracing::info!("{}: Recommended Master", self.port_identity);
            }
            PortEvent::RecommendedPassive => {
                tracing::info!("{}: Recommended Passive", self.port_identity);
            }
            PortEvent::MasterClockSelected => {
                tracing::info!("{}: Master Clock Selected", self.port_identity);
            }
            PortEvent::AnnounceReceiptTimeout => {
                tracing::info!("{}: Announce Receipt Timeout", self.port_identity);
            }
            PortEvent::QualificationTimeout => {
                tracing::info!("{}: Qualification Timeout", self.port_identity);
            }
            PortEvent::SynchronizationFault => {
                tracing::warn!("{}: Synchronization Fault", self.port_identity);
            }
            PortEvent::FaultDetected => {
                tracing::warn!("{}: Fault Detected", self.port_identity);
            }
            PortEvent::FaultCleared => {
                tracing::info!("{}: Fault Cleared", self.port_identity);
            }
            PortEvent::PortDisabled => {
                tracing::info!("{}: Port Disabled", self.port_identity);
            }
            PortEvent::PortEnabled => {
                tracing::info!("{}: Port Enabled", self.port_identity);
            }
            PortEvent::MessageReceived(msg) => {
                tracing::debug!("{}: Message Received: {}", self.port_identity, msg);
            }
            PortEvent::MessageSent(msg) => {
                tracing::debug!("{}: Message Sent: {}", self.port_identity, msg);
            }
            PortEvent::Static(desc) => {
                tracing::info!("{}: {}", self.port_identity, desc);
            }
        }
    }
}

/// Forwards servo observations to `tracing` at `debug`, divergence at `warn`.
pub struct TracingClockMetrics;

impl ClockMetrics for TracingClockMetrics {
    fn offset_from_master(&self, offset: TimeInterval) {
        tracing::debug!("offset from master: {} ns", offset.nanos());
    }

    fn mean_path_delay(&self, delay: TimeInterval) {
        tracing::debug!("mean path delay: {} ns", delay.nanos());
    }

    fn phase_step(&self, step: TimeInterval) {
        tracing::info!("clock stepped by {} ns", step.nanos());
    }

    fn frequency_trim(&self, ppb: i64) {
        tracing::debug!("frequency trim: {} ppb", ppb);
    }

    fn servo_divergence(&self) {
        tracing::warn!("servo divergence");
    }
}

/// Static instance for wiring into servos, which hold `&'static dyn ClockMetrics`.
pub static TRACING_CLOCK_METRICS: TracingClockMetrics = TracingClockMetrics;
