//! Node runtime: tokio timers, frame routing, and the per-node event loop.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use syntonic::clock::{LocalClock, SynchronizableClock};
use syntonic::infra::ForeignClockRecordsVec;
use syntonic::message::SystemMessage;
use syntonic::ordinary::OrdinaryClock;
use syntonic::port::{DomainNumber, DomainPort, PhysicalPort, PortIdentity, PortNumber, TimerHost};
use syntonic::profile::PortProfile;
use syntonic::result::HalError;
use syntonic::time::Instant;
use syntonic::wire;

use syntonic::boundary::SelectionQueue;

use crate::log::TracingPortLog;
use crate::net::NetworkSocket;
use crate::timestamping::{ClockTimestamping, RxTimestamping};

/// A one-shot timer that posts its message to the node's system queue.
///
/// Restarting aborts the previously scheduled task, so at most one delivery
/// is in flight; dropping the timeout cancels it.
pub struct TokioTimeout {
    port: PortNumber,
    msg: SystemMessage,
    system_tx: mpsc::UnboundedSender<(PortNumber, SystemMessage)>,
    handle: RefCell<Option<JoinHandle<()>>>,
}

impl TokioTimeout {
    fn abort(&self) {
        if let Some(handle) = self.handle.borrow_mut().take() {
            handle.abort();
        }
    }
}

impl syntonic::port::Timeout for TokioTimeout {
    fn restart(&self, delay: Duration) {
        self.abort();
        let tx = self.system_tx.clone();
        let port = self.port;
        let msg = self.msg;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send((port, msg));
        });
        *self.handle.borrow_mut() = Some(handle);
    }

    fn cancel(&self) {
        self.abort();
    }
}

impl Drop for TokioTimeout {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Creates [`TokioTimeout`]s bound to one port's system queue.
pub struct TokioTimerHost {
    port: PortNumber,
    system_tx: mpsc::UnboundedSender<(PortNumber, SystemMessage)>,
}

impl TokioTimerHost {
    pub fn new(
        port: PortNumber,
        system_tx: mpsc::UnboundedSender<(PortNumber, SystemMessage)>,
    ) -> Self {
        Self { port, system_tx }
    }
}

impl TimerHost for TokioTimerHost {
    type Timeout = TokioTimeout;

    fn timeout(&self, msg: SystemMessage) -> TokioTimeout {
        TokioTimeout {
            port: self.port,
            msg,
            system_tx: self.system_tx.clone(),
            handle: RefCell::new(None),
        }
    }
}

/// Routes outgoing frames to the event or general socket by message type.
pub struct RoutingPhysicalPort<N: NetworkSocket> {
    event_socket: Rc<N>,
    general_socket: Rc<N>,
}

impl<N: NetworkSocket> RoutingPhysicalPort<N> {
    pub fn new(event_socket: Rc<N>, general_socket: Rc<N>) -> Self {
        Self {
            event_socket,
            general_socket,
        }
    }
}

impl<N: NetworkSocket> PhysicalPort for RoutingPhysicalPort<N> {
    fn send(&self, frame: &[u8]) -> Result<(), HalError> {
        let socket = if wire::is_event_frame(frame) {
            &self.event_socket
        } else {
            &self.general_socket
        };
        match socket.try_send(frame) {
            Ok(_) => Ok(()),
            Err(_) => Err(HalError::Send),
        }
    }
}

/// A single-port PTP node: one [`OrdinaryClock`] wired to a pair of sockets
/// and driven by [`run`](OrdinaryNode::run) on a current-thread runtime.
pub struct OrdinaryNode<N: NetworkSocket, C: SynchronizableClock + Clone> {
    clock: C,
    local_clock: LocalClock<C>,
    selection: SelectionQueue<1>,
    physical_port: RoutingPhysicalPort<N>,
    event_socket: Rc<N>,
    general_socket: Rc<N>,
    domain_number: DomainNumber,
    profile: PortProfile,
}

const PORT_NUMBER: PortNumber = PortNumber::new(1);

impl<N: NetworkSocket, C: SynchronizableClock + Clone> OrdinaryNode<N, C> {
    pub fn new(
        clock: C,
        local_clock: LocalClock<C>,
        event_socket: Rc<N>,
        general_socket: Rc<N>,
        domain_number: DomainNumber,
        profile: PortProfile,
    ) -> Self {
        let physical_port = RoutingPhysicalPort::new(event_socket.clone(), general_socket.clone());
        Self {
            clock,
            local_clock,
            selection: SelectionQueue::new(),
            physical_port,
            event_socket,
            general_socket,
            domain_number,
            profile,
        }
    }

    pub fn local_clock(&self) -> &LocalClock<C> {
        &self.local_clock
    }

    pub async fn run(&self) -> std::io::Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Drive the node until `shutdown` resolves or a termination signal
    /// arrives.
    pub async fn run_until<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let (system_tx, mut system_rx) = mpsc::unbounded_channel();

        let port = DomainPort::new(
            &self.local_clock,
            &self.physical_port,
            TokioTimerHost::new(PORT_NUMBER, system_tx.clone()),
            ClockTimestamping::new(self.clock.clone(), PORT_NUMBER, system_tx.clone()),
            TracingPortLog::new(PortIdentity::new(*self.local_clock.identity(), PORT_NUMBER)),
            self.domain_number,
            PORT_NUMBER,
        );
        let rx_timestamping = ClockTimestamping::new(self.clock.clone(), PORT_NUMBER, system_tx);

        let mut clock = OrdinaryClock::new(
            &self.local_clock,
            &self.selection,
            port,
            ForeignClockRecordsVec::new(),
            self.profile,
        );
        clock.on_system_message(SystemMessage::Initialized);

        let started = tokio::time::Instant::now();
        let uptime = || Instant::from_nanos(started.elapsed().as_nanos() as u64);
        clock.tick(uptime());

        let mut event_buf = [0u8; 2048];
        let mut general_buf = [0u8; 2048];
        let mut housekeeping = tokio::time::interval(Duration::from_secs(1));

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                recv = self.event_socket.recv(&mut event_buf) => {
                    if let Ok((len, _peer)) = recv {
                        let ingress = rx_timestamping.ingress_stamp();
                        if let Err(err) =
                            clock.on_message_received(&event_buf[..len], ingress, uptime())
                        {
                            tracing::debug!("dropping event frame: {:?}", err);
                        }
                        clock.tick(uptime());
                    }
                }
                recv = self.general_socket.recv(&mut general_buf) => {
                    if let Ok((len, _peer)) = recv {
                        let ingress = rx_timestamping.ingress_stamp();
                        if let Err(err) =
                            clock.on_message_received(&general_buf[..len], ingress, uptime())
                        {
                            tracing::debug!("dropping general frame: {:?}", err);
                        }
                        clock.tick(uptime());
                    }
                }
                msg = system_rx.recv() => {
                    if let Some((_port, msg)) = msg {
                        clock.on_system_message(msg);
                        clock.tick(uptime());
                    }
                }
                _ = housekeeping.tick() => {
                    clock.tick(uptime());
                }
                _ = tokio::signal::ctrl_c() => {
                    return Ok(());
                }
                _ = terminate() => {
                    return Ok(());
                }
                _ = &mut shutdown => {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
