//! UDP and in-process transports for the daemon runtime.

use std::future::Future;
use std::io::Result;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::rc::Rc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// One side of a PTP transport channel. A node holds two of these, one for
/// event traffic and one for general traffic.
pub trait NetworkSocket {
    fn recv<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = Result<(usize, SocketAddr)>> + 'a;

    fn send<'a>(&'a self, bytes: &'a [u8]) -> impl Future<Output = Result<usize>> + 'a;
    fn try_send(&self, bytes: &[u8]) -> Result<usize>;
}

impl<N: NetworkSocket> NetworkSocket for Rc<N> {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.as_ref().recv(buf).await
    }

    async fn send(&self, bytes: &[u8]) -> Result<usize> {
        self.as_ref().send(bytes).await
    }

    fn try_send(&self, bytes: &[u8]) -> Result<usize> {
        self.as_ref().try_send(bytes)
    }
}

/// A socket joined to the IPv4 PTP multicast group.
#[derive(Debug)]
pub struct MulticastSocket {
    socket: UdpSocket,
    dest: SocketAddrV4,
}

impl MulticastSocket {
    const PTP_MCAST: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 129);

    /// Event channel (Sync, DelayReq), UDP port 319.
    pub async fn event() -> Result<Self> {
        Self::bind_v4(Self::PTP_MCAST, 319).await
    }

    /// General channel (Announce, FollowUp, DelayResp, Signaling), UDP port 320.
    pub async fn general() -> Result<Self> {
        Self::bind_v4(Self::PTP_MCAST, 320).await
    }

    async fn bind_v4(multicast: Ipv4Addr, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.join_multicast_v4(multicast, Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(false)?;
        socket.set_multicast_ttl_v4(1)?;
        Ok(Self {
            socket,
            dest: SocketAddrV4::new(multicast, port),
        })
    }
}

impl NetworkSocket for MulticastSocket {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    async fn send(&self, bytes: &[u8]) -> Result<usize> {
        self.socket.send_to(bytes, self.dest).await
    }

    fn try_send(&self, bytes: &[u8]) -> Result<usize> {
        self.socket.try_send_to(bytes, SocketAddr::V4(self.dest))
    }
}

/// An in-process datagram channel. [`LoopbackSocket::pair`] returns two
/// connected ends; what one end sends, the other receives.
pub struct LoopbackSocket {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl LoopbackSocket {
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: a_tx,
                rx: tokio::sync::Mutex::new(a_rx),
            },
            Self {
                tx: b_tx,
                rx: tokio::sync::Mutex::new(b_rx),
            },
        )
    }

    fn local_addr() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
    }
}

impl NetworkSocket for LoopbackSocket {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok((len, Self::local_addr()))
            }
            // Peer gone; behave like a quiet network rather than erroring
            // out of the select loop.
            None => std::future::pending().await,
        }
    }

    async fn send(&self, bytes: &[u8]) -> Result<usize> {
        self.try_send(bytes)
    }

    fn try_send(&self, bytes: &[u8]) -> Result<usize> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| std::io::Error::other("loopback peer closed"))?;
        Ok(bytes.len())
    }
}
