// Numan Thabit 2025
// io/udp.rs - datagram source for demodulator bridges
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::trace;

use super::PacketSource;

const DEFAULT_RECV_BUFFER_LEN: usize = 2048;

/// Receives one frame per datagram.
///
/// Datagram boundaries are kept as-is; length checks happen at decode time.
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
    recv_buf: Vec<u8>,
}

impl UdpSource {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            recv_buf: vec![0u8; DEFAULT_RECV_BUFFER_LEN],
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl PacketSource for UdpSource {
    type Error = io::Error;

    async fn recv(&mut self) -> Result<Option<Bytes>, Self::Error> {
        let (len, peer) = self.socket.recv_from(&mut self.recv_buf).await?;
        trace!(%peer, len, "datagram received");
        Ok(Some(Bytes::copy_from_slice(&self.recv_buf[..len])))
    }
}

/// Sends a single raw frame; used by the sender-side tooling.
pub async fn send_frame(to: SocketAddr, frame: &[u8]) -> io::Result<usize> {
    let local: SocketAddr = if to.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.send_to(frame, to).await
}
