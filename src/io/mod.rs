// Transport and host-stream collaborators for the gateway loop.
// Numan Thabit 2025

use std::convert::Infallible;

use bytes::Bytes;
use tokio::sync::mpsc;

pub mod host;
pub mod stream;
pub mod udp;

pub use host::{HostSink, OutputMode};
pub use stream::StreamSource;
pub use udp::UdpSource;

/// Source of raw, already demodulated packet frames.
///
/// `recv` is the loop's only suspension point. It resolves to `Ok(None)` once
/// the source is closed for good.
#[allow(async_fn_in_trait)]
pub trait PacketSource {
    /// Error type returned by the source.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for the next frame.
    async fn recv(&mut self) -> Result<Option<Bytes>, Self::Error>;
}

/// In-process source fed through a channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }
}

impl PacketSource for ChannelSource {
    type Error = Infallible;

    async fn recv(&mut self) -> Result<Option<Bytes>, Self::Error> {
        Ok(self.rx.recv().await)
    }
}
