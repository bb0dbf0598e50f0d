// Numan Thabit 2025
// io/stream.rs - fixed-size frames from a byte stream (stdin, serial line)
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::PacketSource;
use crate::wire::PACKET_LEN;

/// Cuts a byte stream into consecutive `PACKET_LEN` frames.
///
/// A clean end of stream on a frame boundary closes the source; a partial
/// trailing frame is reported as `UnexpectedEof`.
///
/// Frames carry no delimiter, so boundaries are pure byte counts. A byte lost
/// or inserted upstream shifts every later frame, and those frames then fail
/// authentication until the stream is reopened. Use it only on links that
/// preserve byte counts (pipes, reliable serial bridges); lossy links belong
/// on [`super::UdpSource`].
#[derive(Debug)]
pub struct StreamSource<R> {
    reader: R,
    buf: [u8; PACKET_LEN],
}

impl<R: AsyncRead + Unpin> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: [0u8; PACKET_LEN],
        }
    }
}

impl<R: AsyncRead + Unpin> PacketSource for StreamSource<R> {
    type Error = io::Error;

    async fn recv(&mut self) -> Result<Option<Bytes>, Self::Error> {
        let mut filled = 0;
        while filled < PACKET_LEN {
            let n = self.reader.read(&mut self.buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended inside a frame ({filled} of {PACKET_LEN} bytes)"),
                ));
            }
            filled += n;
        }
        Ok(Some(Bytes::copy_from_slice(&self.buf)))
    }
}
