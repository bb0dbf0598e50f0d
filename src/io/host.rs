// Numan Thabit 2025
// io/host.rs - forwarding stream towards the host process
use std::{fmt, io};

use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::gateway::{Rejection, Verdict};
use crate::wire::{format_decimal, TelemetryPacket};

/// What the host stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Framed binary records for accepted packets only.
    #[default]
    Binary,
    /// Human-readable trace of accepted and rejected packets.
    Diagnostic,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Binary => f.write_str("binary"),
            OutputMode::Diagnostic => f.write_str("diagnostic"),
        }
    }
}

/// Writes verdicts to the host byte stream.
///
/// Every write is flushed before returning; back-pressure from the host is
/// absorbed by blocking the loop.
#[derive(Debug)]
pub struct HostSink<W> {
    writer: W,
    mode: OutputMode,
}

impl<W: AsyncWrite + Unpin> HostSink<W> {
    pub fn new(writer: W, mode: OutputMode) -> Self {
        Self { writer, mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Emits whatever the current mode prescribes for `verdict`; returns the
    /// number of bytes written.
    pub async fn emit(&mut self, verdict: &Verdict) -> io::Result<usize> {
        let bytes = match self.mode {
            OutputMode::Binary => match verdict {
                Verdict::Forwarded { record, .. } => record.encode(),
                Verdict::Rejected { .. } => return Ok(0),
            },
            OutputMode::Diagnostic => match render_diagnostic(verdict) {
                Some(text) => text.into_bytes(),
                None => return Ok(0),
            },
        };

        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(bytes.len())
    }
}

/// Text trace for a verdict; frames that never decoded produce nothing.
pub fn render_diagnostic(verdict: &Verdict) -> Option<String> {
    match verdict {
        Verdict::Forwarded { packet, .. } => Some(format!(
            "Start\r\nSourceId:{}\r\npacketNumber:{}\r\ncommandType:{}\r\nData:{}\r\nEnd\r\n\r\n",
            packet.source_id,
            packet.sequence,
            packet.command,
            format_decimal(packet.payload)
        )),
        Verdict::Rejected {
            packet: Some(packet),
            reason,
        } => {
            let heading = match reason {
                Rejection::Authentication => "Wrong packet HMAC:",
                Rejection::ReplayOrReorder { .. } | Rejection::StoreFull { .. } => {
                    "Wrong packet Number:"
                }
                Rejection::MalformedFrame(_) => return None,
            };
            Some(rejection_block(heading, packet))
        }
        Verdict::Rejected { packet: None, .. } => None,
    }
}

fn rejection_block(heading: &str, packet: &TelemetryPacket) -> String {
    format!(
        "{heading}\r\n{}\r\n{}\r\n\r\n",
        packet.source_id, packet.sequence
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ForwardRecord, WireError};

    fn forwarded() -> Verdict {
        let packet = TelemetryPacket::new(42, 1, 5, 3.14);
        Verdict::Forwarded {
            packet,
            record: ForwardRecord::from_packet(&packet),
        }
    }

    #[tokio::test]
    async fn binary_mode_writes_records_only() {
        let mut sink = HostSink::new(Vec::new(), OutputMode::Binary);
        let written = sink.emit(&forwarded()).await.unwrap();
        assert_eq!(written, 13);

        let rejected = Verdict::Rejected {
            packet: Some(TelemetryPacket::new(42, 1, 5, 3.14)),
            reason: Rejection::Authentication,
        };
        assert_eq!(sink.emit(&rejected).await.unwrap(), 0);

        let out = sink.into_inner();
        assert_eq!(&out[..3], &[0, 0, 0]);
        assert_eq!(&out[out.len() - 3..], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(out.len(), 13);
    }

    #[tokio::test]
    async fn diagnostic_mode_traces_every_decoded_packet() {
        let mut sink = HostSink::new(Vec::new(), OutputMode::Diagnostic);
        sink.emit(&forwarded()).await.unwrap();
        sink.emit(&Verdict::Rejected {
            packet: Some(TelemetryPacket::new(42, 1, 5, 3.14)),
            reason: Rejection::ReplayOrReorder { last_seen: 1 },
        })
        .await
        .unwrap();
        sink.emit(&Verdict::Rejected {
            packet: Some(TelemetryPacket::new(42, 2, 5, 3.14)),
            reason: Rejection::Authentication,
        })
        .await
        .unwrap();
        let malformed = Verdict::Rejected {
            packet: None,
            reason: Rejection::MalformedFrame(WireError::InvalidLength {
                expected: 26,
                actual: 3,
            }),
        };
        assert_eq!(sink.emit(&malformed).await.unwrap(), 0);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "Start\r\nSourceId:42\r\npacketNumber:1\r\ncommandType:5\r\nData:3.14\r\nEnd\r\n\r\n\
             Wrong packet Number:\r\n42\r\n1\r\n\r\n\
             Wrong packet HMAC:\r\n42\r\n2\r\n\r\n"
        );
    }
}
