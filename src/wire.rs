// Wire format primitives: telemetry packet layout, forwarding record, decimal text.
// Numan Thabit 2025

use std::fmt::Write as _;

use thiserror::Error;

/// Number of tag bytes carried on the wire.
pub const TAG_FRAGMENT_COUNT: usize = 13;

/// Length of a raw telemetry packet in bytes.
pub const PACKET_LEN: usize = 4 + 4 + 1 + 4 + TAG_FRAGMENT_COUNT;

/// Marker written before every forwarding record.
pub const FRAME_START: [u8; 3] = [0x00, 0x00, 0x00];

/// Marker written after every forwarding record.
pub const FRAME_END: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Fractional digits used when rendering the payload as text.
pub const DECIMAL_DIGITS: u8 = 2;

const SOURCE_ID_RANGE: std::ops::Range<usize> = 0..4;
const SEQUENCE_RANGE: std::ops::Range<usize> = 4..8;
const COMMAND_OFFSET: usize = 8;
const PAYLOAD_RANGE: std::ops::Range<usize> = 9..13;
const FRAGMENTS_RANGE: std::ops::Range<usize> = 13..PACKET_LEN;

// Largest magnitude the two-digit renderer accepts before reporting overflow.
const RENDER_LIMIT: f32 = 4_294_967_040.0;

/// Wire-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer length does not match the fixed packet layout.
    #[error("invalid packet length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Telemetry packet as carried over the radio link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPacket {
    /// Identifier of the sending device.
    pub source_id: u32,
    /// Per-source counter used for replay detection.
    pub sequence: u32,
    /// Opaque command code.
    pub command: u8,
    /// Opaque measurement value.
    pub payload: f32,
    /// Checked tag bytes, in ascending tag position order.
    pub tag_fragments: [u8; TAG_FRAGMENT_COUNT],
}

impl TelemetryPacket {
    /// Creates an unsigned packet (all tag fragments zero).
    pub fn new(source_id: u32, sequence: u32, command: u8, payload: f32) -> Self {
        Self {
            source_id,
            sequence,
            command,
            payload,
            tag_fragments: [0u8; TAG_FRAGMENT_COUNT],
        }
    }

    /// Parses a packet from a raw transport buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != PACKET_LEN {
            return Err(WireError::InvalidLength {
                expected: PACKET_LEN,
                actual: bytes.len(),
            });
        }

        let source_id = u32::from_le_bytes(bytes[SOURCE_ID_RANGE].try_into().unwrap());
        let sequence = u32::from_le_bytes(bytes[SEQUENCE_RANGE].try_into().unwrap());
        let command = bytes[COMMAND_OFFSET];
        let payload = f32::from_le_bytes(bytes[PAYLOAD_RANGE].try_into().unwrap());
        let mut tag_fragments = [0u8; TAG_FRAGMENT_COUNT];
        tag_fragments.copy_from_slice(&bytes[FRAGMENTS_RANGE]);

        Ok(Self {
            source_id,
            sequence,
            command,
            payload,
            tag_fragments,
        })
    }

    /// Encodes the packet into its wire layout.
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[SOURCE_ID_RANGE].copy_from_slice(&self.source_id.to_le_bytes());
        buf[SEQUENCE_RANGE].copy_from_slice(&self.sequence.to_le_bytes());
        buf[COMMAND_OFFSET] = self.command;
        buf[PAYLOAD_RANGE].copy_from_slice(&self.payload.to_le_bytes());
        buf[FRAGMENTS_RANGE].copy_from_slice(&self.tag_fragments);
        buf
    }

    /// Builds the text the integrity tag is computed over.
    ///
    /// The fields are rendered in decimal and concatenated without separators,
    /// so `(42, 1, 5, 3.14)` becomes `"42153.14"`. Senders hash the same text,
    /// which makes the rendering part of the wire contract.
    pub fn auth_message(&self) -> String {
        let mut message = String::with_capacity(32);
        // Writing into a String cannot fail.
        let _ = write!(
            message,
            "{}{}{}{}",
            self.source_id,
            self.sequence,
            self.command,
            format_decimal(self.payload)
        );
        message
    }
}

/// Record emitted on the host stream for every accepted packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRecord {
    /// Low 16 bits of the source identifier; the upper half is not forwarded.
    pub source_id: u16,
    /// Command code copied from the packet.
    pub command: u8,
    /// Payload rendered as decimal text.
    pub payload_text: String,
}

impl ForwardRecord {
    /// Builds the forwarding record for an accepted packet.
    pub fn from_packet(packet: &TelemetryPacket) -> Self {
        Self {
            source_id: (packet.source_id & 0xFFFF) as u16,
            command: packet.command,
            payload_text: format_decimal(packet.payload),
        }
    }

    /// Total number of bytes [`ForwardRecord::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        FRAME_START.len() + 3 + self.payload_text.len() + FRAME_END.len()
    }

    /// Serialises the record: start marker, source id (LE, 16 bits), command,
    /// payload text, end marker.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&FRAME_START);
        out.extend_from_slice(&self.source_id.to_le_bytes());
        out.push(self.command);
        out.extend_from_slice(self.payload_text.as_bytes());
        out.extend_from_slice(&FRAME_END);
        out
    }
}

/// Renders a payload value with two fractional digits.
///
/// Arithmetic runs in single precision and follows the sender's renderer:
/// round half-up at the last digit, truncate the integer part, then emit the
/// fraction digit by digit. Non-finite and out-of-range values render as
/// `nan`, `inf` and `ovf`.
pub fn format_decimal(value: f32) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return "inf".to_owned();
    }
    if value > RENDER_LIMIT || value < -RENDER_LIMIT {
        return "ovf".to_owned();
    }

    let mut out = String::with_capacity(16);
    let mut number = value;
    if number < 0.0 {
        out.push('-');
        number = -number;
    }

    let mut rounding = 0.5f32;
    for _ in 0..DECIMAL_DIGITS {
        rounding /= 10.0;
    }
    number += rounding;

    let int_part = number as u32;
    let mut remainder = number - int_part as f32;
    let _ = write!(out, "{int_part}");

    if DECIMAL_DIGITS > 0 {
        out.push('.');
    }
    for _ in 0..DECIMAL_DIGITS {
        remainder *= 10.0;
        let digit = remainder as u32;
        let _ = write!(out, "{digit}");
        remainder -= digit as f32;
    }

    out
}
