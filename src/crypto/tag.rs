// Packet tag based on HMAC-SHA1, checked on a fixed subset of tag bytes.
// Numan Thabit 2025

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use super::key::SecretKey;
use crate::wire::{TelemetryPacket, TAG_FRAGMENT_COUNT};

/// Length of the full HMAC-SHA1 tag.
pub const TAG_LEN: usize = 20;

/// Tag byte positions carried on the wire, in transmission order.
///
/// Positions 1, 7, 9, 10, 12, 14 and 16 are never transmitted. Deployed
/// senders depend on this exact set.
pub const CHECKED_TAG_POSITIONS: [usize; TAG_FRAGMENT_COUNT] =
    [0, 2, 3, 4, 5, 6, 8, 11, 13, 15, 17, 18, 19];

type HmacSha1 = Hmac<Sha1>;

fn hmac_sha1(key: &[u8], message: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(message);
    let full_tag = mac.finalize().into_bytes();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&full_tag);
    tag
}

/// Computes the full tag over an arbitrary message.
#[must_use]
pub fn compute(key: &SecretKey, message: &[u8]) -> [u8; TAG_LEN] {
    hmac_sha1(key.as_bytes(), message)
}

/// Computes the full tag over the packet's semantic fields.
#[must_use]
pub fn packet_tag(key: &SecretKey, packet: &TelemetryPacket) -> [u8; TAG_LEN] {
    compute(key, packet.auth_message().as_bytes())
}

/// Extracts the transmitted fragments from a full tag.
#[must_use]
pub fn fragments(tag: &[u8; TAG_LEN]) -> [u8; TAG_FRAGMENT_COUNT] {
    let mut out = [0u8; TAG_FRAGMENT_COUNT];
    for (slot, &position) in out.iter_mut().zip(CHECKED_TAG_POSITIONS.iter()) {
        *slot = tag[position];
    }
    out
}

/// Fills in the packet's tag fragments (sender side).
pub fn sign(key: &SecretKey, packet: &mut TelemetryPacket) {
    packet.tag_fragments = fragments(&packet_tag(key, packet));
}

/// Returns `true` when every transmitted fragment matches the recomputed tag.
///
/// All thirteen bytes are compared in constant time; the result carries no
/// information about how many fragments differed.
#[must_use]
pub fn verify(key: &SecretKey, packet: &TelemetryPacket) -> bool {
    let expected = fragments(&packet_tag(key, packet));
    expected
        .as_slice()
        .ct_eq(packet.tag_fragments.as_slice())
        .into()
}
