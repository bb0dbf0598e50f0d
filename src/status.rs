// Numan Thabit 2025
// status.rs - acceptance indicator hooks
use std::time::Duration;

use tracing::{debug, info};

use crate::gateway::Rejection;

/// Blink length used at startup.
pub const SHORT_BLINK: Duration = Duration::from_millis(100);

/// Blink length used on rejection.
pub const LONG_BLINK: Duration = Duration::from_millis(500);

/// Number of short blinks signalling readiness.
pub const READY_BLINKS: u32 = 3;

/// Receives outcome notifications from the gateway loop.
///
/// Implementations must not block; the loop calls them inline.
pub trait StatusIndicator {
    /// The loop is about to wait for its first frame.
    fn ready(&mut self);
    /// An accepted packet is about to be written to the host stream.
    fn forwarding(&mut self);
    /// The forwarding write finished.
    fn forwarded(&mut self);
    /// A frame was dropped.
    fn rejected(&mut self, reason: &Rejection);
}

/// Ignores all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn ready(&mut self) {}

    fn forwarding(&mut self) {}

    fn forwarded(&mut self) {}

    fn rejected(&mut self, _reason: &Rejection) {}
}

/// Reports blink patterns as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingIndicator {
    accepted: u64,
    rejected: u64,
}

impl TracingIndicator {
    pub fn counts(&self) -> (u64, u64) {
        (self.accepted, self.rejected)
    }
}

impl StatusIndicator for TracingIndicator {
    fn ready(&mut self) {
        info!(
            blinks = READY_BLINKS,
            interval_ms = SHORT_BLINK.as_millis() as u64,
            "indicator: ready"
        );
    }

    fn forwarding(&mut self) {
        debug!("indicator: on");
    }

    fn forwarded(&mut self) {
        self.accepted += 1;
        debug!("indicator: off");
    }

    fn rejected(&mut self, reason: &Rejection) {
        self.rejected += 1;
        debug!(
            blink_ms = LONG_BLINK.as_millis() as u64,
            %reason,
            "indicator: rejected"
        );
    }
}
