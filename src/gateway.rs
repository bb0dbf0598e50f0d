//! Packet acceptance engine and the receive loop that drives it.
//!
//! Every raw frame walks the same path: decode, tag verification, replay
//! check, forward. A frame ends in exactly one [`Verdict`]; rejected frames
//! never touch the host stream in binary mode and never mutate replay state
//! unless they were authentic.

use std::{error::Error as StdError, future::Future, pin::pin};

use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use crate::{
    crypto::{key::SecretKey, tag},
    io::{
        host::{HostSink, OutputMode},
        PacketSource,
    },
    metrics::Metrics,
    replay::{Admission, ReplayGuard},
    status::StatusIndicator,
    wire::{ForwardRecord, TelemetryPacket, WireError},
};

/// Reason a frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// At least one checked tag byte differed.
    #[error("authentication failure")]
    Authentication,
    /// Sequence number not greater than the last accepted one for the source.
    #[error("replay or reorder (last accepted sequence {last_seen})")]
    ReplayOrReorder { last_seen: u32 },
    /// Unseen source while the replay store is at capacity.
    #[error("replay store full ({capacity} sources)")]
    StoreFull { capacity: usize },
    /// Frame did not match the packet layout.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] WireError),
}

/// Terminal outcome for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Authentic and fresh; `record` goes to the host stream.
    Forwarded {
        packet: TelemetryPacket,
        record: ForwardRecord,
    },
    /// Dropped. `packet` is `None` only for frames that failed to decode.
    Rejected {
        packet: Option<TelemetryPacket>,
        reason: Rejection,
    },
}

impl Verdict {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Verdict::Forwarded { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Forwarded { .. } => None,
            Verdict::Rejected { reason, .. } => Some(reason),
        }
    }

    fn rejected(packet: &TelemetryPacket, reason: Rejection) -> Self {
        Verdict::Rejected {
            packet: Some(*packet),
            reason,
        }
    }
}

/// Errors that stop the receive loop.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("packet source failed: {0}")]
    Source(#[source] Box<dyn StdError + Send + Sync>),
    #[error("host stream write failed: {0}")]
    Host(#[from] std::io::Error),
}

/// Per-run tallies returned when the source closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub forwarded: u64,
    pub auth_rejected: u64,
    pub replay_rejected: u64,
    pub malformed: u64,
}

impl RunSummary {
    fn record(&mut self, verdict: &Verdict) {
        match verdict.rejection() {
            None => self.forwarded += 1,
            Some(Rejection::Authentication) => self.auth_rejected += 1,
            Some(Rejection::ReplayOrReorder { .. }) | Some(Rejection::StoreFull { .. }) => {
                self.replay_rejected += 1
            }
            Some(Rejection::MalformedFrame(_)) => self.malformed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.forwarded + self.auth_rejected + self.replay_rejected + self.malformed
    }
}

/// Owns the key and the replay store; sequences verification and admission.
#[derive(Debug)]
pub struct Gateway {
    key: SecretKey,
    replay: ReplayGuard,
    metrics: Metrics,
}

impl Gateway {
    pub fn new(key: SecretKey, max_sources: usize, metrics: Metrics) -> Self {
        Self {
            key,
            replay: ReplayGuard::new(max_sources),
            metrics,
        }
    }

    pub fn replay(&self) -> &ReplayGuard {
        &self.replay
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Decodes a raw transport frame and runs it through [`Gateway::process`].
    pub fn process_frame(&mut self, frame: &[u8]) -> Verdict {
        self.metrics.frames_received.inc();
        match TelemetryPacket::decode(frame) {
            Ok(packet) => self.process(&packet),
            Err(err) => {
                self.metrics.frames_malformed.inc();
                warn!(len = frame.len(), %err, "dropping malformed frame");
                Verdict::Rejected {
                    packet: None,
                    reason: Rejection::MalformedFrame(err),
                }
            }
        }
    }

    /// Decides the fate of a decoded packet.
    ///
    /// The replay store is consulted only after the tag checks out, so forged
    /// packets cannot advance or create a baseline.
    pub fn process(&mut self, packet: &TelemetryPacket) -> Verdict {
        if !tag::verify(&self.key, packet) {
            self.metrics.auth_failures.inc();
            debug!(
                source = packet.source_id,
                seq = packet.sequence,
                "tag mismatch"
            );
            return Verdict::rejected(packet, Rejection::Authentication);
        }

        match self.replay.check_and_update(packet.source_id, packet.sequence) {
            Admission::FirstSeen => {
                self.metrics.known_sources.set(self.replay.len() as i64);
                info!(
                    source = packet.source_id,
                    seq = packet.sequence,
                    known = self.replay.len(),
                    "tracking new source"
                );
            }
            Admission::Advanced { .. } => {}
            Admission::Stale { last_seen } => {
                self.metrics.replay_rejects.inc();
                debug!(
                    source = packet.source_id,
                    seq = packet.sequence,
                    last_seen,
                    "stale sequence"
                );
                return Verdict::rejected(packet, Rejection::ReplayOrReorder { last_seen });
            }
            Admission::StoreFull { capacity } => {
                self.metrics.store_full_rejects.inc();
                warn!(
                    source = packet.source_id,
                    capacity, "replay store full; refusing unseen source"
                );
                return Verdict::rejected(packet, Rejection::StoreFull { capacity });
            }
        }

        self.metrics.packets_forwarded.inc();
        debug!(
            source = packet.source_id,
            seq = packet.sequence,
            command = packet.command,
            "forwarding packet"
        );
        Verdict::Forwarded {
            packet: *packet,
            record: ForwardRecord::from_packet(packet),
        }
    }

    /// Receives frames until the source closes or `shutdown` resolves,
    /// writing verdicts to `sink`.
    ///
    /// `shutdown` is only raced against the receive. Once a frame is in hand
    /// it is processed, written and signalled before the loop looks again, so
    /// the host stream never ends inside a record.
    pub async fn run<S, W, I, F>(
        &mut self,
        source: &mut S,
        sink: &mut HostSink<W>,
        indicator: &mut I,
        shutdown: F,
    ) -> Result<RunSummary, GatewayError>
    where
        S: PacketSource,
        W: AsyncWrite + Unpin,
        I: StatusIndicator,
        F: Future<Output = ()>,
    {
        indicator.ready();
        info!(
            capacity = self.replay.capacity(),
            mode = %sink.mode(),
            "gateway ready"
        );

        let mut shutdown = pin!(shutdown);
        let mut summary = RunSummary::default();
        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested; leaving receive loop");
                    break;
                }
                received = source.recv() => received,
            };
            let Some(frame) = received.map_err(|err| GatewayError::Source(Box::new(err)))? else {
                info!("packet source closed");
                break;
            };

            let verdict = self.process_frame(&frame);
            summary.record(&verdict);

            match verdict.rejection() {
                None => {
                    indicator.forwarding();
                    let written = sink.emit(&verdict).await?;
                    if sink.mode() == OutputMode::Binary {
                        self.metrics.forward_bytes_total.inc_by(written as u64);
                    }
                    indicator.forwarded();
                }
                Some(reason) => {
                    sink.emit(&verdict).await?;
                    indicator.rejected(reason);
                }
            }
        }

        info!(
            forwarded = summary.forwarded,
            auth_rejected = summary.auth_rejected,
            replay_rejected = summary.replay_rejected,
            malformed = summary.malformed,
            "receive loop finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::key::SECRET_LEN,
        io::ChannelSource,
        status::NullIndicator,
        wire::TAG_FRAGMENT_COUNT,
    };
    use bytes::Bytes;
    use std::{
        future::{pending, ready, Future},
        io,
        pin::Pin,
        task::{ready as poll_ready, Context, Poll},
        time::Duration,
    };
    use tokio::{
        io::AsyncWrite,
        sync::mpsc,
        time::{sleep, Instant, Sleep},
    };

    fn key() -> SecretKey {
        SecretKey::new(*b"test-secret-0123456789abcdefghij")
    }

    fn gateway(capacity: usize) -> Gateway {
        Gateway::new(key(), capacity, Metrics::new().expect("metrics"))
    }

    fn signed(source_id: u32, sequence: u32, command: u8, payload: f32) -> TelemetryPacket {
        let mut packet = TelemetryPacket::new(source_id, sequence, command, payload);
        tag::sign(&key(), &mut packet);
        packet
    }

    fn reference_record() -> Vec<u8> {
        let mut expected = vec![0x00, 0x00, 0x00, 0x2A, 0x00, 0x05];
        expected.extend_from_slice(b"3.14");
        expected.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        expected
    }

    #[test]
    fn reference_scenario() {
        let mut gw = gateway(16);
        let frame = signed(42, 1, 5, 3.14).encode();

        match gw.process_frame(&frame) {
            Verdict::Forwarded { record, .. } => assert_eq!(record.encode(), reference_record()),
            other => panic!("expected forward, got {other:?}"),
        }

        let replayed = gw.process_frame(&frame);
        assert_eq!(
            replayed.rejection(),
            Some(&Rejection::ReplayOrReorder { last_seen: 1 })
        );

        let mut corrupted = signed(42, 2, 5, 3.14);
        corrupted.tag_fragments[4] ^= 0x80;
        let verdict = gw.process_frame(&corrupted.encode());
        assert_eq!(verdict.rejection(), Some(&Rejection::Authentication));
        assert_eq!(gw.replay().last_sequence(42), Some(1));
    }

    #[test]
    fn forged_packets_do_not_touch_replay_state() {
        let mut gw = gateway(16);
        let mut forged = TelemetryPacket::new(9, 1000, 1, 1.0);
        forged.tag_fragments = [0xAA; TAG_FRAGMENT_COUNT];
        assert_eq!(
            gw.process(&forged).rejection(),
            Some(&Rejection::Authentication)
        );
        assert!(gw.replay().is_empty());

        assert!(gw.process(&signed(9, 1, 1, 1.0)).is_forwarded());
    }

    #[test]
    fn new_source_with_sequence_zero_is_admitted_once() {
        let mut gw = gateway(16);
        assert!(gw.process(&signed(77, 0, 3, 0.5)).is_forwarded());
        assert_eq!(gw.replay().len(), 1);
        assert_eq!(gw.replay().last_sequence(77), Some(0));
        assert!(!gw.process(&signed(77, 0, 3, 0.5)).is_forwarded());
        assert_eq!(gw.replay().len(), 1);
    }

    #[test]
    fn replay_check_applies_to_authentic_packets_only() {
        let mut gw = gateway(16);
        assert!(gw.process(&signed(5, 10, 1, 2.0)).is_forwarded());

        let mut stale_forged = signed(5, 3, 1, 2.0);
        stale_forged.tag_fragments[0] ^= 1;
        assert_eq!(
            gw.process(&stale_forged).rejection(),
            Some(&Rejection::Authentication)
        );
        assert_eq!(
            gw.process(&signed(5, 3, 1, 2.0)).rejection(),
            Some(&Rejection::ReplayOrReorder { last_seen: 10 })
        );
    }

    #[test]
    fn wrong_key_sender_is_rejected() {
        let mut gw = gateway(16);
        let mut packet = TelemetryPacket::new(1, 1, 1, 1.0);
        tag::sign(&SecretKey::new([0x33; SECRET_LEN]), &mut packet);
        assert_eq!(
            gw.process(&packet).rejection(),
            Some(&Rejection::Authentication)
        );
    }

    #[test]
    fn full_store_rejects_unseen_source() {
        let mut gw = gateway(1);
        assert!(gw.process(&signed(1, 1, 1, 1.0)).is_forwarded());
        assert_eq!(
            gw.process(&signed(2, 1, 1, 1.0)).rejection(),
            Some(&Rejection::StoreFull { capacity: 1 })
        );
        assert!(gw.process(&signed(1, 2, 1, 1.0)).is_forwarded());
        assert_eq!(gw.metrics().store_full_rejects.get(), 1);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut gw = gateway(4);
        let verdict = gw.process_frame(&[0u8; 10]);
        assert!(matches!(
            verdict,
            Verdict::Rejected {
                packet: None,
                reason: Rejection::MalformedFrame(_)
            }
        ));
        assert_eq!(gw.metrics().frames_malformed.get(), 1);
        assert!(gw.replay().is_empty());
    }

    #[tokio::test]
    async fn run_forwards_accepted_packets_to_host() {
        let (tx, rx) = mpsc::channel(8);
        let frame = Bytes::copy_from_slice(&signed(42, 1, 5, 3.14).encode());
        tx.send(frame.clone()).await.unwrap();
        tx.send(frame).await.unwrap();
        tx.send(Bytes::from_static(b"short")).await.unwrap();
        let mut bad = signed(42, 2, 5, 3.14);
        bad.tag_fragments[12] ^= 0xFF;
        tx.send(Bytes::copy_from_slice(&bad.encode())).await.unwrap();
        drop(tx);

        let mut source = ChannelSource::new(rx);
        let mut sink = HostSink::new(Vec::new(), OutputMode::Binary);
        let mut gw = gateway(16);
        let summary = gw
            .run(&mut source, &mut sink, &mut NullIndicator, pending())
            .await
            .expect("run");

        assert_eq!(
            summary,
            RunSummary {
                forwarded: 1,
                auth_rejected: 1,
                replay_rejected: 1,
                malformed: 1,
            }
        );
        assert_eq!(summary.total(), 4);
        assert_eq!(sink.into_inner(), reference_record());
        assert_eq!(
            gw.metrics().forward_bytes_total.get(),
            reference_record().len() as u64
        );
    }

    const CHUNK_DELAY: Duration = Duration::from_millis(20);

    /// Host stream that takes at most four bytes per write, each after a delay.
    struct SlowHost {
        written: Vec<u8>,
        delay: Pin<Box<Sleep>>,
    }

    impl SlowHost {
        fn new() -> Self {
            Self {
                written: Vec::new(),
                delay: Box::pin(sleep(CHUNK_DELAY)),
            }
        }
    }

    impl AsyncWrite for SlowHost {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            poll_ready!(this.delay.as_mut().poll(cx));
            let n = buf.len().min(4);
            this.written.extend_from_slice(&buf[..n]);
            this.delay.as_mut().reset(Instant::now() + CHUNK_DELAY);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[derive(Default)]
    struct RecordingIndicator {
        events: Vec<&'static str>,
    }

    impl StatusIndicator for RecordingIndicator {
        fn ready(&mut self) {
            self.events.push("ready");
        }

        fn forwarding(&mut self) {
            self.events.push("forwarding");
        }

        fn forwarded(&mut self) {
            self.events.push("forwarded");
        }

        fn rejected(&mut self, _reason: &Rejection) {
            self.events.push("rejected");
        }
    }

    #[tokio::test]
    async fn shutdown_during_write_finishes_the_record() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::copy_from_slice(&signed(42, 1, 5, 3.14).encode()))
            .await
            .unwrap();

        let mut source = ChannelSource::new(rx);
        let mut sink = HostSink::new(SlowHost::new(), OutputMode::Binary);
        let mut gw = gateway(16);
        // fires while the 13-byte record is still trickling out
        let summary = gw
            .run(
                &mut source,
                &mut sink,
                &mut NullIndicator,
                sleep(CHUNK_DELAY + CHUNK_DELAY / 2),
            )
            .await
            .expect("run");

        assert_eq!(summary.forwarded, 1);
        assert_eq!(sink.into_inner().written, reference_record());
        assert_eq!(gw.replay().last_sequence(42), Some(1));
        drop(tx);
    }

    #[tokio::test]
    async fn shutdown_while_idle_stops_the_loop() {
        let (_tx, rx) = mpsc::channel::<Bytes>(1);
        let mut source = ChannelSource::new(rx);
        let mut sink = HostSink::new(Vec::new(), OutputMode::Binary);
        let mut gw = gateway(16);

        let summary = gw
            .run(&mut source, &mut sink, &mut NullIndicator, ready(()))
            .await
            .expect("run");
        assert_eq!(summary.total(), 0);
        assert!(sink.into_inner().is_empty());
    }

    #[tokio::test]
    async fn indicator_brackets_the_forwarding_write() {
        let (tx, rx) = mpsc::channel(4);
        let frame = Bytes::copy_from_slice(&signed(7, 1, 2, 1.0).encode());
        tx.send(frame.clone()).await.unwrap();
        tx.send(frame).await.unwrap();
        drop(tx);

        let mut indicator = RecordingIndicator::default();
        let mut sink = HostSink::new(Vec::new(), OutputMode::Binary);
        gateway(16)
            .run(&mut ChannelSource::new(rx), &mut sink, &mut indicator, pending())
            .await
            .expect("run");

        assert_eq!(
            indicator.events,
            ["ready", "forwarding", "forwarded", "rejected"]
        );
    }

    #[tokio::test]
    async fn diagnostic_text_is_not_counted_as_forwarded_bytes() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::copy_from_slice(&signed(42, 1, 5, 3.14).encode()))
            .await
            .unwrap();
        drop(tx);

        let mut sink = HostSink::new(Vec::new(), OutputMode::Diagnostic);
        let mut gw = gateway(16);
        gw.run(&mut ChannelSource::new(rx), &mut sink, &mut NullIndicator, pending())
            .await
            .expect("run");

        assert!(!sink.into_inner().is_empty());
        assert_eq!(gw.metrics().packets_forwarded.get(), 1);
        assert_eq!(gw.metrics().forward_bytes_total.get(), 0);
    }
}
