// Numan Thabit 2025
// metrics.rs - Prometheus counters for gateway outcomes
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics text is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    pub frames_received: IntCounter,
    pub frames_malformed: IntCounter,
    pub packets_forwarded: IntCounter,
    pub auth_failures: IntCounter,
    pub replay_rejects: IntCounter,
    pub store_full_rejects: IntCounter,
    pub forward_bytes_total: IntCounter,
    pub known_sources: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some("rfgate".into()), None)?;

        macro_rules! register_counter {
            ($name:expr, $help:expr) => {{
                let counter = IntCounter::new($name, $help)?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        macro_rules! register_gauge {
            ($name:expr, $help:expr) => {{
                let gauge = IntGauge::new($name, $help)?;
                registry.register(Box::new(gauge.clone()))?;
                gauge
            }};
        }

        let frames_received =
            register_counter!("frames_received", "Raw frames handed over by the transport");
        let frames_malformed =
            register_counter!("frames_malformed", "Frames dropped for an invalid layout");
        let packets_forwarded =
            register_counter!("packets_forwarded", "Packets forwarded to the host stream");
        let auth_failures = register_counter!("auth_failures", "Packet tag mismatches");
        let replay_rejects =
            register_counter!("replay_rejects", "Packets with a stale sequence number");
        let store_full_rejects = register_counter!(
            "store_full_rejects",
            "Packets from unseen sources refused by a full replay store"
        );
        let forward_bytes_total = register_counter!(
            "forward_bytes_total",
            "Binary forwarding record bytes written to the host stream"
        );
        let known_sources = register_gauge!("known_sources", "Sources tracked by the replay guard");

        Ok(Self {
            registry,
            frames_received,
            frames_malformed,
            packets_forwarded,
            auth_failures,
            replay_rejects,
            store_full_rejects,
            forward_bytes_total,
            known_sources,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
