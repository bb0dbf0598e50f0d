// rfgate authenticated telemetry gateway public library surface.
// Numan Thabit 2025

pub mod config;

pub mod crypto;

pub mod wire;

pub mod replay;

pub mod gateway;

pub mod io;

pub mod status;

pub mod metrics;

pub use config::{Config, ConfigError, InputKind, OutputKind};

pub use crypto::{
    key::{KeyError, SecretKey, SECRET_LEN},
    tag::{CHECKED_TAG_POSITIONS, TAG_LEN},
};

pub use wire::{
    format_decimal, ForwardRecord, TelemetryPacket, WireError, PACKET_LEN, TAG_FRAGMENT_COUNT,
};

pub use replay::{Admission, ReplayGuard, DEFAULT_MAX_SOURCES};

pub use gateway::{Gateway, GatewayError, Rejection, RunSummary, Verdict};

pub use io::{ChannelSource, HostSink, OutputMode, PacketSource, StreamSource, UdpSource};

pub use status::{NullIndicator, StatusIndicator, TracingIndicator};

pub use metrics::{Metrics, MetricsError};
