// Numan Thabit 2025
// rfgate - receive, verify and forward authenticated telemetry packets
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tokio::io::AsyncWrite;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rfgate::{
    config::{Config, InputKind, OutputKind},
    crypto::tag,
    io::udp::send_frame,
    Gateway, HostSink, Metrics, OutputMode, PacketSource, SecretKey, StreamSource,
    TelemetryPacket, TracingIndicator, UdpSource, TAG_FRAGMENT_COUNT,
};

/// Authenticated telemetry gateway for radio sensor nodes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; falls back to RFGATE_CONFIG, then defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the receive loop until the source closes or Ctrl-C.
    Run {
        /// Write the human-readable trace instead of binary records.
        #[arg(long)]
        diagnostic: bool,
        /// Override the UDP bind address.
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Dump Prometheus metrics to stderr on shutdown.
        #[arg(long)]
        metrics: bool,
    },
    /// Sign and send a single packet over UDP.
    Emit {
        #[arg(long)]
        to: SocketAddr,
        #[arg(long)]
        source_id: u32,
        #[arg(long)]
        seq: u32,
        #[arg(long)]
        command: u8,
        #[arg(long, allow_hyphen_values = true)]
        payload: f32,
        /// Flip every bit of one tag fragment before sending.
        #[arg(long, value_name = "INDEX")]
        corrupt_fragment: Option<usize>,
    },
    /// Print a fresh random secret as hex.
    Keygen,
}

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    // stdout may be the host stream
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_path(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Config::load().context("loading config"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);

    match cli.command {
        Command::Keygen => {
            let key = SecretKey::new(rand::random());
            println!("{}", key.to_hex());
            Ok(())
        }
        Command::Emit {
            to,
            source_id,
            seq,
            command,
            payload,
            corrupt_fragment,
        } => {
            let config = load_config(cli.config)?;
            let key = config.secret().context("resolving secret")?;
            emit(&key, to, source_id, seq, command, payload, corrupt_fragment).await
        }
        Command::Run {
            diagnostic,
            bind,
            metrics,
        } => {
            let mut config = load_config(cli.config)?;
            if diagnostic {
                config.output.mode = OutputMode::Diagnostic;
            }
            if let Some(bind) = bind {
                config.input.bind = bind;
            }
            run(config, metrics).await
        }
    }
}

async fn emit(
    key: &SecretKey,
    to: SocketAddr,
    source_id: u32,
    seq: u32,
    command: u8,
    payload: f32,
    corrupt_fragment: Option<usize>,
) -> Result<()> {
    let mut packet = TelemetryPacket::new(source_id, seq, command, payload);
    tag::sign(key, &mut packet);
    if let Some(index) = corrupt_fragment {
        ensure!(
            index < TAG_FRAGMENT_COUNT,
            "fragment index {index} out of range (0..{TAG_FRAGMENT_COUNT})"
        );
        packet.tag_fragments[index] ^= 0xFF;
    }

    let sent = send_frame(to, &packet.encode())
        .await
        .with_context(|| format!("sending to {to}"))?;
    info!(
        %to,
        source = source_id,
        seq,
        command,
        auth_message = %packet.auth_message(),
        bytes = sent,
        "packet sent"
    );
    Ok(())
}

async fn run(config: Config, dump_metrics: bool) -> Result<()> {
    let key = config.secret().context("resolving secret")?;
    let metrics = Metrics::new().context("registering metrics")?;
    let mut gateway = Gateway::new(key, config.replay.max_sources, metrics.clone());

    let writer: Box<dyn AsyncWrite + Unpin + Send> = match config.output.kind {
        OutputKind::Stdout => Box::new(tokio::io::stdout()),
        OutputKind::File => {
            let path = config
                .output
                .path
                .as_ref()
                .context("output.path is required for file output")?;
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("opening host stream {}", path.display()))?;
            Box::new(file)
        }
    };
    let mut sink = HostSink::new(writer, config.output.mode);

    let outcome = match config.input.kind {
        InputKind::Udp => {
            let mut source = UdpSource::bind(config.input.bind)
                .await
                .with_context(|| format!("binding {}", config.input.bind))?;
            info!(addr = %source.local_addr()?, "listening for frames");
            serve(&mut gateway, &mut source, &mut sink).await
        }
        InputKind::Stdin => {
            info!("reading frames from stdin");
            let mut source = StreamSource::new(tokio::io::stdin());
            serve(&mut gateway, &mut source, &mut sink).await
        }
    };

    if dump_metrics {
        match metrics.render() {
            Ok(text) => eprint!("{text}"),
            Err(err) => warn!(%err, "failed to render metrics"),
        }
    }

    if let Err(err) = &outcome {
        error!(%err, "gateway stopped");
    }
    outcome
}

async fn serve<S, W>(gateway: &mut Gateway, source: &mut S, sink: &mut HostSink<W>) -> Result<()>
where
    S: PacketSource,
    W: AsyncWrite + Unpin,
{
    let mut indicator = TracingIndicator::default();
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("interrupted; shutting down");
    };
    let summary = gateway
        .run(source, sink, &mut indicator, shutdown)
        .await
        .context("receive loop failed")?;
    info!(total = summary.total(), "gateway stopped cleanly");
    Ok(())
}
