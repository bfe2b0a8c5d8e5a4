//! Replays a congestion scenario against the conditioner.
//!
//! By default ticks run in simulated time, so a ten-minute scenario finishes
//! instantly. `--realtime` runs the same scenario through the supervisor's
//! own timer.
//!
//! Built only with the `sim` feature:
//! `cargo run --features sim --bin conditioner-sim -- --protocol srt`

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use stream_conditioner::{
    format_bandwidth, CameraCapabilities, ConditionerConfig, ConditionerState,
    ConditionerSupervisor, ConnectionId, ConnectionStats, Decision, FpsRange, Transport,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "conditioner-sim")]
#[command(about = "Simulate adaptive bitrate decisions under scripted congestion")]
#[command(version)]
struct Args {
    /// Path to a conditioner TOML config (defaults if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Full target bitrate in bits/sec
    #[arg(short, long, default_value_t = 3_000_000)]
    bitrate: u32,

    /// Scenario length in seconds
    #[arg(short, long, default_value_t = 300)]
    duration: u64,

    /// Congestion begins at this second
    #[arg(long, default_value_t = 30)]
    congestion_start: u64,

    /// Congestion ends at this second
    #[arg(long, default_value_t = 60)]
    congestion_end: u64,

    /// Lost units per second while congested
    #[arg(long, default_value_t = 5.0)]
    loss_rate: f64,

    /// Stats family the simulated connection reports
    #[arg(long, value_enum, default_value_t = Protocol::Tcp)]
    protocol: Protocol,

    /// Use the supervisor timer and wall-clock time
    #[arg(long)]
    realtime: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Protocol {
    Tcp,
    Srt,
    Rist,
}

const CONNECTION: ConnectionId = ConnectionId(1);

#[derive(Debug, Default)]
struct LinkState {
    elapsed: Duration,
    bitrate: u32,
    bytes_sent: f64,
    lost: f64,
}

/// In-memory link whose loss follows the scripted congestion window
struct SimTransport {
    protocol: Protocol,
    congestion: std::ops::Range<Duration>,
    loss_rate: f64,
    link: Mutex<LinkState>,
}

impl SimTransport {
    fn new(args: &Args) -> Self {
        Self {
            protocol: args.protocol,
            congestion: Duration::from_secs(args.congestion_start)
                ..Duration::from_secs(args.congestion_end),
            loss_rate: args.loss_rate,
            link: Mutex::new(LinkState::default()),
        }
    }

    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the link clock forward, accumulating traffic and loss
    fn advance_to(&self, now: Duration) {
        let mut link = self.link();
        let dt = now.saturating_sub(link.elapsed).as_secs_f64();
        link.bytes_sent += link.bitrate as f64 / 8.0 * dt;
        if self.congestion.contains(&now) {
            link.lost += self.loss_rate * dt;
        }
        link.elapsed = now;
    }
}

impl Transport for SimTransport {
    fn connection_stats(&self, id: ConnectionId) -> Option<ConnectionStats> {
        if id != CONNECTION {
            return None;
        }
        let link = self.link();
        let lost = link.lost as u64;
        let bytes = link.bytes_sent as u64;
        let stats = match self.protocol {
            Protocol::Tcp => ConnectionStats::Tcp {
                audio_frames_skipped: 0,
                video_frames_skipped: lost,
                bytes_sent: bytes,
            },
            Protocol::Srt => ConnectionStats::Srt {
                pkt_snd_drop: lost,
                byte_sent_unique: bytes,
                pkt_sent_unique: bytes / 1_316,
                mbps_bandwidth: link.bitrate as f64 / 1_000_000.0,
            },
            Protocol::Rist => {
                let congested = self.congestion.contains(&link.elapsed);
                ConnectionStats::Rist {
                    quality: if congested { 90.0 - self.loss_rate } else { 100.0 },
                    sent: bytes / 1_316,
                }
            }
        };
        Some(stats)
    }

    fn change_bitrate(&self, bits_per_second: u32) {
        let mut link = self.link();
        tracing::info!(
            at = ?link.elapsed,
            bitrate = %format_bandwidth(bits_per_second as f64),
            "Encoder bitrate"
        );
        link.bitrate = bits_per_second;
    }

    fn change_fps_range(&self, range: FpsRange) {
        tracing::info!(min = range.min, max = range.max, "Camera fps range");
    }
}

fn camera() -> CameraCapabilities {
    CameraCapabilities::new(
        30.0,
        vec![
            FpsRange::new(15, 15),
            FpsRange::new(20, 20),
            FpsRange::new(24, 24),
            FpsRange::new(25, 25),
            FpsRange::new(30, 30),
        ],
    )
}

/// Ticks in simulated time straight through the session state
fn run_simulated(args: &Args, config: &ConditionerConfig, transport: &SimTransport) {
    let mut state = ConditionerState::new(config, camera(), args.bitrate, Duration::ZERO);
    let initial = state.current_bitrate();
    transport.change_bitrate(initial);
    state.add_connection(CONNECTION, Duration::ZERO, transport);

    let end = Duration::from_secs(args.duration);
    let mut now = config.tick_delay();
    let (mut downs, mut ups) = (0u32, 0u32);
    while now <= end {
        transport.advance_to(now);
        match state.tick(now, transport) {
            Decision::StepDown { .. } => downs += 1,
            Decision::StepUp { .. } => ups += 1,
            Decision::Hold => {}
        }
        now += config.tick_interval();
    }

    state.restore_full_fps(transport);
    let snapshot = state.snapshot(false);
    for report in &snapshot.connections {
        tracing::info!("{}", report);
    }
    tracing::info!(
        steps_down = downs,
        steps_up = ups,
        final_bitrate = snapshot.bitrate,
        ladder_index = snapshot.ladder_index,
        "Simulation finished"
    );
}

/// Runs the supervisor on its own timer while this task advances the link clock
async fn run_realtime(
    args: &Args,
    config: ConditionerConfig,
    transport: Arc<SimTransport>,
) -> Result<()> {
    let supervisor = ConditionerSupervisor::new(config, camera(), transport.clone())?;
    supervisor.start(args.bitrate).await?;
    supervisor.add_connection(CONNECTION).await;

    let started = tokio::time::Instant::now();
    let end = Duration::from_secs(args.duration);
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    while started.elapsed() < end {
        ticker.tick().await;
        transport.advance_to(started.elapsed());
    }

    if let Some(snapshot) = supervisor.snapshot().await {
        tracing::info!(
            final_bitrate = snapshot.bitrate,
            ladder_index = snapshot.ladder_index,
            fps = snapshot.fps,
            "Realtime run finished"
        );
    }
    supervisor.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConditionerConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConditionerConfig::default(),
    };

    let transport = Arc::new(SimTransport::new(&args));
    if args.realtime {
        run_realtime(&args, config, transport).await
    } else {
        run_simulated(&args, &config, &transport);
        Ok(())
    }
}
