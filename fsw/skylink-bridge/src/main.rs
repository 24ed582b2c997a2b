use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use skylink::entity::WaitOutcome;
use skylink::messages::{
    BatteryStatus, FlightMode, FullPose, Heartbeat, MessageId, StatusText, SysStatus,
};
use skylink::protocols::{CommandProtocol, FenceClearProtocol, FenceUploadProtocol};
use skylink::{Entity, Link, PostcardCodec, Transport, UdpTransport, timeout_from_secs};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{Config, TransportConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Skylink Bridge - telemetry monitor and command line for a vehicle link",
    long_about = None
)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "skylink.toml")]
    config: String,

    /// Serial port (selects the serial transport, overrides config)
    #[arg(short, long)]
    serial_port: Option<String>,

    /// UDP bind address (selects the UDP transport, overrides config)
    #[arg(short, long)]
    udp: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print heartbeat, pose and battery state until the duration elapses
    Monitor {
        /// Seconds to run; runs forever when omitted
        #[arg(short, long)]
        duration: Option<f64>,
    },
    Arm,
    Disarm,
    /// Switch flight mode, e.g. GUIDED or LOITER
    Mode { mode: String },
    /// Take off to ALTITUDE metres
    Takeoff { altitude: f32 },
    /// Request MESSAGE (e.g. ATTITUDE_QUATERNION) at HZ; zero disables it
    Interval { message: String, hz: f32 },
    FenceClear,
    /// Upload a fence polygon given as lat,lon pairs in degrees
    FenceUpload {
        #[arg(value_parser = parse_vertex, num_args = 3.., required = true)]
        vertices: Vec<(f64, f64)>,
        /// Keep the vehicle out of the polygon instead of inside it
        #[arg(long)]
        exclusion: bool,
    },
    Reboot,
}

fn parse_vertex(s: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lon, got {s}"))?;
    let lat: f64 = lat.trim().parse().map_err(|err| format!("{lat}: {err}"))?;
    let lon: f64 = lon.trim().parse().map_err(|err| format!("{lon}: {err}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("{s} is not a valid coordinate"));
    }
    Ok((lat, lon))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_file_or_default(&args.config)?;
    if let Some(port) = args.serial_port {
        config.serial.port = port;
        config.transport = TransportConfig::Serial;
    }
    if let Some(bind) = args.udp {
        config.udp.bind = bind;
        config.transport = TransportConfig::Udp;
    }

    let link = Link::new(
        open_transport(&config)?,
        Arc::new(PostcardCodec),
        config.link.clone(),
    )?;
    let heartbeat = Entity::new(Heartbeat::default());
    link.add_listener(&heartbeat);
    establish(&link, &config)?;

    let target = link.target();
    let res = match args.command {
        Command::Monitor { duration } => monitor(&link, &config, heartbeat, duration),
        Command::Arm => command(&link, CommandProtocol::arm(target)),
        Command::Disarm => command(&link, CommandProtocol::disarm(target)),
        Command::Mode { mode } => {
            let mode = FlightMode::from_name(&mode).ok_or_else(|| anyhow!("unknown mode {mode}"))?;
            command(&link, CommandProtocol::set_mode(target, mode))
        }
        Command::Takeoff { altitude } => command(&link, CommandProtocol::takeoff(target, altitude)),
        Command::Interval { message, hz } => {
            let id = MessageId::from_name(&message)
                .ok_or_else(|| anyhow!("unknown message {message}"))?;
            command(&link, CommandProtocol::request_interval(target, id, hz))
        }
        Command::FenceClear => {
            let mut clear = FenceClearProtocol::new(target);
            link.run_protocol(&mut clear)?;
            if clear.outcome() != WaitOutcome::Received {
                bail!("no reply to fence clear");
            }
            let ack = clear.ack();
            if !ack.accepted() {
                bail!("fence clear rejected: {:?}", ack.result);
            }
            info!("fence cleared");
            Ok(())
        }
        Command::FenceUpload {
            vertices,
            exclusion,
        } => {
            let mut upload = FenceUploadProtocol::new(target, vertices, !exclusion);
            link.run_protocol(&mut upload)
                .context("fence upload failed")?;
            let ack = upload.ack();
            if upload.ack_outcome() != WaitOutcome::Received || !ack.accepted() {
                bail!("fence upload not acknowledged: {:?}", ack.result);
            }
            info!(vertices = upload.sent(), "fence uploaded");
            Ok(())
        }
        Command::Reboot => command(&link, CommandProtocol::reboot(target)),
    };
    link.close();
    res
}

fn open_transport(config: &Config) -> Result<Arc<dyn Transport>> {
    match config.transport {
        TransportConfig::Serial => {
            info!(
                "Opening serial link on {} at {} baud",
                config.serial.port, config.serial.baud
            );
            let serial = skylink::SerialTransport::open(&config.serial.port, config.serial.baud)
                .with_context(|| format!("failed to open {}", config.serial.port))?;
            Ok(Arc::new(serial))
        }
        TransportConfig::Udp => {
            let udp = match &config.udp.remote {
                Some(remote) => UdpTransport::connect(&config.udp.bind, remote.parse()?)?,
                None => UdpTransport::bind(&config.udp.bind)?,
            };
            info!("Listening for the vehicle on {}", udp.local_addr()?);
            Ok(Arc::new(udp))
        }
    }
}

/// Waits for the vehicle, then starts our own heartbeat. A UDP link without a fixed remote has
/// nowhere to send until the vehicle speaks first.
fn establish(link: &Link, config: &Config) -> Result<()> {
    await_vehicle(link, config)?;
    link.start_heartbeat(config.monitor.heartbeat_period())?;
    Ok(())
}

fn await_vehicle(link: &Link, config: &Config) -> Result<()> {
    let heartbeat = Entity::new(Heartbeat::default());
    let timeout = timeout_from_secs(config.monitor.connect_timeout_s);
    match link.wait_for_message(&heartbeat, timeout, true) {
        WaitOutcome::Received => {
            let hb = heartbeat.get();
            info!(
                system_id = hb.system_id,
                armed = hb.is_armed(),
                mode = ?hb.mode(),
                "vehicle connected"
            );
            Ok(())
        }
        _ => bail!("no heartbeat from the vehicle"),
    }
}

fn command(link: &Link, mut protocol: CommandProtocol) -> Result<()> {
    link.run_protocol(&mut protocol)?;
    let name = protocol.command().command;
    match protocol.outcome() {
        WaitOutcome::Received if protocol.accepted() => {
            info!(?name, "command accepted");
            Ok(())
        }
        WaitOutcome::Received => bail!("{name:?} rejected: {:?}", protocol.ack().result),
        _ => bail!("{name:?} not acknowledged"),
    }
}

fn monitor(
    link: &Link,
    config: &Config,
    heartbeat: Entity<Heartbeat>,
    duration: Option<f64>,
) -> Result<()> {
    let pose = FullPose::new(&config.link.pose);
    let battery = Entity::new(BatteryStatus::default());
    let status = Entity::new(SysStatus::default());
    let text = Entity::new(StatusText::default()).with_callback(|msg, _| {
        info!(severity = ?msg.severity, "{}", msg.text);
    });
    link.add_listener(&pose);
    link.add_listener(&battery);
    link.add_listener(&status);
    link.add_listener(&text);

    let started = Instant::now();
    let period = config.monitor.refresh_period();
    while duration.is_none_or(|secs| started.elapsed().as_secs_f64() < secs) {
        thread::sleep(period);
        let hb = heartbeat.get();
        info!(
            armed = hb.is_armed(),
            mode = ?hb.mode(),
            state = ?hb.state,
            hz = heartbeat.hz(),
            "heartbeat"
        );
        match pose.query(None) {
            Ok(p) => {
                let (roll, pitch, yaw) = p.orientation.euler_angles();
                info!(
                    north = p.position.x,
                    east = p.position.y,
                    down = p.position.z,
                    roll = roll.to_degrees(),
                    pitch = pitch.to_degrees(),
                    yaw = yaw.to_degrees(),
                    "pose"
                );
            }
            Err(err) => warn!(%err, "no pose yet"),
        }
        if battery.timestamp().is_some() {
            let b = battery.get();
            info!(volts = b.voltage(), remaining = ?b.remaining, current = ?b.current, "battery");
        }
        let s = status.get();
        if status.timestamp().is_some() && !(s.accel_health() && s.gyro_health() && s.baro_health()) {
            warn!(health = s.health, "sensor health degraded");
        }
    }
    link.remove_listener(&text);
    link.remove_listener(&status);
    link.remove_listener(&battery);
    link.remove_listener(&pose);
    Ok(())
}
