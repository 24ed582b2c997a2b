use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skylink::entity::WaitOutcome;
use skylink::messages::{FullPose, Heartbeat, MavResult, MissionResult};
use skylink::protocols::{CommandProtocol, FenceClearProtocol, FenceUploadProtocol};
use skylink::{
    ChannelTransport, Codec, Entity, Error, Frame, Header, Link, LinkConfig, Payload,
    PostcardCodec, Target, Transport,
};

/// A scripted autopilot on the far end of a channel transport.
struct Vehicle {
    received: Arc<Mutex<Vec<Payload>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Vehicle {
    fn spawn(transport: ChannelTransport) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let received = received.clone();
            let running = running.clone();
            thread::spawn(move || run_vehicle(transport, received, running))
        };
        Vehicle {
            received,
            running,
            handle: Some(handle),
        }
    }

    fn received(&self) -> Vec<Payload> {
        self.received.lock().clone()
    }
}

impl Drop for Vehicle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn send(transport: &ChannelTransport, payload: Payload) {
    let buf = PostcardCodec
        .encode(&Frame::new(Header::new(1, 1), payload))
        .unwrap();
    let _ = transport.send(&buf);
}

fn telemetry(transport: &ChannelTransport, tick: u32) {
    send(
        transport,
        Payload::Heartbeat {
            mav_type: 2,
            autopilot: 3,
            base_mode: 0x80 | 0x01,
            custom_mode: 4,
            system_status: 4,
        },
    );
    send(
        transport,
        Payload::AttitudeQuaternion {
            time_boot_ms: tick,
            q: [1.0, 0.0, 0.0, 0.0],
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
        },
    );
    send(
        transport,
        Payload::LocalPositionNed {
            time_boot_ms: tick,
            x: 1.0,
            y: 2.0,
            z: -3.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
        },
    );
}

fn mission_ack(result: u8) -> Payload {
    Payload::MissionAck {
        target_system: 255,
        target_component: 0,
        result,
        mission_type: 1,
    }
}

fn request(seq: u16) -> Payload {
    Payload::MissionRequestInt {
        target_system: 255,
        target_component: 0,
        seq,
        mission_type: 1,
    }
}

fn run_vehicle(
    transport: ChannelTransport,
    received: Arc<Mutex<Vec<Payload>>>,
    running: Arc<AtomicBool>,
) {
    let mut fence_count = 0;
    let mut last_telemetry = Instant::now();
    let mut tick = 0;
    while running.load(Ordering::SeqCst) {
        if last_telemetry.elapsed() >= Duration::from_millis(20) {
            last_telemetry = Instant::now();
            tick += 20;
            telemetry(&transport, tick);
        }
        let Ok(Some(buf)) = transport.recv(Duration::from_millis(5)) else {
            continue;
        };
        let Ok(frame) = PostcardCodec.decode(&buf) else {
            continue;
        };
        received.lock().push(frame.payload.clone());
        match frame.payload {
            Payload::CommandLong { command, .. } => {
                // reboot is refused while armed
                let result = if command == 246 { 4 } else { 0 };
                send(&transport, Payload::CommandAck { command, result });
            }
            Payload::MissionCount { count, .. } => {
                fence_count = count;
                send(&transport, request(0));
            }
            Payload::MissionItemInt { seq, .. } => {
                if seq + 1 < fence_count {
                    send(&transport, request(seq + 1));
                } else {
                    send(&transport, mission_ack(0));
                }
            }
            Payload::MissionClearAll { .. } => send(&transport, mission_ack(0)),
            _ => {}
        }
    }
}

fn connect() -> (Link, Vehicle) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (ours, theirs) = ChannelTransport::pair();
    let vehicle = Vehicle::spawn(theirs);
    let config = LinkConfig {
        reader_timeout_ms: 20,
        ..Default::default()
    };
    let link = Link::connect(ours, config).unwrap();
    (link, vehicle)
}

#[test]
fn commands_are_acknowledged() -> anyhow::Result<()> {
    let (link, _vehicle) = connect();
    let mut arm = CommandProtocol::arm(Target::default());
    link.run_protocol(&mut arm)?;
    assert_eq!(arm.outcome(), WaitOutcome::Received);
    assert!(arm.accepted());

    let mut reboot = CommandProtocol::reboot(Target::default());
    link.run_protocol(&mut reboot)?;
    assert_eq!(reboot.ack().result, Some(MavResult::Failed));
    assert!(!reboot.accepted());
    assert!(!link.sender().is_held());
    Ok(())
}

#[test]
fn fence_upload_round_trip() -> anyhow::Result<()> {
    let (link, vehicle) = connect();
    let vertices = vec![(47.0, 8.0), (47.0, 8.01), (47.01, 8.0)];
    let mut upload = FenceUploadProtocol::new(Target::default(), vertices, true);
    link.run_protocol(&mut upload)?;
    assert_eq!(upload.sent(), 3);
    assert_eq!(upload.ack().result, Some(MissionResult::Accepted));

    let items: Vec<(u16, i32)> = vehicle
        .received()
        .into_iter()
        .filter_map(|payload| match payload {
            Payload::MissionItemInt { seq, x, .. } => Some((seq, x)),
            _ => None,
        })
        .collect();
    assert_eq!(
        items,
        vec![(0, 470_000_000), (1, 470_000_000), (2, 470_100_000)]
    );

    let mut clear = FenceClearProtocol::new(Target::default());
    link.run_protocol(&mut clear)?;
    assert!(clear.ack().accepted());
    Ok(())
}

#[test]
fn gate_released_when_protocol_fails() {
    let (link, vehicle) = connect();
    let mut upload = FenceUploadProtocol::new(Target::default(), vec![(47.0, 8.0)], true);
    assert!(matches!(
        link.run_protocol(&mut upload),
        Err(Error::TooFewVertices(1))
    ));
    assert!(!link.sender().is_held());
    thread::sleep(Duration::from_millis(30));
    assert!(
        !vehicle
            .received()
            .iter()
            .any(|payload| matches!(payload, Payload::MissionCount { .. }))
    );
}

#[test]
fn ground_station_heartbeat_repeats() -> anyhow::Result<()> {
    let (link, vehicle) = connect();
    let heartbeat = link.start_heartbeat(Duration::from_millis(50))?;
    thread::sleep(Duration::from_millis(300));
    let sent = vehicle
        .received()
        .iter()
        .filter(|payload| matches!(payload, Payload::Heartbeat { mav_type: 6, .. }))
        .count();
    assert!((4..=8).contains(&sent), "sent = {sent}");
    assert!(link.sender().stop_repeating(heartbeat.id()));
    Ok(())
}

#[test]
fn telemetry_reaches_listeners() -> anyhow::Result<()> {
    let (link, _vehicle) = connect();
    let heartbeat = Entity::new(Heartbeat::default());
    let pose = FullPose::new(&link.config().pose);
    link.add_listener(&heartbeat);
    link.add_listener(&pose);

    let deadline = Instant::now() + Duration::from_secs(2);
    while pose.query(None).is_err() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let fused = pose.query(None)?;
    assert_eq!(fused.position, nalgebra::Vector3::new(1.0, 2.0, -3.0));
    assert!(heartbeat.get().is_armed());
    assert!(heartbeat.hz() > 0.0);

    let history = link.history("HEARTBEAT");
    assert!(!history.is_empty());
    assert!(history.windows(2).all(|w| w[0].0 >= w[1].0));
    assert_eq!(link.remove_listener(&pose), 3);
    Ok(())
}

#[test]
fn close_is_idempotent() {
    let (link, _vehicle) = connect();
    assert!(link.is_open());
    link.close();
    link.close();
    assert!(!link.is_open());
    assert!(!link.registry().is_running());
}

#[test]
fn close_during_outage() -> anyhow::Result<()> {
    let (ours, theirs) = ChannelTransport::pair();
    let ours = Arc::new(ours);
    let _vehicle = Vehicle::spawn(theirs);
    let config = LinkConfig {
        reader_timeout_ms: 20,
        ..Default::default()
    };
    let link = Link::new(ours.clone(), Arc::new(PostcardCodec), config)?;
    link.start_heartbeat(Duration::from_millis(20))?;

    ours.set_alive(false);
    thread::sleep(Duration::from_millis(100));
    let (tx, rx) = flume::bounded(1);
    let closer = thread::spawn(move || {
        link.close();
        let _ = tx.send(());
    });
    assert!(rx.recv_timeout(Duration::from_secs(3)).is_ok());
    closer.join().unwrap();
    Ok(())
}
