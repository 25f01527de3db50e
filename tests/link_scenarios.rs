//! End-to-end link scenarios over loopback TCP

use rat_link::core::types::{KNOWN_BITS, SEQ_SCAN};
use rat_link::devices::SimulatedRat;
use rat_link::endpoint::SessionEnd;
use rat_link::link::{Backoff, LinkListener};
use rat_link::{
    Action, CommandSink, CommandWord, ConnectOptions, DeviceEndpoint, Error, LinkSession,
    OperatorEndpoint, PolicyState, PresentationSink, Result, SensorSource, TelemetryFrame,
};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

struct FixedDevice;

impl CommandSink for FixedDevice {
    fn apply_command(&mut self, _cmd: CommandWord) -> Result<()> {
        Ok(())
    }
}

impl SensorSource for FixedDevice {
    fn read_telemetry(&mut self) -> Result<TelemetryFrame> {
        Ok(TelemetryFrame::new(*b"ssss", *b"tttt"))
    }
}

#[derive(Default)]
struct Screen {
    frames: Vec<TelemetryFrame>,
    commands: Vec<CommandWord>,
}

impl PresentationSink for Screen {
    fn on_telemetry(&mut self, frame: &TelemetryFrame) {
        self.frames.push(*frame);
    }

    fn on_command_changed(&mut self, cmd: CommandWord) {
        self.commands.push(cmd);
    }
}

fn options(timeout: Duration, retry: Duration) -> ConnectOptions {
    ConnectOptions {
        timeout,
        backoff: Backoff::Fixed(retry),
        read_timeout: Some(Duration::from_secs(2)),
        nodelay: true,
    }
}

/// Loopback address nobody listens on
fn freed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

fn spawn_device<C, S>(
    device: DeviceEndpoint<C, S>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<Result<SessionEnd>>
where
    C: CommandSink + 'static,
    S: SensorSource + 'static,
{
    let mut device = device;
    thread::spawn(move || device.serve_once(&running))
}

#[test]
fn test_forward_command_gets_both_telemetry_frames() {
    let device = DeviceEndpoint::bind("127.0.0.1:0", FixedDevice, FixedDevice)
        .unwrap()
        .with_poll_interval(Duration::from_millis(20));
    let address = device.local_addr().to_string();
    let server = spawn_device(device, Arc::new(AtomicBool::new(true)));

    let mut operator = OperatorEndpoint::new(
        address,
        options(Duration::from_secs(2), Duration::from_millis(50)),
        Screen::default(),
    );
    operator.update_command(Action::Forward);
    let frame = operator.send_and_await_telemetry().unwrap();

    assert_eq!(frame.sensor, *b"ssss");
    assert_eq!(frame.status, *b"tttt");
    assert_eq!(operator.presentation().frames.len(), 1);

    drop(operator);
    assert_eq!(
        server.join().unwrap().unwrap(),
        SessionEnd::PeerClosed { cycles: 1 }
    );
}

#[test]
fn test_every_command_word_survives_the_wire() {
    let listener = LinkListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().to_string();

    // Echo each command back in the sensor payload
    let echo = thread::spawn(move || {
        let mut session = listener.accept().unwrap();
        let mut count = 0u32;
        loop {
            match session.recv_command() {
                Ok(cmd) => {
                    let sensor = u32::from(cmd.bits()).to_be_bytes();
                    session
                        .send_telemetry(&TelemetryFrame::new(sensor, *b"tttt"))
                        .unwrap();
                    count += 1;
                }
                Err(Error::ConnectionClosed) => return count,
                Err(e) => panic!("device failed: {}", e),
            }
        }
    });

    let mut session = LinkSession::connect(
        &address,
        &options(Duration::from_secs(2), Duration::from_millis(50)),
    )
    .unwrap();
    for bits in 0..=KNOWN_BITS {
        session.send_command(CommandWord::from_bits(bits)).unwrap();
        let frame = session.recv_telemetry().unwrap();
        assert_eq!(frame.sensor_u32(), u32::from(bits));
    }
    session.close();

    assert_eq!(echo.join().unwrap(), u32::from(KNOWN_BITS) + 1);
}

#[test]
fn test_refused_connect_fails_before_window_closes() {
    let address = freed_address();
    let window = Duration::from_millis(300);

    let start = Instant::now();
    let result = LinkSession::connect(&address, &options(window, Duration::from_secs(1)));
    let elapsed = start.elapsed();

    match result {
        Err(Error::ConnectRefused { address: refused }) => assert_eq!(refused, address),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("connected to a closed port"),
    }
    assert!(elapsed < window, "refusal took {:?}", elapsed);
}

#[test]
fn test_unreachable_device_times_out_at_deadline() {
    // TEST-NET-1 is never routed
    let window = Duration::from_millis(300);

    let start = Instant::now();
    let result = LinkSession::connect("192.0.2.1:5007", &options(window, Duration::from_millis(50)));
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(Error::ConnectTimeout { .. })));
    assert!(elapsed >= window, "gave up after {:?}", elapsed);
}

#[test]
fn test_connect_retries_until_device_appears() {
    let address = freed_address();
    let late_bind = address.clone();
    let device = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        let listener = LinkListener::bind(&late_bind).unwrap();
        listener.accept().unwrap()
    });

    let session = LinkSession::connect(
        &address,
        &options(Duration::from_secs(3), Duration::from_millis(50)),
    )
    .unwrap();
    assert!(session.is_connected());
    let _device_side = device.join().unwrap();
}

#[test]
fn test_close_mid_frame_is_short_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let device = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut command = [0u8; 2];
        stream.read_exact(&mut command).unwrap();
        // Three of the four sensor bytes, then hang up
        stream.write_all(b"sss").unwrap();
    });

    let mut session = LinkSession::connect(
        &address,
        &options(Duration::from_secs(2), Duration::from_millis(50)),
    )
    .unwrap();
    session.send_command(CommandWord::IDLE).unwrap();
    let result = session.recv_telemetry();
    device.join().unwrap();

    assert!(matches!(
        result,
        Err(Error::ProtocolShortFrame {
            expected: 4,
            received: 3
        })
    ));
    assert!(!session.is_connected());
}

#[test]
fn test_operator_reconnects_after_device_restart() {
    let first = DeviceEndpoint::bind("127.0.0.1:0", FixedDevice, FixedDevice)
        .unwrap()
        .with_poll_interval(Duration::from_millis(20));
    let address = first.local_addr().to_string();
    let first_running = Arc::new(AtomicBool::new(true));
    let first_server = spawn_device(first, Arc::clone(&first_running));

    let mut operator = OperatorEndpoint::new(
        address.clone(),
        options(Duration::from_secs(3), Duration::from_millis(50)),
        Screen::default(),
    );
    operator.update_command(Action::Forward);
    operator.send_and_await_telemetry().unwrap();
    assert_eq!(operator.state(), PolicyState::Connected);

    // Device goes away
    first_running.store(false, Ordering::Relaxed);
    assert!(matches!(
        first_server.join().unwrap(),
        Ok(SessionEnd::Shutdown { cycles: 1 })
    ));

    let err = operator.send_and_await_telemetry().unwrap_err();
    assert!(err.is_peer_loss(), "unexpected error: {}", err);
    assert_eq!(operator.state(), PolicyState::Connecting);

    // Device comes back on the same address
    let second = DeviceEndpoint::bind(&address, FixedDevice, FixedDevice)
        .unwrap()
        .with_poll_interval(Duration::from_millis(20));
    let second_server = spawn_device(second, Arc::new(AtomicBool::new(true)));

    let frame = operator.send_and_await_telemetry().unwrap();
    assert_eq!(frame, TelemetryFrame::new(*b"ssss", *b"tttt"));
    assert_eq!(operator.state(), PolicyState::Connected);
    assert_eq!(operator.policy().reconnects(), 1);
    assert_eq!(operator.presentation().frames.len(), 2);

    drop(operator);
    assert!(matches!(
        second_server.join().unwrap(),
        Ok(SessionEnd::PeerClosed { cycles: 1 })
    ));
}

#[test]
fn test_operator_drives_simulated_rat() {
    let rat = Arc::new(Mutex::new(SimulatedRat::new(1_000)));
    let device = DeviceEndpoint::bind("127.0.0.1:0", Arc::clone(&rat), Arc::clone(&rat))
        .unwrap()
        .with_poll_interval(Duration::from_millis(20));
    let address = device.local_addr().to_string();
    let server = spawn_device(device, Arc::new(AtomicBool::new(true)));

    let mut operator = OperatorEndpoint::new(
        address,
        options(Duration::from_secs(2), Duration::from_millis(50)),
        Screen::default(),
    );
    operator.update_command(Action::Forward);
    operator.update_command(Action::SpeedUp);
    operator.send_and_await_telemetry().unwrap();
    let frame = operator.send_and_await_telemetry().unwrap();

    // Speed 1 then 2, 10 mm per level
    assert_eq!(frame.sensor_u32(), 1_000 - 30);
    assert_eq!(frame.status[1], 2);

    let scan = operator.update_command(Action::Scan);
    assert_eq!(scan.bits(), SEQ_SCAN);
    operator.send_and_await_telemetry().unwrap();

    drop(operator);
    server.join().unwrap().unwrap();

    let rat = rat.lock();
    assert_eq!(rat.commands(), 3);
    assert_eq!(rat.scans(), 1);
}
