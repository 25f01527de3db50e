//! Link session: one TCP connection between operator and device
//!
//! A session is created connected (operator: [`LinkSession::connect`],
//! device: [`LinkListener::accept`]) and owns its socket exclusively. The
//! socket is shut down when the session is closed or dropped, whichever
//! path the owner takes out of a send or receive.
//!
//! # Roles
//!
//! | Operation          | Operator | Device |
//! |--------------------|----------|--------|
//! | `send_command`     | yes      | no     |
//! | `recv_command`     | no       | yes    |
//! | `send_telemetry`   | no       | yes    |
//! | `recv_telemetry`   | yes      | no     |

use crate::core::types::{CommandWord, TelemetryFrame};
use crate::error::{Error, Result};
use crate::link::reconnect::Backoff;
use crate::link::wire::{
    COMMAND_FRAME_LEN, IdleMode, TELEMETRY_FRAME_LEN, decode_command, encode_command, read_frame,
    write_frame,
};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Which end of the link a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Device,
    Operator,
}

impl Role {
    pub const fn name(self) -> &'static str {
        match self {
            Role::Device => "device",
            Role::Operator => "operator",
        }
    }
}

/// Connection state of a link
///
/// Sessions only exist once connected; `Connecting` is reported by the
/// reconnection policy while an attempt is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Parameters for establishing an operator session
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Connect window
    pub timeout: Duration,
    /// Delay between attempts
    pub backoff: Backoff,
    /// How long a telemetry read may wait (None = forever)
    pub read_timeout: Option<Duration>,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl ConnectOptions {
    /// Default options with a different connect window
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            backoff: Backoff::default(),
            read_timeout: None,
            nodelay: true,
        }
    }
}

/// One live connection
#[derive(Debug)]
pub struct LinkSession {
    stream: TcpStream,
    peer: SocketAddr,
    role: Role,
    state: LinkState,
}

impl LinkSession {
    fn new(stream: TcpStream, peer: SocketAddr, role: Role) -> Self {
        Self {
            stream,
            peer,
            role,
            state: LinkState::Connected,
        }
    }

    /// Connect to a device, retrying until the connect window closes
    ///
    /// A refused attempt with no room left for another retry fails with
    /// [`Error::ConnectRefused`] right away. Any other way of running out of
    /// attempts fails with [`Error::ConnectTimeout`], never before the window
    /// has fully elapsed.
    pub fn connect(address: &str, options: &ConnectOptions) -> Result<Self> {
        let target = resolve(address)?;
        let start = Instant::now();
        let deadline = start + options.timeout;
        let mut attempt: u32 = 0;

        log::info!(
            "Connecting to {} (window {:?}, backoff {:?})",
            target,
            options.timeout,
            options.backoff
        );

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match TcpStream::connect_timeout(&target, remaining) {
                Ok(stream) => {
                    configure_stream(&stream, options.read_timeout, options.nodelay);
                    log::info!(
                        "Successfully connected to {} after {} attempt(s)",
                        target,
                        attempt + 1
                    );
                    return Ok(Self::new(stream, target, Role::Operator));
                }
                Err(e) => {
                    let delay = options.backoff.delay(attempt);
                    attempt += 1;
                    let remaining = deadline.saturating_duration_since(Instant::now());

                    if e.kind() == io::ErrorKind::ConnectionRefused && remaining <= delay {
                        log::warn!("Connection to {} refused; no time left to retry", target);
                        return Err(Error::ConnectRefused {
                            address: address.to_string(),
                        });
                    }

                    let pause = delay.min(remaining);
                    log::warn!(
                        "No connection to {} ({}); attempting reconnection in {:?}",
                        target,
                        e,
                        pause
                    );
                    thread::sleep(pause);
                }
            }
        }

        let elapsed = start.elapsed();
        log::error!("Connection to {} timed out after {:?}", target, elapsed);
        Err(Error::ConnectTimeout {
            address: address.to_string(),
            elapsed,
        })
    }

    /// Bind `bind_address` and accept exactly one operator
    pub fn accept(bind_address: &str) -> Result<Self> {
        LinkListener::bind(bind_address)?.accept()
    }

    /// Peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of the socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Change how long a read may wait before timing out
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    /// Send one command word (operator)
    pub fn send_command(&mut self, cmd: CommandWord) -> Result<()> {
        self.expect_role(Role::Operator, "send_command")?;
        self.ensure_connected()?;

        let frame = encode_command(cmd);
        log::debug!("-> command {} ({:02x?})", cmd, frame);
        let result = write_frame(&mut self.stream, &frame);
        self.track(result)
    }

    /// Receive one command word, blocking until it is complete (device)
    pub fn recv_command(&mut self) -> Result<CommandWord> {
        loop {
            if let Some(cmd) = self.poll_command()? {
                return Ok(cmd);
            }
        }
    }

    /// Receive a command word if one starts within the read timeout (device)
    ///
    /// Returns `Ok(None)` when nothing arrived; once the first byte of a
    /// frame is in, the whole frame is read.
    pub fn poll_command(&mut self) -> Result<Option<CommandWord>> {
        self.expect_role(Role::Device, "recv_command")?;
        self.ensure_connected()?;

        let mut frame = [0u8; COMMAND_FRAME_LEN];
        let result = read_frame(&mut self.stream, &mut frame, IdleMode::Poll);
        match self.track(result)? {
            true => {
                let cmd = decode_command(frame);
                log::debug!("<- command {} ({:02x?})", cmd, frame);
                Ok(Some(cmd))
            }
            false => Ok(None),
        }
    }

    /// Send sensor then status frame (device)
    pub fn send_telemetry(&mut self, frame: &TelemetryFrame) -> Result<()> {
        self.expect_role(Role::Device, "send_telemetry")?;
        self.ensure_connected()?;

        log::debug!(
            "-> telemetry sensor={:02x?} status={:02x?}",
            frame.sensor,
            frame.status
        );
        let result = write_frame(&mut self.stream, &frame.sensor)
            .and_then(|()| write_frame(&mut self.stream, &frame.status));
        self.track(result)
    }

    /// Receive sensor then status frame (operator)
    ///
    /// Fails with [`Error::ReadError`] when the configured read timeout
    /// passes before the sensor frame starts.
    pub fn recv_telemetry(&mut self) -> Result<TelemetryFrame> {
        self.expect_role(Role::Operator, "recv_telemetry")?;
        self.ensure_connected()?;

        let result = self.read_telemetry_frames();
        let frame = self.track(result)?;
        log::debug!(
            "<- telemetry sensor={:02x?} status={:02x?}",
            frame.sensor,
            frame.status
        );
        Ok(frame)
    }

    fn read_telemetry_frames(&mut self) -> Result<TelemetryFrame> {
        let mut sensor = [0u8; TELEMETRY_FRAME_LEN];
        read_frame(&mut self.stream, &mut sensor, IdleMode::Fail)?;

        let mut status = [0u8; TELEMETRY_FRAME_LEN];
        match read_frame(&mut self.stream, &mut status, IdleMode::Fail) {
            Ok(_) => Ok(TelemetryFrame::new(sensor, status)),
            // Sensor frame without its status frame is half a reply
            Err(Error::ConnectionClosed) => Err(Error::ProtocolShortFrame {
                expected: 2 * TELEMETRY_FRAME_LEN,
                received: TELEMETRY_FRAME_LEN,
            }),
            Err(e) => Err(e),
        }
    }

    /// Close the session, shutting the socket down
    pub fn close(mut self) {
        log::info!("Closing {} link to {}", self.role.name(), self.peer);
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.state = LinkState::Disconnected;
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn expect_role(&self, role: Role, operation: &'static str) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(Error::RoleMismatch {
                role: self.role.name(),
                operation,
            })
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    /// Mark the session dead when an I/O result reports peer loss
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result
            && e.is_peer_loss()
        {
            log::info!("{} link to {} ended: {}", self.role.name(), self.peer, e);
            self.shutdown();
        }
        result
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        if self.state == LinkState::Connected {
            self.shutdown();
        }
    }
}

/// Listening socket for the device side
///
/// Stays bound across sessions so the device can go back to accepting after
/// losing an operator.
#[derive(Debug)]
pub struct LinkListener {
    listener: TcpListener,
    local: SocketAddr,
}

impl LinkListener {
    /// Bind the listen address
    pub fn bind(address: &str) -> Result<Self> {
        let listener = TcpListener::bind(address).map_err(|source| Error::BindError {
            address: address.to_string(),
            source,
        })?;
        let local = listener.local_addr()?;
        log::info!("Listening for operator on {}", local);
        Ok(Self { listener, local })
    }

    /// Bound address (useful when binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Block until an operator connects
    pub fn accept(&self) -> Result<LinkSession> {
        self.listener.set_nonblocking(false)?;
        let (stream, peer) = self.listener.accept()?;
        Self::session_for(stream, peer)
    }

    /// Accept an operator, checking `running` every `poll` interval
    ///
    /// Returns `Ok(None)` once `running` is cleared.
    pub fn accept_until(&self, running: &AtomicBool, poll: Duration) -> Result<Option<LinkSession>> {
        self.listener.set_nonblocking(true)?;

        while running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Accepted sockets may inherit non-blocking mode
                    stream.set_nonblocking(false)?;
                    return Self::session_for(stream, peer).map(Some);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(poll.min(Duration::from_millis(10)));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(None)
    }

    fn session_for(stream: TcpStream, peer: SocketAddr) -> Result<LinkSession> {
        configure_stream(&stream, None, true);
        log::info!("Operator connected: {}", peer);
        Ok(LinkSession::new(stream, peer, Role::Device))
    }
}

fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("{}: no addresses", address)))
}

fn configure_stream(stream: &TcpStream, read_timeout: Option<Duration>, nodelay: bool) {
    if let Err(e) = stream.set_nodelay(nodelay) {
        log::warn!("Failed to set TCP_NODELAY: {}", e);
    }
    if let Err(e) = stream.set_read_timeout(read_timeout) {
        log::warn!("Failed to set read timeout: {}", e);
    }
}
