//! Device endpoint loop
//!
//! Serves one operator at a time, synchronously:
//!
//! ```text
//! accept ──▶ recv command ──▶ apply (sink) ──▶ sample (source) ──▶ send telemetry
//!   ▲              │                                                    │
//!   │              └──────────────◀─────────────────────────────────────┘
//!   └──── peer closed / I/O error / collaborator error
//! ```
//!
//! Losing the operator never ends the loop; only the shutdown flag does.

use crate::core::collaborators::{CommandSink, SensorSource};
use crate::error::{Error, Result};
use crate::link::session::{LinkListener, LinkSession};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// How a served session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The operator closed the connection
    PeerClosed { cycles: u64 },
    /// The shutdown flag was cleared
    Shutdown { cycles: u64 },
}

/// Counters across all sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Operators accepted
    pub sessions: u64,
    /// Command/telemetry cycles completed
    pub cycles: u64,
    /// Sessions that ended with an error
    pub failures: u64,
}

/// Device side of the link
pub struct DeviceEndpoint<C, S> {
    listener: LinkListener,
    sink: C,
    source: S,
    poll_interval: Duration,
    stats: DeviceStats,
}

impl<C: CommandSink, S: SensorSource> DeviceEndpoint<C, S> {
    /// Bind the listen address
    ///
    /// Fails with [`Error::BindError`] when the address is in use.
    pub fn bind(bind_address: &str, sink: C, source: S) -> Result<Self> {
        let listener = LinkListener::bind(bind_address)?;
        Ok(Self {
            listener,
            sink,
            source,
            poll_interval: Duration::from_millis(500),
            stats: DeviceStats::default(),
        })
    }

    /// How often an idle session checks the shutdown flag
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Serve operators until `running` is cleared
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        log::info!("Device endpoint serving on {}", self.local_addr());

        while running.load(Ordering::Relaxed) {
            match self.serve_once(running) {
                Ok(SessionEnd::PeerClosed { cycles }) => {
                    log::info!("Operator disconnected after {} cycles", cycles);
                }
                Ok(SessionEnd::Shutdown { .. }) => break,
                Err(e) => {
                    log::error!("Session ended with error: {}", e);
                    if !e.is_peer_loss() {
                        // Give a failing collaborator or accept() a moment
                        thread::sleep(self.poll_interval);
                    }
                }
            }
            log::info!("Waiting for operator on {}", self.local_addr());
        }

        log::info!(
            "Device endpoint stopped ({} sessions, {} cycles, {} failures)",
            self.stats.sessions,
            self.stats.cycles,
            self.stats.failures
        );
        Ok(())
    }

    /// Accept one operator and serve it until the session ends
    ///
    /// An orderly close by the operator is `Ok(SessionEnd::PeerClosed)`;
    /// everything else that ends the session is returned as the error.
    pub fn serve_once(&mut self, running: &AtomicBool) -> Result<SessionEnd> {
        let Some(mut session) = self.listener.accept_until(running, self.poll_interval)? else {
            return Ok(SessionEnd::Shutdown { cycles: 0 });
        };
        self.stats.sessions += 1;

        let mut cycles = 0;
        let result = self.serve_session(&mut session, running, &mut cycles);
        self.stats.cycles += cycles;

        // Session dropped here on every path, releasing the socket
        match result {
            Ok(end) => Ok(end),
            Err(Error::ConnectionClosed) => Ok(SessionEnd::PeerClosed { cycles }),
            Err(e) => {
                self.stats.failures += 1;
                Err(e)
            }
        }
    }

    fn serve_session(
        &mut self,
        session: &mut LinkSession,
        running: &AtomicBool,
        cycles: &mut u64,
    ) -> Result<SessionEnd> {
        session.set_read_timeout(Some(self.poll_interval))?;

        loop {
            if !running.load(Ordering::Relaxed) {
                log::info!("Shutdown requested; closing link to {}", session.peer_addr());
                return Ok(SessionEnd::Shutdown { cycles: *cycles });
            }

            let Some(cmd) = session.poll_command()? else {
                continue;
            };

            if !cmd.is_resolved() {
                log::warn!(
                    "Command {} sets both flags on {:?}",
                    cmd,
                    cmd.conflicting_axes()
                );
            }
            if cmd.unknown_bits() != 0 {
                log::warn!("Command carries unknown bits {:#06x}", cmd.unknown_bits());
            }

            self.sink.apply_command(cmd)?;
            let frame = self.source.read_telemetry()?;
            session.send_telemetry(&frame)?;
            *cycles += 1;
        }
    }
}
