//! Reconnection policy for the operator side of the link
//!
//! ```text
//! Idle ──connect──▶ Connecting ──ok──▶ Connected
//!                       │  ▲                │
//!                  window  └──I/O failure───┘
//!                  closed
//!                       ▼
//!                   TimedOut ──restart──▶ Idle
//! ```
//!
//! Connection attempts happen lazily: a failure moves the policy to
//! `Connecting`, and the next call to [`ReconnectPolicy::session`] runs a
//! full connect window with the configured backoff.

use crate::error::{Error, Result};
use crate::link::session::{ConnectOptions, LinkSession};
use std::time::Duration;

/// Delay between connect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt
    Fixed(Duration),
    /// Delay doubles after each failed attempt, up to `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `attempt`-th failure (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(interval) => interval,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_secs(1))
    }
}

/// Reconnection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Never connected, or restarted
    Idle,
    /// A connect window is pending or in progress
    Connecting,
    /// A live session is held
    Connected,
    /// The last connect window closed without a session
    TimedOut,
}

/// Keeps one operator session alive across device restarts
pub struct ReconnectPolicy {
    address: String,
    options: ConnectOptions,
    state: PolicyState,
    session: Option<LinkSession>,
    reconnects: u32,
}

impl ReconnectPolicy {
    /// Create an idle policy for `address`
    pub fn new(address: impl Into<String>, options: ConnectOptions) -> Self {
        Self {
            address: address.into(),
            options,
            state: PolicyState::Idle,
            session: None,
            reconnects: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> PolicyState {
        self.state
    }

    /// Target address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of sessions lost and re-established since creation
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Live session, connecting first when none is held
    ///
    /// Blocks for at most one connect window. In `TimedOut` this returns
    /// [`Error::ReconnectExhausted`] until [`ReconnectPolicy::restart`].
    pub fn session(&mut self) -> Result<&mut LinkSession> {
        if self.state == PolicyState::TimedOut {
            return Err(Error::ReconnectExhausted);
        }

        let healthy = self.session.as_ref().is_some_and(LinkSession::is_connected);
        if !healthy {
            if self.session.take().is_some() {
                log::warn!("Dropping dead session to {}", self.address);
            }
            self.establish()?;
        }

        self.session.as_mut().ok_or(Error::ConnectionClosed)
    }

    fn establish(&mut self) -> Result<()> {
        let reconnecting = self.state == PolicyState::Connecting;
        self.state = PolicyState::Connecting;

        match LinkSession::connect(&self.address, &self.options) {
            Ok(session) => {
                if reconnecting {
                    self.reconnects += 1;
                    log::info!(
                        "Reconnected to {} (reconnect #{})",
                        self.address,
                        self.reconnects
                    );
                }
                self.session = Some(session);
                self.state = PolicyState::Connected;
                Ok(())
            }
            Err(e) => {
                log::error!("Link to {} timed out: {}", self.address, e);
                self.state = PolicyState::TimedOut;
                Err(e)
            }
        }
    }

    /// Record an error from the held session
    ///
    /// Peer-loss errors drop the session and move the policy back to
    /// `Connecting`; other errors leave the session in place.
    pub fn report_failure(&mut self, err: &Error) {
        if !err.is_peer_loss() || self.state != PolicyState::Connected {
            return;
        }
        log::warn!("Link to {} lost: {}", self.address, err);
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.state = PolicyState::Connecting;
    }

    /// Leave `TimedOut` (or any state) and start over from `Idle`
    pub fn restart(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        log::info!("Link policy for {} restarted", self.address);
        self.state = PolicyState::Idle;
    }
}
