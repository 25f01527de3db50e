//! Operator endpoint
//!
//! Holds the in-memory command word and drives the link one explicit send at
//! a time. Input events only change the word; nothing touches the network
//! until [`OperatorEndpoint::send_and_await_telemetry`] is called.

use crate::core::collaborators::PresentationSink;
use crate::core::types::{Action, CommandWord, TelemetryFrame};
use crate::error::Result;
use crate::link::reconnect::{PolicyState, ReconnectPolicy};
use crate::link::session::{ConnectOptions, LinkSession};

/// Pure command update for one operator action
pub fn update_command(current: CommandWord, action: Action) -> CommandWord {
    current.apply(action)
}

/// Send `command`, then read the sensor and status frames
pub fn send_and_await_telemetry(
    session: &mut LinkSession,
    command: CommandWord,
) -> Result<TelemetryFrame> {
    session.send_command(command)?;
    session.recv_telemetry()
}

/// Operator side of the link
pub struct OperatorEndpoint<P> {
    policy: ReconnectPolicy,
    command: CommandWord,
    presentation: P,
}

impl<P: PresentationSink> OperatorEndpoint<P> {
    /// Create an endpoint; no connection is made until first use
    pub fn new(address: impl Into<String>, options: ConnectOptions, presentation: P) -> Self {
        Self {
            policy: ReconnectPolicy::new(address, options),
            command: CommandWord::IDLE,
            presentation,
        }
    }

    /// Current command word
    pub fn command(&self) -> CommandWord {
        self.command
    }

    /// Reconnection state
    pub fn state(&self) -> PolicyState {
        self.policy.state()
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    /// Apply an operator action to the command word
    pub fn update_command(&mut self, action: Action) -> CommandWord {
        let next = update_command(self.command, action);
        if next != self.command {
            self.command = next;
            self.presentation.on_command_changed(next);
        }
        next
    }

    /// Connect now instead of on the first send
    pub fn connect(&mut self) -> Result<()> {
        self.policy.session().map(|_| ())
    }

    /// Send the current word and hand the reply to the presentation sink
    ///
    /// Failures are returned as-is. A lost peer moves the policy to
    /// `Connecting`, so the next call reconnects before sending.
    pub fn send_and_await_telemetry(&mut self) -> Result<TelemetryFrame> {
        let command = self.command;
        let result = self
            .policy
            .session()
            .and_then(|session| send_and_await_telemetry(session, command));

        match result {
            Ok(frame) => {
                self.presentation.on_telemetry(&frame);
                Ok(frame)
            }
            Err(e) => {
                self.policy.report_failure(&e);
                Err(e)
            }
        }
    }

    /// Start a fresh connect window after `TimedOut`
    pub fn restart(&mut self) {
        self.policy.restart();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DIR_FORWARD, SPEED_DEC, SPEED_INC};
    use crate::link::reconnect::Backoff;
    use crate::link::session::LinkListener;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        commands: Vec<CommandWord>,
        telemetry: Vec<TelemetryFrame>,
    }

    impl PresentationSink for Recorder {
        fn on_telemetry(&mut self, frame: &TelemetryFrame) {
            self.telemetry.push(*frame);
        }

        fn on_command_changed(&mut self, cmd: CommandWord) {
            self.commands.push(cmd);
        }
    }

    fn options() -> ConnectOptions {
        ConnectOptions {
            timeout: Duration::from_secs(2),
            backoff: Backoff::Fixed(Duration::from_millis(50)),
            read_timeout: Some(Duration::from_secs(2)),
            nodelay: true,
        }
    }

    #[test]
    fn test_update_command_notifies_on_change_only() {
        let mut operator = OperatorEndpoint::new("127.0.0.1:1", options(), Recorder::default());

        operator.update_command(Action::SpeedUp);
        operator.update_command(Action::SpeedUp);
        let word = operator.update_command(Action::SpeedDown);

        assert_eq!(word.bits(), SPEED_DEC);
        assert_eq!(
            operator.presentation().commands,
            vec![CommandWord::from_bits(SPEED_INC), CommandWord::from_bits(SPEED_DEC)]
        );
        // Input never touches the network
        assert_eq!(operator.state(), PolicyState::Idle);
    }

    #[test]
    fn test_send_hands_telemetry_to_presentation() {
        let listener = LinkListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().to_string();
        let device = thread::spawn(move || {
            let mut session = listener.accept().unwrap();
            let cmd = session.recv_command().unwrap();
            session
                .send_telemetry(&TelemetryFrame::new(*b"ssss", *b"tttt"))
                .unwrap();
            cmd
        });

        let mut operator = OperatorEndpoint::new(address, options(), Recorder::default());
        operator.update_command(Action::Forward);
        let frame = operator.send_and_await_telemetry().unwrap();

        assert_eq!(device.join().unwrap().bits(), DIR_FORWARD);
        assert_eq!(frame, TelemetryFrame::new(*b"ssss", *b"tttt"));
        assert_eq!(operator.presentation().telemetry, vec![frame]);
        assert_eq!(operator.state(), PolicyState::Connected);
    }

    #[test]
    fn test_lost_peer_moves_policy_to_connecting() {
        let listener = LinkListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().to_string();
        let device = thread::spawn(move || {
            let mut session = listener.accept().unwrap();
            session.recv_command().unwrap();
            // Hang up without replying
        });

        let mut operator = OperatorEndpoint::new(address, options(), Recorder::default());
        let err = operator.send_and_await_telemetry().unwrap_err();
        device.join().unwrap();

        assert!(err.is_peer_loss());
        assert_eq!(operator.state(), PolicyState::Connecting);
        assert!(operator.presentation().telemetry.is_empty());
    }
}
