//! Fixed-length frame codec
//!
//! # Protocol
//!
//! Every payload has a size known at compile time, so frames carry no length
//! prefix and no delimiter:
//!
//! ```text
//! operator -> device   ┌───────────────────────┐
//!                      │ Command word (2 bytes)│
//!                      │ big-endian u16        │
//!                      └───────────────────────┘
//!
//! device -> operator   ┌──────────────────┐┌──────────────────┐
//!                      │ Sensor (4 bytes) ││ Status (4 bytes) │
//!                      └──────────────────┘└──────────────────┘
//! ```
//!
//! A read that sees end-of-stream before the first byte of a frame is an
//! orderly close; end-of-stream after the first byte is a short frame.

use crate::core::types::{CommandWord, TELEMETRY_FIELD_LEN};
use crate::error::{Error, Result};
use std::io::{self, Read, Write};

/// Command frame size
pub const COMMAND_FRAME_LEN: usize = 2;

/// Size of each telemetry frame (sensor, then status)
pub const TELEMETRY_FRAME_LEN: usize = TELEMETRY_FIELD_LEN;

/// Encode a command word
#[inline]
pub fn encode_command(cmd: CommandWord) -> [u8; COMMAND_FRAME_LEN] {
    cmd.bits().to_be_bytes()
}

/// Decode a command word; every bit pattern is kept
#[inline]
pub fn decode_command(frame: [u8; COMMAND_FRAME_LEN]) -> CommandWord {
    CommandWord::from_bits(u16::from_be_bytes(frame))
}

/// How a read timeout before the first byte of a frame is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleMode {
    /// Return `Ok(false)` so the caller can poll a shutdown flag
    Poll,
    /// Report the timeout as [`Error::ReadError`]
    Fail,
}

/// Write one frame completely
///
/// Partial writes are continued until the frame is out or the socket fails.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < frame.len() {
        match writer.write(&frame[written..]) {
            Ok(0) => {
                return Err(Error::WriteError(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("wrote {} of {} bytes", written, frame.len()),
                )));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::WriteError(e)),
        }
    }
    writer.flush().map_err(Error::WriteError)
}

/// Read exactly one frame into `buf`
///
/// Returns `Ok(true)` once the frame is complete, or `Ok(false)` when
/// `idle` is [`IdleMode::Poll`] and the read timed out before any byte of
/// the frame arrived. Once the first byte is in, timeouts are waited out:
/// a frame is never abandoned half read.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8], idle: IdleMode) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Err(Error::ConnectionClosed),
            Ok(0) => {
                return Err(Error::ProtocolShortFrame {
                    expected: buf.len(),
                    received: filled,
                });
            }
            Ok(n) => {
                filled += n;
                log::trace!("Frame progress: {}/{} bytes", filled, buf.len());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => {
                if filled > 0 {
                    continue;
                }
                return match idle {
                    IdleMode::Poll => Ok(false),
                    IdleMode::Fail => Err(Error::ReadError(e)),
                };
            }
            Err(e) if filled == 0 && is_reset(&e) => return Err(Error::ConnectionClosed),
            Err(e) if is_reset(&e) => {
                return Err(Error::ProtocolShortFrame {
                    expected: buf.len(),
                    received: filled,
                });
            }
            Err(e) => return Err(Error::ReadError(e)),
        }
    }
    Ok(true)
}

/// Read timeouts surface as `WouldBlock` on Unix and `TimedOut` on Windows
fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn is_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}
