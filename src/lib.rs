//! # IMAP Wire Layer
//!
//! imap-wire implements the byte-level data plane of an IMAP client:
//! encoding command arguments, framing server responses, and guarding
//! blocking reads with deadlines. It deliberately stops below the
//! protocol engine — no command state machine, no mailbox model, no
//! transport setup.
//!
//! ## Encoding arguments
//!
//! [`Arguments`] accumulates command parameters and serializes them in
//! one pass, picking the minimal legal encoding (atom, quoted string, or
//! literal) per value and negotiating synchronizing literals with the
//! server when needed:
//!
//! ```no_run
//! use std::net::TcpStream;
//!
//! use imap_wire::{Arguments, Connection};
//!
//! # fn main() -> Result<(), imap_wire::WireError> {
//! let stream = TcpStream::connect("imap.example.org:143")?;
//! let mut conn = Connection::new(stream, "imap.example.org");
//!
//! let mut args = Arguments::new();
//! args.write_atom("A1")
//!     .write_atom("LOGIN")
//!     .write_string("alice")
//!     .write_string("correct horse");
//! args.write(&mut conn)?;
//! # Ok(()) }
//! ```
//!
//! ## Reading responses
//!
//! [`Connection::read_response`] blocks until one complete frame is
//! available — a CRLF-terminated line plus any `{n}` literal payloads it
//! announces — and never consumes bytes belonging to the next frame.
//! The returned [`Response`] classifies itself as continuation, tagged,
//! or BYE.
//!
//! ## Interrupting stuck reads
//!
//! A [`ReadWatchdog`] runs one sweeper thread for the whole process.
//! Registering a read hands it a [`CancelToken`] and an [`Unblock`]
//! handle; past the deadline the sweeper cancels the token and kicks the
//! blocked thread out of the kernel, surfacing
//! [`WireError::Interrupted`] at the call site.

#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]

mod buffer;
mod connection;
mod decode;
mod encode;
mod error;
mod response;
#[cfg(test)]
mod testing;
mod watchdog;

pub use buffer::ReadBuffer;
pub use connection::{CancelToken, Connection};
pub use encode::Arguments;
pub use error::WireError;
pub use response::Response;
pub use watchdog::{ReadWatchdog, Unblock, WatchGuard};
