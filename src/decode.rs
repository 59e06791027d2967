//! Blocking response decoder.
//!
//! Consumes a connection's input byte stream and yields one complete
//! [`Response`] frame per call. A frame is a CRLF-terminated line, plus —
//! whenever the line's tail announces a literal (`{<n>}` immediately
//! before the CRLF) — exactly `n` raw payload bytes followed by the
//! continuation of the line, recursively. Literal payloads may contain
//! arbitrary bytes, including CRLF pairs; they never terminate the frame.
//!
//! The line phase reads single bytes (hand the connection a buffered
//! stream); literal payloads are pulled with bulk reads of the exact
//! remaining count, so the decoder never consumes bytes belonging to the
//! following response.

use std::io::Read;

use crate::{buffer::ReadBuffer, connection::Connection, error::WireError, response::Response};

impl<S: Read> Connection<S> {
    /// Reads the next complete response frame, blocking as needed.
    ///
    /// `reuse` lets the caller hand back the buffer of a previous
    /// [`Response`] (via [`Response::into_buffer`]) to amortize
    /// allocations across many reads on the same connection.
    ///
    /// On return — success or error — any pending cancellation signal on
    /// this connection is cleared, so a subsequent unrelated read does not
    /// observe a stale interruption.
    pub fn read_response(&mut self, reuse: Option<ReadBuffer>) -> Result<Response, WireError> {
        let mut buffer = reuse.unwrap_or_default();
        buffer.clear();

        let result = self.read_frame(&mut buffer);
        self.clear_interrupt();

        result.map(|()| Response::new(buffer))
    }

    fn read_frame(&mut self, buffer: &mut ReadBuffer) -> Result<(), WireError> {
        loop {
            let line_start = buffer.len();

            // CRLF-terminated line, byte by byte. A lone LF does not
            // terminate.
            loop {
                let byte = self.read_line_byte(buffer)?;
                if byte == b'\n' {
                    let line = &buffer.as_slice()[line_start..];
                    if line.len() >= 2 && line[line.len() - 2] == b'\r' {
                        break;
                    }
                }
            }

            let line = &buffer.as_slice()[line_start..buffer.len() - 2];
            match literal_announcement(line) {
                // A literal of `count` bytes follows, then the line
                // continues; scan that continuation for a CRLF (and
                // possibly further literals) as well.
                Some(count) => {
                    if count > 0 {
                        self.read_literal(buffer, count)?;
                    }
                }
                None => return Ok(()),
            }
        }
    }

    fn read_line_byte(&mut self, buffer: &mut ReadBuffer) -> Result<u8, WireError> {
        self.check_interrupt()?;
        self.check_limit(buffer.len(), 1)?;

        let mut byte = [0u8; 1];
        self.read_stream(&mut byte)?;

        buffer.push(byte[0]);
        Ok(byte[0])
    }

    fn read_literal(&mut self, buffer: &mut ReadBuffer, count: usize) -> Result<(), WireError> {
        // Fail before buffering a single payload byte: a huge declared
        // count must not trigger a huge allocation.
        self.check_limit(buffer.len(), count)?;
        buffer.reserve(count);

        let mut remaining = count;
        while remaining > 0 {
            self.check_interrupt()?;

            let spare = buffer.spare_mut();
            let cap = spare.len().min(remaining);
            let read = self.read_stream(&mut spare[..cap])?;

            buffer.advance(read);
            remaining -= read;
        }

        Ok(())
    }

    /// One stream read with the cancellation flag folded in: a forced
    /// socket shutdown reports as interrupted rather than as EOF or a
    /// transport error.
    fn read_stream(&mut self, buf: &mut [u8]) -> Result<usize, WireError> {
        loop {
            match self.stream.read(buf) {
                Ok(count) => {
                    self.check_interrupt()?;
                    if count == 0 {
                        return Err(self.dropped_error());
                    }
                    return Ok(count);
                }
                // Signal-interrupted reads are retried unless a
                // cancellation is actually pending.
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {
                    self.check_interrupt()?;
                }
                Err(err) => {
                    self.check_interrupt()?;
                    return Err(err.into());
                }
            }
        }
    }

    fn check_interrupt(&self) -> Result<(), WireError> {
        if self.is_interrupted() {
            Err(self.interrupted_error())
        } else {
            Ok(())
        }
    }

    fn check_limit(&self, current: usize, additional: usize) -> Result<(), WireError> {
        match self.max_response_len() {
            Some(limit) if current + additional > limit => {
                Err(WireError::ResponseTooLarge { limit })
            }
            _ => Ok(()),
        }
    }
}

/// Checks whether `line` (terminator stripped) announces a literal, and
/// returns the declared byte count.
///
/// A tail that merely looks brace-ish — non-digits between the braces, an
/// empty `{}`, an overflowing count — is ordinary line content, not an
/// error: plain response text can legitimately contain braces.
fn literal_announcement(line: &[u8]) -> Option<usize> {
    let before_close = line.len().checked_sub(1)?;
    if line[before_close] != b'}' {
        return None;
    }

    let open = line[..before_close].iter().rposition(|byte| *byte == b'{')?;
    let digits = &line[open + 1..before_close];
    if digits.is_empty() {
        return None;
    }

    let mut count = 0usize;
    for byte in digits {
        if !byte.is_ascii_digit() {
            return None;
        }
        count = count
            .checked_mul(10)?
            .checked_add(usize::from(byte - b'0'))?;
    }

    Some(count)
}
