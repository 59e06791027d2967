//! Decoded response frames.

use crate::buffer::ReadBuffer;

/// One complete response frame as read off the wire, literal payloads
/// absorbed.
///
/// Ownership transfers to the protocol engine, which classifies the frame
/// via the three predicates and dispatches it. The backing buffer can be
/// reclaimed for the next read with [`Response::into_buffer`].
#[derive(Debug)]
pub struct Response {
    buffer: ReadBuffer,
}

impl Response {
    pub(crate) fn new(buffer: ReadBuffer) -> Self {
        Self { buffer }
    }

    /// Raw frame bytes, including the terminating CRLF and any literal
    /// payloads.
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Server signals it is ready for more command data (`+ ...`).
    pub fn is_continuation(&self) -> bool {
        self.as_bytes().first() == Some(&b'+')
    }

    /// Frame begins with a client-supplied command tag, i.e. completes a
    /// command.
    pub fn is_tagged(&self) -> bool {
        !matches!(self.as_bytes().first(), None | Some(b'*') | Some(b'+'))
    }

    /// Server announced imminent disconnect (`* BYE ...`).
    pub fn is_bye(&self) -> bool {
        let Some(rest) = self.as_bytes().strip_prefix(b"* ") else {
            return false;
        };
        rest.len() >= 3
            && rest[..3].eq_ignore_ascii_case(b"BYE")
            && matches!(rest.get(3), None | Some(b' ') | Some(b'\r') | Some(b'\n'))
    }

    /// Reclaims the buffer (cleared) for the next read on the connection.
    pub fn into_buffer(mut self) -> ReadBuffer {
        self.buffer.clear();
        self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(bytes: &[u8]) -> Response {
        let mut buffer = ReadBuffer::new();
        for byte in bytes {
            buffer.push(*byte);
        }
        Response::new(buffer)
    }

    #[test]
    fn continuation() {
        assert!(response(b"+ Ready for additional command text\r\n").is_continuation());
        assert!(response(b"+\r\n").is_continuation());
        assert!(!response(b"* OK done\r\n").is_continuation());
        assert!(!response(b"A1 OK done\r\n").is_continuation());
    }

    #[test]
    fn tagged() {
        assert!(response(b"A1 OK FETCH completed\r\n").is_tagged());
        assert!(response(b"a NO denied\r\n").is_tagged());
        assert!(!response(b"* 12 EXISTS\r\n").is_tagged());
        assert!(!response(b"+ go on\r\n").is_tagged());
        assert!(!response(b"").is_tagged());
    }

    #[test]
    fn bye() {
        assert!(response(b"* BYE server shutting down\r\n").is_bye());
        assert!(response(b"* bye\r\n").is_bye());
        assert!(!response(b"* BYEBYE\r\n").is_bye());
        assert!(!response(b"* OK BYE in text\r\n").is_bye());
        assert!(!response(b"A1 BYE\r\n").is_bye());
    }

    #[test]
    fn buffer_reclaim_clears_content() {
        let frame = response(b"* OK\r\n");
        let buffer = frame.into_buffer();
        assert!(buffer.is_empty());
    }
}
