//! In-memory stream doubles shared by the unit tests.

use std::io::{Cursor, Read, Write};

use crate::connection::Connection;

/// Duplex stream double: reads come from a fixed script, writes are
/// captured for assertions.
#[derive(Debug)]
pub(crate) struct FakeStream {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl FakeStream {
    pub(crate) fn new(input: &[u8]) -> Self {
        Self {
            input: Cursor::new(input.to_vec()),
            output: Vec::new(),
        }
    }
}

impl Read for FakeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for FakeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) fn connection(input: &[u8], host: &str) -> Connection<FakeStream> {
    Connection::new(FakeStream::new(input), host)
}

pub(crate) fn connection_with_input(input: &[u8]) -> Connection<FakeStream> {
    connection(input, "testhost")
}

/// Everything written to the connection so far.
pub(crate) fn output(conn: Connection<FakeStream>) -> Vec<u8> {
    conn.into_inner().output
}
