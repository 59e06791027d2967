//! Wire value model and the argument encoder.
//!
//! [`Arguments`] accumulates command parameters as tagged [`WireValue`]s
//! and serializes them onto a connection in one pass, choosing the
//! minimal legal encoding for each string (atom, quoted string, or
//! literal) and negotiating synchronizing literals with the peer.

use std::io::{Read, Write};

use crate::{connection::Connection, error::WireError};

/// Strings longer than this are always sent as literals; the quoting and
/// atom rules are not even consulted.
const LITERAL_THRESHOLD: usize = 1024;

/// A single wire value accumulated by the encoder.
///
/// Closed set; selected by `match` at write time.
enum WireValue {
    /// Unescaped token. The caller guarantees legal atom characters.
    Atom(String),
    /// Atom-or-string: encoded as atom, quoted string, or literal
    /// depending on content.
    AString(Vec<u8>),
    /// Nullable string; absence encodes as the bare token `NIL`.
    NString(Option<Vec<u8>>),
    /// Length-prefixed raw byte block.
    Literal(Vec<u8>),
    /// Length-prefixed block whose payload is drained from a reader at
    /// write time, so large payloads need not be buffered in full.
    Stream {
        reader: Box<dyn Read + Send>,
        size: usize,
    },
    /// Parenthesised nested argument list.
    Nested(Arguments),
}

impl std::fmt::Debug for WireValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atom(text) => f.debug_tuple("Atom").field(text).finish(),
            Self::AString(bytes) => f.debug_tuple("AString").field(bytes).finish(),
            Self::NString(bytes) => f.debug_tuple("NString").field(bytes).finish(),
            Self::Literal(bytes) => f.debug_tuple("Literal").field(bytes).finish(),
            Self::Stream { size, .. } => {
                f.debug_struct("Stream").field("size", size).finish_non_exhaustive()
            }
            Self::Nested(nested) => f.debug_tuple("Nested").field(nested).finish(),
        }
    }
}

#[derive(Debug)]
struct Item {
    value: WireValue,
    /// Whether a delimiting space precedes this value. Only ever false
    /// for the first value spliced in by
    /// [`Arguments::append_without_leading_space`].
    delimit: bool,
}

/// Ordered list of command arguments.
///
/// All `write_*` methods only accumulate; nothing touches the wire until
/// [`Arguments::write`]. They return `&mut Self` for chaining:
///
/// ```
/// use imap_wire::Arguments;
///
/// let mut args = Arguments::new();
/// args.write_atom("LOGIN").write_string("alice").write_string("p a s s");
/// ```
#[derive(Debug, Default)]
pub struct Arguments {
    items: Vec<Item>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an atom. No escaping or validation is performed.
    pub fn write_atom(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(WireValue::Atom(text.into()))
    }

    /// Appends an atom glued to the previous value, with no delimiting
    /// space. Used to join adjacent parts of one wire token, e.g. a
    /// section suffix after an item name.
    pub fn write_atom_without_leading_space(&mut self, text: impl Into<String>) -> &mut Self {
        self.items.push(Item {
            value: WireValue::Atom(text.into()),
            delimit: false,
        });
        self
    }

    /// Appends an astring from the UTF-8 bytes of `text`.
    pub fn write_string(&mut self, text: &str) -> &mut Self {
        self.push(WireValue::AString(text.as_bytes().to_vec()))
    }

    /// Appends an astring, converting `text` with the given charset.
    ///
    /// Fails synchronously — before any bytes are written — when the
    /// charset label is unknown or `text` has no representation in it.
    pub fn write_string_with_charset(
        &mut self,
        text: &str,
        charset: &str,
    ) -> Result<&mut Self, WireError> {
        let bytes = convert(text, charset)?;
        Ok(self.push(WireValue::AString(bytes)))
    }

    /// Appends a nullable string; `None` encodes as `NIL`.
    pub fn write_nstring(&mut self, text: Option<&str>) -> &mut Self {
        self.push(WireValue::NString(text.map(|s| s.as_bytes().to_vec())))
    }

    /// Appends a nullable string, converting with the given charset.
    pub fn write_nstring_with_charset(
        &mut self,
        text: Option<&str>,
        charset: &str,
    ) -> Result<&mut Self, WireError> {
        let bytes = match text {
            Some(text) => Some(convert(text, charset)?),
            None => None,
        };
        Ok(self.push(WireValue::NString(bytes)))
    }

    /// Appends an opaque payload, always sent as a literal.
    pub fn write_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.push(WireValue::Literal(bytes.into()))
    }

    /// Appends a literal whose payload is drained from `reader` at write
    /// time. `size` is the declared byte count; the reader must yield at
    /// least that many bytes, and any excess is left unread.
    ///
    /// The reader is consumed by [`Arguments::write`]; a value appended
    /// this way can only be written once.
    pub fn write_stream(&mut self, reader: impl Read + Send + 'static, size: usize) -> &mut Self {
        self.push(WireValue::Stream {
            reader: Box::new(reader),
            size,
        })
    }

    /// Appends the decimal ASCII form of `number`.
    pub fn write_number(&mut self, number: i64) -> &mut Self {
        self.push(WireValue::Atom(number.to_string()))
    }

    /// Appends a nested argument list, parenthesised at write time.
    pub fn write_argument(&mut self, nested: Arguments) -> &mut Self {
        self.push(WireValue::Nested(nested))
    }

    /// Concatenates all of `other`'s values as siblings.
    pub fn append(&mut self, other: Arguments) -> &mut Self {
        self.items.extend(other.items);
        self
    }

    /// Concatenates `other` with the delimiting space before its first
    /// value suppressed.
    ///
    /// Needed when two encoders build adjacent parts of one wire token
    /// rather than sibling arguments.
    pub fn append_without_leading_space(&mut self, other: Arguments) -> &mut Self {
        let mut items = other.items.into_iter();
        if let Some(mut first) = items.next() {
            first.delimit = false;
            self.items.push(first);
        }
        self.items.extend(items);
        self
    }

    /// Serializes the accumulated values onto the connection.
    ///
    /// Values are separated by single spaces (unless suppressed via
    /// [`Arguments::append_without_leading_space`]). Synchronizing
    /// literals flush the stream and wait for the server's continuation
    /// by reading responses on the same connection; a tagged or BYE
    /// response in that gap fails with [`WireError::LiteralRejected`].
    ///
    /// The final flush is left to the caller, which typically still
    /// appends the command's CRLF.
    ///
    /// Takes `&mut self` because stream-backed literals are drained as
    /// they are written.
    pub fn write<S: Read + Write>(&mut self, conn: &mut Connection<S>) -> Result<(), WireError> {
        let mut first = true;
        for item in &mut self.items {
            if first {
                first = false;
            } else if item.delimit {
                conn.stream.write_all(b" ")?;
            }

            match &mut item.value {
                WireValue::Atom(text) => conn.stream.write_all(text.as_bytes())?,
                WireValue::AString(bytes) => write_astring(conn, bytes, false)?,
                WireValue::NString(None) => conn.stream.write_all(b"NIL")?,
                WireValue::NString(Some(bytes)) => write_astring(conn, bytes, true)?,
                WireValue::Literal(bytes) => write_literal(conn, bytes)?,
                WireValue::Stream { reader, size } => {
                    write_literal_stream(conn, reader.as_mut(), *size)?
                }
                WireValue::Nested(nested) => {
                    conn.stream.write_all(b"(")?;
                    nested.write(conn)?;
                    conn.stream.write_all(b")")?;
                }
            }
        }

        Ok(())
    }

    fn push(&mut self, value: WireValue) -> &mut Self {
        self.items.push(Item {
            value,
            delimit: true,
        });
        self
    }
}

fn convert(text: &str, charset: &str) -> Result<Vec<u8>, WireError> {
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes()).ok_or_else(|| {
        WireError::Encoding {
            charset: charset.to_owned(),
        }
    })?;

    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(WireError::Encoding {
            charset: charset.to_owned(),
        });
    }

    Ok(bytes.into_owned())
}

/// Emits `bytes` as atom, quoted string, or literal — whichever is the
/// minimal legal encoding for the content.
///
/// `quote` forces at least quoted-string form; nstrings pass `true` so a
/// present value can never collide with the `NIL` token or an atom.
fn write_astring<S: Read + Write>(
    conn: &mut Connection<S>,
    bytes: &[u8],
    quote: bool,
) -> Result<(), WireError> {
    // Large values bypass the quoting and atom rules entirely.
    if bytes.len() > LITERAL_THRESHOLD {
        return write_literal(conn, bytes);
    }

    let utf8 = conn.utf8_accepted();

    // A zero-length literal is not a valid empty atom on the wire.
    let mut quote = quote || bytes.is_empty();
    let mut escape = false;

    for &byte in bytes {
        if byte == 0 || byte == b'\r' || byte == b'\n' || (!utf8 && byte > 0x7f) {
            // These can never appear inside a quoted string.
            return write_literal(conn, bytes);
        }
        if matches!(
            byte,
            b'*' | b'%' | b'(' | b')' | b'{' | b'}' | b'"' | b'\\'
        ) || byte <= b' '
            || byte > 0x7f
        {
            quote = true;
            if byte == b'"' || byte == b'\\' {
                escape = true;
            }
        }
    }

    // The bare token NIL is the protocol's null marker; quote the text
    // "NIL" (any case) so the two stay distinguishable.
    if !quote && bytes.len() == 3 && bytes.eq_ignore_ascii_case(b"NIL") {
        quote = true;
    }

    if !quote {
        return Ok(conn.stream.write_all(bytes)?);
    }

    conn.stream.write_all(b"\"")?;
    if escape {
        for &byte in bytes {
            if byte == b'"' || byte == b'\\' {
                conn.stream.write_all(b"\\")?;
            }
            conn.stream.write_all(&[byte])?;
        }
    } else {
        conn.stream.write_all(bytes)?;
    }
    conn.stream.write_all(b"\"")?;

    Ok(())
}

/// Emits a length-prefixed literal, negotiating the synchronizing form
/// when the connection did not advertise non-synchronizing literals.
fn write_literal<S: Read + Write>(
    conn: &mut Connection<S>,
    bytes: &[u8],
) -> Result<(), WireError> {
    start_literal(conn, bytes.len())?;
    conn.stream.write_all(bytes)?;
    Ok(())
}

/// As [`write_literal`], but drains the payload from `reader` instead of
/// a buffered slice. The reader must yield at least `size` bytes.
fn write_literal_stream<S, R>(
    conn: &mut Connection<S>,
    reader: &mut R,
    size: usize,
) -> Result<(), WireError>
where
    S: Read + Write,
    R: Read + ?Sized,
{
    start_literal(conn, size)?;

    let copied = std::io::copy(&mut reader.take(size as u64), &mut conn.stream)?;
    if copied < size as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "literal source ended before its declared size",
        )
        .into());
    }

    Ok(())
}

/// Writes the `{n}`/`{n+}` header and, for a synchronizing literal,
/// waits for the server's continuation before the payload may follow.
fn start_literal<S: Read + Write>(conn: &mut Connection<S>, size: usize) -> Result<(), WireError> {
    let non_sync = conn.non_sync_literals();

    let mut header = format!("{{{size}");
    header.push_str(if non_sync { "+}\r\n" } else { "}\r\n" });
    conn.stream.write_all(header.as_bytes())?;

    if !non_sync {
        conn.stream.flush()?;

        // Wait for the server's go-ahead before transmitting the payload.
        let mut reuse = None;
        loop {
            let response = conn.read_response(reuse.take())?;
            if response.is_continuation() {
                break;
            }
            if response.is_tagged() || response.is_bye() {
                return Err(WireError::LiteralRejected {
                    response: response.into_bytes(),
                });
            }
            // Untagged responses arriving in the gap are dropped.
            reuse = Some(response.into_buffer());
        }
    }

    Ok(())
}
