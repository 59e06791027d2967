use thiserror::Error;

/// Errors surfaced by the wire layer.
///
/// Every variant is distinct; none of them overlap. The codec neither
/// retries nor logs — classification and policy belong to the caller:
///
/// * [`WireError::ConnectionDropped`] and [`WireError::ResponseTooLarge`]
///   are fatal to the connection.
/// * [`WireError::Interrupted`] is recoverable; the caller may abandon the
///   current wait without closing the connection, provided no partial
///   command write is outstanding.
/// * [`WireError::LiteralRejected`] is fatal to the in-progress command,
///   not necessarily to the connection.
/// * [`WireError::Encoding`] is raised synchronously at encode time,
///   before any bytes hit the wire.
#[derive(Debug, Error)]
pub enum WireError {
    /// End-of-stream in the middle of a response frame.
    #[error("connection to {host} dropped while reading a response (user: {user:?})")]
    ConnectionDropped {
        host: String,
        user: Option<String>,
    },

    /// A cooperative cancellation was observed during a blocking read,
    /// either set explicitly or forced by the watchdog.
    #[error("read on connection to {host} was interrupted (user: {user:?})")]
    Interrupted {
        host: String,
        user: Option<String>,
    },

    /// The response would exceed the configured maximum length.
    #[error("response exceeds the maximum allowed length of {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// Charset conversion failed while encoding a string argument.
    #[error("cannot encode string argument using charset {charset:?}")]
    Encoding { charset: String },

    /// A tagged or BYE response arrived while waiting for the
    /// continuation of a synchronizing literal.
    #[error("server rejected literal: {}", String::from_utf8_lossy(response))]
    LiteralRejected { response: Vec<u8> },

    /// Transport failure below the wire layer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
