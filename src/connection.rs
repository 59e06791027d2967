//! Duplex connection state shared by the encoder and the decoder.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::error::WireError;

/// Cloneable cancellation flag observed by blocking reads.
///
/// Setting the token is a *request* to unblock, not a guarantee: the
/// blocked read observes it at its own granularity (per byte for lines,
/// per chunk for literals). The reader clears the flag on exit so a
/// subsequent unrelated read on the same connection starts clean.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the current blocking read returns.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Resets the token so the next blocking call is unaffected.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A duplex IMAP channel plus the negotiated state the wire layer needs.
///
/// Transport setup (TLS, authentication, pooling) happens elsewhere; the
/// stream arrives here fully established. Wrap the stream in a
/// [`std::io::BufReader`]-style adapter if the transport does not buffer
/// on its own — the line phase of the decoder reads single bytes.
pub struct Connection<S> {
    pub(crate) stream: S,
    host: String,
    user: Option<String>,
    non_sync_literals: bool,
    utf8_accepted: bool,
    max_response_len: Option<usize>,
    cancel: CancelToken,
}

impl<S> Connection<S> {
    pub fn new(stream: S, host: impl Into<String>) -> Self {
        Self {
            stream,
            host: host.into(),
            user: None,
            non_sync_literals: false,
            utf8_accepted: false,
            max_response_len: None,
            cancel: CancelToken::new(),
        }
    }

    /// Attaches the authenticated user for error diagnostics.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Whether the peer accepts non-synchronizing literals (`{n+}`).
    pub fn set_non_sync_literals(&mut self, enabled: bool) {
        self.non_sync_literals = enabled;
    }

    /// Whether the peer accepts unencoded high-bit bytes in quoted strings.
    pub fn set_utf8_accepted(&mut self, enabled: bool) {
        self.utf8_accepted = enabled;
    }

    /// Upper bound for a single response frame, literals included.
    ///
    /// `None` disables the guard. The limit is connection state passed in
    /// explicitly; there is no ambient or thread-local fallback.
    pub fn set_max_response_len(&mut self, limit: Option<usize>) {
        self.max_response_len = limit;
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn non_sync_literals(&self) -> bool {
        self.non_sync_literals
    }

    pub fn utf8_accepted(&self) -> bool {
        self.utf8_accepted
    }

    pub fn max_response_len(&self) -> Option<usize> {
        self.max_response_len
    }

    /// The token a watchdog registration should cancel on expiry.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn clear_interrupt(&self) {
        self.cancel.clear();
    }

    pub(crate) fn interrupted_error(&self) -> WireError {
        WireError::Interrupted {
            host: self.host.clone(),
            user: self.user.clone(),
        }
    }

    pub(crate) fn dropped_error(&self) -> WireError {
        WireError::ConnectionDropped {
            host: self.host.clone(),
            user: self.user.clone(),
        }
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("non_sync_literals", &self.non_sync_literals)
            .field("utf8_accepted", &self.utf8_accepted)
            .field("max_response_len", &self.max_response_len)
            .finish_non_exhaustive()
    }
}
