//! Deadline enforcement for blocking reads.
//!
//! A single shared sweeper thread watches any number of in-flight
//! operations. Each watched operation carries a deadline, a
//! [`CancelToken`], and an [`Unblock`] handle; when the sweeper finds an
//! operation past its deadline it cancels the token and forces the
//! blocked thread out of its system call via the handle.
//!
//! Registration goes through a channel, so starting to watch an
//! operation never contends with the sweep itself. The race between an
//! operation finishing normally and the sweeper expiring it is
//! reconciled under a per-operation lock: whichever side moves the state
//! out of `Active` first wins, and both outcomes are terminal.

use std::{
    io,
    net::{Shutdown, TcpStream},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use crate::connection::CancelToken;

/// Forces a thread out of a blocking read.
///
/// Cancelling the token alone is not enough: a thread parked inside a
/// system call never gets to observe the flag. The handle supplies the
/// kick that makes the call return.
pub trait Unblock: Send + Sync {
    fn unblock(&self);
}

/// Wakes a thread blocked in [`std::thread::park_timeout`] or similar.
impl Unblock for thread::Thread {
    fn unblock(&self) {
        self.unpark();
    }
}

/// Tears the socket down in both directions; pending and future reads
/// return immediately. Use a [`TcpStream::try_clone`] of the stream the
/// connection owns.
impl Unblock for TcpStream {
    fn unblock(&self) {
        // The socket may already be gone; expiry must not fail on that.
        let _ = self.shutdown(Shutdown::Both);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpState {
    Active,
    /// The sweeper fired. Terminal.
    Expired,
    /// The operation finished on its own. Terminal.
    Retired,
}

struct WatchedOp {
    deadline: Instant,
    token: CancelToken,
    unblock: Box<dyn Unblock>,
    state: Mutex<OpState>,
}

impl WatchedOp {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, OpState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sweeper side. Returns whether the sweeper should keep watching.
    fn expire_if_due(&self, now: Instant) -> bool {
        let mut state = self.lock_state();
        match *state {
            OpState::Active if now >= self.deadline => {
                *state = OpState::Expired;
                self.token.cancel();
                self.unblock.unblock();
                log::warn!(
                    "blocking read exceeded its deadline; forcing interruption"
                );
                false
            }
            OpState::Active => true,
            OpState::Expired | OpState::Retired => false,
        }
    }

    /// Owner side, when the operation finishes normally.
    fn retire(&self) {
        let mut state = self.lock_state();
        match *state {
            OpState::Active => *state = OpState::Retired,
            // The sweeper won the race. The read already returned (or is
            // about to return) interrupted; clear the residual cancel
            // request so the connection's next read starts clean.
            OpState::Expired => self.token.clear(),
            OpState::Retired => {}
        }
    }

    fn is_expired(&self) -> bool {
        *self.lock_state() == OpState::Expired
    }
}

enum SweeperMsg {
    Watch(Arc<WatchedOp>),
    Poison,
}

/// Shared sweeper for blocking-read deadlines.
///
/// One instance (and one background thread) serves an entire process;
/// operations from any number of connections register against it. Dropping
/// the watchdog shuts the sweeper down and joins the thread.
#[derive(Debug)]
pub struct ReadWatchdog {
    sender: mpsc::Sender<SweeperMsg>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ReadWatchdog {
    /// Starts the sweeper thread; deadlines are checked every `interval`.
    ///
    /// Expiry is therefore detected up to one interval late. Pick an
    /// interval well below the smallest timeout you intend to register.
    pub fn new(interval: Duration) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("imap-wire-watchdog".into())
            .spawn(move || sweep_loop(receiver, interval))?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Puts an operation under watch until the guard is dropped.
    ///
    /// `token` must be the [`CancelToken`] the blocking read observes and
    /// `unblock` the handle that forces its stream out of the kernel.
    /// Drop the guard as soon as the read returns.
    pub fn watch(
        &self,
        timeout: Duration,
        token: CancelToken,
        unblock: Box<dyn Unblock>,
    ) -> WatchGuard {
        let op = Arc::new(WatchedOp {
            deadline: Instant::now() + timeout,
            token,
            unblock,
            state: Mutex::new(OpState::Active),
        });

        // Failure means the sweeper is already gone; the guard then
        // simply never expires, which only happens during shutdown.
        let _ = self.sender.send(SweeperMsg::Watch(Arc::clone(&op)));

        WatchGuard { op }
    }
}

impl Drop for ReadWatchdog {
    fn drop(&mut self) {
        let _ = self.sender.send(SweeperMsg::Poison);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Live registration of one operation with the watchdog.
///
/// Dropping the guard retires the operation; after that the sweeper will
/// never interrupt it.
#[derive(Debug)]
pub struct WatchGuard {
    op: Arc<WatchedOp>,
}

impl WatchGuard {
    /// Whether the watchdog expired this operation.
    ///
    /// Useful to distinguish a watchdog-forced interruption from an
    /// externally cancelled token after the read returns.
    pub fn is_expired(&self) -> bool {
        self.op.is_expired()
    }

    /// Retires the operation immediately; equivalent to dropping the
    /// guard.
    pub fn retire(self) {}
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.op.retire();
    }
}

impl std::fmt::Debug for WatchedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedOp")
            .field("deadline", &self.deadline)
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

fn sweep_loop(receiver: mpsc::Receiver<SweeperMsg>, interval: Duration) {
    let mut ops: Vec<Arc<WatchedOp>> = Vec::new();
    let mut next_sweep = Instant::now() + interval;

    loop {
        let wait = next_sweep.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(wait) {
            Ok(SweeperMsg::Watch(op)) => ops.push(op),
            Ok(SweeperMsg::Poison) => return,
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                ops.retain(|op| op.expire_if_due(now));
                next_sweep = now + interval;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingUnblock(Arc<AtomicUsize>);

    impl Unblock for CountingUnblock {
        fn unblock(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (Box<CountingUnblock>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (Box::new(CountingUnblock(Arc::clone(&count))), count)
    }

    #[test]
    fn expiry_cancels_and_unblocks() {
        let watchdog = ReadWatchdog::new(Duration::from_millis(10)).unwrap();
        let token = CancelToken::new();
        let (unblock, kicks) = counting();

        let guard = watchdog.watch(Duration::from_millis(20), token.clone(), unblock);
        thread::sleep(Duration::from_millis(150));

        assert!(guard.is_expired());
        assert!(token.is_cancelled());
        assert_eq!(kicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retired_operation_is_left_alone() {
        let watchdog = ReadWatchdog::new(Duration::from_millis(10)).unwrap();
        let token = CancelToken::new();
        let (unblock, kicks) = counting();

        let guard = watchdog.watch(Duration::from_millis(20), token.clone(), unblock);
        drop(guard);
        thread::sleep(Duration::from_millis(150));

        assert!(!token.is_cancelled());
        assert_eq!(kicks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn retire_after_expiry_clears_the_token() {
        let watchdog = ReadWatchdog::new(Duration::from_millis(10)).unwrap();
        let token = CancelToken::new();
        let (unblock, _kicks) = counting();

        let guard = watchdog.watch(Duration::from_millis(20), token.clone(), unblock);
        thread::sleep(Duration::from_millis(150));
        assert!(token.is_cancelled());

        drop(guard);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn deadlines_are_independent() {
        let watchdog = ReadWatchdog::new(Duration::from_millis(10)).unwrap();
        let short_token = CancelToken::new();
        let long_token = CancelToken::new();
        let (short_unblock, _) = counting();
        let (long_unblock, long_kicks) = counting();

        let short = watchdog.watch(Duration::from_millis(20), short_token.clone(), short_unblock);
        let long = watchdog.watch(Duration::from_secs(60), long_token.clone(), long_unblock);
        thread::sleep(Duration::from_millis(150));

        assert!(short.is_expired());
        assert!(!long.is_expired());
        assert!(!long_token.is_cancelled());
        assert_eq!(long_kicks.load(Ordering::SeqCst), 0);
        drop(long);
    }

    #[test]
    fn drop_joins_the_sweeper() {
        let watchdog = ReadWatchdog::new(Duration::from_millis(10)).unwrap();
        drop(watchdog);
        // Nothing to assert; the test is that drop returns.
    }
}
