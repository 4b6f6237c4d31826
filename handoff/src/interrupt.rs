//! Cooperative thread interruption for waiting operations.
//!
//! A thread obtains its own [`Interrupter`] with [`current`] and hands it to
//! whoever may need to cancel its waits (usually the pipeline's shutdown
//! path). [`Interrupter::interrupt`] raises a per-thread flag and wakes the
//! thread whether it is parked in a timed backoff or blocked on a condition
//! variable inside a blocking queue. The waiting operation observes the flag,
//! clears it, and returns [`Interrupted`] with the queue left untouched.
//!
//! # Example
//!
//! ```
//! use std::sync::mpsc::channel;
//! use handoff::{Take, blocking, interrupt};
//!
//! let (_producer, consumer) = blocking::channel::<u64>(4).unwrap();
//! let (tx, rx) = channel();
//!
//! let waiter = std::thread::spawn(move || {
//!     tx.send(interrupt::current()).unwrap();
//!     consumer.take()
//! });
//!
//! rx.recv().unwrap().interrupt();
//! assert!(waiter.join().unwrap().is_err());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, Thread};

use thiserror::Error;

use crate::trace::debug;

/// A wait was cut short by [`Interrupter::interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted while waiting on queue")]
pub struct Interrupted;

/// Something a blocked thread sleeps on that an interrupt must rouse.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

#[derive(Default)]
struct State {
    flag: AtomicBool,
    waker: Mutex<Option<Arc<dyn Wake>>>,
}

thread_local! {
    static CURRENT: Arc<State> = Arc::new(State::default());
}

/// Handle that interrupts one specific thread.
#[derive(Clone)]
pub struct Interrupter {
    state: Arc<State>,
    thread: Thread,
}

impl Interrupter {
    /// Interrupts the owning thread.
    ///
    /// If the thread is currently waiting in a timed or blocking queue
    /// operation it returns promptly with [`Interrupted`]; otherwise its next
    /// wait does. The flag stays raised until a wait observes it or the
    /// thread calls [`interrupted`].
    pub fn interrupt(&self) {
        self.state.flag.store(true, Ordering::SeqCst);
        let waker = self
            .state
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(
            thread = ?self.thread.id(),
            blocked = waker.is_some(),
            "delivering interrupt"
        );
        if let Some(waker) = waker {
            waker.wake();
        }
        self.thread.unpark();
    }

    /// Whether the flag is raised, without clearing it.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter")
            .field("thread", &self.thread.id())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Returns the [`Interrupter`] for the calling thread.
#[must_use]
pub fn current() -> Interrupter {
    Interrupter {
        state: CURRENT.with(Arc::clone),
        thread: thread::current(),
    }
}

/// Tests and clears the calling thread's interrupt flag.
pub fn interrupted() -> bool {
    CURRENT.with(|state| state.flag.swap(false, Ordering::SeqCst))
}

/// Converts a raised flag into an error, clearing it.
#[inline]
pub(crate) fn check() -> Result<(), Interrupted> {
    if interrupted() {
        Err(Interrupted)
    } else {
        Ok(())
    }
}

/// Registers `waker` for the calling thread until the guard drops.
///
/// Must be called before the final flag check preceding a condition-variable
/// wait, so an interrupt racing with that check still wakes the waiter.
pub(crate) fn register(waker: Arc<dyn Wake>) -> Registration {
    let state = CURRENT.with(Arc::clone);
    *state.waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(waker);
    Registration { state }
}

pub(crate) struct Registration {
    state: Arc<State>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        *self
            .state
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
