//! Capability traits shared by every queue variant.
//!
//! Each variant implements only the traits its handles can honor:
//!
//! | Trait      | Provides                                                 |
//! |------------|----------------------------------------------------------|
//! | [`Queue`]  | capacity and size queries                                |
//! | [`Offer`]  | nonblocking `offer`, timed `offer_timeout`, `fill`       |
//! | [`Poll`]   | nonblocking `poll`, timed `poll_timeout`, the drains     |
//! | [`Put`]    | blocking `put` (blocking MPSC producers only)            |
//! | [`Take`]   | blocking `take` (blocking MPSC consumers only)           |
//!
//! The timed and batch operations are provided methods built on the variant's
//! own `offer`/`poll`, retried with the progressive [`Backoff`].

use std::cell::Cell;
use std::marker::PhantomData;

use thiserror::Error;

use crate::backoff::{self, Backoff, Timeout};
use crate::config::BackoffConfig;
use crate::interrupt::{self, Interrupted};

/// Marker type to opt-out of `Sync` while remaining `Send`.
pub(crate) type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// A timed or blocking offer gave up; the item is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OfferError<T> {
    /// The queue stayed full until the timeout elapsed.
    #[error("queue stayed full until the timeout elapsed")]
    Full(T),
    /// The waiting thread was interrupted.
    #[error("interrupted while waiting for queue space")]
    Interrupted(T),
}

impl<T> OfferError<T> {
    /// Recovers the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Interrupted(item) => item,
        }
    }

    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

/// Outcome of [`Offer::fill`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Fill<T> {
    /// Items enqueued.
    pub filled: usize,
    /// An item taken from the supplier that the queue no longer had room for.
    pub rejected: Option<T>,
}

/// Capacity queries common to every handle.
pub trait Queue {
    /// Effective capacity (the requested capacity rounded up to a power of two).
    fn capacity(&self) -> usize;

    /// Items currently enqueued.
    ///
    /// Best effort under concurrency: the value may be stale as soon as it is
    /// returned. Always within `0..=capacity()`.
    fn size(&self) -> usize;

    /// Wait schedule used by the timed operations of this queue.
    ///
    /// Lives here rather than on [`Offer`]/[`Poll`] because both the
    /// producer and the consumer handle carry the queue's
    /// [`QueueConfig::backoff`](crate::QueueConfig::backoff), and the provided
    /// `offer_timeout`, `poll_timeout` and `drain_while` read it through the
    /// shared supertrait.
    fn backoff_config(&self) -> &BackoffConfig;

    /// `capacity() - size()`, with the same staleness as [`Queue::size`].
    fn remaining_capacity(&self) -> usize {
        self.capacity().saturating_sub(self.size())
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// Producer side of a queue.
pub trait Offer<T>: Queue {
    /// Enqueues `item` without blocking.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full. This is ordinary
    /// backpressure: the caller decides whether to drop, retry or block.
    fn offer(&self, item: T) -> Result<(), T>;

    /// Retries [`Offer::offer`] with progressive backoff until it succeeds or
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`OfferError::Full`] once the deadline passes,
    /// [`OfferError::Interrupted`] as soon as the thread is interrupted. The
    /// item is returned in both cases and never left half-enqueued.
    fn offer_timeout(&self, mut item: T, timeout: Timeout) -> Result<(), OfferError<T>> {
        let deadline = timeout.deadline();
        let mut backoff = Backoff::new(self.backoff_config());
        loop {
            match self.offer(item) {
                Ok(()) => return Ok(()),
                Err(rejected) => item = rejected,
            }
            if interrupt::interrupted() {
                return Err(OfferError::Interrupted(item));
            }
            if backoff::expired(deadline) {
                return Err(OfferError::Full(item));
            }
            backoff.snooze(deadline);
        }
    }

    /// Offers up to `limit` items pulled from `supplier`.
    ///
    /// Stops when the supplier returns `None`, when `limit` is reached, or
    /// at the first rejected offer. The supplier is not asked for an item
    /// while the queue reports no remaining capacity.
    fn fill<F>(&self, mut supplier: F, limit: usize) -> Fill<T>
    where
        F: FnMut() -> Option<T>,
    {
        let mut filled = 0;
        while filled < limit && self.remaining_capacity() > 0 {
            let Some(item) = supplier() else {
                break;
            };
            if let Err(item) = self.offer(item) {
                return Fill {
                    filled,
                    rejected: Some(item),
                };
            }
            filled += 1;
        }
        Fill {
            filled,
            rejected: None,
        }
    }
}

/// Consumer side of a queue.
pub trait Poll<T>: Queue {
    /// Dequeues the next item without blocking, `None` if none is visible.
    fn poll(&self) -> Option<T>;

    /// Retries [`Poll::poll`] with progressive backoff until an item arrives
    /// or `timeout` elapses (`Ok(None)`).
    ///
    /// # Errors
    ///
    /// [`Interrupted`] as soon as the thread is interrupted.
    fn poll_timeout(&self, timeout: Timeout) -> Result<Option<T>, Interrupted> {
        let deadline = timeout.deadline();
        let mut backoff = Backoff::new(self.backoff_config());
        loop {
            if let Some(item) = self.poll() {
                return Ok(Some(item));
            }
            interrupt::check()?;
            if backoff::expired(deadline) {
                return Ok(None);
            }
            backoff.snooze(deadline);
        }
    }

    /// Polls up to `limit` items into `consumer`, stopping early when empty.
    /// Returns the number drained.
    fn drain_limit<F>(&self, mut consumer: F, limit: usize) -> usize
    where
        F: FnMut(T),
    {
        let mut drained = 0;
        while drained < limit {
            let Some(item) = self.poll() else {
                break;
            };
            consumer(item);
            drained += 1;
        }
        drained
    }

    /// [`Poll::drain_limit`] bounded by [`Queue::capacity`], so producers that
    /// outpace the consumer cannot keep it here forever.
    fn drain<F>(&self, consumer: F) -> usize
    where
        F: FnMut(T),
    {
        self.drain_limit(consumer, self.capacity())
    }

    /// Background consumer loop: drains while `keep_running` holds, backing
    /// off progressively whenever the queue is empty. Returns the total
    /// drained.
    fn drain_while<F, K>(&self, mut consumer: F, mut keep_running: K) -> usize
    where
        F: FnMut(T),
        K: FnMut() -> bool,
    {
        let mut backoff = Backoff::new(self.backoff_config());
        let mut total = 0;
        while keep_running() {
            let drained = self.drain(&mut consumer);
            if drained == 0 {
                backoff.snooze(None);
            } else {
                backoff.reset();
                total += drained;
            }
        }
        total
    }
}

/// Blocking producer side.
pub trait Put<T>: Offer<T> {
    /// Enqueues `item`, waiting for space as long as necessary.
    ///
    /// # Errors
    ///
    /// [`OfferError::Interrupted`] with the item if the thread is interrupted
    /// while waiting.
    fn put(&self, item: T) -> Result<(), OfferError<T>>;
}

/// Blocking consumer side.
pub trait Take<T>: Poll<T> {
    /// Dequeues the next item, waiting for one as long as necessary.
    ///
    /// # Errors
    ///
    /// [`Interrupted`] if the thread is interrupted while waiting.
    fn take(&self) -> Result<T, Interrupted>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    use minstant::Instant;

    /// Single-threaded reference queue exercising the provided methods.
    struct Local {
        items: RefCell<VecDeque<u32>>,
        capacity: usize,
        backoff: BackoffConfig,
    }

    impl Local {
        fn new(capacity: usize) -> Self {
            Self {
                items: RefCell::new(VecDeque::new()),
                capacity,
                backoff: BackoffConfig {
                    spin_limit: 1,
                    yield_limit: 2,
                    max_park: Duration::from_micros(200),
                },
            }
        }
    }

    impl Queue for Local {
        fn capacity(&self) -> usize {
            self.capacity
        }

        fn size(&self) -> usize {
            self.items.borrow().len()
        }

        fn backoff_config(&self) -> &BackoffConfig {
            &self.backoff
        }
    }

    impl Offer<u32> for Local {
        fn offer(&self, item: u32) -> Result<(), u32> {
            let mut items = self.items.borrow_mut();
            if items.len() == self.capacity {
                return Err(item);
            }
            items.push_back(item);
            Ok(())
        }
    }

    impl Poll<u32> for Local {
        fn poll(&self) -> Option<u32> {
            self.items.borrow_mut().pop_front()
        }
    }

    #[test]
    fn test_fill_stops_at_limit() {
        let queue = Local::new(8);
        let mut next = 0;
        let fill = queue.fill(
            || {
                next += 1;
                Some(next)
            },
            3,
        );
        assert_eq!(
            fill,
            Fill {
                filled: 3,
                rejected: None
            }
        );
        assert_eq!(queue.size(), 3);
    }

    #[test]
    fn test_fill_stops_at_capacity_without_pulling() {
        let queue = Local::new(4);
        let mut pulled = 0;
        let fill = queue.fill(
            || {
                pulled += 1;
                Some(pulled)
            },
            100,
        );
        assert_eq!(fill.filled, 4);
        assert_eq!(fill.rejected, None);
        assert_eq!(pulled, 4);
        assert_eq!(queue.remaining_capacity(), 0);
    }

    #[test]
    fn test_fill_stops_when_supplier_exhausted() {
        let queue = Local::new(8);
        let mut source = vec![1, 2].into_iter();
        let fill = queue.fill(|| source.next(), 10);
        assert_eq!(fill.filled, 2);
    }

    #[test]
    fn test_drain_limit_and_drain() {
        let queue = Local::new(8);
        for i in 0..6 {
            queue.offer(i).unwrap();
        }

        let mut seen = Vec::new();
        assert_eq!(queue.drain_limit(|i| seen.push(i), 2), 2);
        assert_eq!(seen, vec![0, 1]);

        assert_eq!(queue.drain(|i| seen.push(i)), 4);
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);

        assert_eq!(queue.drain(|i| seen.push(i)), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_while_runs_until_told_to_stop() {
        let queue = Local::new(8);
        for i in 0..5 {
            queue.offer(i).unwrap();
        }

        let mut rounds = 0;
        let total = queue.drain_while(
            |_| {},
            || {
                rounds += 1;
                rounds <= 3
            },
        );
        assert_eq!(total, 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_offer_timeout_gives_up_after_deadline() {
        let queue = Local::new(1);
        queue.offer(1).unwrap();

        let timeout = Duration::from_millis(20);
        let start = Instant::now();
        let result = queue.offer_timeout(2, Timeout::Duration(timeout));
        assert_eq!(result, Err(OfferError::Full(2)));
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_poll_timeout_returns_none_after_deadline() {
        let queue = Local::new(1);
        let timeout = Duration::from_millis(20);
        let start = Instant::now();
        assert_eq!(queue.poll_timeout(Timeout::Duration(timeout)), Ok(None));
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_timed_ops_honor_pending_interrupt() {
        let queue = Local::new(1);
        queue.offer(1).unwrap();

        interrupt::current().interrupt();
        let err = queue.offer_timeout(2, Timeout::Infinite).unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(err.into_inner(), 2);

        assert_eq!(queue.poll(), Some(1));
        interrupt::current().interrupt();
        assert_eq!(queue.poll_timeout(Timeout::Infinite), Err(Interrupted));
    }

    #[test]
    fn test_timed_ops_succeed_immediately_when_possible() {
        let queue = Local::new(2);
        assert_eq!(
            queue.offer_timeout(7, Timeout::Duration(Duration::ZERO)),
            Ok(())
        );
        assert_eq!(
            queue.poll_timeout(Timeout::Duration(Duration::ZERO)),
            Ok(Some(7))
        );
    }
}
