//! Single-producer single-consumer queue.
//!
//! The cheapest variant: no CAS anywhere, one release store per operation.
//! Use it whenever the 1:1 access pattern is guaranteed.
//!
//! # Overview
//!
//! - [`Producer`] - write end (exactly one per queue)
//! - [`Consumer`] - read end (exactly one per queue)
//!
//! Both ends are [`Send`] but neither is [`Sync`] nor [`Clone`], so the
//! one-producer one-consumer contract is enforced by the compiler.
//!
//! # Example
//!
//! ```
//! use handoff::{Offer, Poll, spsc};
//!
//! let (producer, consumer) = spsc::channel::<String>(16).unwrap();
//!
//! producer.offer("hello".to_string()).unwrap();
//! assert_eq!(consumer.peek().as_deref(), Some("hello"));
//! assert_eq!(consumer.poll().as_deref(), Some("hello"));
//! ```
//!
//! # Compile-time guarantees
//!
//! Neither end can be shared between threads:
//!
//! ```compile_fail
//! # use handoff::spsc;
//! fn assert_sync<S: Sync>() {}
//! assert_sync::<spsc::Consumer<u64>>();
//! ```
//!
//! ```compile_fail
//! # use handoff::spsc;
//! fn assert_sync<S: Sync>() {}
//! assert_sync::<spsc::Producer<u64>>();
//! ```
//!
//! Nor duplicated:
//!
//! ```compile_fail
//! # use handoff::spsc;
//! let (producer, _consumer) = spsc::channel::<u64>(4).unwrap();
//! let _second = producer.clone();
//! ```
//!
//! ```compile_fail
//! # use handoff::spsc;
//! let (_producer, consumer) = spsc::channel::<u64>(4).unwrap();
//! let _second = consumer.clone();
//! ```
//!
//! Blocking operations belong to [`crate::blocking`] only:
//!
//! ```compile_fail
//! # use handoff::{Take, spsc};
//! let (_producer, consumer) = spsc::channel::<u64>(4).unwrap();
//! let _ = consumer.take();
//! ```

pub(crate) mod ring;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::capacity::{CapacityError, Layout};
use crate::config::{BackoffConfig, QueueConfig};
use crate::queue::{Offer, PhantomUnsync, Poll, Queue};
use crate::trace::debug;
use ring::Ring;

/// Write end of the SPSC queue.
pub struct Producer<T: Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Read end of the SPSC queue.
pub struct Consumer<T: Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Creates an SPSC queue holding at least `capacity` items.
///
/// # Errors
///
/// See [`crate::capacity::round_to_power_of_two`].
pub fn channel<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    channel_with_config(&QueueConfig::with_capacity(capacity))
}

/// Creates an SPSC queue from a [`QueueConfig`].
///
/// # Errors
///
/// See [`crate::capacity::round_to_power_of_two`].
pub fn channel_with_config<T: Send>(
    config: &QueueConfig,
) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    let layout = Layout::new(config.capacity)?;
    debug!(
        requested = config.capacity,
        capacity = layout.capacity(),
        "creating spsc queue"
    );

    let ring = Arc::new(Ring::new(layout, config.backoff));
    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };
    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };
    Ok((producer, consumer))
}

impl<T: Send> Queue for Producer<T> {
    fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    fn size(&self) -> usize {
        self.ring.size()
    }

    fn backoff_config(&self) -> &BackoffConfig {
        self.ring.backoff()
    }
}

impl<T: Send> Offer<T> for Producer<T> {
    #[inline]
    fn offer(&self, item: T) -> Result<(), T> {
        // SAFETY: Producer is neither Clone nor Sync, so this is the only
        // thread offering.
        unsafe { self.ring.offer(item) }
    }
}

impl<T: Send> Queue for Consumer<T> {
    fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    fn size(&self) -> usize {
        self.ring.size()
    }

    fn backoff_config(&self) -> &BackoffConfig {
        self.ring.backoff()
    }
}

impl<T: Send> Poll<T> for Consumer<T> {
    #[inline]
    fn poll(&self) -> Option<T> {
        // SAFETY: Consumer is neither Clone nor Sync, so this is the only
        // thread polling.
        unsafe { self.ring.poll() }
    }
}

impl<T: Send> Consumer<T> {
    /// Clones the next item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        // SAFETY: single consumer, see `poll`.
        unsafe { self.ring.peek() }
    }

    /// Drops every item currently visible, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.drain(drop)
    }
}
