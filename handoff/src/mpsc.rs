//! Multi-producer single-consumer queue.
//!
//! The hand-off buffer between instrumented call sites and one background
//! consumer: producers never lock, a full queue is reported immediately.
//!
//! # Overview
//!
//! - [`Producer`] - write end; [`Clone`] and [`Sync`], share it freely
//! - [`Consumer`] - read end; exactly one per queue, [`Send`] but not [`Sync`]
//!
//! # Ordering
//!
//! Items from one producer arrive in the order it offered them. Across
//! producers, a producer that claimed a position but has not yet written it
//! holds back items already written at later positions until it finishes.
//!
//! # Example
//!
//! ```
//! use handoff::{Offer, Poll, mpsc};
//!
//! let (producer, consumer) = mpsc::channel::<u64>(1024).unwrap();
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|p| {
//!         let producer = producer.clone();
//!         std::thread::spawn(move || producer.offer(p).unwrap())
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//!
//! let mut total = 0;
//! consumer.drain(|item| total += item);
//! assert_eq!(total, 0 + 1 + 2 + 3);
//! ```
//!
//! # Compile-time guarantees
//!
//! The consumer is unique: it can be neither shared nor cloned.
//!
//! ```compile_fail
//! # use handoff::mpsc;
//! fn assert_sync<S: Sync>() {}
//! assert_sync::<mpsc::Consumer<u64>>();
//! ```
//!
//! ```compile_fail
//! # use handoff::mpsc;
//! let (_producer, consumer) = mpsc::channel::<u64>(4).unwrap();
//! let _second = consumer.clone();
//! ```
//!
//! Producers never block; use [`crate::blocking`] for `put`:
//!
//! ```compile_fail
//! # use handoff::{Put, mpsc};
//! let (producer, _consumer) = mpsc::channel::<u64>(4).unwrap();
//! let _ = producer.put(1);
//! ```

pub(crate) mod ring;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::capacity::{CapacityError, Layout};
use crate::config::{BackoffConfig, QueueConfig};
use crate::queue::{Offer, PhantomUnsync, Poll, Queue};
use crate::trace::debug;
use ring::Ring;

/// Write end of the MPSC queue.
///
/// Clone it once per producing thread, or share a reference; concurrent
/// `offer` calls are safe.
pub struct Producer<T: Send> {
    ring: Arc<Ring<T>>,
}

/// Read end of the MPSC queue.
///
/// Only one consumer exists per queue: it is neither [`Clone`] nor [`Sync`].
pub struct Consumer<T: Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Creates an MPSC queue holding at least `capacity` items.
///
/// # Errors
///
/// See [`crate::capacity::round_to_power_of_two`].
pub fn channel<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    channel_with_config(&QueueConfig::with_capacity(capacity))
}

/// Creates an MPSC queue from a [`QueueConfig`].
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
        "creating mpsc queue"
    );

    let ring = Arc::new(Ring::new(layout, config.backoff));
    let producer = Producer {
        ring: Arc::clone(&ring),
    };
    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };
    Ok((producer, consumer))
}

impl<T: Send> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
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
        self.ring.offer(item)
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
