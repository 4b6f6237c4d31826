//! Single-producer multi-consumer queue.
//!
//! One producer fans work out to a pool of consumers. Every item is delivered
//! to exactly one consumer, in the order the producer offered them.
//!
//! # Overview
//!
//! - [`Producer`] - write end; exactly one per queue, [`Send`] but not [`Sync`]
//! - [`Consumer`] - read end; [`Clone`] and [`Sync`], share it freely
//!
//! There is no `peek`: another consumer could take the item while it is
//! being looked at.
//!
//! # Example
//!
//! ```
//! use handoff::{Offer, Poll, spmc};
//!
//! let (producer, consumer) = spmc::channel::<u32>(8).unwrap();
//! for i in 0..8 {
//!     producer.offer(i).unwrap();
//! }
//!
//! let other = consumer.clone();
//! assert_eq!(consumer.poll(), Some(0));
//! assert_eq!(other.poll(), Some(1));
//! ```
//!
//! The producer is unique:
//!
//! ```compile_fail
//! # use handoff::spmc;
//! fn assert_sync<S: Sync>() {}
//! assert_sync::<spmc::Producer<u64>>();
//! ```
//!
//! ```compile_fail
//! # use handoff::spmc;
//! let (producer, _consumer) = spmc::channel::<u64>(4).unwrap();
//! let _second = producer.clone();
//! ```

pub(crate) mod ring;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::capacity::{CapacityError, Layout};
use crate::config::{BackoffConfig, QueueConfig};
use crate::queue::{Offer, PhantomUnsync, Poll, Queue};
use crate::trace::debug;
use ring::Ring;

/// Write end of the SPMC queue.
pub struct Producer<T: Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Read end of the SPMC queue. Clone it once per consuming thread.
pub struct Consumer<T: Send> {
    ring: Arc<Ring<T>>,
}

/// Creates an SPMC queue holding at least `capacity` items.
///
/// # Errors
///
/// See [`crate::capacity::round_to_power_of_two`].
pub fn channel<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    channel_with_config(&QueueConfig::with_capacity(capacity))
}

/// Creates an SPMC queue from a [`QueueConfig`].
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
        "creating spmc queue"
    );

    let ring = Arc::new(Ring::new(layout, config.backoff));
    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };
    let consumer = Consumer { ring };
    Ok((producer, consumer))
}

impl<T: Send> Clone for Consumer<T> {
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
        self.ring.poll()
    }
}

impl<T: Send> Consumer<T> {
    /// Drops every item currently visible and returns how many were dropped.
    ///
    /// Other consumers may race for the same items; each is dropped once.
    pub fn clear(&self) -> usize {
        self.drain(drop)
    }
}
