//! Bounded hand-off queues between instrumented call sites and a background
//! consumer thread.
//!
//! Three lock-free cardinality variants share one capacity model and one set
//! of capability traits:
//!
//! - [`spsc`] - one producer, one consumer
//! - [`mpsc`] - many producers, one consumer
//! - [`spmc`] - one producer, many consumers
//!
//! [`blocking`] layers `put`/`take` over the MPSC queue without touching its
//! lock-free fast path.
//!
//! # Example
//!
//! ```
//! use handoff::{Offer, Poll, Queue, mpsc};
//!
//! let (producer, consumer) = mpsc::channel::<u64>(10).unwrap();
//! assert_eq!(producer.capacity(), 16);
//!
//! let worker = producer.clone();
//! std::thread::spawn(move || worker.offer(7).unwrap()).join().unwrap();
//! producer.offer(8).unwrap();
//!
//! let mut seen = Vec::new();
//! consumer.drain(|item| seen.push(item));
//! seen.sort();
//! assert_eq!(seen, vec![7, 8]);
//! ```

pub mod backoff;
pub mod blocking;
pub mod capacity;
pub mod config;
pub mod interrupt;
pub mod mpsc;
pub mod queue;
pub(crate) mod slot;
pub mod spmc;
pub mod spsc;
mod trace;

pub use backoff::{Backoff, Timeout};
pub use capacity::CapacityError;
pub use config::{BackoffConfig, QueueConfig};
pub use interrupt::{Interrupted, Interrupter};
pub use queue::{Fill, Offer, OfferError, Poll, Put, Queue, Take};
pub use trace::init_tracing;
