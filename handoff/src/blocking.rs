//! Blocking adapter over the MPSC queue.
//!
//! Adds [`Put::put`] and [`Take::take`] on top of [`crate::mpsc`] without
//! slowing its lock-free fast path. Every operation first tries the
//! nonblocking `offer`/`poll`; only when that fails does a thread take the
//! mutex and wait on `not_full` or `not_empty`.
//!
//! The signalling side pays one fence and one atomic load per successful
//! operation. It touches the mutex only when that load shows a thread
//! waiting on the other side, so uncontended throughput is unaffected by the
//! blocking machinery.
//!
//! # Example
//!
//! ```
//! use handoff::{Put, Take, blocking};
//!
//! let (producer, consumer) = blocking::channel::<String>(4).unwrap();
//!
//! let worker = std::thread::spawn(move || consumer.take().unwrap());
//! producer.put("span".to_string()).unwrap();
//! assert_eq!(worker.join().unwrap(), "span");
//! ```

use std::sync::atomic::{AtomicUsize, Ordering, fence};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::capacity::CapacityError;
use crate::config::{BackoffConfig, QueueConfig};
use crate::interrupt::{self, Interrupted, Wake};
use crate::mpsc;
use crate::queue::{Offer, OfferError, Poll, Put, Queue, Take};
use crate::trace::trace;

/// Slow-path state shared by both ends. Never consulted on the fast path
/// beyond the waiter counts.
#[derive(Default)]
struct Signal {
    lock: Mutex<()>,
    not_empty: Condvar,
    not_full: Condvar,
    waiting_producers: AtomicUsize,
    waiting_consumers: AtomicUsize,
}

impl Signal {
    /// Called after a successful enqueue.
    #[inline]
    fn item_added(&self) {
        fence(Ordering::SeqCst);
        if self.waiting_consumers.load(Ordering::Relaxed) > 0 {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.not_empty.notify_one();
        }
    }

    /// Called after a successful dequeue.
    #[inline]
    fn item_removed(&self) {
        fence(Ordering::SeqCst);
        if self.waiting_producers.load(Ordering::Relaxed) > 0 {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.not_full.notify_all();
        }
    }
}

impl Wake for Signal {
    fn wake(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Write end of the blocking MPSC queue. [`Clone`] and [`Sync`].
pub struct Producer<T: Send> {
    inner: mpsc::Producer<T>,
    signal: Arc<Signal>,
}

/// Read end of the blocking MPSC queue. Exactly one per queue.
pub struct Consumer<T: Send> {
    inner: mpsc::Consumer<T>,
    signal: Arc<Signal>,
}

/// Creates a blocking MPSC queue holding at least `capacity` items.
///
/// # Errors
///
/// See [`crate::capacity::round_to_power_of_two`].
pub fn channel<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    channel_with_config(&QueueConfig::with_capacity(capacity))
}

/// Creates a blocking MPSC queue from a [`QueueConfig`].
///
/// # Errors
///
/// See [`crate::capacity::round_to_power_of_two`].
pub fn channel_with_config<T: Send>(
    config: &QueueConfig,
) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    let (producer, consumer) = mpsc::channel_with_config(config)?;
    let signal = Arc::new(Signal::default());
    Ok((
        Producer {
            inner: producer,
            signal: Arc::clone(&signal),
        },
        Consumer {
            inner: consumer,
            signal,
        },
    ))
}

impl<T: Send> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            signal: Arc::clone(&self.signal),
        }
    }
}

impl<T: Send> Queue for Producer<T> {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn backoff_config(&self) -> &BackoffConfig {
        self.inner.backoff_config()
    }
}

impl<T: Send> Offer<T> for Producer<T> {
    #[inline]
    fn offer(&self, item: T) -> Result<(), T> {
        self.inner.offer(item)?;
        self.signal.item_added();
        Ok(())
    }
}

impl<T: Send> Put<T> for Producer<T> {
    fn put(&self, item: T) -> Result<(), OfferError<T>> {
        match self.offer(item) {
            Ok(()) => Ok(()),
            Err(item) => self.put_slow(item),
        }
    }
}

impl<T: Send> Producer<T> {
    #[cold]
    fn put_slow(&self, mut item: T) -> Result<(), OfferError<T>> {
        let signal = &*self.signal;
        let _registration = interrupt::register(self.signal.clone());
        let mut guard = signal.lock.lock().unwrap_or_else(PoisonError::into_inner);
        signal.waiting_producers.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let result = loop {
            match self.inner.offer(item) {
                Ok(()) => break Ok(()),
                Err(rejected) => item = rejected,
            }
            if interrupt::interrupted() {
                break Err(OfferError::Interrupted(item));
            }
            trace!(capacity = self.capacity(), "producer waiting for space");
            guard = signal
                .not_full
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        };

        signal.waiting_producers.fetch_sub(1, Ordering::SeqCst);
        drop(guard);
        if result.is_ok() {
            signal.item_added();
        }
        result
    }
}

impl<T: Send> Queue for Consumer<T> {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn backoff_config(&self) -> &BackoffConfig {
        self.inner.backoff_config()
    }
}

impl<T: Send> Poll<T> for Consumer<T> {
    #[inline]
    fn poll(&self) -> Option<T> {
        let item = self.inner.poll()?;
        self.signal.item_removed();
        Some(item)
    }
}

impl<T: Send> Take<T> for Consumer<T> {
    fn take(&self) -> Result<T, Interrupted> {
        match self.poll() {
            Some(item) => Ok(item),
            None => self.take_slow(),
        }
    }
}

impl<T: Send> Consumer<T> {
    #[cold]
    fn take_slow(&self) -> Result<T, Interrupted> {
        let signal = &*self.signal;
        let _registration = interrupt::register(self.signal.clone());
        let mut guard = signal.lock.lock().unwrap_or_else(PoisonError::into_inner);
        signal.waiting_consumers.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let result = loop {
            if let Some(item) = self.inner.poll() {
                break Ok(item);
            }
            if interrupt::interrupted() {
                break Err(Interrupted);
            }
            trace!("consumer waiting for an item");
            guard = signal
                .not_empty
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        };

        signal.waiting_consumers.fetch_sub(1, Ordering::SeqCst);
        drop(guard);
        if result.is_ok() {
            signal.item_removed();
        }
        result
    }

    /// Clones the next item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.peek()
    }

    /// Drops every item currently visible, waking blocked producers.
    pub fn clear(&self) -> usize {
        self.drain(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timeout;
    use std::sync::mpsc::channel as std_channel;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_fast_path_offer_poll() {
        let (producer, consumer) = channel::<u64>(4).unwrap();
        producer.put(1).unwrap();
        producer.offer(2).unwrap();
        assert_eq!(consumer.size(), 2);
        assert_eq!(consumer.peek(), Some(1));
        assert_eq!(consumer.take(), Ok(1));
        assert_eq!(consumer.poll(), Some(2));
        assert_eq!(consumer.poll(), None);
    }

    #[test]
    fn test_take_blocks_until_put() {
        let (producer, consumer) = channel::<u64>(4).unwrap();

        let taker = thread::spawn(move || {
            let start = Instant::now();
            let item = consumer.take();
            (item, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        producer.put(42).unwrap();

        let (item, waited) = taker.join().unwrap();
        assert_eq!(item, Ok(42));
        assert!(waited >= Duration::from_millis(40));
    }

    #[test]
    fn test_put_blocks_until_space() {
        let (producer, consumer) = channel::<u64>(1).unwrap();
        producer.put(1).unwrap();

        let putter = {
            let producer = producer.clone();
            thread::spawn(move || producer.put(2))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!putter.is_finished());
        assert_eq!(consumer.take(), Ok(1));

        putter.join().unwrap().unwrap();
        assert_eq!(consumer.take(), Ok(2));
    }

    #[test]
    fn test_interrupt_wakes_blocked_put() {
        let (producer, _consumer) = channel::<u64>(1).unwrap();
        producer.put(1).unwrap();

        let (tx, rx) = std_channel();
        let putter = thread::spawn(move || {
            tx.send(interrupt::current()).unwrap();
            producer.put(2)
        });

        let interrupter = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();

        let err = putter.join().unwrap().unwrap_err();
        assert_eq!(err, OfferError::Interrupted(2));
    }

    #[test]
    fn test_interrupt_wakes_blocked_take() {
        let (_producer, consumer) = channel::<u64>(1).unwrap();

        let (tx, rx) = std_channel();
        let taker = thread::spawn(move || {
            tx.send(interrupt::current()).unwrap();
            let start = Instant::now();
            (consumer.take(), start.elapsed())
        });

        let interrupter = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();

        let (result, waited) = taker.join().unwrap();
        assert_eq!(result, Err(Interrupted));
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_timed_offer_wakes_on_space() {
        let (producer, consumer) = channel::<u64>(1).unwrap();
        producer.offer(1).unwrap();

        let remover = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            consumer.poll()
        });

        let result = producer.offer_timeout(2, Timeout::Duration(Duration::from_secs(5)));
        assert_eq!(result, Ok(()));
        assert_eq!(remover.join().unwrap(), Some(1));
    }

    #[test]
    fn test_clear_unblocks_producers() {
        let (producer, consumer) = channel::<u64>(2).unwrap();
        producer.put(1).unwrap();
        producer.put(2).unwrap();

        let putter = {
            let producer = producer.clone();
            thread::spawn(move || producer.put(3))
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(consumer.clear(), 2);
        putter.join().unwrap().unwrap();
        assert_eq!(consumer.take(), Ok(3));
    }
}
