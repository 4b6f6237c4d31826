//! Lock-free MPSC ring buffer.
//!
//! Producers race for positions with a CAS on `tail`; the single consumer
//! owns `head` outright. Slot stamps (see [`crate::slot`]) carry both the
//! occupancy and the lap, so:
//!
//! - a producer that finds its slot still stamped for an earlier lap reports
//!   the ring full;
//! - the consumer that finds its slot claimed but not yet written treats it
//!   exactly like an empty ring and retries later, never skipping ahead to
//!   items already written at higher positions.
//!
//! The second point means one slow producer can briefly hide items from
//! faster ones. That starvation window is inherent to the algorithm.
//!
//! # Safety
//!
//! `poll`/`peek` must only be called by one thread at a time.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::capacity::Layout;
use crate::config::BackoffConfig;
use crate::slot::{self, Slot, distance, occupied, vacant};

/// Producer-side state: the claim counter.
#[repr(C)]
#[repr(align(64))]
pub struct ProducerState {
    /// Next position to claim. Advanced by CAS from any producer.
    pub(crate) tail: AtomicU64,
}

/// Consumer-side state.
#[repr(C)]
#[repr(align(64))]
pub struct ConsumerState {
    /// Next position to read. Only the consumer stores it.
    pub(crate) head: AtomicU64,
}

#[repr(C)]
pub struct Ring<T> {
    producer: ProducerState,
    consumer: ConsumerState,
    layout: Layout,
    backoff: BackoffConfig,
    buffer: Box<[Slot<T>]>,
}

impl<T> Ring<T> {
    pub fn new(layout: Layout, backoff: BackoffConfig) -> Self {
        Self {
            producer: ProducerState {
                tail: AtomicU64::new(0),
            },
            consumer: ConsumerState {
                head: AtomicU64::new(0),
            },
            layout,
            backoff,
            buffer: slot::allocate(layout.capacity()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.capacity()
    }

    #[inline]
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Claimed positions not yet consumed, including unwritten claims.
    pub fn size(&self) -> usize {
        let mut head = self.consumer.head.load(Ordering::Acquire);
        loop {
            let tail = self.producer.tail.load(Ordering::Acquire);
            let again = self.consumer.head.load(Ordering::Acquire);
            if again == head {
                return (tail.wrapping_sub(head) as usize).min(self.capacity());
            }
            head = again;
        }
    }

    /// Attempts to enqueue an item. Safe to call from any number of threads.
    #[inline]
    pub fn offer(&self, item: T) -> Result<(), T> {
        let mut tail = self.producer.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[self.layout.index(tail)];
            let expected = vacant(tail);
            let diff = distance(slot.stamp(), expected);

            if diff == 0 {
                match self.producer.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gave us the only claim on `tail` and
                        // the slot was observed vacant for it.
                        unsafe { slot.publish(tail, item) };
                        return Ok(());
                    }
                    Err(current) => {
                        // Lost the race; back off briefly before retrying.
                        hint::spin_loop();
                        tail = current;
                    }
                }
            } else if diff < 0 {
                // Still holding, or claimed for, the previous lap: full.
                return Err(item);
            } else {
                // Another producer already claimed this position.
                tail = self.producer.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to dequeue an item.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn poll(&self) -> Option<T> {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let slot = &self.buffer[self.layout.index(head)];

        if slot.stamp() != occupied(head) {
            // Empty, or claimed by a producer that has not written yet.
            return None;
        }

        // SAFETY: single consumer, and the stamp says the item for `head`
        // has been published.
        let item = unsafe { slot.consume(head, self.capacity() as u64) };
        self.consumer
            .head
            .store(head.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// Clones the next item without dequeuing it.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let slot = &self.buffer[self.layout.index(head)];

        if slot.stamp() != occupied(head) {
            return None;
        }
        // SAFETY: only the consumer releases this slot, and it is us.
        Some(unsafe { slot.get() }.clone())
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        for slot in self.buffer.iter_mut() {
            slot.drop_if_occupied();
        }
    }
}

// SAFETY: producers coordinate through the CAS on tail, and slot stamps hand
// each item from its producer to the single consumer.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ring<T>(capacity: usize) -> Ring<T> {
        Ring::new(Layout::new(capacity).unwrap(), BackoffConfig::default())
    }

    #[test]
    fn test_single_producer_single_consumer() {
        let ring = ring::<u64>(8);

        assert!(ring.offer(1).is_ok());
        assert!(ring.offer(2).is_ok());
        assert!(ring.offer(3).is_ok());

        unsafe {
            assert_eq!(ring.poll(), Some(1));
            assert_eq!(ring.poll(), Some(2));
            assert_eq!(ring.poll(), Some(3));
            assert_eq!(ring.poll(), None);
        }
    }

    #[test]
    fn test_queue_full() {
        let ring = ring::<u64>(4);

        for i in 1..=4 {
            assert!(ring.offer(i).is_ok());
        }
        assert_eq!(ring.offer(5), Err(5));

        unsafe {
            assert_eq!(ring.poll(), Some(1));
        }
        assert!(ring.offer(5).is_ok());
        assert_eq!(ring.offer(6), Err(6));
    }

    #[test]
    fn test_capacity_one_never_overwrites() {
        let ring = ring::<u64>(1);
        for i in 0..10 {
            assert!(ring.offer(i).is_ok());
            assert_eq!(ring.offer(99), Err(99));
            unsafe {
                assert_eq!(ring.peek(), Some(i));
                assert_eq!(ring.poll(), Some(i));
            }
        }
    }

    #[test]
    fn test_hole_blocks_consumer() {
        let ring = ring::<u64>(4);

        // A producer claims position 0 but has not written yet.
        ring.producer.tail.store(1, Ordering::Relaxed);
        // A faster producer claims and writes position 1.
        assert!(ring.offer(11).is_ok());
        assert_eq!(ring.size(), 2);

        unsafe {
            assert_eq!(ring.poll(), None);
            assert_eq!(ring.peek(), None);
        }

        // The slow producer finally publishes position 0.
        unsafe { ring.buffer[0].publish(0, 10) };
        unsafe {
            assert_eq!(ring.poll(), Some(10));
            assert_eq!(ring.poll(), Some(11));
            assert_eq!(ring.poll(), None);
        }
    }

    #[test]
    fn test_full_while_hole_outstanding() {
        let ring = ring::<u64>(2);

        // Position 0 claimed but never written; position 1 written.
        ring.producer.tail.store(1, Ordering::Relaxed);
        assert!(ring.offer(1).is_ok());

        // Position 2 maps onto the hole's slot, which is still awaiting lap 0.
        assert_eq!(ring.offer(2), Err(2));

        unsafe { ring.buffer[0].publish(0, 0) };
        unsafe {
            assert_eq!(ring.poll(), Some(0));
        }
        assert!(ring.offer(2).is_ok());
    }

    #[test]
    fn test_multiple_producers() {
        let ring = Arc::new(ring::<u64>(64));
        let num_producers = 4;
        let items_per_producer = 10;

        let mut handles = vec![];
        for p in 0..num_producers {
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for i in 0..items_per_producer {
                    let value = (p * 100 + i) as u64;
                    while ring.offer(value).is_err() {
                        thread::yield_now();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut items = vec![];
        while let Some(item) = unsafe { ring.poll() } {
            items.push(item);
        }

        assert_eq!(items.len(), num_producers * items_per_producer);
        for p in 0..num_producers {
            for i in 0..items_per_producer {
                let expected = (p * 100 + i) as u64;
                assert!(items.contains(&expected), "Missing value {expected}");
            }
        }
    }
}
