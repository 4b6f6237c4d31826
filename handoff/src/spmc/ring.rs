//! Lock-free SPMC ring buffer.
//!
//! The single producer owns `tail` and publishes into stamped slots without a
//! CAS. Consumers race for `head`: a consumer that sees the item for its
//! position claims it by CAS, and only the winner moves the item out and
//! frees the slot. A loser reloads `head`, which may have moved several
//! positions, and tries again.
//!
//! # Safety
//!
//! `offer` must only be called by one thread at a time.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::capacity::Layout;
use crate::config::BackoffConfig;
use crate::slot::{self, Slot, distance, occupied, vacant};

/// Producer-side state.
#[repr(C)]
#[repr(align(64))]
pub struct ProducerState {
    /// Next position to write. Only the producer stores it.
    pub(crate) tail: AtomicU64,
}

/// Consumer-side state: the claim counter.
#[repr(C)]
#[repr(align(64))]
pub struct ConsumerState {
    /// Next position to claim. Advanced by CAS from any consumer.
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

    /// Published positions not yet claimed by a consumer.
    pub fn size(&self) -> usize {
        let mut head = self.consumer.head.load(Ordering::Acquire);
        loop {
            let tail = self.producer.tail.load(Ordering::Acquire);
            let again = self.consumer.head.load(Ordering::Acquire);
            if again == head {
                // A consumer may claim past a tail we loaded earlier.
                let size = tail.saturating_sub(head) as usize;
                return size.min(self.capacity());
            }
            head = again;
        }
    }

    /// Attempts to enqueue an item.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer.
    #[inline]
    pub unsafe fn offer(&self, item: T) -> Result<(), T> {
        let tail = self.producer.tail.load(Ordering::Relaxed);
        let slot = &self.buffer[self.layout.index(tail)];

        if slot.stamp() != vacant(tail) {
            // The item from the previous lap is unread, or claimed but still
            // being moved out by its consumer.
            return Err(item);
        }

        // SAFETY: single producer, and the slot is vacant for `tail`.
        unsafe { slot.publish(tail, item) };
        self.producer
            .tail
            .store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Attempts to dequeue an item. Safe to call from any number of threads.
    #[inline]
    pub fn poll(&self) -> Option<T> {
        let mut head = self.consumer.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[self.layout.index(head)];
            let diff = distance(slot.stamp(), occupied(head));

            if diff == 0 {
                match self.consumer.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gave us the only claim on `head`
                        // and the stamp showed its item published.
                        return Some(unsafe { slot.consume(head, self.capacity() as u64) });
                    }
                    Err(current) => head = current,
                }
            } else if diff < 0 {
                // Not yet written for this position: empty.
                return None;
            } else {
                // Already consumed; head has moved on.
                head = self.consumer.head.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        for slot in self.buffer.iter_mut() {
            slot.drop_if_occupied();
        }
    }
}

// SAFETY: consumers coordinate through the CAS on head, and slot stamps hand
// each item from the single producer to exactly one consumer.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn ring<T>(capacity: usize) -> Ring<T> {
        Ring::new(Layout::new(capacity).unwrap(), BackoffConfig::default())
    }

    #[test]
    fn test_fifo_and_full() {
        let ring = ring::<u64>(4);
        unsafe {
            for i in 0..4 {
                assert!(ring.offer(i).is_ok());
            }
            assert_eq!(ring.offer(4), Err(4));
        }
        assert_eq!(ring.size(), 4);

        assert_eq!(ring.poll(), Some(0));
        unsafe {
            assert!(ring.offer(4).is_ok());
        }
        for i in 1..5 {
            assert_eq!(ring.poll(), Some(i));
        }
        assert_eq!(ring.poll(), None);
        assert_eq!(ring.size(), 0);
    }

    #[test]
    fn test_capacity_one() {
        let ring = ring::<u64>(1);
        for i in 0..10 {
            unsafe {
                assert!(ring.offer(i).is_ok());
                assert_eq!(ring.offer(99), Err(99));
            }
            assert_eq!(ring.poll(), Some(i));
            assert_eq!(ring.poll(), None);
        }
    }

    #[test]
    fn test_consumers_claim_each_item_once() {
        let ring = Arc::new(ring::<u64>(1024));
        let count = 1000u64;
        unsafe {
            for i in 0..count {
                ring.offer(i).unwrap();
            }
        }

        let taken = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ring = Arc::clone(&ring);
                let taken = Arc::clone(&taken);
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(item) = ring.poll() {
                        taken.fetch_add(1, Ordering::Relaxed);
                        mine.push(item);
                    }
                    mine
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..count).collect::<Vec<_>>());
        assert_eq!(taken.load(Ordering::Relaxed), count as usize);
    }

    #[test]
    fn test_drop_releases_unclaimed_items() {
        let item = Arc::new(());
        {
            let ring = ring::<Arc<()>>(4);
            unsafe {
                ring.offer(Arc::clone(&item)).unwrap();
                ring.offer(Arc::clone(&item)).unwrap();
            }
            drop(ring.poll());
            assert_eq!(Arc::strong_count(&item), 2);
        }
        assert_eq!(Arc::strong_count(&item), 1);
    }
}
