//! Lock-free SPSC ring buffer.
//!
//! One producer, one consumer, no CAS. Each side owns its counter and keeps a
//! private cached copy of the other side's counter, refreshing it only when
//! the cache says the ring is full (producer) or empty (consumer). Slots are
//! plain cells: a slot is written before the producer's release store of
//! `tail` and read after the consumer's acquire load of it.
//!
//! # Safety
//!
//! `offer` must only ever be called from one thread at a time, and likewise
//! `poll`/`peek`/`clear`. The handles in [`crate::spsc`] guarantee this.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::capacity::Layout;
use crate::config::BackoffConfig;

/// Role marker: fields owned exclusively by the producer.
pub struct ProducerRole;

/// Role marker: fields owned exclusively by the consumer.
pub struct ConsumerRole;

/// Role marker: buffer slots whose ownership transfers via the SPSC protocol.
pub struct SlotRole;

/// Interior-mutable cell tagged with the role allowed to touch it.
///
/// The `Role` is purely nominal; it keeps producer-owned, consumer-owned and
/// slot cells from being mixed up at compile time.
#[repr(transparent)]
pub struct RoleCell<T, Role>(UnsafeCell<T>, PhantomData<Role>);

impl<T, Role> RoleCell<T, Role> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value), PhantomData)
    }

    pub const fn get(&self) -> *mut T {
        self.0.get()
    }
}

// SAFETY: each cell is accessed only by the role it is tagged with, and the
// counters' release/acquire pairs order the hand-off of slot cells.
unsafe impl<T: Send, Role> Sync for RoleCell<T, Role> {}
unsafe impl<T: Send, Role> Send for RoleCell<T, Role> {}

pub type ProducerCache = RoleCell<u64, ProducerRole>;
pub type ConsumerCache = RoleCell<u64, ConsumerRole>;
pub type SlotCell<T> = RoleCell<MaybeUninit<T>, SlotRole>;

/// Producer-side state: `tail` plus a cached `head`.
#[repr(C)]
#[repr(align(64))]
pub struct ProducerState {
    /// Next position to write. Owned by producer, read by consumer.
    pub tail: AtomicU64,

    /// Last `head` the producer observed.
    pub cached_head: ProducerCache,
}

impl ProducerState {
    pub const fn new() -> Self {
        Self {
            tail: AtomicU64::new(0),
            cached_head: ProducerCache::new(0),
        }
    }
}

/// Consumer-side state: `head` plus a cached `tail`.
#[repr(C)]
#[repr(align(64))]
pub struct ConsumerState {
    /// Next position to read. Owned by consumer, read by producer.
    pub head: AtomicU64,

    /// Last `tail` the consumer observed.
    pub cached_tail: ConsumerCache,
}

impl ConsumerState {
    pub const fn new() -> Self {
        Self {
            head: AtomicU64::new(0),
            cached_tail: ConsumerCache::new(0),
        }
    }
}

#[repr(C)]
pub struct Ring<T> {
    producer: ProducerState,
    consumer: ConsumerState,
    layout: Layout,
    backoff: BackoffConfig,
    buffer: Box<[SlotCell<T>]>,
}

impl<T> Ring<T> {
    pub fn new(layout: Layout, backoff: BackoffConfig) -> Self {
        let buffer = (0..layout.capacity())
            .map(|_| SlotCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            producer: ProducerState::new(),
            consumer: ConsumerState::new(),
            layout,
            backoff,
            buffer,
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

    /// Best-effort item count from either side.
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

    /// Attempts to enqueue an item.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer.
    #[inline]
    pub unsafe fn offer(&self, item: T) -> Result<(), T> {
        // Only the producer stores tail.
        let tail = self.producer.tail.load(Ordering::Relaxed);
        let capacity = self.capacity() as u64;

        // SAFETY: the producer has exclusive access to its cache.
        let mut cached_head = unsafe { *self.producer.cached_head.get() };
        if tail.wrapping_sub(cached_head) >= capacity {
            cached_head = self.consumer.head.load(Ordering::Acquire);
            // SAFETY: as above.
            unsafe { *self.producer.cached_head.get() = cached_head };

            if tail.wrapping_sub(cached_head) >= capacity {
                return Err(item);
            }
        }

        // SAFETY: tail - head < capacity, so the consumer has released this
        // slot, and tail is not yet published so it cannot read it either.
        unsafe {
            (*self.buffer[self.layout.index(tail)].get()).write(item);
        }

        self.producer
            .tail
            .store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Refreshes the consumer's view and returns the slot index at `head`
    /// if an item is available there.
    #[inline]
    fn readable(&self, head: u64) -> Option<usize> {
        // SAFETY: the consumer has exclusive access to its cache.
        let mut cached_tail = unsafe { *self.consumer.cached_tail.get() };
        if cached_tail == head {
            cached_tail = self.producer.tail.load(Ordering::Acquire);
            // SAFETY: as above.
            unsafe { *self.consumer.cached_tail.get() = cached_tail };

            if cached_tail == head {
                return None;
            }
        }
        Some(self.layout.index(head))
    }

    /// Attempts to dequeue an item.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn poll(&self) -> Option<T> {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let index = self.readable(head)?;

        // SAFETY: head < tail and the acquire load of tail synchronized with
        // the producer's write of this slot.
        let item = unsafe { (*self.buffer[index].get()).assume_init_read() };

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
        let index = self.readable(head)?;

        // SAFETY: as in `poll`; the slot stays owned by the consumer because
        // head is not advanced.
        Some(unsafe { (*self.buffer[index].get()).assume_init_ref() }.clone())
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = *self.consumer.head.get_mut();
        let tail = *self.producer.tail.get_mut();
        let mut pos = head;
        while pos != tail {
            let index = self.layout.index(pos);
            // SAFETY: exclusive access; every position in head..tail holds an
            // initialized item.
            unsafe { (*self.buffer[index].get()).assume_init_drop() };
            pos = pos.wrapping_add(1);
        }
    }
}

// SAFETY: all cross-thread access is mediated by the tail/head release and
// acquire pairs under the single-producer single-consumer invariant.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}
