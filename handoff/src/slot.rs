//! Stamped slots for the rings where one side races through a CAS.
//!
//! Every slot carries an atomic stamp recording what it holds for which
//! counter position `pos`:
//!
//! - `2 * pos` - empty, writable by whoever claimed `pos`
//! - `2 * pos + 1` - holds the item written for `pos`
//!
//! Releasing the item read at `pos` stores `2 * (pos + capacity)`, making the
//! slot writable for the next lap. Both sides decide emptiness and fullness by
//! comparing the stamp with the value they expect, never from head and tail
//! alone, so a claimed-but-unwritten slot reads as empty to the consumer.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stamp of an empty slot awaiting position `pos`.
#[inline]
pub(crate) const fn vacant(pos: u64) -> u64 {
    pos.wrapping_mul(2)
}

/// Stamp of a slot holding the item for position `pos`.
#[inline]
pub(crate) const fn occupied(pos: u64) -> u64 {
    pos.wrapping_mul(2).wrapping_add(1)
}

/// Signed distance between an observed stamp and the expected one.
#[inline]
pub(crate) const fn distance(stamp: u64, expected: u64) -> i64 {
    stamp.wrapping_sub(expected) as i64
}

#[repr(C)]
#[repr(align(64))] // Own cache line, so neighbouring claims do not false-share
pub(crate) struct Slot<T> {
    stamp: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    pub(crate) const fn new(index: u64) -> Self {
        Self {
            stamp: AtomicU64::new(vacant(index)),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    pub(crate) fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    /// Writes `item` and publishes it for `pos`.
    ///
    /// # Safety
    ///
    /// The caller must own the claim on `pos` and have observed
    /// `vacant(pos)` on this slot.
    #[inline]
    pub(crate) unsafe fn publish(&self, pos: u64, item: T) {
        // SAFETY: the claim on `pos` gives exclusive write access until the
        // release store below hands the slot to the consumer side.
        unsafe { (*self.value.get()).write(item) };
        self.stamp.store(occupied(pos), Ordering::Release);
    }

    /// Moves the item for `pos` out and frees the slot for `pos + capacity`.
    ///
    /// # Safety
    ///
    /// The caller must own the claim on `pos` and have observed
    /// `occupied(pos)` on this slot.
    #[inline]
    pub(crate) unsafe fn consume(&self, pos: u64, capacity: u64) -> T {
        // SAFETY: the acquire load that observed `occupied(pos)` synchronizes
        // with the producer's release store, so the value is initialized.
        let item = unsafe { (*self.value.get()).assume_init_read() };
        self.stamp
            .store(vacant(pos.wrapping_add(capacity)), Ordering::Release);
        item
    }

    /// Borrows the item for `pos` without consuming it.
    ///
    /// # Safety
    ///
    /// Same as [`Slot::consume`], and no other thread may consume `pos`
    /// while the reference lives.
    #[inline]
    pub(crate) unsafe fn get(&self) -> &T {
        // SAFETY: see `consume`; the slot stays occupied for the borrow.
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    /// Drops the held item, if any. Occupied stamps are exactly the odd ones.
    pub(crate) fn drop_if_occupied(&mut self) {
        let stamp = self.stamp.get_mut();
        if *stamp & 1 == 1 {
            // SAFETY: exclusive access, and the stamp proves initialization.
            unsafe { self.value.get_mut().assume_init_drop() };
            *stamp -= 1;
        }
    }
}

// SAFETY: the value cell is only touched by the thread holding the claim on
// the slot's current position; the stamp hands ownership across threads.
unsafe impl<T: Send> Sync for Slot<T> {}
unsafe impl<T: Send> Send for Slot<T> {}

/// Allocates `capacity` vacant slots, slot `i` awaiting position `i`.
pub(crate) fn allocate<T>(capacity: usize) -> Box<[Slot<T>]> {
    (0..capacity as u64).map(Slot::new).collect()
}
