//! Capacity rounding and index math shared by every ring.
//!
//! Rings are sized to a power of two so a monotonically increasing 64-bit
//! counter maps onto a slot with a single mask instead of a division.

use thiserror::Error;

/// Largest capacity any ring accepts.
///
/// Fits in `usize` on every supported target and keeps `capacity as u64`
/// arithmetic on counters far from overflow.
pub const MAX_CAPACITY: usize = 1 << 30;

/// Rejected capacity request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// A queue must hold at least one item.
    #[error("queue capacity must be greater than 0")]
    Zero,
    /// The next power of two is larger than [`MAX_CAPACITY`].
    #[error("queue capacity {requested} exceeds the maximum of {MAX_CAPACITY}")]
    TooLarge { requested: usize },
}

/// Rounds `requested` up to the next power of two.
///
/// # Errors
///
/// [`CapacityError::Zero`] for `0`, [`CapacityError::TooLarge`] when the
/// rounded value would exceed [`MAX_CAPACITY`].
pub fn round_to_power_of_two(requested: usize) -> Result<usize, CapacityError> {
    if requested == 0 {
        return Err(CapacityError::Zero);
    }
    match requested.checked_next_power_of_two() {
        Some(capacity) if capacity <= MAX_CAPACITY => Ok(capacity),
        _ => Err(CapacityError::TooLarge { requested }),
    }
}

/// Effective capacity plus the mask derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    capacity: usize,
    mask: u64,
}

impl Layout {
    pub(crate) fn new(requested: usize) -> Result<Self, CapacityError> {
        let capacity = round_to_power_of_two(requested)?;
        Ok(Self {
            capacity,
            mask: capacity as u64 - 1,
        })
    }

    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot index for a counter value.
    #[inline]
    pub(crate) const fn index(&self, counter: u64) -> usize {
        (counter & self.mask) as usize
    }
}
