//! Slot selection
//!
//! Maps an absolute time slot to a 0-based array index inside a
//! `[start, end]` window, merging `interval_ratio` storage slots into one
//! query slot.

use crate::error::{CoreError, Result};
use crate::types::{Slot, SlotRange};

/// Where a slot falls relative to the selector window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPosition {
    /// Before the window start; keep scanning
    Before,
    /// Inside the window at the given array index
    Index(usize),
    /// Past the window end; nothing further can match
    Completed,
}

impl SlotPosition {
    /// Array index when inside the window
    pub fn index(&self) -> Option<usize> {
        match self {
            SlotPosition::Index(idx) => Some(*idx),
            _ => None,
        }
    }

    /// True when the slot is past the window end
    pub fn is_completed(&self) -> bool {
        matches!(self, SlotPosition::Completed)
    }
}

/// Slot window with an interval ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSelector {
    start: Slot,
    end: Slot,
    ratio: usize,
    point_count: usize,
}

impl SlotSelector {
    /// Create a selector over `[start, end]` with `ratio` slots per point
    pub fn new(start: Slot, end: Slot, ratio: usize) -> Result<Self> {
        if ratio == 0 {
            return Err(CoreError::InvalidRatio(ratio));
        }
        if start > end {
            return Err(CoreError::InvalidSlotRange { start, end });
        }
        Ok(Self {
            start,
            end,
            ratio,
            point_count: (end - start) / ratio + 1,
        })
    }

    /// Selector over a slot range
    pub fn from_range(range: SlotRange, ratio: usize) -> Result<Self> {
        Self::new(range.start, range.end, ratio)
    }

    /// Map an absolute slot to its array index
    #[inline]
    pub fn index_of(&self, slot: Slot) -> SlotPosition {
        if slot < self.start {
            SlotPosition::Before
        } else if slot > self.end {
            SlotPosition::Completed
        } else {
            SlotPosition::Index((slot - self.start) / self.ratio)
        }
    }

    /// Absolute slot of the first storage slot merged into `idx`
    #[inline]
    pub fn slot_of(&self, idx: usize) -> Slot {
        self.start + idx * self.ratio
    }

    /// Number of array points covered by the window
    #[inline]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn start(&self) -> Slot {
        self.start
    }

    pub fn end(&self) -> Slot {
        self.end
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// The selector window as a slot range
    pub fn range(&self) -> SlotRange {
        SlotRange {
            start: self.start,
            end: self.end,
        }
    }
}
