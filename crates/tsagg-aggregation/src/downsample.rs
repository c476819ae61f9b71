//! Down-sampling engine
//!
//! Merges several decoded source streams over a fine-grained source slot
//! range into a coarser target slot range. `ratio` source slots collapse
//! into one target slot. This is a single left-to-right sweep over the
//! source slots and is the only place where ratio-based compression of time
//! happens.

use crate::error::Result;
use crate::functions::reduce;
use tsagg_core::{AggType, CoreError, FloatArray, Slot, SlotRange};

/// Random or sequential access to one decoded source stream
pub trait ValueGetter {
    fn value_at(&self, slot: Slot) -> Option<f64>;
}

impl ValueGetter for FloatArray {
    fn value_at(&self, slot: Slot) -> Option<f64> {
        self.value(slot)
    }
}

/// Receives one `(has_value, value)` pair per target slot, in ascending order
pub trait SlotSink {
    fn write(&mut self, has_value: bool, value: f64);
}

/// Sink writing sequentially into a [`FloatArray`]
#[derive(Debug)]
pub struct ArraySink<'a> {
    array: &'a mut FloatArray,
    pos: usize,
}

impl<'a> ArraySink<'a> {
    pub fn new(array: &'a mut FloatArray) -> Self {
        Self { array, pos: 0 }
    }
}

impl SlotSink for ArraySink<'_> {
    fn write(&mut self, has_value: bool, value: f64) {
        if has_value {
            self.array.set_value(self.pos, value);
        }
        self.pos += 1;
    }
}

/// Down-sample `streams` over `source` into `target`, `ratio` source slots per target slot.
///
/// `None` streams have no data for this range. The sink receives exactly one
/// call per target slot; `(false, 0.0)` when no source value contributed.
pub fn down_sampling_into(
    target: SlotRange,
    source: SlotRange,
    ratio: usize,
    agg_type: AggType,
    streams: &[Option<&dyn ValueGetter>],
    sink: &mut dyn SlotSink,
) -> Result<()> {
    if ratio == 0 {
        return Err(CoreError::InvalidRatio(ratio).into());
    }

    // slots before the first target bucket never contribute
    let mut pos = source.start.max(target.start.saturating_mul(ratio));
    for j in target.start..=target.end {
        let mut result: Option<f64> = None;
        let bucket_end = ratio.saturating_mul(j.saturating_add(1));
        while pos <= source.end && pos < bucket_end {
            for stream in streams.iter().flatten() {
                if let Some(value) = stream.value_at(pos) {
                    result = Some(match result {
                        Some(current) => reduce(agg_type, current, value),
                        None => value,
                    });
                }
            }
            pos += 1;
        }
        match result {
            Some(value) => sink.write(true, value),
            None => sink.write(false, 0.0),
        }
    }
    Ok(())
}
