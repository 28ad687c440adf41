// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::command_recorder::CommandEncoder;
use std::any::Any;

/// One frame of resolved GPU timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampFrame {
    /// Set when the timestamps cannot be trusted (counter reset, clock change).
    pub disjoint: bool,
    /// Timestamp ticks per second.
    pub frequency: f64,
    /// Raw timestamps, indexed by marker.
    pub stamps: Vec<u64>,
}

impl TimestampFrame {
    /// Milliseconds elapsed between two markers, or `None` if a marker is missing.
    pub fn duration_ms(&self, start: usize, end: usize) -> Option<f64> {
        let begin = *self.stamps.get(start)?;
        let finish = *self.stamps.get(end)?;
        Some(finish.wrapping_sub(begin) as f64 / self.frequency * 1000.0)
    }
}

/// The outcome of reading one slot of the profiler ring.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampReadback {
    /// The GPU has not finished with the slot yet.
    NotReady,
    /// Nothing was recorded into the slot.
    Empty,
    /// The slot holds a resolved frame.
    Ready(TimestampFrame),
}

/// A ring of timestamp query sets, read back several frames after recording.
///
/// Each frame records into its own slot; the CPU reads a slot only once the
/// ring has wrapped around to it, so readback never stalls the frame that is
/// being recorded.
pub trait GpuProfiler: Any + Send + Sync {
    /// Number of slots in the ring.
    fn ring_size(&self) -> usize;

    /// Number of timestamps a single frame can record.
    fn markers_per_frame(&self) -> u32;

    /// Records commands that resolve `slot`'s queries into its readback buffer.
    fn resolve(&self, encoder: &mut dyn CommandEncoder, slot: usize);

    /// Schedules the CPU mapping of `slot`'s readback buffer. Call after submission.
    fn after_submit(&mut self, slot: usize);

    /// Lets the device make progress on pending mappings without blocking.
    fn poll(&self);

    /// Tries to read `slot`. A ready slot is released for reuse.
    fn read_slot(&mut self, slot: usize) -> TimestampReadback;

    /// Returns a reference to the underlying `Any` trait object.
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_uses_frequency_in_ticks_per_second() {
        let frame = TimestampFrame {
            disjoint: false,
            frequency: 1_000_000_000.0,
            stamps: vec![1_000_000, 3_000_000, 4_500_000],
        };
        assert_eq!(frame.duration_ms(0, 1), Some(2.0));
        assert_eq!(frame.duration_ms(1, 2), Some(1.5));
        assert_eq!(frame.duration_ms(0, 3), None);
    }
}
