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

//! GPU frame timing read back from the profiler ring.
//!
//! Frame `f` records its timestamps into slot `f % N`. At the start of frame
//! `f` the slot that frame `f + 1` is about to reuse is read, which holds the
//! results of frame `f + 1 - N`; nothing is read until the ring has filled.

use ember_core::renderer::{GpuProfiler, TimestampFrame, TimestampReadback};
use std::fmt;

/// Upper bound of `poll` calls spent waiting on one readback slot.
pub const MAX_READBACK_SPINS: u32 = 10_000;

/// Timestamps recorded per frame: the frame start plus one after every timed lane.
pub const FRAME_MARKERS: u32 = 7;

const TOTAL: (usize, usize) = (0, 6);
const POLYGONIZE: (usize, usize) = (1, 2);
const Z_PREPASS: (usize, usize) = (2, 3);
const TILE_LIGHTS: (usize, usize) = (3, 4);
const DRAW: (usize, usize) = (4, 5);
const PRESENT: (usize, usize) = (5, 6);

/// Per-lane GPU durations of one frame, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimings {
    /// The frame the timestamps were recorded in.
    pub frame: u64,
    /// First to last timestamp.
    pub total_ms: f64,
    /// Procedural surface generation.
    pub polygonize_ms: f64,
    /// Depth prepass.
    pub z_prepass_ms: f64,
    /// Tile light culling.
    pub tile_lights_ms: f64,
    /// Shading, or the light-count visualization in the debug routine.
    pub draw_ms: f64,
    /// Submission up to the end of the frame.
    pub present_ms: f64,
}

impl FrameTimings {
    /// Derives the durations from a resolved frame. `None` if a marker is missing.
    pub fn from_frame(frame: u64, stamps: &TimestampFrame) -> Option<Self> {
        let span = |(start, end): (usize, usize)| stamps.duration_ms(start, end);
        Some(Self {
            frame,
            total_ms: span(TOTAL)?,
            polygonize_ms: span(POLYGONIZE)?,
            z_prepass_ms: span(Z_PREPASS)?,
            tile_lights_ms: span(TILE_LIGHTS)?,
            draw_ms: span(DRAW)?,
            present_ms: span(PRESENT)?,
        })
    }
}

impl fmt::Display for FrameTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame {}: Total frame time: {:.3} ms; Polygonize: {:.3} ms; Z Prepass: {:.3} ms; \
             Tile lights: {:.3} ms; Draw: {:.3} ms; Present: {:.3} ms;",
            self.frame,
            self.total_ms,
            self.polygonize_ms,
            self.z_prepass_ms,
            self.tile_lights_ms,
            self.draw_ms,
            self.present_ms
        )
    }
}

/// Counts frames and collects the timings that have come back from the GPU.
#[derive(Debug, Default)]
pub struct FrameTimer {
    frame: u64,
    last: Option<FrameTimings>,
    disjoint_frames: u64,
}

impl FrameTimer {
    /// Creates a timer at frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the frame being recorded.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The ring slot the current frame records into.
    pub fn current_slot(&self, profiler: &dyn GpuProfiler) -> usize {
        (self.frame % profiler.ring_size().max(1) as u64) as usize
    }

    /// The last timings read back, if any.
    pub fn last_timings(&self) -> Option<&FrameTimings> {
        self.last.as_ref()
    }

    /// Number of frames dropped because their timestamps were disjoint.
    pub fn disjoint_frames(&self) -> u64 {
        self.disjoint_frames
    }

    /// Reads the oldest slot of the ring and logs its timings.
    ///
    /// Call at the start of a frame, before anything is recorded into the
    /// current slot. Spins on [`GpuProfiler::poll`] while the slot is not ready,
    /// giving up after [`MAX_READBACK_SPINS`] attempts.
    pub fn collect(&mut self, profiler: &mut dyn GpuProfiler) -> Option<FrameTimings> {
        let ring = profiler.ring_size() as u64;
        if ring == 0 || self.frame + 1 < ring {
            return None;
        }
        let slot = ((self.frame + 1) % ring) as usize;
        let recorded = self.frame + 1 - ring;

        let mut spins = 0;
        let stamps = loop {
            match profiler.read_slot(slot) {
                TimestampReadback::Ready(stamps) => break stamps,
                TimestampReadback::Empty => return None,
                TimestampReadback::NotReady => {
                    if spins == 0 {
                        log::trace!(target: "gpu_profile", "Query not ready");
                    }
                    spins += 1;
                    if spins >= MAX_READBACK_SPINS {
                        log::warn!(
                            target: "gpu_profile",
                            "Frame {}: timestamps still not ready after {} polls, skipping.",
                            recorded,
                            spins
                        );
                        return None;
                    }
                    profiler.poll();
                }
            }
        };

        if stamps.disjoint || !stamps.frequency.is_finite() || stamps.frequency <= 0.0 {
            self.disjoint_frames += 1;
            log::warn!(target: "gpu_profile", "Frame {}: Disjoint frame data detected!", recorded);
            return None;
        }

        let timings = FrameTimings::from_frame(recorded, &stamps)?;
        log::info!(target: "gpu_profile", "{}", timings);
        self.last = Some(timings.clone());
        Some(timings)
    }

    /// Moves on to the next frame.
    pub fn advance(&mut self) {
        self.frame += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ember_core::renderer::CommandEncoder;
    use std::any::Any;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedProfiler {
        ring: usize,
        reads: Vec<usize>,
        polls: std::sync::atomic::AtomicU32,
        script: VecDeque<TimestampReadback>,
    }

    impl GpuProfiler for ScriptedProfiler {
        fn ring_size(&self) -> usize {
            self.ring
        }
        fn markers_per_frame(&self) -> u32 {
            FRAME_MARKERS
        }
        fn resolve(&self, _encoder: &mut dyn CommandEncoder, _slot: usize) {}
        fn after_submit(&mut self, _slot: usize) {}
        fn poll(&self) {
            self.polls
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        fn read_slot(&mut self, slot: usize) -> TimestampReadback {
            self.reads.push(slot);
            self.script.pop_front().unwrap_or(TimestampReadback::Empty)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn frame(stamps: Vec<u64>) -> TimestampReadback {
        TimestampReadback::Ready(TimestampFrame {
            disjoint: false,
            frequency: 1_000_000.0,
            stamps,
        })
    }

    #[test]
    fn reads_start_once_the_ring_has_filled() {
        let mut profiler = ScriptedProfiler {
            ring: 3,
            ..Default::default()
        };
        let mut timer = FrameTimer::new();

        assert!(timer.collect(&mut profiler).is_none());
        timer.advance();
        assert!(timer.collect(&mut profiler).is_none());
        assert!(profiler.reads.is_empty());

        timer.advance();
        profiler.script.push_back(frame(vec![0, 1000, 3000, 3500, 5500, 9500, 10_000]));
        let timings = timer.collect(&mut profiler).unwrap();
        assert_eq!(profiler.reads, vec![0]);
        assert_eq!(timings.frame, 0);
        assert_relative_eq!(timings.total_ms, 10.0);
        assert_relative_eq!(timings.polygonize_ms, 2.0);
        assert_relative_eq!(timings.z_prepass_ms, 0.5);
        assert_relative_eq!(timings.tile_lights_ms, 2.0);
        assert_relative_eq!(timings.draw_ms, 4.0);
        assert_relative_eq!(timings.present_ms, 0.5);
        assert_eq!(timer.last_timings(), Some(&timings));
    }

    #[test]
    fn slot_read_is_the_one_recorded_ring_minus_one_frames_ago() {
        let mut profiler = ScriptedProfiler {
            ring: 5,
            ..Default::default()
        };
        let mut timer = FrameTimer::new();
        for _ in 0..7 {
            timer.collect(&mut profiler);
            timer.advance();
        }
        // Frames 4, 5 and 6 read the slots of frames 0, 1 and 2.
        assert_eq!(profiler.reads, vec![0, 1, 2]);
        assert_eq!(timer.current_slot(&profiler), 2);
    }

    #[test]
    fn spins_while_not_ready() {
        let mut profiler = ScriptedProfiler {
            ring: 2,
            ..Default::default()
        };
        profiler.script.push_back(TimestampReadback::NotReady);
        profiler.script.push_back(TimestampReadback::NotReady);
        profiler.script.push_back(frame(vec![0; 7]));
        let mut timer = FrameTimer::new();
        timer.advance();

        assert!(timer.collect(&mut profiler).is_some());
        assert_eq!(profiler.reads.len(), 3);
        assert_eq!(profiler.polls.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[test]
    fn disjoint_frames_yield_no_numbers() {
        let mut profiler = ScriptedProfiler {
            ring: 2,
            ..Default::default()
        };
        profiler.script.push_back(TimestampReadback::Ready(TimestampFrame {
            disjoint: true,
            frequency: 1_000_000.0,
            stamps: vec![0; 7],
        }));
        profiler.script.push_back(TimestampReadback::Ready(TimestampFrame {
            disjoint: false,
            frequency: 0.0,
            stamps: vec![0; 7],
        }));
        let mut timer = FrameTimer::new();
        timer.advance();

        assert!(timer.collect(&mut profiler).is_none());
        assert!(timer.collect(&mut profiler).is_none());
        assert_eq!(timer.disjoint_frames(), 2);
        assert!(timer.last_timings().is_none());
    }

    #[test]
    fn log_line_names_every_lane() {
        let timings = FrameTimings {
            frame: 12,
            total_ms: 1.0,
            polygonize_ms: 0.1,
            z_prepass_ms: 0.2,
            tile_lights_ms: 0.3,
            draw_ms: 0.3,
            present_ms: 0.1,
        };
        assert_eq!(
            timings.to_string(),
            "Frame 12: Total frame time: 1.000 ms; Polygonize: 0.100 ms; Z Prepass: 0.200 ms; \
             Tile lights: 0.300 ms; Draw: 0.300 ms; Present: 0.100 ms;"
        );
    }
}
