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

//! GPU timestamp queries read back through a ring of staging buffers.
//!
//! Each ring slot owns `markers_per_frame` queries, a region of the resolve
//! buffer and one staging buffer. A slot goes through resolve (recorded in the
//! frame's encoder), mapping (scheduled after submission) and readback (when
//! the frame timer comes back to it). Nothing here ever blocks on the GPU.

use super::command::WgpuCommandEncoder;
use super::device::WgpuDevice;
use ember_core::renderer::traits::{
    CommandEncoder, GpuProfiler, TimestampFrame, TimestampReadback,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

const TIMESTAMP_SIZE: u64 = std::mem::size_of::<u64>() as u64;

const MAP_IDLE: u8 = 0;
const MAP_PENDING: u8 = 1;
const MAP_DONE: u8 = 2;
const MAP_FAILED: u8 = 3;

#[derive(Debug)]
struct TimestampSlot {
    staging: wgpu::Buffer,
    /// Set when this frame's queries were resolved into the staging buffer.
    recorded: AtomicBool,
    /// One of the `MAP_*` states, written by the `map_async` callback.
    map_state: Arc<AtomicU8>,
}

/// A [`GpuProfiler`] backed by a wgpu timestamp query set.
#[derive(Debug)]
pub struct WgpuTimestampProfiler {
    device: WgpuDevice,
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    slots: Vec<TimestampSlot>,
    markers_per_frame: u32,
    /// Distance between two slots in the resolve buffer.
    slot_stride: u64,
    period_ns: f32,
}

impl WgpuTimestampProfiler {
    /// Returns `true` if the device can write timestamps between passes.
    pub fn feature_available(features: wgpu::Features) -> bool {
        features.contains(
            wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS,
        )
    }

    /// Creates the query set and buffers for `ring_size` frames of
    /// `markers_per_frame` timestamps each.
    ///
    /// Returns `None` if the device lacks the timestamp features.
    pub fn new(device: &WgpuDevice, ring_size: usize, markers_per_frame: u32) -> Option<Self> {
        if !Self::feature_available(device.features()) {
            log::info!("GPU timestamps unavailable on this device, profiling disabled.");
            return None;
        }
        if ring_size == 0 || markers_per_frame == 0 {
            return None;
        }

        let wgpu_device = device.wgpu_device();
        let frame_bytes = markers_per_frame as u64 * TIMESTAMP_SIZE;
        let slot_stride = frame_bytes.next_multiple_of(wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT);

        let query_set = wgpu_device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Ember GPU Timestamp QuerySet"),
            ty: wgpu::QueryType::Timestamp,
            count: ring_size as u32 * markers_per_frame,
        });
        let resolve_buffer = wgpu_device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ember GPU Timestamp Resolve Buffer"),
            size: slot_stride * ring_size as u64,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let slots = (0..ring_size)
            .map(|i| TimestampSlot {
                staging: wgpu_device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Ember GPU Timestamp Staging Buffer {i}")),
                    size: frame_bytes,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                recorded: AtomicBool::new(false),
                map_state: Arc::new(AtomicU8::new(MAP_IDLE)),
            })
            .collect();

        let period_ns = device.wgpu_queue().get_timestamp_period();
        log::info!(
            "GPU timestamp profiler ready: {} slots of {} markers, period {:.3} ns.",
            ring_size,
            markers_per_frame,
            period_ns
        );

        Some(Self {
            device: device.clone(),
            query_set,
            resolve_buffer,
            slots,
            markers_per_frame,
            slot_stride,
            period_ns,
        })
    }

    pub(crate) fn query_set(&self) -> &wgpu::QuerySet {
        &self.query_set
    }

    /// Index in the query set of `marker` within `slot`.
    pub(crate) fn query_index(&self, slot: usize, marker: u32) -> Option<u32> {
        (slot < self.slots.len() && marker < self.markers_per_frame)
            .then(|| slot as u32 * self.markers_per_frame + marker)
    }
}

/// Turns raw ticks into a frame, flagging it disjoint when the counter went backwards.
fn frame_from_ticks(stamps: Vec<u64>, period_ns: f32) -> TimestampFrame {
    let disjoint = stamps.windows(2).any(|pair| pair[1] < pair[0]) || period_ns <= 0.0;
    TimestampFrame {
        disjoint,
        frequency: 1.0e9 / period_ns as f64,
        stamps,
    }
}

impl GpuProfiler for WgpuTimestampProfiler {
    fn ring_size(&self) -> usize {
        self.slots.len()
    }

    fn markers_per_frame(&self) -> u32 {
        self.markers_per_frame
    }

    fn resolve(&self, encoder: &mut dyn CommandEncoder, slot: usize) {
        let Some(state) = self.slots.get(slot) else {
            log::warn!("Timestamp slot {} is out of range.", slot);
            return;
        };
        if state.map_state.load(Ordering::Acquire) != MAP_IDLE {
            log::debug!(target: "gpu_profile", "Slot {} still mapped, not resolving.", slot);
            return;
        }
        let Some(encoder) = encoder.as_any_mut().downcast_mut::<WgpuCommandEncoder>() else {
            log::warn!("WgpuTimestampProfiler needs a WgpuCommandEncoder.");
            return;
        };

        let first = slot as u32 * self.markers_per_frame;
        let offset = slot as u64 * self.slot_stride;
        let wgpu_encoder = encoder.wgpu_encoder_mut();
        wgpu_encoder.resolve_query_set(
            &self.query_set,
            first..first + self.markers_per_frame,
            &self.resolve_buffer,
            offset,
        );
        wgpu_encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            offset,
            &state.staging,
            0,
            self.markers_per_frame as u64 * TIMESTAMP_SIZE,
        );
        state.recorded.store(true, Ordering::Release);
    }

    fn after_submit(&mut self, slot: usize) {
        let Some(state) = self.slots.get(slot) else {
            return;
        };
        if !state.recorded.load(Ordering::Acquire)
            || state
                .map_state
                .compare_exchange(MAP_IDLE, MAP_PENDING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }

        let map_state = Arc::clone(&state.map_state);
        state
            .staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let next = match result {
                    Ok(()) => MAP_DONE,
                    Err(e) => {
                        log::error!("GPU timestamp staging map_async failed: {:?}", e);
                        MAP_FAILED
                    }
                };
                map_state.store(next, Ordering::Release);
            });
    }

    fn poll(&self) {
        self.device.poll_device_non_blocking();
    }

    fn read_slot(&mut self, slot: usize) -> TimestampReadback {
        let Some(state) = self.slots.get(slot) else {
            return TimestampReadback::Empty;
        };
        match state.map_state.load(Ordering::Acquire) {
            MAP_PENDING => TimestampReadback::NotReady,
            MAP_DONE => {
                let stamps: Vec<u64> = {
                    let view = state.staging.slice(..).get_mapped_range();
                    bytemuck::pod_collect_to_vec::<u8, u64>(&view)
                };
                state.staging.unmap();
                state.recorded.store(false, Ordering::Release);
                state.map_state.store(MAP_IDLE, Ordering::Release);
                TimestampReadback::Ready(frame_from_ticks(stamps, self.period_ns))
            }
            MAP_FAILED => {
                state.recorded.store(false, Ordering::Release);
                state.map_state.store(MAP_IDLE, Ordering::Release);
                TimestampReadback::Empty
            }
            _ => {
                // Resolved but never submitted, or never resolved at all.
                state.recorded.store(false, Ordering::Release);
                TimestampReadback::Empty
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
