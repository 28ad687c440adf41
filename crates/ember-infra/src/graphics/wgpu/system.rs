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

//! Brings up the wgpu backend for a window.

use super::context::WgpuGraphicsContext;
use super::device::WgpuDevice;
use super::profiler::WgpuTimestampProfiler;
use ember_core::renderer::{GpuProfiler, GraphicsDevice, RenderError};
use std::sync::Arc;
use winit::window::Window;

/// Owns the wgpu device for the lifetime of the application window.
#[derive(Debug)]
pub struct WgpuRenderSystem {
    device: WgpuDevice,
    adapter_name: String,
    adapter_backend: wgpu::Backend,
}

impl WgpuRenderSystem {
    /// Creates the instance, surface and logical device for `window`.
    ///
    /// Blocks on adapter and device requests.
    pub fn new(window: Arc<Window>, vsync: bool) -> Result<Self, RenderError> {
        log::info!("WgpuRenderSystem: Initializing...");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let context = pollster::block_on(WgpuGraphicsContext::new(&instance, window, vsync))
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let (width, height) = context.get_size();
        let adapter_name = context.adapter_name.clone();
        let adapter_backend = context.adapter_backend;
        log::info!(
            "WgpuRenderSystem: GraphicsContext created with size: {}x{}",
            width,
            height
        );

        Ok(Self {
            device: WgpuDevice::new(context),
            adapter_name,
            adapter_backend,
        })
    }

    /// The graphics device every lane records against.
    pub fn device(&self) -> &WgpuDevice {
        &self.device
    }

    /// Name and backend of the adapter in use, for window titles and logs.
    pub fn adapter_description(&self) -> String {
        format!("{} ({:?})", self.adapter_name, self.adapter_backend)
    }

    /// Creates a timestamp profiler, or `None` when the device cannot time passes.
    pub fn create_profiler(
        &self,
        ring_size: usize,
        markers_per_frame: u32,
    ) -> Option<Box<dyn GpuProfiler>> {
        if !self.device.supports_feature(super::device::FEATURE_GPU_TIMESTAMPS) {
            log::info!("GPU timestamp feature not available; instrumentation disabled.");
            return None;
        }
        WgpuTimestampProfiler::new(&self.device, ring_size, markers_per_frame)
            .map(|profiler| Box::new(profiler) as Box<dyn GpuProfiler>)
    }

    /// Waits for the GPU and releases every resource still registered.
    pub fn shutdown(&self) {
        log::info!("WgpuRenderSystem: Shutting down...");
        self.device.poll_device_blocking();
        let leaked = self.device.live_buffer_count();
        if leaked > 0 {
            log::warn!("{} buffers were still alive at shutdown.", leaked);
        }
        self.device.release_all();
    }
}
