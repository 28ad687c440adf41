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

//! The wgpu surface, adapter, device and queue of one window.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use winit::window::Window;

/// Device features the frame pipeline uses when the adapter offers them.
pub const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::TIMESTAMP_QUERY
    .union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS)
    .union(wgpu::Features::POLYGON_MODE_LINE);

/// Owns the wgpu objects bound to the application window.
#[derive(Debug)]
pub struct WgpuGraphicsContext {
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,

    // Configuration for the surface's swapchain behavior
    pub surface_config: wgpu::SurfaceConfiguration,
    supports_no_vsync: bool,

    pub adapter_name: String,
    pub adapter_backend: wgpu::Backend,
    pub active_device_features: wgpu::Features,
}

impl WgpuGraphicsContext {
    /// Creates the surface for `window`, picks an adapter able to present to
    /// it and opens a logical device.
    ///
    /// ## Arguments
    /// * `instance` - The shared `wgpu::Instance`.
    /// * `window` - The window the surface presents to.
    /// * `vsync` - Initial presentation mode.
    pub async fn new(instance: &wgpu::Instance, window: Arc<Window>, vsync: bool) -> Result<Self> {
        log::info!("Initializing wgpu graphics context...");
        let size = window.inner_size();

        // --- 1. Surface ---
        let surface = instance
            .create_surface(window)
            .map_err(|e| anyhow!("Failed to create surface: {}", e))?;
        log::debug!("wgpu surface created for the window.");

        // --- 2. Adapter ---
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .map_err(|e| anyhow!("No suitable graphics adapter: {}", e))?;
        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?}, Type: {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        // --- 3. Logical device and queue ---
        let features_to_enable = adapter.features() & OPTIONAL_FEATURES;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Ember Logical Device"),
                required_features: features_to_enable,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
        log::info!("Logical device and command queue created.");

        device.on_uncaptured_error(Box::new(|e| {
            log::error!("wgpu uncaptured error: {e}");
        }));

        let active_device_features = device.features();
        log::info!("Active device features: {active_device_features:?}");

        // --- 4. Surface configuration ---
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("The surface reports no supported formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let supports_no_vsync = surface_caps
            .present_modes
            .iter()
            .any(|m| matches!(m, wgpu::PresentMode::Immediate | wgpu::PresentMode::Mailbox));

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: present_mode(vsync, supports_no_vsync),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        log::info!(
            "Surface configured: {}x{} {:?}, {:?}",
            surface_config.width,
            surface_config.height,
            surface_config.format,
            surface_config.present_mode
        );

        Ok(Self {
            surface,
            adapter,
            device,
            queue,
            surface_config,
            supports_no_vsync,
            adapter_name: adapter_info.name,
            adapter_backend: adapter_info.backend,
            active_device_features,
        })
    }

    /// Reconfigures the surface for a new window size. Zero sizes are ignored.
    pub fn resize(&mut self, new_width: u32, new_height: u32) {
        if new_width > 0 && new_height > 0 {
            log::info!("Resizing surface to {new_width}x{new_height}");
            self.surface_config.width = new_width;
            self.surface_config.height = new_height;
            self.reconfigure();
        } else {
            log::warn!("Ignoring resize request to zero dimensions: {new_width}x{new_height}");
        }
    }

    /// Switches between vsync and the fastest available presentation mode.
    pub fn set_vsync(&mut self, enabled: bool) {
        let mode = present_mode(enabled, self.supports_no_vsync);
        if mode != self.surface_config.present_mode {
            self.surface_config.present_mode = mode;
            self.reconfigure();
            log::info!("Present mode: {:?}", mode);
        }
    }

    /// Applies the current configuration to the surface again.
    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.surface_config);
    }

    /// Returns the size of the surface configuration.
    pub fn get_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }
}

fn present_mode(vsync: bool, supports_no_vsync: bool) -> wgpu::PresentMode {
    if vsync || !supports_no_vsync {
        wgpu::PresentMode::Fifo
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_falls_back_to_fifo() {
        assert_eq!(present_mode(true, true), wgpu::PresentMode::Fifo);
        assert_eq!(present_mode(false, false), wgpu::PresentMode::Fifo);
        assert_eq!(present_mode(false, true), wgpu::PresentMode::AutoNoVsync);
    }
}
