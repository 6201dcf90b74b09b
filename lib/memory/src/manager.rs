// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Device memory subsystem: one buffer allocator and one image allocator
//! sharing a native API handle.

use super::{AllocatorConfig, BufferAllocator, DeviceMemoryApi, ImageAllocator, ImageLimits};

pub struct DeviceMemory<A: DeviceMemoryApi> {
    buffers: BufferAllocator<A>,
    images: ImageAllocator<A>,
}

impl<A: DeviceMemoryApi + Clone> DeviceMemory<A> {
    /// Build both allocators for one device.
    ///
    /// `device_limits` comes from the device capability query; the config may
    /// only tighten it.
    pub fn new(api: A, config: &AllocatorConfig, device_limits: ImageLimits) -> Self {
        let limits = config.image_limits(device_limits);
        Self {
            buffers: BufferAllocator::with_device_id(api.clone(), config.device_id),
            images: ImageAllocator::with_device_id(
                api,
                config.element_format,
                limits,
                config.device_id,
            ),
        }
    }
}

impl<A: DeviceMemoryApi> DeviceMemory<A> {
    pub fn buffers(&mut self) -> &mut BufferAllocator<A> {
        &mut self.buffers
    }

    pub fn images(&mut self) -> &mut ImageAllocator<A> {
        &mut self.images
    }

    pub fn buffer_allocator(&self) -> &BufferAllocator<A> {
        &self.buffers
    }

    pub fn image_allocator(&self) -> &ImageAllocator<A> {
        &self.images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;
    use crate::{ElementFormat, Image2DDesc, MemoryKind};

    #[test]
    fn test_allocators_share_device_and_config() {
        let device = MockDevice::new();
        let config = AllocatorConfig::builder()
            .element_format(ElementFormat::Fp16)
            .device_id(1)
            .max_image_width(Some(8))
            .build()
            .unwrap();
        let mut memory = DeviceMemory::new(device.clone(), &config, ImageLimits::new(1024, 1024));

        assert_eq!(memory.image_allocator().format(), ElementFormat::Fp16);
        assert_eq!(memory.image_allocator().limits(), ImageLimits::new(8, 1024));
        assert_eq!(memory.buffer_allocator().info().device_id, 1);
        assert_eq!(memory.image_allocator().info().kind, MemoryKind::Image2D);

        let b = memory.buffers().allocate(128).unwrap();
        let i = memory.images().allocate(Image2DDesc::new(8, 8)).unwrap();
        assert_ne!(b, i);
        assert!(memory.images().allocate(Image2DDesc::new(9, 8)).is_err());

        memory.buffers().release(b);
        drop(memory);
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.release_count(), 2);
    }
}
