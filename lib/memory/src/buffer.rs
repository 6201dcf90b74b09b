// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Caching allocator for linear device buffers.

use super::native::{DeviceMemoryApi, MemFlags};
use super::pool::{MemoryObjectFactory, PoolStats, RecyclingPool};
use super::{AllocatorError, AllocatorInfo, DeviceAllocator, MemoryKind, Result};

/// Creates read-write buffers of exactly the requested byte count.
#[derive(Debug)]
pub(crate) struct BufferFactory<A> {
    api: A,
}

impl<A: DeviceMemoryApi> MemoryObjectFactory for BufferFactory<A> {
    type Key = usize;
    type Handle = A::Handle;

    fn create(&mut self, size: &usize) -> Result<A::Handle> {
        self.api
            .create_buffer(MemFlags::READ_WRITE, *size)
            .map_err(|status| AllocatorError::DeviceAllocation {
                kind: MemoryKind::Buffer,
                status,
            })
    }

    fn destroy(&mut self, handle: A::Handle) -> Result<()> {
        self.api
            .release_mem_object(handle)
            .map_err(AllocatorError::ReleaseFailed)
    }
}

/// Device buffer allocator that recycles released buffers by exact size.
///
/// A released buffer is only reused for a request of the very same byte count.
/// Buffers are never shrunk, split or destroyed while the allocator is alive;
/// dropping the allocator releases every buffer it created, including any the
/// caller still holds.
#[derive(Debug)]
pub struct BufferAllocator<A: DeviceMemoryApi> {
    info: AllocatorInfo,
    pool: RecyclingPool<BufferFactory<A>>,
}

impl<A: DeviceMemoryApi> BufferAllocator<A> {
    pub fn new(api: A) -> Self {
        Self::with_device_id(api, 0)
    }

    pub fn with_device_id(api: A, device_id: u32) -> Self {
        tracing::debug!(device_id, "creating buffer allocator");
        Self {
            info: AllocatorInfo::buffer(device_id),
            pool: RecyclingPool::new(AllocatorInfo::BUFFER_ALLOCATOR_NAME, BufferFactory { api }),
        }
    }

    /// Allocate a buffer of exactly `size` bytes.
    ///
    /// Returns the most recently released buffer of that size if one is cached;
    /// otherwise creates a new one. Zero-byte requests are rejected with
    /// [`AllocatorError::InvalidSize`].
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn allocate(&mut self, size: usize) -> Result<A::Handle> {
        if size == 0 {
            return Err(AllocatorError::InvalidSize(size));
        }

        self.pool.acquire(&size)
    }

    /// Return a buffer to the cache. The buffer stays allocated on the device.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not allocated by this allocator or is already released.
    pub fn release(&mut self, handle: A::Handle) {
        self.pool.recycle(handle);
    }

    /// Byte size `handle` was created with.
    pub fn size_of(&self, handle: A::Handle) -> Option<usize> {
        self.pool.key_of(handle).copied()
    }

    pub fn is_cached(&self, handle: A::Handle) -> bool {
        self.pool.is_cached(handle)
    }

    pub fn api(&self) -> &A {
        &self.pool.factory().api
    }

    pub fn info(&self) -> &AllocatorInfo {
        &self.info
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl<A: DeviceMemoryApi> DeviceAllocator for BufferAllocator<A> {
    type Handle = A::Handle;

    fn info(&self) -> &AllocatorInfo {
        &self.info
    }

    fn allocate_bytes(&mut self, size: usize) -> Result<A::Handle> {
        self.allocate(size)
    }

    fn release(&mut self, handle: A::Handle) {
        self.pool.recycle(handle);
    }

    fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
