// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Caching allocators for OpenCL device memory objects.
//!
//! Native buffer and image creation is slow enough to dominate tensor allocation
//! in iterative inference. The allocators in this crate never destroy an object
//! when the caller releases it; they park it on a free-list and hand it out again
//! to the next request with a compatible key:
//! - [`BufferAllocator`]: linear buffers keyed by exact byte size
//! - [`ImageAllocator`]: 2D images keyed by `(width, height, element format)`
//!
//! Both are thin strategies over one [`RecyclingPool`](pool::RecyclingPool).
//! Everything they ever created is released to the device when they are dropped.

pub mod config;
pub mod native;
pub mod pool;

mod buffer;
mod image;
mod manager;

#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use buffer::BufferAllocator;
pub use config::{AllocatorConfig, AllocatorConfigBuilder};
pub use image::{ElementFormat, Image2DDesc, ImageAllocator, ImageKey, ImageLimits};
pub use manager::DeviceMemory;
pub use native::{ClStatus, DeviceMemoryApi};
pub use pool::PoolStats;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for allocator operations.
pub type Result<T> = std::result::Result<T, AllocatorError>;

/// Errors that can occur during allocator operations.
#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("{kind} allocation failed: {status}")]
    DeviceAllocation { kind: MemoryKind, status: ClStatus },

    #[error(
        "invalid image2d shape {width}x{height}, device supports up to {max_width}x{max_height}"
    )]
    InvalidShape {
        width: usize,
        height: usize,
        max_width: usize,
        max_height: usize,
    },

    #[error("invalid allocation size: {0} bytes")]
    InvalidSize(usize),

    #[error("release failed: {0}")]
    ReleaseFailed(ClStatus),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AllocatorError {
    /// True if the device ran out of memory, as opposed to rejecting the request.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, AllocatorError::DeviceAllocation { status, .. } if status.is_out_of_memory())
    }
}

/// Kind of device memory object an allocator hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryKind {
    /// Linear, untyped device buffer.
    Buffer,

    /// 2D image object with its shape and format baked in.
    Image2D,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryKind::Buffer => write!(f, "buffer"),
            MemoryKind::Image2D => write!(f, "image2d"),
        }
    }
}

/// Identity of an allocator, as registered with the surrounding runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatorInfo {
    pub name: &'static str,
    pub kind: MemoryKind,
    pub device_id: u32,
}

impl AllocatorInfo {
    pub const BUFFER_ALLOCATOR_NAME: &'static str = "OpenCL_Buffer";
    pub const IMAGE2D_ALLOCATOR_NAME: &'static str = "OpenCL_Image2D";

    pub fn buffer(device_id: u32) -> Self {
        Self {
            name: Self::BUFFER_ALLOCATOR_NAME,
            kind: MemoryKind::Buffer,
            device_id,
        }
    }

    pub fn image2d(device_id: u32) -> Self {
        Self {
            name: Self::IMAGE2D_ALLOCATOR_NAME,
            kind: MemoryKind::Image2D,
            device_id,
        }
    }
}

/// Allocator interface shared by every device memory allocator.
///
/// The size-only entry point exists so the runtime can drive any allocator
/// uniformly. Allocators whose objects cannot be described by a byte count
/// reject it with [`AllocatorError::Unsupported`].
pub trait DeviceAllocator {
    type Handle: Copy + Eq + fmt::Debug;

    fn info(&self) -> &AllocatorInfo;

    /// Allocate an object of `size` bytes.
    fn allocate_bytes(&mut self, size: usize) -> Result<Self::Handle>;

    /// Give an object back to the allocator.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not allocated by this allocator or is already released.
    fn release(&mut self, handle: Self::Handle);

    fn stats(&self) -> PoolStats;
}
