// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Native device memory primitives.
//!
//! The allocators never talk to the driver directly. Everything they need from
//! the native API (buffer creation, 2D image creation and memory-object release)
//! goes through [`DeviceMemoryApi`], which keeps the caching policy testable
//! without a GPU and lets the OpenCL binding live behind the `opencl` feature.

mod status;

#[cfg(feature = "opencl")]
mod opencl;

pub use status::ClStatus;

#[cfg(feature = "opencl")]
pub use opencl::{ClDevice, query_image2d_limits};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Access flags passed to the native create calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemFlags(u64);

impl MemFlags {
    /// `CL_MEM_READ_WRITE`
    pub const READ_WRITE: MemFlags = MemFlags(1 << 0);
    /// `CL_MEM_WRITE_ONLY`
    pub const WRITE_ONLY: MemFlags = MemFlags(1 << 1);
    /// `CL_MEM_READ_ONLY`
    pub const READ_ONLY: MemFlags = MemFlags(1 << 2);

    #[inline]
    pub fn bits(&self) -> u64 {
        self.0
    }
}

/// Channel layout of a texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Four channels per texel; the only order the image allocator requests.
    Rgba,
}

impl ChannelOrder {
    /// Number of tensor elements held by one texel.
    pub const fn channels(&self) -> usize {
        match self {
            ChannelOrder::Rgba => 4,
        }
    }
}

/// Storage type of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelDataType {
    HalfFloat,
    Float,
}

/// Native image format descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageFormatSpec {
    pub channel_order: ChannelOrder,
    pub channel_data_type: ChannelDataType,
}

/// Native image shape descriptor for a plain 2D image.
///
/// Only width and height are meaningful. The remaining fields are kept so the
/// struct maps one-to-one onto `cl_image_desc`; they must stay zero because the
/// image is not an array, not mipmapped, not multisampled and has no host or
/// buffer backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDescSpec {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub array_size: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
    pub num_mip_levels: u32,
    pub num_samples: u32,
}

impl ImageDescSpec {
    pub fn image_2d(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            depth: 0,
            array_size: 0,
            // must be 0 without a host pointer
            row_pitch: 0,
            slice_pitch: 0,
            num_mip_levels: 0,
            num_samples: 0,
        }
    }
}

/// The native allocation primitives the caching allocators are built on.
///
/// Every call reports the raw driver status on failure; translating that status
/// into an [`AllocatorError`](crate::AllocatorError) is the caller's job.
///
/// Handles are plain identifiers. Implementations must hand out a distinct
/// handle for every live object, since the allocators key their ownership
/// tables on handle identity.
pub trait DeviceMemoryApi {
    type Handle: Copy + Eq + Hash + fmt::Debug;

    /// Create a linear device buffer of exactly `size` bytes.
    fn create_buffer(&mut self, flags: MemFlags, size: usize) -> Result<Self::Handle, ClStatus>;

    /// Create a 2D image object.
    fn create_image(
        &mut self,
        flags: MemFlags,
        format: &ImageFormatSpec,
        desc: &ImageDescSpec,
    ) -> Result<Self::Handle, ClStatus>;

    /// Drop the caller's reference on a memory object.
    fn release_mem_object(&mut self, handle: Self::Handle) -> Result<(), ClStatus>;
}
