// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! OpenCL implementation of [`DeviceMemoryApi`].

use super::{
    ChannelDataType, ChannelOrder, ClStatus, DeviceMemoryApi, ImageDescSpec, ImageFormatSpec,
    MemFlags,
};
use crate::image::ImageLimits;
use cl3::device::{CL_DEVICE_IMAGE2D_MAX_HEIGHT, CL_DEVICE_IMAGE2D_MAX_WIDTH, get_device_info};
use cl3::memory::{
    CL_FLOAT, CL_HALF_FLOAT, CL_MEM_OBJECT_IMAGE2D, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE,
    CL_MEM_WRITE_ONLY, CL_RGBA,
};
use cl3::types::{cl_context, cl_device_id, cl_image_desc, cl_image_format, cl_mem, cl_mem_flags};
use std::ptr;

/// Native allocation primitives bound to an OpenCL context.
///
/// The context is borrowed, not retained: whoever created it must keep it alive
/// for as long as any allocator built on this value exists.
#[derive(Debug, Clone, Copy)]
pub struct ClDevice {
    context: cl_context,
}

impl ClDevice {
    /// Wrap a raw OpenCL context.
    ///
    /// # Safety
    ///
    /// `context` must be a valid OpenCL context that outlives the returned value
    /// and every allocator it is handed to.
    pub unsafe fn from_raw(context: cl_context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> cl_context {
        self.context
    }
}

fn mem_flags(flags: MemFlags) -> cl_mem_flags {
    let mut out: cl_mem_flags = 0;
    if flags.bits() & MemFlags::READ_WRITE.bits() != 0 {
        out |= CL_MEM_READ_WRITE;
    }
    if flags.bits() & MemFlags::WRITE_ONLY.bits() != 0 {
        out |= CL_MEM_WRITE_ONLY;
    }
    if flags.bits() & MemFlags::READ_ONLY.bits() != 0 {
        out |= CL_MEM_READ_ONLY;
    }
    out
}

fn image_format(format: &ImageFormatSpec) -> cl_image_format {
    cl_image_format {
        image_channel_order: match format.channel_order {
            ChannelOrder::Rgba => CL_RGBA,
        },
        image_channel_data_type: match format.channel_data_type {
            ChannelDataType::HalfFloat => CL_HALF_FLOAT,
            ChannelDataType::Float => CL_FLOAT,
        },
    }
}

fn image_desc(desc: &ImageDescSpec) -> cl_image_desc {
    cl_image_desc {
        image_type: CL_MEM_OBJECT_IMAGE2D,
        image_width: desc.width,
        image_height: desc.height,
        image_depth: desc.depth,
        image_array_size: desc.array_size,
        image_row_pitch: desc.row_pitch,
        image_slice_pitch: desc.slice_pitch,
        num_mip_levels: desc.num_mip_levels,
        num_samples: desc.num_samples,
        buffer: ptr::null_mut(),
    }
}

impl DeviceMemoryApi for ClDevice {
    type Handle = cl_mem;

    fn create_buffer(&mut self, flags: MemFlags, size: usize) -> Result<cl_mem, ClStatus> {
        // SAFETY: the context is valid per `from_raw`, and no host pointer is passed.
        unsafe { cl3::memory::create_buffer(self.context, mem_flags(flags), size, ptr::null_mut()) }
            .map_err(ClStatus)
    }

    fn create_image(
        &mut self,
        flags: MemFlags,
        format: &ImageFormatSpec,
        desc: &ImageDescSpec,
    ) -> Result<cl_mem, ClStatus> {
        let format = image_format(format);
        let desc = image_desc(desc);
        // SAFETY: both descriptors live on the stack for the duration of the call
        // and pitches are zero, as required when no host pointer is given.
        unsafe {
            cl3::memory::create_image(
                self.context,
                mem_flags(flags),
                &format,
                &desc,
                ptr::null_mut(),
            )
        }
        .map_err(ClStatus)
    }

    fn release_mem_object(&mut self, handle: cl_mem) -> Result<(), ClStatus> {
        // SAFETY: handles only reach here from the allocators' ownership tables,
        // each of which releases a handle exactly once.
        unsafe { cl3::memory::release_mem_object(handle) }.map_err(ClStatus)
    }
}

/// Query the largest 2D image the device supports.
///
/// # Safety
///
/// `device` must be a valid OpenCL device id.
pub unsafe fn query_image2d_limits(device: cl_device_id) -> Result<ImageLimits, ClStatus> {
    let max_width = get_device_info(device, CL_DEVICE_IMAGE2D_MAX_WIDTH)
        .map_err(ClStatus)?
        .to_size();
    let max_height = get_device_info(device, CL_DEVICE_IMAGE2D_MAX_HEIGHT)
        .map_err(ClStatus)?
        .to_size();

    tracing::debug!(max_width, max_height, "queried device image2d limits");

    Ok(ImageLimits::new(max_width, max_height))
}
