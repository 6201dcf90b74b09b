// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Native status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code returned by a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClStatus(pub i32);

impl fmt::Display for ClStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl std::error::Error for ClStatus {}

impl ClStatus {
    pub const SUCCESS: ClStatus = ClStatus(0);
    pub const MEM_OBJECT_ALLOCATION_FAILURE: ClStatus = ClStatus(-4);
    pub const OUT_OF_RESOURCES: ClStatus = ClStatus(-5);
    pub const OUT_OF_HOST_MEMORY: ClStatus = ClStatus(-6);
    pub const IMAGE_FORMAT_NOT_SUPPORTED: ClStatus = ClStatus(-10);
    pub const INVALID_VALUE: ClStatus = ClStatus(-30);
    pub const INVALID_DEVICE: ClStatus = ClStatus(-33);
    pub const INVALID_CONTEXT: ClStatus = ClStatus(-34);
    pub const INVALID_MEM_OBJECT: ClStatus = ClStatus(-38);
    pub const INVALID_IMAGE_FORMAT_DESCRIPTOR: ClStatus = ClStatus(-39);
    pub const INVALID_IMAGE_SIZE: ClStatus = ClStatus(-40);
    pub const INVALID_HOST_PTR: ClStatus = ClStatus(-37);
    pub const INVALID_BUFFER_SIZE: ClStatus = ClStatus(-61);
    pub const INVALID_IMAGE_DESCRIPTOR: ClStatus = ClStatus(-65);

    /// Map a raw status code onto a `Result`.
    #[inline]
    pub fn check(code: i32) -> Result<(), ClStatus> {
        let status = ClStatus(code);
        if status.is_success() {
            Ok(())
        } else {
            Err(status)
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    /// True for the codes that mean the device (or host) ran out of memory,
    /// as opposed to an invalid request.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            *self,
            Self::MEM_OBJECT_ALLOCATION_FAILURE | Self::OUT_OF_RESOURCES | Self::OUT_OF_HOST_MEMORY
        )
    }

    /// Symbolic name of the status, `CL_UNKNOWN_ERROR` for codes without one.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::SUCCESS => "CL_SUCCESS",
            Self::MEM_OBJECT_ALLOCATION_FAILURE => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
            Self::OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
            Self::OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
            Self::IMAGE_FORMAT_NOT_SUPPORTED => "CL_IMAGE_FORMAT_NOT_SUPPORTED",
            Self::INVALID_VALUE => "CL_INVALID_VALUE",
            Self::INVALID_DEVICE => "CL_INVALID_DEVICE",
            Self::INVALID_CONTEXT => "CL_INVALID_CONTEXT",
            Self::INVALID_HOST_PTR => "CL_INVALID_HOST_PTR",
            Self::INVALID_MEM_OBJECT => "CL_INVALID_MEM_OBJECT",
            Self::INVALID_IMAGE_FORMAT_DESCRIPTOR => "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR",
            Self::INVALID_IMAGE_SIZE => "CL_INVALID_IMAGE_SIZE",
            Self::INVALID_BUFFER_SIZE => "CL_INVALID_BUFFER_SIZE",
            Self::INVALID_IMAGE_DESCRIPTOR => "CL_INVALID_IMAGE_DESCRIPTOR",
            _ => "CL_UNKNOWN_ERROR",
        }
    }
}
