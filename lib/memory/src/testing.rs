// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`DeviceMemoryApi`] for exercising the allocators without a GPU.

use crate::native::{ClStatus, DeviceMemoryApi, ImageDescSpec, ImageFormatSpec, MemFlags};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle of a mock memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockMem(pub u64);

/// A native call observed by [`MockDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    CreateBuffer {
        flags: MemFlags,
        size: usize,
        handle: MockMem,
    },
    CreateImage {
        flags: MemFlags,
        format: ImageFormatSpec,
        desc: ImageDescSpec,
        handle: MockMem,
    },
    Release {
        handle: MockMem,
    },
}

#[derive(Debug, Default)]
struct MockState {
    next: u64,
    calls: Vec<NativeCall>,
    create_attempts: usize,
    live: HashSet<MockMem>,
    fail_next_create: Option<ClStatus>,
    fail_releases: bool,
}

/// Records every native call and tracks which objects are alive.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// allocator owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Make the next create call fail with `status`.
    pub fn fail_next_create(&self, status: ClStatus) {
        self.state().fail_next_create = Some(status);
    }

    /// Make every release call report failure (the object is still freed).
    pub fn fail_releases(&self, fail: bool) {
        self.state().fail_releases = fail;
    }

    /// Successful native calls in order.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.state().calls.clone()
    }

    /// Create calls made, including failed ones.
    pub fn create_count(&self) -> usize {
        self.state().create_attempts
    }

    pub fn release_count(&self) -> usize {
        self.released().len()
    }

    /// Handles passed to release, in call order.
    pub fn released(&self) -> Vec<MockMem> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::Release { handle } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    /// Objects created and not yet released.
    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    fn create(&self, record: impl FnOnce(MockMem) -> NativeCall) -> Result<MockMem, ClStatus> {
        let mut state = self.state();
        state.create_attempts += 1;

        if let Some(status) = state.fail_next_create.take() {
            return Err(status);
        }

        state.next += 1;
        let handle = MockMem(state.next);
        state.live.insert(handle);
        state.calls.push(record(handle));
        Ok(handle)
    }
}

impl DeviceMemoryApi for MockDevice {
    type Handle = MockMem;

    fn create_buffer(&mut self, flags: MemFlags, size: usize) -> Result<MockMem, ClStatus> {
        if size == 0 {
            self.state().create_attempts += 1;
            return Err(ClStatus::INVALID_BUFFER_SIZE);
        }
        self.create(|handle| NativeCall::CreateBuffer {
            flags,
            size,
            handle,
        })
    }

    fn create_image(
        &mut self,
        flags: MemFlags,
        format: &ImageFormatSpec,
        desc: &ImageDescSpec,
    ) -> Result<MockMem, ClStatus> {
        let (format, desc) = (*format, *desc);
        self.create(|handle| NativeCall::CreateImage {
            flags,
            format,
            desc,
            handle,
        })
    }

    fn release_mem_object(&mut self, handle: MockMem) -> Result<(), ClStatus> {
        let mut state = self.state();
        assert!(
            state.live.remove(&handle),
            "release of dead or unknown mock object {handle:?}"
        );
        state.calls.push(NativeCall::Release { handle });

        if state.fail_releases {
            Err(ClStatus::INVALID_MEM_OBJECT)
        } else {
            Ok(())
        }
    }
}
