// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Recycling pool shared by the buffer and image allocators.

pub mod recycling;

pub use recycling::{MemoryObjectFactory, PoolStats, RecyclingPool};
