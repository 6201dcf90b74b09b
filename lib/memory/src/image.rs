// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Caching allocator for 2D image objects.
//!
//! Image objects carry their shape and texel format from creation, so two
//! images are only interchangeable when width, height and format all match.
//! A 4x8 image and an 8x4 image have the same footprint but are never reused
//! for one another.

use super::native::{
    ChannelDataType, ChannelOrder, DeviceMemoryApi, ImageDescSpec, ImageFormatSpec, MemFlags,
};
use super::pool::{MemoryObjectFactory, PoolStats, RecyclingPool};
use super::{AllocatorError, AllocatorInfo, DeviceAllocator, MemoryKind, Result};
use serde::{Deserialize, Serialize};

/// Precision of each image channel, fixed for the lifetime of an allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementFormat {
    Fp16,
    #[default]
    Fp32,
}

impl ElementFormat {
    pub fn from_fp16(use_fp16: bool) -> Self {
        if use_fp16 {
            ElementFormat::Fp16
        } else {
            ElementFormat::Fp32
        }
    }

    pub fn channel_data_type(&self) -> ChannelDataType {
        match self {
            ElementFormat::Fp16 => ChannelDataType::HalfFloat,
            ElementFormat::Fp32 => ChannelDataType::Float,
        }
    }

    /// Bytes per channel.
    pub fn element_size(&self) -> usize {
        match self {
            ElementFormat::Fp16 => 2,
            ElementFormat::Fp32 => 4,
        }
    }
}

/// Largest image the device can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLimits {
    max_width: usize,
    max_height: usize,
}

impl ImageLimits {
    pub fn new(max_width: usize, max_height: usize) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    #[inline]
    pub fn max_width(&self) -> usize {
        self.max_width
    }

    #[inline]
    pub fn max_height(&self) -> usize {
        self.max_height
    }

    /// Shrink the limits to the given overrides; never grows them.
    pub fn clamp(self, max_width: Option<usize>, max_height: Option<usize>) -> Self {
        Self {
            max_width: max_width.map_or(self.max_width, |w| w.min(self.max_width)),
            max_height: max_height.map_or(self.max_height, |h| h.min(self.max_height)),
        }
    }

    pub fn admits(&self, desc: &Image2DDesc) -> bool {
        (1..=self.max_width).contains(&desc.width) && (1..=self.max_height).contains(&desc.height)
    }
}

/// Width and height of a 2D image, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image2DDesc {
    pub width: usize,
    pub height: usize,
}

impl Image2DDesc {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Pack a tensor shape into the image that stores it.
    ///
    /// Four consecutive channel values share one RGBA texel:
    /// - `[n]` -> `(ceil(n/4), 1)`
    /// - `[h, w]` -> `(ceil(w/4), h)`
    /// - `[c, h, w]` -> `(ceil(c/4) * w, h)`
    /// - `[n, c, h, w]` -> `(ceil(c/4) * w, n * h)`
    ///
    /// Any other rank, or a shape whose packed size overflows, packs to `0x0`,
    /// which no allocator accepts.
    pub fn pack_from_tensor(shape: &[usize]) -> Self {
        let texels = |c: usize| c.div_ceil(ChannelOrder::Rgba.channels());
        let packed = match *shape {
            [n] => Some((texels(n), 1)),
            [h, w] => Some((texels(w), h)),
            [c, h, w] => texels(c).checked_mul(w).map(|width| (width, h)),
            [n, c, h, w] => texels(c).checked_mul(w).zip(n.checked_mul(h)),
            _ => None,
        };
        packed.map_or(Self::new(0, 0), |(width, height)| Self::new(width, height))
    }

    pub fn texels(&self) -> usize {
        self.width * self.height
    }
}

/// Cache key of the image allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageKey {
    pub width: usize,
    pub height: usize,
    pub format: ElementFormat,
}

impl ImageKey {
    pub fn new(desc: Image2DDesc, format: ElementFormat) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format,
        }
    }

    pub fn desc(&self) -> Image2DDesc {
        Image2DDesc::new(self.width, self.height)
    }

    /// Device footprint in bytes, ignoring any driver padding.
    pub fn byte_size(&self) -> usize {
        self.width * self.height * ChannelOrder::Rgba.channels() * self.format.element_size()
    }
}

/// Creates RGBA 2D images with zeroed auxiliary descriptor fields.
#[derive(Debug)]
pub(crate) struct ImageFactory<A> {
    api: A,
}

impl<A: DeviceMemoryApi> MemoryObjectFactory for ImageFactory<A> {
    type Key = ImageKey;
    type Handle = A::Handle;

    fn create(&mut self, key: &ImageKey) -> Result<A::Handle> {
        let format = ImageFormatSpec {
            channel_order: ChannelOrder::Rgba,
            channel_data_type: key.format.channel_data_type(),
        };
        let desc = ImageDescSpec::image_2d(key.width, key.height);

        self.api
            .create_image(MemFlags::READ_WRITE, &format, &desc)
            .map_err(|status| AllocatorError::DeviceAllocation {
                kind: MemoryKind::Image2D,
                status,
            })
    }

    fn destroy(&mut self, handle: A::Handle) -> Result<()> {
        self.api
            .release_mem_object(handle)
            .map_err(AllocatorError::ReleaseFailed)
    }
}

/// 2D image allocator that recycles released images by exact shape.
pub struct ImageAllocator<A: DeviceMemoryApi> {
    info: AllocatorInfo,
    format: ElementFormat,
    limits: ImageLimits,
    pool: RecyclingPool<ImageFactory<A>>,
}

impl<A: DeviceMemoryApi> std::fmt::Debug for ImageAllocator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAllocator")
            .field("format", &self.format)
            .field("limits", &self.limits)
            .field("pool", &self.pool)
            .finish()
    }
}

impl<A: DeviceMemoryApi> ImageAllocator<A> {
    pub fn new(api: A, format: ElementFormat, limits: ImageLimits) -> Self {
        Self::with_device_id(api, format, limits, 0)
    }

    pub fn with_device_id(
        api: A,
        format: ElementFormat,
        limits: ImageLimits,
        device_id: u32,
    ) -> Self {
        tracing::debug!(
            device_id,
            ?format,
            max_width = limits.max_width(),
            max_height = limits.max_height(),
            "creating image2d allocator"
        );

        Self {
            info: AllocatorInfo::image2d(device_id),
            format,
            limits,
            pool: RecyclingPool::new(AllocatorInfo::IMAGE2D_ALLOCATOR_NAME, ImageFactory { api }),
        }
    }

    /// Allocate an image of the given shape.
    ///
    /// Shapes with a zero dimension, or larger than the device limits, are
    /// rejected with [`AllocatorError::InvalidShape`] before any native call.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn allocate(&mut self, desc: Image2DDesc) -> Result<A::Handle> {
        if !self.limits.admits(&desc) {
            return Err(AllocatorError::InvalidShape {
                width: desc.width,
                height: desc.height,
                max_width: self.limits.max_width(),
                max_height: self.limits.max_height(),
            });
        }

        self.pool.acquire(&ImageKey::new(desc, self.format))
    }

    /// Allocate the image that stores a tensor of the given shape.
    pub fn allocate_for_shape(&mut self, shape: &[usize]) -> Result<A::Handle> {
        self.allocate(Image2DDesc::pack_from_tensor(shape))
    }

    /// Return an image to the cache. The image stays allocated on the device.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not allocated by this allocator or is already released.
    pub fn release(&mut self, handle: A::Handle) {
        self.pool.recycle(handle);
    }

    /// Shape `handle` was created with.
    pub fn desc_of(&self, handle: A::Handle) -> Option<Image2DDesc> {
        self.pool.key_of(handle).map(ImageKey::desc)
    }

    pub fn is_cached(&self, handle: A::Handle) -> bool {
        self.pool.is_cached(handle)
    }

    pub fn format(&self) -> ElementFormat {
        self.format
    }

    pub fn limits(&self) -> ImageLimits {
        self.limits
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

impl<A: DeviceMemoryApi> DeviceAllocator for ImageAllocator<A> {
    type Handle = A::Handle;

    fn info(&self) -> &AllocatorInfo {
        &self.info
    }

    /// Images have no byte-size form; always fails.
    fn allocate_bytes(&mut self, size: usize) -> Result<A::Handle> {
        Err(AllocatorError::Unsupported(format!(
            "image2d allocation by byte size ({size} bytes); allocate by shape instead"
        )))
    }

    fn release(&mut self, handle: A::Handle) {
        self.pool.recycle(handle);
    }

    fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDevice, NativeCall};
    use rstest::rstest;

    const MAX_W: usize = 64;
    const MAX_H: usize = 32;

    fn allocator(format: ElementFormat) -> (ImageAllocator<MockDevice>, MockDevice) {
        let device = MockDevice::new();
        let allocator = ImageAllocator::new(device.clone(), format, ImageLimits::new(MAX_W, MAX_H));
        (allocator, device)
    }

    #[rstest]
    #[case(&[10], Image2DDesc::new(3, 1))]
    #[case(&[8], Image2DDesc::new(2, 1))]
    #[case(&[5, 9], Image2DDesc::new(3, 5))]
    #[case(&[6, 2, 3], Image2DDesc::new(6, 2))]
    #[case(&[2, 3, 4, 5], Image2DDesc::new(5, 8))]
    #[case(&[], Image2DDesc::new(0, 0))]
    #[case(&[1, 2, 3, 4, 5], Image2DDesc::new(0, 0))]
    #[case(&[8, 1, usize::MAX], Image2DDesc::new(0, 0))]
    #[case(&[1, 8, 1, usize::MAX], Image2DDesc::new(0, 0))]
    #[case(&[usize::MAX, 4, 2, 1], Image2DDesc::new(0, 0))]
    fn test_pack_from_tensor(#[case] shape: &[usize], #[case] expected: Image2DDesc) {
        assert_eq!(Image2DDesc::pack_from_tensor(shape), expected);
    }

    #[rstest]
    #[case(ElementFormat::Fp16, ChannelDataType::HalfFloat)]
    #[case(ElementFormat::Fp32, ChannelDataType::Float)]
    fn test_native_descriptor_per_format(
        #[case] format: ElementFormat,
        #[case] data_type: ChannelDataType,
    ) {
        let (mut allocator, device) = allocator(format);
        let h = allocator.allocate(Image2DDesc::new(4, 8)).unwrap();

        assert_eq!(
            device.calls(),
            vec![NativeCall::CreateImage {
                flags: MemFlags::READ_WRITE,
                format: ImageFormatSpec {
                    channel_order: ChannelOrder::Rgba,
                    channel_data_type: data_type,
                },
                desc: ImageDescSpec::image_2d(4, 8),
                handle: h,
            }]
        );
    }

    #[test]
    fn test_transposed_shapes_never_share() {
        let (mut allocator, device) = allocator(ElementFormat::Fp16);
        let a = allocator.allocate(Image2DDesc::new(4, 8)).unwrap();
        allocator.release(a);

        let b = allocator.allocate(Image2DDesc::new(8, 4)).unwrap();
        assert_ne!(a, b);
        assert_eq!(device.create_count(), 2);
        assert!(allocator.is_cached(a));

        allocator.release(b);
        assert_eq!(allocator.allocate(Image2DDesc::new(4, 8)).unwrap(), a);
        assert_eq!(allocator.allocate(Image2DDesc::new(8, 4)).unwrap(), b);
    }

    #[rstest]
    #[case(MAX_W + 1, 1)]
    #[case(1, MAX_H + 1)]
    #[case(0, 1)]
    #[case(1, 0)]
    #[case(0, 0)]
    fn test_out_of_bounds_rejected(#[case] width: usize, #[case] height: usize) {
        let (mut allocator, device) = allocator(ElementFormat::Fp32);
        let err = allocator.allocate(Image2DDesc::new(width, height)).unwrap_err();
        assert!(matches!(
            err,
            AllocatorError::InvalidShape { max_width: MAX_W, max_height: MAX_H, .. }
        ));
        assert_eq!(device.create_count(), 0);
        assert_eq!(allocator.stats().live, 0);
    }

    #[test]
    fn test_limits_are_inclusive() {
        let (mut allocator, _device) = allocator(ElementFormat::Fp32);
        let h = allocator.allocate(Image2DDesc::new(MAX_W, MAX_H)).unwrap();
        assert_eq!(allocator.desc_of(h), Some(Image2DDesc::new(MAX_W, MAX_H)));
    }

    #[test]
    fn test_unpackable_shape_rejected() {
        let (mut allocator, device) = allocator(ElementFormat::Fp32);
        let err = allocator.allocate_for_shape(&[1, 1, 1, 1, 1]).unwrap_err();
        assert!(matches!(err, AllocatorError::InvalidShape { width: 0, height: 0, .. }));
        assert_eq!(device.create_count(), 0);
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let (mut allocator, device) = allocator(ElementFormat::Fp32);
        let err = allocator.allocate_for_shape(&[2, 8, usize::MAX, 3]).unwrap_err();
        assert!(matches!(err, AllocatorError::InvalidShape { width: 0, height: 0, .. }));
        assert_eq!(device.create_count(), 0);
    }

    #[test]
    fn test_shape_entry_point_shares_cache_with_desc() {
        let (mut allocator, device) = allocator(ElementFormat::Fp32);
        let h = allocator.allocate_for_shape(&[1, 8, 2, 3]).unwrap();
        allocator.release(h);
        assert_eq!(allocator.allocate(Image2DDesc::new(6, 2)).unwrap(), h);
        assert_eq!(device.create_count(), 1);
    }

    #[test]
    fn test_size_only_request_is_unsupported() {
        let (mut allocator, device) = allocator(ElementFormat::Fp32);
        let err = DeviceAllocator::allocate_bytes(&mut allocator, 1024).unwrap_err();
        assert!(matches!(err, AllocatorError::Unsupported(_)));
        assert!(device.calls().is_empty());
        assert_eq!(allocator.stats().live, 0);
    }

    #[test]
    fn test_native_failure_is_device_allocation_error() {
        let (mut allocator, device) = allocator(ElementFormat::Fp16);
        device.fail_next_create(crate::ClStatus::IMAGE_FORMAT_NOT_SUPPORTED);
        let err = allocator.allocate(Image2DDesc::new(2, 2)).unwrap_err();
        assert!(matches!(
            err,
            AllocatorError::DeviceAllocation { kind: MemoryKind::Image2D, .. }
        ));
        assert_eq!(allocator.stats().live, 0);
    }

    #[test]
    fn test_key_byte_size() {
        let key = ImageKey::new(Image2DDesc::new(4, 8), ElementFormat::Fp16);
        assert_eq!(key.byte_size(), 4 * 8 * 4 * 2);
    }

    #[test]
    fn test_limits_clamp_only_shrinks() {
        let limits = ImageLimits::new(100, 50).clamp(Some(200), Some(10));
        assert_eq!(limits, ImageLimits::new(100, 10));
        assert_eq!(ImageLimits::new(100, 50).clamp(None, None), ImageLimits::new(100, 50));
    }
}
