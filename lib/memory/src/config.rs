// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Allocator configuration.
//!
//! Settings are layered, later sources winning:
//!   1. Built-in defaults.
//!   2. Optional TOML file pointed to by the `CLALLOC_CONFIG_PATH` environment variable.
//!   3. Environment variables prefixed with `CLALLOC_`, e.g. `CLALLOC_ELEMENT_FORMAT=fp16`.

use crate::{AllocatorError, ElementFormat, ImageLimits};
use anyhow::Result;
use derive_builder::Builder;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Environment variable naming an optional TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "CLALLOC_CONFIG_PATH";

/// Prefix of the environment variables read by [`AllocatorConfig::from_settings`].
pub const ENV_PREFIX: &str = "CLALLOC_";

#[derive(Debug, Clone, Builder, Validate, Serialize, Deserialize, PartialEq, Eq)]
#[builder(build_fn(private, name = "build_internal"))]
pub struct AllocatorConfig {
    /// Channel precision of every image the image allocator creates.
    #[builder(default)]
    #[serde(default)]
    pub element_format: ElementFormat,

    /// Device the allocators are registered for.
    #[builder(default)]
    #[serde(default)]
    pub device_id: u32,

    /// Cap on image width, applied on top of the device limit.
    #[validate(range(min = 1))]
    #[builder(default)]
    #[serde(default)]
    pub max_image_width: Option<usize>,

    /// Cap on image height, applied on top of the device limit.
    #[validate(range(min = 1))]
    #[builder(default)]
    #[serde(default)]
    pub max_image_height: Option<usize>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            element_format: ElementFormat::Fp32,
            device_id: 0,
            max_image_width: None,
            max_image_height: None,
        }
    }
}

impl AllocatorConfigBuilder {
    /// Build and validate the configuration.
    pub fn build(&self) -> std::result::Result<AllocatorConfig, AllocatorError> {
        let config = self
            .build_internal()
            .map_err(|e| AllocatorError::Config(e.to_string()))?;
        config
            .validate()
            .map_err(|e| AllocatorError::Config(e.to_string()))?;
        Ok(config)
    }
}

impl AllocatorConfig {
    pub fn builder() -> AllocatorConfigBuilder {
        AllocatorConfigBuilder::default()
    }

    pub(crate) fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(AllocatorConfig::default()));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG_PATH"]))
    }

    /// Load the configuration from the default layered sources.
    pub fn from_settings() -> Result<AllocatorConfig> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<AllocatorConfig> {
        let config: AllocatorConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Device limits with the configured caps applied.
    pub fn image_limits(&self, device: ImageLimits) -> ImageLimits {
        device.clamp(self.max_image_width, self.max_image_height)
    }
}
