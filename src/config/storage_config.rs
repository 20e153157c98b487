//! # Runtime Storage Configuration
//!
//! `StorageConfig` carries the per-database knobs of the columnar storage
//! layer. It is built through `StorageConfigBuilder`, which validates the
//! combination before handing out an immutable value that is cheap to copy
//! into every node group and column.
//!
//! ## Configuration Options
//!
//! | Option                  | Default            | Description                               |
//! |-------------------------|--------------------|-------------------------------------------|
//! | node_group_size_log2    | 17 (131072 rows)   | Rows per node group                        |
//! | enable_compression      | true               | Run codec selection on flush               |
//! | list_checkpoint_policy  | AlwaysOutOfPlace   | Whether list columns may commit in place   |
//! | alp_max_exception_ratio | 0.05               | ALP abandoned above this exception ratio   |
//!
//! ## Usage
//!
//! ```ignore
//! let config = StorageConfig::builder()
//!     .node_group_size_log2(12)
//!     .enable_compression(true)
//!     .build()?;
//! ```

use eyre::{ensure, Result};

use crate::compression::CompressionPolicy;

use super::constants::{
    ALP_MAX_EXCEPTION_RATIO, DEFAULT_NODE_GROUP_SIZE_LOG2, MAX_NODE_GROUP_SIZE_LOG2,
    MIN_NODE_GROUP_SIZE_LOG2,
};

/// How list/array columns treat pending updates at checkpoint.
///
/// The list checkpoint path always rewrote list columns out of place. That is
/// kept as the default; `AllowInPlace` lets list columns go through the same
/// in-place test as their offset/size/data children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListCheckpointPolicy {
    #[default]
    AlwaysOutOfPlace,
    AllowInPlace,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageConfig {
    node_group_size_log2: u32,
    enable_compression: bool,
    list_checkpoint_policy: ListCheckpointPolicy,
    alp_max_exception_ratio: f64,
}

impl StorageConfig {
    pub fn builder() -> StorageConfigBuilder {
        StorageConfigBuilder::new()
    }

    pub fn node_group_size(&self) -> u64 {
        1u64 << self.node_group_size_log2
    }

    pub fn node_group_size_log2(&self) -> u32 {
        self.node_group_size_log2
    }

    pub fn enable_compression(&self) -> bool {
        self.enable_compression
    }

    pub fn list_checkpoint_policy(&self) -> ListCheckpointPolicy {
        self.list_checkpoint_policy
    }

    pub fn alp_max_exception_ratio(&self) -> f64 {
        self.alp_max_exception_ratio
    }

    /// Codec selection knobs handed to `Column::flush`.
    pub fn compression_policy(&self) -> CompressionPolicy {
        CompressionPolicy {
            enable_compression: self.enable_compression,
            alp_max_exception_ratio: self.alp_max_exception_ratio,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            node_group_size_log2: DEFAULT_NODE_GROUP_SIZE_LOG2,
            enable_compression: true,
            list_checkpoint_policy: ListCheckpointPolicy::default(),
            alp_max_exception_ratio: ALP_MAX_EXCEPTION_RATIO,
        }
    }
}

/// Builder for [`StorageConfig`]. Unset options keep their defaults.
#[derive(Debug, Default)]
pub struct StorageConfigBuilder {
    node_group_size_log2: Option<u32>,
    enable_compression: Option<bool>,
    list_checkpoint_policy: Option<ListCheckpointPolicy>,
    alp_max_exception_ratio: Option<f64>,
}

impl StorageConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the node group size as a power of two.
    ///
    /// Must lie between one vector (2^11) and 2^20 rows.
    pub fn node_group_size_log2(mut self, log2: u32) -> Self {
        self.node_group_size_log2 = Some(log2);
        self
    }

    pub fn enable_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = Some(enabled);
        self
    }

    pub fn list_checkpoint_policy(mut self, policy: ListCheckpointPolicy) -> Self {
        self.list_checkpoint_policy = Some(policy);
        self
    }

    /// Sets the exception ratio above which ALP falls back to uncompressed.
    pub fn alp_max_exception_ratio(mut self, ratio: f64) -> Self {
        self.alp_max_exception_ratio = Some(ratio);
        self
    }

    pub fn build(self) -> Result<StorageConfig> {
        let defaults = StorageConfig::default();
        let node_group_size_log2 = self
            .node_group_size_log2
            .unwrap_or(defaults.node_group_size_log2);
        ensure!(
            (MIN_NODE_GROUP_SIZE_LOG2..=MAX_NODE_GROUP_SIZE_LOG2).contains(&node_group_size_log2),
            "node group size log2 {} outside [{}, {}]",
            node_group_size_log2,
            MIN_NODE_GROUP_SIZE_LOG2,
            MAX_NODE_GROUP_SIZE_LOG2
        );

        let alp_max_exception_ratio = self
            .alp_max_exception_ratio
            .unwrap_or(defaults.alp_max_exception_ratio);
        ensure!(
            (0.0..=1.0).contains(&alp_max_exception_ratio),
            "ALP exception ratio {} outside [0, 1]",
            alp_max_exception_ratio
        );

        Ok(StorageConfig {
            node_group_size_log2,
            enable_compression: self
                .enable_compression
                .unwrap_or(defaults.enable_compression),
            list_checkpoint_policy: self
                .list_checkpoint_policy
                .unwrap_or(defaults.list_checkpoint_policy),
            alp_max_exception_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_constants() {
        let config = StorageConfig::default();

        assert_eq!(config.node_group_size(), 1 << DEFAULT_NODE_GROUP_SIZE_LOG2);
        assert!(config.enable_compression());
        assert_eq!(
            config.list_checkpoint_policy(),
            ListCheckpointPolicy::AlwaysOutOfPlace
        );
    }

    #[test]
    fn builder_overrides_selected_options() {
        let config = StorageConfig::builder()
            .node_group_size_log2(12)
            .enable_compression(false)
            .build()
            .unwrap();

        assert_eq!(config.node_group_size(), 4096);
        assert!(!config.enable_compression());
        assert_eq!(config.alp_max_exception_ratio(), ALP_MAX_EXCEPTION_RATIO);
    }

    #[test]
    fn builder_rejects_node_group_smaller_than_vector() {
        let result = StorageConfig::builder().node_group_size_log2(5).build();

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("node group size"));
    }

    #[test]
    fn builder_rejects_invalid_exception_ratio() {
        let result = StorageConfig::builder()
            .alp_max_exception_ratio(1.5)
            .build();

        assert!(result.is_err());
    }
}
