//! # Configuration Module
//!
//! Compile-time constants live in [`constants`]; the runtime knobs a caller
//! may change per database (node group size, compression, checkpoint
//! policies) live in [`StorageConfig`].
//!
//! ## Module Organization
//!
//! - [`constants`]: Numeric configuration values with dependency documentation
//! - [`storage_config`]: Runtime builder validated on `build()`

pub mod constants;
pub mod storage_config;

pub use constants::*;
pub use storage_config::{ListCheckpointPolicy, StorageConfig, StorageConfigBuilder};
