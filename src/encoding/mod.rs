//! # Encoding Module
//!
//! Serialization of persisted metadata (chunk descriptors, compression
//! metadata, node-group layouts). Column values themselves are encoded by the
//! `compression` codecs, not here.

mod serializer;

pub use serializer::{Deserializer, Serializer};
