//! # Column Type System
//!
//! Types shared by every layer of the column store.
//!
//! ## Module Structure
//!
//! - `data_type`: `LogicalType` (what the user stored) and `PhysicalType`
//!   (how a chunk lays it out)
//! - `value`: owned `Value`, `InternalId`, and the `FixedValue` trait used
//!   to read and write little-endian elements
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | `LogicalType` | Column type including nested children |
//! | `PhysicalType` | Storage layout discriminant |
//! | `Value` | Row-at-a-time value for lookups and tests |
//! | `FixedValue` | Typed access to fixed-width buffers |

mod data_type;
mod value;

pub use data_type::{LogicalType, PhysicalType, StructField};
pub use value::{FixedValue, InternalId, Value};
