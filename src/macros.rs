//! # Internal Macros
//!
//! ## zerocopy_accessors!
//!
//! On-disk records (ALP exception records) are `#[repr(C)]` zerocopy structs
//! whose integer fields are little-endian wrappers, so a page can be read and
//! written without copying or caring about host byte order. The macro
//! generates a native getter and a `set_` setter per field:
//!
//! ```ignore
//! #[repr(C)]
//! struct DoubleExceptionRecord {
//!     value: U64,
//!     pos_in_chunk: U32,
//! }
//!
//! impl DoubleExceptionRecord {
//!     zerocopy_accessors! {
//!         value: u64,
//!         pos_in_chunk: u32,
//!     }
//! }
//!
//! // record.value() -> u64, record.set_pos_in_chunk(7)
//! ```
//!
//! | Native | Wrapper                          |
//! |--------|----------------------------------|
//! | `u32`  | `zerocopy::little_endian::U32`   |
//! | `u64`  | `zerocopy::little_endian::U64`   |

/// Getter/setter pairs for little-endian zerocopy fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@field $field:ident, u32) => {
        $crate::zerocopy_accessors!(@emit $field, u32, U32);
    };
    (@field $field:ident, u64) => {
        $crate::zerocopy_accessors!(@emit $field, u64, U64);
    };
    (@emit $field:ident, $native:ty, $wrapper:ident) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> $native {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, value: $native) {
                self.$field = ::zerocopy::little_endian::$wrapper::new(value);
            }
        }
    };
    ($($field:ident : $ty:ident),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@field $field, $ty);
        )*
    };
}
