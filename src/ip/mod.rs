//! Address primitives.
//!
//! This module holds the value types the allocator is built from: single
//! addresses with wrapping arithmetic, inclusive ranges, and the canonical
//! sorted range list used for every free, reserved and in-use set.

pub mod address;
pub mod family;
pub mod range;
pub mod range_list;

// Re-export commonly used types
pub use address::IpAddress;
pub use family::{Family, FamilyMap, Protocol};
pub use range::IpRange;
pub use range_list::IpRangeList;
