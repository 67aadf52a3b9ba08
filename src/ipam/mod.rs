//! Address management: pools, subnets and the subnet registry.

pub mod pool;
pub mod registry;
pub mod subnet;

pub use pool::{AddressPool, FamilyStatistics, PoolRanges, PoolStatistics};
pub use registry::{Ipam, SubnetAddress, SubnetRangeStrings};
pub use subnet::{Allocation, Binding, NicAddress, Owner, Subnet, DEFAULT_POOL};
