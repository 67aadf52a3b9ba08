//! Address pools: the partitions of a subnet's address space.
//!
//! Every subnet has a default pool (named `""`) plus any number of named
//! pools. Pools never overlap; the default pool owns whatever the named
//! pools do not.

use crate::ip::{Family, FamilyMap, IpAddress, IpRangeList};
use num_bigint::BigUint;

/// Bookkeeping sets of one pool for one address family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolRanges {
    /// Every address the pool covers
    pub ips: IpRangeList,
    /// Never handed out, drawn from first
    pub free: IpRangeList,
    /// Excluded addresses inside the pool; only assignable statically
    pub reserved: IpRangeList,
    /// Handed out before and given back; drawn from once `free` runs dry
    pub released: IpRangeList,
    /// Currently bound to a NIC
    pub using: IpRangeList,
}

impl PoolRanges {
    /// Recompute every set from the pool's coverage.
    ///
    /// Released addresses become free again.
    pub(crate) fn rebuild(&mut self, ips: IpRangeList, reserved: &IpRangeList, using: &IpRangeList) {
        self.reserved = reserved.intersect(&ips);
        self.using = using.intersect(&ips);
        self.free = ips.separate(&self.reserved).separate(&self.using);
        self.released = IpRangeList::new();
        self.ips = ips;
    }

    /// Addresses a request could still be given: free and released
    pub fn available(&self) -> IpRangeList {
        self.free.merge(&self.released)
    }

    /// Smallest address not in `skip`, first from free, then from released.
    ///
    /// The flag is true when the address comes from the released set.
    pub(crate) fn candidate(&self, skip: &[IpAddress]) -> Option<(IpAddress, bool)> {
        if let Some(ip) = self.free.first_available(skip) {
            return Some((ip, false));
        }
        self.released.first_available(skip).map(|ip| (ip, true))
    }

    /// Move the released set back into free
    pub(crate) fn fold_released(&mut self) {
        if self.released.is_empty() {
            return;
        }
        self.free = self.free.merge(&self.released);
        self.released = IpRangeList::new();
    }
}

/// A named partition of a subnet
#[derive(Debug, Clone)]
pub struct AddressPool {
    name: String,
    /// Addresses requested for the pool, before clamping to the subnet
    requested: FamilyMap<IpRangeList>,
    ranges: FamilyMap<PoolRanges>,
}

impl AddressPool {
    pub(crate) fn new(name: &str, requested: FamilyMap<IpRangeList>) -> Self {
        AddressPool {
            name: name.to_string(),
            requested,
            ranges: FamilyMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    pub(crate) fn requested(&self, family: Family) -> &IpRangeList {
        &self.requested[family]
    }

    pub fn ranges(&self, family: Family) -> &PoolRanges {
        &self.ranges[family]
    }

    pub(crate) fn ranges_mut(&mut self, family: Family) -> &mut PoolRanges {
        &mut self.ranges[family]
    }

    pub fn statistics(&self) -> PoolStatistics {
        PoolStatistics {
            families: self.ranges.map(|_, r| {
                let available = r.available();
                FamilyStatistics {
                    available: available.count(),
                    using: r.using.count(),
                    available_range: available.to_string(),
                    using_range: r.using.to_string(),
                }
            }),
        }
    }
}

/// Counters of one family of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyStatistics {
    pub available: BigUint,
    pub using: BigUint,
    pub available_range: String,
    pub using_range: String,
}

/// Per-family counters and range strings reported for a pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStatistics {
    pub families: FamilyMap<FamilyStatistics>,
}

impl PoolStatistics {
    pub fn family(&self, family: Family) -> &FamilyStatistics {
        &self.families[family]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(s: &str) -> IpRangeList {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_rebuild() {
        let mut ranges = PoolRanges::default();
        ranges.released = list("10.0.0.9");
        ranges.rebuild(
            list("10.0.0.1..10.0.0.10"),
            &list("10.0.0.2,10.0.0.50"),
            &list("10.0.0.3..10.0.0.4,10.0.0.60"),
        );
        assert_eq!(ranges.reserved, list("10.0.0.2"));
        assert_eq!(ranges.using, list("10.0.0.3..10.0.0.4"));
        assert_eq!(ranges.free.to_string(), "10.0.0.1,10.0.0.5-10.0.0.10");
        assert!(ranges.released.is_empty());
    }

    #[test]
    fn test_candidate_prefers_free() {
        let mut ranges = PoolRanges {
            free: list("10.0.0.5"),
            released: list("10.0.0.1"),
            ..Default::default()
        };
        assert_eq!(ranges.candidate(&[]), Some((ip("10.0.0.5"), false)));
        assert_eq!(ranges.candidate(&[ip("10.0.0.5")]), Some((ip("10.0.0.1"), true)));
        assert_eq!(ranges.candidate(&[ip("10.0.0.5"), ip("10.0.0.1")]), None);

        ranges.fold_released();
        assert_eq!(ranges.free.to_string(), "10.0.0.1,10.0.0.5");
        assert!(ranges.released.is_empty());
    }

    #[test]
    fn test_statistics() {
        let mut pool = AddressPool::new("", FamilyMap::default());
        *pool.ranges_mut(Family::V4) = PoolRanges {
            ips: list("10.0.0.1..10.0.0.10"),
            free: list("10.0.0.4..10.0.0.10"),
            released: list("10.0.0.1"),
            using: list("10.0.0.2..10.0.0.3"),
            ..Default::default()
        };
        let stats = pool.statistics();
        let v4 = stats.family(Family::V4);
        assert_eq!(v4.available, BigUint::from(8u32));
        assert_eq!(v4.using, BigUint::from(2u32));
        assert_eq!(v4.available_range, "10.0.0.1,10.0.0.4-10.0.0.10");
        assert_eq!(v4.using_range, "10.0.0.2-10.0.0.3");
        assert_eq!(stats.family(Family::V6).available, BigUint::from(0u32));
        assert!(pool.is_default());
    }
}
