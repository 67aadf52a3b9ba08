//! Inclusive range of addresses, the unit of storage of [`IpRangeList`].
//!
//! [`IpRangeList`]: super::IpRangeList

use super::{Family, IpAddress};
use ipnet::IpNet;
use num_bigint::BigUint;
use rand::Rng;
use std::fmt;

/// Inclusive address range `[start, end]` within one family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    start: IpAddress,
    end: IpAddress,
}

impl IpRange {
    /// Create a range from correctly ordered endpoints of the same family.
    ///
    /// No validation happens here; parsers that accept user input check
    /// `start <= end` before calling this.
    pub fn new(start: IpAddress, end: IpAddress) -> Self {
        debug_assert_eq!(start.family(), end.family());
        debug_assert!(start <= end, "range start {} is greater than end {}", start, end);
        IpRange { start, end }
    }

    pub fn single(ip: IpAddress) -> Self {
        IpRange { start: ip, end: ip }
    }

    /// Every address of the block, network and broadcast included
    pub fn from_cidr(net: &IpNet) -> Self {
        let net = net.trunc();
        IpRange::new(net.network().into(), net.broadcast().into())
    }

    pub fn start(&self) -> IpAddress {
        self.start
    }

    pub fn end(&self) -> IpAddress {
        self.end
    }

    pub fn family(&self) -> Family {
        self.start.family()
    }

    /// Number of addresses, `end - start + 1`
    pub fn count(&self) -> BigUint {
        BigUint::from(self.span()) + 1u32
    }

    /// `end - start`, which always fits in a u128
    pub(crate) fn span(&self) -> u128 {
        self.end.to_bits() - self.start.to_bits()
    }

    pub fn contains(&self, ip: IpAddress) -> bool {
        self.start <= ip && ip <= self.end
    }

    /// Uniformly sampled address within the range
    pub fn random(&self) -> IpAddress {
        let offset = rand::thread_rng().gen_range(0..=self.span());
        self.start.offset(offset)
    }

    /// Grow the range by one address if `ip` sits right before its start or
    /// right after its end.
    pub fn try_extend(&mut self, ip: IpAddress) -> bool {
        if ip.family() != self.family() {
            return false;
        }
        if ip < self.start && ip.add(1) == self.start {
            self.start = ip;
            return true;
        }
        if ip > self.end && self.end.add(1) == ip {
            self.end = ip;
            return true;
        }
        false
    }

    /// Split the range around `ip`.
    ///
    /// Returns `None` when `ip` is outside the range, otherwise the zero, one
    /// or two ranges left after removing it.
    pub fn remove(&self, ip: IpAddress) -> Option<Vec<IpRange>> {
        if !self.contains(ip) {
            return None;
        }

        let mut rest = Vec::with_capacity(2);
        if self.start < ip {
            rest.push(IpRange::new(self.start, ip.sub(1)));
        }
        if ip < self.end {
            rest.push(IpRange::new(ip.add(1), self.end));
        }
        Some(rest)
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> IpRange {
        IpRange::new(ip(start), ip(end))
    }

    #[test]
    fn test_display() {
        assert_eq!(range("10.0.0.1", "10.0.0.1").to_string(), "10.0.0.1");
        assert_eq!(range("10.0.0.1", "10.0.0.9").to_string(), "10.0.0.1-10.0.0.9");
        assert_eq!(range("fd00::1", "fd00::ff").to_string(), "fd00::1-fd00::ff");
    }

    #[test]
    fn test_count() {
        assert_eq!(range("10.0.0.0", "10.0.0.255").count(), BigUint::from(256u32));
        assert_eq!(range("10.0.0.7", "10.0.0.7").count(), BigUint::from(1u32));
        assert_eq!(
            range("0.0.0.0", "255.255.255.255").count(),
            BigUint::from(1u64 << 32)
        );

        let everything = range("::", "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff");
        assert_eq!(everything.count(), BigUint::from(1u8) << 128);
    }

    #[test]
    fn test_contains() {
        let r = range("10.0.0.10", "10.0.0.20");
        assert!(r.contains(ip("10.0.0.10")));
        assert!(r.contains(ip("10.0.0.15")));
        assert!(r.contains(ip("10.0.0.20")));
        assert!(!r.contains(ip("10.0.0.9")));
        assert!(!r.contains(ip("10.0.0.21")));
    }

    #[test]
    fn test_from_cidr() {
        let net: IpNet = "10.0.1.77/24".parse().unwrap();
        let r = IpRange::from_cidr(&net);
        assert_eq!(r, range("10.0.1.0", "10.0.1.255"));

        let net: IpNet = "fd00::/120".parse().unwrap();
        assert_eq!(IpRange::from_cidr(&net), range("fd00::", "fd00::ff"));

        let net: IpNet = "10.0.0.9/32".parse().unwrap();
        assert_eq!(IpRange::from_cidr(&net).count(), BigUint::from(1u32));
    }

    #[test]
    fn test_random_stays_inside() {
        let r = range("10.0.0.10", "10.0.0.13");
        for _ in 0..100 {
            assert!(r.contains(r.random()));
        }

        let single = range("fd00::5", "fd00::5");
        assert_eq!(single.random(), ip("fd00::5"));

        let everything = range("::", "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff");
        assert!(everything.contains(everything.random()));
    }

    #[test]
    fn test_try_extend() {
        let mut r = range("10.0.0.10", "10.0.0.20");
        assert!(r.try_extend(ip("10.0.0.9")));
        assert!(r.try_extend(ip("10.0.0.21")));
        assert_eq!(r, range("10.0.0.9", "10.0.0.21"));
        assert!(!r.try_extend(ip("10.0.0.23")));
        assert!(!r.try_extend(ip("10.0.0.15")));
        assert!(!r.try_extend(ip("fd00::1")));
    }

    #[test]
    fn test_try_extend_does_not_wrap() {
        let mut low = range("0.0.0.0", "0.0.0.5");
        assert!(!low.try_extend(ip("255.255.255.255")));

        let mut high = range("255.255.255.250", "255.255.255.255");
        assert!(!high.try_extend(ip("0.0.0.0")));
    }

    #[test]
    fn test_remove() {
        let r = range("10.0.0.10", "10.0.0.20");
        assert_eq!(r.remove(ip("10.0.0.9")), None);
        assert_eq!(r.remove(ip("10.0.0.10")), Some(vec![range("10.0.0.11", "10.0.0.20")]));
        assert_eq!(r.remove(ip("10.0.0.20")), Some(vec![range("10.0.0.10", "10.0.0.19")]));
        assert_eq!(
            r.remove(ip("10.0.0.15")),
            Some(vec![range("10.0.0.10", "10.0.0.14"), range("10.0.0.16", "10.0.0.20")])
        );

        let single = range("10.0.0.1", "10.0.0.1");
        assert_eq!(single.remove(ip("10.0.0.1")), Some(vec![]));
    }
}
