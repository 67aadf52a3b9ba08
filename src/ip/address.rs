//! Single IPv4 or IPv6 address with ordering and modular arithmetic.

use super::Family;
use crate::error::IpamError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// One IPv4 or IPv6 address.
///
/// Addresses of different families are never compared by the allocator; the
/// derived ordering (all IPv4 before all IPv6) only keeps mixed lists sorted.
/// `add`/`sub` wrap around modulo 2^32 or 2^128, so
/// `255.255.255.255 + 1 == 0.0.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpAddress(IpAddr);

impl IpAddress {
    pub fn parse(s: &str) -> Result<Self, IpamError> {
        s.trim()
            .parse::<IpAddr>()
            .map(IpAddress)
            .map_err(|_| IpamError::InvalidAddress(s.to_string()))
    }

    /// Build an address of `family` from its integer value, truncated to the family width
    pub fn from_bits(family: Family, bits: u128) -> Self {
        match family {
            Family::V4 => IpAddress(IpAddr::V4(Ipv4Addr::from(bits as u32))),
            Family::V6 => IpAddress(IpAddr::V6(Ipv6Addr::from(bits))),
        }
    }

    pub fn to_bits(&self) -> u128 {
        match self.0 {
            IpAddr::V4(addr) => u32::from(addr) as u128,
            IpAddr::V6(addr) => u128::from(addr),
        }
    }

    pub fn family(&self) -> Family {
        match self.0 {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    pub fn is_ipv4(&self) -> bool {
        self.family() == Family::V4
    }

    pub fn addr(&self) -> IpAddr {
        self.0
    }

    pub fn add(&self, n: i64) -> Self {
        match self.0 {
            IpAddr::V4(addr) => {
                IpAddress(IpAddr::V4(Ipv4Addr::from(u32::from(addr).wrapping_add(n as u32))))
            }
            IpAddr::V6(addr) => IpAddress(IpAddr::V6(Ipv6Addr::from(
                u128::from(addr).wrapping_add(n as i128 as u128),
            ))),
        }
    }

    pub fn sub(&self, n: i64) -> Self {
        match self.0 {
            IpAddr::V4(addr) => {
                IpAddress(IpAddr::V4(Ipv4Addr::from(u32::from(addr).wrapping_sub(n as u32))))
            }
            IpAddr::V6(addr) => IpAddress(IpAddr::V6(Ipv6Addr::from(
                u128::from(addr).wrapping_sub(n as i128 as u128),
            ))),
        }
    }

    /// Unsigned offset, wrapping like `add`
    pub(crate) fn offset(&self, n: u128) -> Self {
        IpAddress::from_bits(self.family(), self.to_bits().wrapping_add(n))
    }

    pub fn less_than(&self, other: &IpAddress) -> bool {
        debug_assert_eq!(self.family(), other.family(), "comparing addresses of different families");
        self < other
    }

    pub fn greater_than(&self, other: &IpAddress) -> bool {
        debug_assert_eq!(self.family(), other.family(), "comparing addresses of different families");
        self > other
    }
}

impl FromStr for IpAddress {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpAddress::parse(s)
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        IpAddress(addr)
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress(IpAddr::V4(addr))
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress(IpAddr::V6(addr))
    }
}

impl From<IpAddress> for IpAddr {
    fn from(addr: IpAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
