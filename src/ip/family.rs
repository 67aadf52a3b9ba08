//! Address families and subnet protocols.
//!
//! Subnets are either single-stack or dual-stack. Rather than duplicating
//! every code path per family, per-family state lives in a [`FamilyMap`]
//! indexed by [`Family`], and a [`Protocol`] says which entries are live.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// One address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::V4, Family::V6];

    /// Address width in bits
    pub fn bits(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "v4"),
            Family::V6 => write!(f, "v6"),
        }
    }
}

/// Protocol of a subnet: which families it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    IPv4,
    IPv6,
    Dual,
}

impl Protocol {
    pub fn from_families(v4: bool, v6: bool) -> Option<Protocol> {
        match (v4, v6) {
            (true, true) => Some(Protocol::Dual),
            (true, false) => Some(Protocol::IPv4),
            (false, true) => Some(Protocol::IPv6),
            (false, false) => None,
        }
    }

    pub fn families(self) -> &'static [Family] {
        match self {
            Protocol::IPv4 => &[Family::V4],
            Protocol::IPv6 => &[Family::V6],
            Protocol::Dual => &Family::ALL,
        }
    }

    pub fn has(self, family: Family) -> bool {
        self.families().contains(&family)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::IPv4 => write!(f, "IPv4"),
            Protocol::IPv6 => write!(f, "IPv6"),
            Protocol::Dual => write!(f, "Dual"),
        }
    }
}

/// A value per address family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyMap<T> {
    v4: T,
    v6: T,
}

impl<T> FamilyMap<T> {
    pub fn new(v4: T, v6: T) -> Self {
        FamilyMap { v4, v6 }
    }

    pub fn from_fn(mut f: impl FnMut(Family) -> T) -> Self {
        FamilyMap {
            v4: f(Family::V4),
            v6: f(Family::V6),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Family, &T)> {
        [(Family::V4, &self.v4), (Family::V6, &self.v6)].into_iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(Family, &T) -> U) -> FamilyMap<U> {
        FamilyMap {
            v4: f(Family::V4, &self.v4),
            v6: f(Family::V6, &self.v6),
        }
    }
}

impl<T> Index<Family> for FamilyMap<T> {
    type Output = T;

    fn index(&self, family: Family) -> &T {
        match family {
            Family::V4 => &self.v4,
            Family::V6 => &self.v6,
        }
    }
}

impl<T> IndexMut<Family> for FamilyMap<T> {
    fn index_mut(&mut self, family: Family) -> &mut T {
        match family {
            Family::V4 => &mut self.v4,
            Family::V6 => &mut self.v6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_families() {
        assert_eq!(Protocol::IPv4.families(), &[Family::V4]);
        assert_eq!(Protocol::IPv6.families(), &[Family::V6]);
        assert_eq!(Protocol::Dual.families(), &[Family::V4, Family::V6]);
        assert!(Protocol::Dual.has(Family::V6));
        assert!(!Protocol::IPv4.has(Family::V6));
        assert_eq!(Protocol::from_families(false, false), None);
        assert_eq!(Protocol::from_families(true, true), Some(Protocol::Dual));
    }

    #[test]
    fn test_family_map_indexing() {
        let mut counts = FamilyMap::new(1u32, 2u32);
        counts[Family::V6] += 10;
        assert_eq!(counts[Family::V4], 1);
        assert_eq!(counts[Family::V6], 12);

        let doubled = counts.map(|_, v| v * 2);
        let collected: Vec<_> = doubled.iter().map(|(f, v)| (f, *v)).collect();
        assert_eq!(collected, vec![(Family::V4, 2), (Family::V6, 24)]);
    }
}
