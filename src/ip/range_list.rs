//! Sorted, coalesced set of address ranges.
//!
//! This is the allocator's core data structure. Every free, reserved,
//! released and in-use set of a subnet is an [`IpRangeList`]. The list keeps
//! three invariants across every public operation:
//!
//! 1. ranges are sorted ascending by start;
//! 2. ranges are pairwise disjoint (`r[i].end < r[i+1].start`);
//! 3. ranges are maximally coalesced (`r[i].end + 1 != r[i+1].start`).
//!
//! Because the representation is canonical, two lists holding the same
//! addresses always compare equal with `==`.
//!
//! Lookups binary-search the ranges; the set algebra (`separate`, `merge`,
//! `intersect`) walks both sorted inputs with two cursors.

use super::{Family, IpAddress, IpRange};
use crate::error::IpamError;
use ipnet::IpNet;
use num_bigint::BigUint;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Canonical set of addresses stored as disjoint inclusive ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpRangeList {
    ranges: Vec<IpRange>,
}

impl IpRangeList {
    pub fn new() -> Self {
        IpRangeList { ranges: Vec::new() }
    }

    /// Build a list from a flat sequence of `start, end` pairs.
    ///
    /// Pairs may overlap or touch; they are merged.
    pub fn from_pairs(ips: &[IpAddress]) -> Result<Self, IpamError> {
        if ips.len() % 2 != 0 {
            return Err(IpamError::InvalidRange {
                range: join_addresses(ips),
                reason: format!("length of ips must be an even number, but current is {}", ips.len()),
            });
        }

        let mut ranges = Vec::with_capacity(ips.len() / 2);
        for pair in ips.chunks_exact(2) {
            ranges.push(checked_range(&format!("{}..{}", pair[0], pair[1]), pair[0], pair[1])?);
        }
        Ok(Self::from_ranges(ranges))
    }

    /// Parse single addresses (`10.0.0.5`), inclusive ranges
    /// (`10.0.0.5..10.0.0.10`) and CIDR blocks (`10.0.0.0/24`).
    ///
    /// Overlapping and adjacent items are merged. An inverted range is an
    /// error, never silently swapped.
    pub fn from_strs<S: AsRef<str>>(items: &[S]) -> Result<Self, IpamError> {
        let mut ranges = Vec::with_capacity(items.len());
        for item in items {
            ranges.push(parse_range(item.as_ref())?);
        }
        Ok(Self::from_ranges(ranges))
    }

    /// Normalize arbitrary well-formed ranges into canonical form
    pub fn from_ranges(mut ranges: Vec<IpRange>) -> Self {
        ranges.sort_by_key(|r| r.start());

        let mut merged: Vec<IpRange> = Vec::with_capacity(ranges.len());
        for r in ranges {
            let overlapping = merged.last().map_or(false, |last| r.start() <= last.end());
            if !overlapping {
                push_coalesced(&mut merged, r);
                continue;
            }
            if let Some(last) = merged.last_mut() {
                if r.end() > last.end() {
                    *last = IpRange::new(last.start(), r.end());
                }
            }
        }
        IpRangeList { ranges: merged }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of addresses in the list
    pub fn count(&self) -> BigUint {
        self.ranges
            .iter()
            .fold(BigUint::from(0u32), |acc, r| acc + r.count())
    }

    pub fn ranges(&self) -> &[IpRange] {
        &self.ranges
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpRange> {
        self.ranges.iter()
    }

    /// The part of the list belonging to one address family
    pub fn family_subset(&self, family: Family) -> IpRangeList {
        IpRangeList {
            ranges: self.ranges.iter().filter(|r| r.family() == family).copied().collect(),
        }
    }

    /// Smallest address of the list
    pub fn first(&self) -> Option<IpAddress> {
        self.ranges.first().map(|r| r.start())
    }

    /// Locate `ip`.
    ///
    /// Returns `(index, true)` when `ip` lies inside `ranges[index]`,
    /// otherwise `(index, false)` where `index` is the insertion point that
    /// keeps the list sorted.
    pub fn find(&self, ip: IpAddress) -> (usize, bool) {
        let found = self.ranges.binary_search_by(|r| {
            if r.end() < ip {
                Ordering::Less
            } else if r.start() > ip {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
        match found {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        }
    }

    pub fn contains(&self, ip: IpAddress) -> bool {
        self.find(ip).1
    }

    /// Insert one address. Returns false if it was already present.
    pub fn add(&mut self, ip: IpAddress) -> bool {
        let (n, found) = self.find(ip);
        if found {
            return false;
        }

        if n > 0 && self.ranges[n - 1].try_extend(ip) {
            // the left neighbour may now touch the right one
            if n < self.ranges.len() && self.ranges[n - 1].end().add(1) == self.ranges[n].start() {
                let fused = IpRange::new(self.ranges[n - 1].start(), self.ranges[n].end());
                self.ranges[n - 1] = fused;
                self.ranges.remove(n);
            }
            return true;
        }
        if n < self.ranges.len() && self.ranges[n].try_extend(ip) {
            return true;
        }

        self.ranges.insert(n, IpRange::single(ip));
        true
    }

    /// Remove one address. Returns false if it was not present.
    pub fn remove(&mut self, ip: IpAddress) -> bool {
        let (n, found) = self.find(ip);
        if !found {
            return false;
        }

        let rest = self.ranges[n].remove(ip).unwrap_or_default();
        self.ranges.splice(n..=n, rest);
        true
    }

    /// Smallest address not listed in `skipped`, without removing it
    pub fn first_available(&self, skipped: &[IpAddress]) -> Option<IpAddress> {
        if skipped.is_empty() {
            return self.first();
        }
        let skipped: IpRangeList = skipped.iter().copied().collect();
        self.separate(&skipped).first()
    }

    /// Take the smallest address not listed in `skipped` out of the list
    pub fn allocate(&mut self, skipped: &[IpAddress]) -> Option<IpAddress> {
        let ip = self.first_available(skipped)?;
        self.remove(ip);
        Some(ip)
    }

    /// Addresses in `self` but not in `other`
    pub fn separate(&self, other: &IpRangeList) -> IpRangeList {
        if self.is_empty() {
            return IpRangeList::new();
        }
        if other.is_empty() {
            return self.clone();
        }

        let mut ret = Vec::new();
        let mut j = 0;
        for r in &self.ranges {
            let (mut start, end) = (r.start(), r.end());
            while j < other.ranges.len() {
                let x = other.ranges[j];
                if x.end() < start {
                    j += 1;
                    continue;
                }
                if x.start() > end {
                    ret.push(IpRange::new(start, end));
                    break;
                }
                if x.end() >= end {
                    if x.start() > start {
                        ret.push(IpRange::new(start, x.start().sub(1)));
                    }
                    break;
                }
                if start < x.start() {
                    ret.push(IpRange::new(start, x.start().sub(1)));
                }
                start = x.end().add(1);
                j += 1;
            }
            if j == other.ranges.len() {
                ret.push(IpRange::new(start, end));
            }
        }

        IpRangeList { ranges: ret }
    }

    /// Addresses in either list
    pub fn merge(&self, other: &IpRangeList) -> IpRangeList {
        let rest = self.separate(other);
        let mut ret = Vec::with_capacity(rest.len() + other.len());

        let (mut i, mut j) = (0, 0);
        while i < rest.ranges.len() || j < other.ranges.len() {
            let take_left = j == other.ranges.len()
                || (i < rest.ranges.len() && rest.ranges[i].start() < other.ranges[j].start());
            let next = if take_left {
                i += 1;
                rest.ranges[i - 1]
            } else {
                j += 1;
                other.ranges[j - 1]
            };
            push_coalesced(&mut ret, next);
        }

        IpRangeList { ranges: ret }
    }

    pub fn merge_range(&self, range: IpRange) -> IpRangeList {
        self.merge(&IpRangeList { ranges: vec![range] })
    }

    /// Addresses in both lists
    pub fn intersect(&self, other: &IpRangeList) -> IpRangeList {
        let only_self = self.separate(other);
        let only_other = other.separate(self);
        self.merge(other).separate(&only_self).separate(&only_other)
    }

    /// Minimal list of CIDR blocks covering exactly this set, sorted as strings
    pub fn to_cidrs(&self) -> Result<Vec<String>, IpamError> {
        let mut result = Vec::new();
        for r in &self.ranges {
            let family = r.family();
            let bits = family.bits() as u32;
            let mut start = r.start().to_bits();
            let end = r.end().to_bits();
            if start > end {
                return Err(IpamError::InvalidRange {
                    range: r.to_string(),
                    reason: "start is greater than end".to_string(),
                });
            }

            loop {
                let aligned = if start == 0 { bits } else { start.trailing_zeros().min(bits) };
                let span = end - start;
                let fits = if span == u128::MAX { 128 } else { (span + 1).ilog2() };
                let size = aligned.min(fits);

                result.push(format!("{}/{}", IpAddress::from_bits(family, start), bits - size));

                let last = if size == 128 { u128::MAX } else { start + ((1u128 << size) - 1) };
                if last >= end {
                    break;
                }
                start = last + 1;
            }
        }

        result.sort();
        Ok(result)
    }
}

impl fmt::Display for IpRangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

/// Parse a comma-separated list such as `10.0.0.1,10.0.0.5..10.0.0.9,10.0.1.0/24`
impl FromStr for IpRangeList {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let items: Vec<&str> = s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        IpRangeList::from_strs(&items)
    }
}

impl FromIterator<IpAddress> for IpRangeList {
    fn from_iter<I: IntoIterator<Item = IpAddress>>(iter: I) -> Self {
        IpRangeList::from_ranges(iter.into_iter().map(IpRange::single).collect())
    }
}

fn push_coalesced(ranges: &mut Vec<IpRange>, r: IpRange) {
    if let Some(last) = ranges.last_mut() {
        if last.end() < r.start() && last.end().add(1) == r.start() {
            *last = IpRange::new(last.start(), r.end());
            return;
        }
    }
    ranges.push(r);
}

fn checked_range(literal: &str, start: IpAddress, end: IpAddress) -> Result<IpRange, IpamError> {
    if start.family() != end.family() {
        return Err(IpamError::InvalidRange {
            range: literal.to_string(),
            reason: format!("{} and {} belong to different address families", start, end),
        });
    }
    if end < start {
        return Err(IpamError::InvalidRange {
            range: literal.to_string(),
            reason: format!("end {} is less than start {}", end, start),
        });
    }
    Ok(IpRange::new(start, end))
}

fn parse_range(s: &str) -> Result<IpRange, IpamError> {
    let s = s.trim();
    if let Some((start, end)) = s.split_once("..") {
        let start = IpAddress::parse(start)?;
        let end = IpAddress::parse(end)?;
        checked_range(s, start, end)
    } else if s.contains('/') {
        let net: IpNet = s.parse().map_err(|_| IpamError::InvalidCidr(s.to_string()))?;
        Ok(IpRange::from_cidr(&net))
    } else {
        IpAddress::parse(s).map(IpRange::single)
    }
}

fn join_addresses(ips: &[IpAddress]) -> String {
    ips.iter().map(|ip| ip.to_string()).collect::<Vec<_>>().join(",")
}
