//! CIDR helpers shared by subnets and the configuration layer.

use crate::error::IpamError;
use crate::ip::{Family, FamilyMap, IpAddress, IpRange, Protocol};
use ipnet::IpNet;
use log::warn;

/// Parse a subnet CIDR string: one block, or `v4,v6` for dual stack.
///
/// Host bits are cleared, so `10.0.0.5/24` yields `10.0.0.0/24`.
pub fn parse_cidrs(cidr: &str) -> Result<(Protocol, FamilyMap<Option<IpNet>>), IpamError> {
    let mut blocks: FamilyMap<Option<IpNet>> = FamilyMap::default();
    let invalid = || IpamError::InvalidCidr(cidr.to_string());

    let parts: Vec<&str> = cidr.split(',').map(str::trim).collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(invalid());
    }

    for part in parts {
        let net: IpNet = part.parse().map_err(|_| invalid())?;
        let family = match net {
            IpNet::V4(_) => Family::V4,
            IpNet::V6(_) => Family::V6,
        };
        if blocks[family].is_some() {
            return Err(invalid());
        }
        blocks[family] = Some(net.trunc());
    }

    let protocol = Protocol::from_families(blocks[Family::V4].is_some(), blocks[Family::V6].is_some())
        .ok_or_else(invalid)?;
    Ok((protocol, blocks))
}

/// True for /31 and /32 (v4) or /127 and /128 (v6) blocks, which have no
/// network or broadcast address to skip
pub fn is_tiny_block(net: &IpNet) -> bool {
    net.max_prefix_len() - net.prefix_len() <= 1
}

/// First address handed out from a block
pub fn first_ip(net: &IpNet) -> IpAddress {
    let network = IpAddress::from(net.network());
    if is_tiny_block(net) {
        network
    } else {
        network.add(1)
    }
}

/// Last address handed out from a block
pub fn last_ip(net: &IpNet) -> IpAddress {
    let broadcast = IpAddress::from(net.broadcast());
    if is_tiny_block(net) {
        broadcast
    } else {
        broadcast.sub(1)
    }
}

pub fn usable_range(net: &IpNet) -> IpRange {
    IpRange::new(first_ip(net), last_ip(net))
}

/// Normalize a subnet's exclude list.
///
/// Each entry (`a` or `a..b`) is clamped to the usable range of the CIDR
/// block of its family. Entries that fall completely outside, inverted
/// ranges and malformed entries are dropped. Tiny blocks keep nothing.
pub fn expand_exclude_ips(exclude_ips: &[String], cidr: &str) -> Vec<String> {
    let blocks = match parse_cidrs(cidr) {
        Ok((_, blocks)) => blocks,
        Err(err) => {
            warn!("cannot expand exclude ips of {}: {}", cidr, err);
            return Vec::new();
        }
    };

    let mut expanded = Vec::new();
    for entry in exclude_ips {
        let entry = entry.trim();
        let parsed = match entry.split_once("..") {
            Some((start, end)) => IpAddress::parse(start).and_then(|s| IpAddress::parse(end).map(|e| (s, e))),
            None => IpAddress::parse(entry).map(|ip| (ip, ip)),
        };
        let (start, end) = match parsed {
            Ok(pair) => pair,
            Err(err) => {
                warn!("ignoring exclude ip {:?}: {}", entry, err);
                continue;
            }
        };
        if start.family() != end.family() || end < start {
            warn!("ignoring invalid exclude ip range {:?}", entry);
            continue;
        }

        let Some(net) = blocks[start.family()] else {
            continue;
        };
        if is_tiny_block(&net) {
            continue;
        }

        let usable = usable_range(&net);
        if end < usable.start() || start > usable.end() {
            continue;
        }
        let start = start.max(usable.start());
        let end = end.min(usable.end());

        if start == end {
            expanded.push(start.to_string());
        } else {
            expanded.push(format!("{}..{}", start, end));
        }
    }
    expanded
}

/// Split address literals (`a`, `a..b` or CIDR) by the family of their
/// first address. Unparseable entries go nowhere.
pub fn split_ips_by_protocol<S: AsRef<str>>(ips: &[S]) -> FamilyMap<Vec<String>> {
    let mut split: FamilyMap<Vec<String>> = FamilyMap::default();
    for ip in ips {
        let ip = ip.as_ref().trim();
        let head = ip
            .split_once("..")
            .map(|(start, _)| start)
            .or_else(|| ip.split_once('/').map(|(addr, _)| addr))
            .unwrap_or(ip);
        match IpAddress::parse(head) {
            Ok(addr) => split[addr.family()].push(ip.to_string()),
            Err(_) => warn!("cannot determine the protocol of {:?}", ip),
        }
    }
    split
}
