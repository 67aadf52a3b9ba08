//! MAC address helpers.
//!
//! MACs are kept as normalized strings (`00:11:22:aa:bb:cc`), the form the
//! subnet indices are keyed by.

use crate::error::IpamError;
use crate::ip::IpAddress;
use ipnet::Ipv6Net;
use rand::Rng;
use regex::Regex;
use std::net::Ipv6Addr;
use std::sync::LazyLock;

static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(||
    Regex::new(r"^[0-9A-Fa-f]{2}([:-][0-9A-Fa-f]{2}){5}$").unwrap()
);

/// Validate a MAC and return it lowercase and colon separated
pub fn normalize_mac(mac: &str) -> Result<String, IpamError> {
    let trimmed = mac.trim();
    if !MAC_PATTERN.is_match(trimmed) {
        return Err(IpamError::InvalidMac(mac.to_string()));
    }
    let separators: Vec<char> = trimmed.chars().filter(|c| *c == ':' || *c == '-').collect();
    if separators.windows(2).any(|w| w[0] != w[1]) {
        return Err(IpamError::InvalidMac(mac.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase().replace('-', ":"))
}

/// Random unicast, locally administered MAC
pub fn generate_mac() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill(&mut bytes);
    bytes[0] = (bytes[0] | 0x02) & 0xfe;
    format_mac(&bytes)
}

fn format_mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn mac_bytes(mac: &str) -> Result<[u8; 6], IpamError> {
    let normalized = normalize_mac(mac)?;
    let mut bytes = [0u8; 6];
    for (i, part) in normalized.split(':').enumerate() {
        bytes[i] = u8::from_str_radix(part, 16).map_err(|_| IpamError::InvalidMac(mac.to_string()))?;
    }
    Ok(bytes)
}

/// Modified EUI-64 interface identifier (RFC 4291 appendix A)
pub fn eui64_interface_id(mac: &str) -> Result<u64, IpamError> {
    let m = mac_bytes(mac)?;
    let id = [m[0] ^ 0x02, m[1], m[2], 0xff, 0xfe, m[3], m[4], m[5]];
    Ok(u64::from_be_bytes(id))
}

/// SLAAC style address: the /64 prefix of `net` followed by the interface id of `mac`.
///
/// Only meaningful for prefixes of /64 or shorter.
pub fn eui64_address(net: &Ipv6Net, mac: &str) -> Result<IpAddress, IpamError> {
    let prefix = u128::from(net.network()) & !(u64::MAX as u128);
    let id = eui64_interface_id(mac)? as u128;
    Ok(IpAddress::from(Ipv6Addr::from(prefix | id)))
}
