//! Shared utilities: CIDR and exclude-list helpers, MAC handling.

pub mod ip_utils;
pub mod mac;

pub use ip_utils::{
    expand_exclude_ips, first_ip, last_ip, parse_cidrs, split_ips_by_protocol, usable_range,
};
pub use mac::{eui64_address, generate_mac, normalize_mac};
