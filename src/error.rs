//! Error kinds returned by the allocator.
//!
//! Every fallible operation in `ip` and `ipam` returns [`IpamError`]. Callers
//! (the reconciliation controllers) decide whether an error is worth a
//! requeue; nothing in this crate retries on its own.

use crate::ip::IpAddress;

/// Errors that can occur while parsing address literals or allocating addresses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpamError {
    #[error("invalid CIDR {0:?}")]
    InvalidCidr(String),

    #[error("invalid IP address {0:?}")]
    InvalidAddress(String),

    #[error("invalid ip range {range:?}: {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),

    #[error("address {ip} is out of the range of subnet {subnet}")]
    OutOfRange { ip: IpAddress, subnet: String },

    #[error("address {ip} has been allocated to {owner}")]
    AddressConflict { ip: IpAddress, owner: String },

    #[error("mac {mac} has been allocated to {owner}")]
    MacConflict { mac: String, owner: String },

    #[error("no available address: {0}")]
    NoAvailable(String),

    #[error("subnet {0} does not exist")]
    SubnetNotFound(String),

    #[error("invalid ippool {0:?}")]
    InvalidPool(String),

    #[error("ippool {pool} has conflict IPs with ippool {other}: {ips}")]
    PoolConflict {
        pool: String,
        other: String,
        ips: String,
    },
}

impl IpamError {
    /// True for both address and MAC conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            IpamError::AddressConflict { .. } | IpamError::MacConflict { .. }
        )
    }

    pub fn is_no_available(&self) -> bool {
        matches!(self, IpamError::NoAvailable(_))
    }
}
