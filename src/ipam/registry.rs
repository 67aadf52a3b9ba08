//! The top-level registry of subnets.
//!
//! `Ipam` is a passive, thread-safe handle: controller workers call it
//! concurrently. The subnet map has its own read-write lock, taken
//! exclusively only to add or delete subnets; every other call only looks a
//! subnet up and then works under that subnet's lock.

use super::pool::PoolStatistics;
use super::subnet::{Allocation, Subnet};
use crate::config::IpamOptions;
use crate::error::IpamError;
use crate::ip::{Family, FamilyMap, IpAddress, IpRangeList};
use crate::utils::split_ips_by_protocol;
use ipnet::IpNet;
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One address held by a pod, as reported across subnets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetAddress {
    pub subnet: String,
    pub nic: String,
    pub ip: IpAddress,
    pub mac: String,
}

/// In-use and available ranges of a subnet, rendered for its status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetRangeStrings {
    pub using: FamilyMap<String>,
    pub available: FamilyMap<String>,
}

/// Registry of every subnet known to the allocator
#[derive(Debug, Default)]
pub struct Ipam {
    options: IpamOptions,
    subnets: RwLock<BTreeMap<String, Arc<Subnet>>>,
}

impl Ipam {
    pub fn new() -> Self {
        Self::with_options(IpamOptions::default())
    }

    pub fn with_options(options: IpamOptions) -> Self {
        Ipam {
            options,
            subnets: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn options(&self) -> IpamOptions {
        self.options
    }

    /// Create a subnet, or apply a new CIDR and exclude list to an existing one
    pub fn add_or_update_subnet(
        &self,
        name: &str,
        cidr: &str,
        exclude_ips: &[String],
    ) -> Result<(), IpamError> {
        let mut subnets = self.subnets.write();
        if let Some(subnet) = subnets.get(name) {
            return subnet.update(cidr, exclude_ips);
        }

        info!("adding new subnet {} cidr {} exclude ips {:?}", name, cidr, exclude_ips);
        let subnet = Subnet::with_options(name, cidr, exclude_ips, self.options)?;
        subnets.insert(name.to_string(), Arc::new(subnet));
        Ok(())
    }

    /// Forget a subnet. Its bindings are dropped along with it.
    pub fn delete_subnet(&self, name: &str) {
        if self.subnets.write().remove(name).is_some() {
            info!("delete subnet {}", name);
        }
    }

    pub fn subnet(&self, name: &str) -> Option<Arc<Subnet>> {
        self.subnets.read().get(name).cloned()
    }

    pub fn subnet_names(&self) -> Vec<String> {
        self.subnets.read().keys().cloned().collect()
    }

    fn all_subnets(&self) -> Vec<Arc<Subnet>> {
        self.subnets.read().values().cloned().collect()
    }

    fn allocatable_subnet(&self, name: &str) -> Result<Arc<Subnet>, IpamError> {
        self.subnet(name)
            .ok_or_else(|| IpamError::NoAvailable(format!("subnet {} does not exist", name)))
    }

    fn existing_subnet(&self, name: &str) -> Result<Arc<Subnet>, IpamError> {
        self.subnet(name)
            .ok_or_else(|| IpamError::SubnetNotFound(name.to_string()))
    }

    /// Allocate the next free address(es) of a subnet to a pod's NIC.
    ///
    /// Unparseable entries of `skip` are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn get_random_address(
        &self,
        subnet: &str,
        pool: &str,
        pod: &str,
        nic: &str,
        mac: Option<&str>,
        skip: &[String],
        dual_stack: bool,
    ) -> Result<Allocation, IpamError> {
        let subnet = self.allocatable_subnet(subnet)?;
        let skip: Vec<IpAddress> = skip
            .iter()
            .filter_map(|s| match IpAddress::parse(s) {
                Ok(ip) => Some(ip),
                Err(err) => {
                    warn!("ignoring skipped address: {}", err);
                    None
                }
            })
            .collect();
        subnet.get_random_address(pool, pod, nic, mac, &skip, dual_stack)
    }

    /// Bind specific address(es) to a pod's NIC. `ip` is `v4`, `v6` or `v4,v6`.
    #[allow(clippy::too_many_arguments)]
    pub fn get_static_address(
        &self,
        subnet: &str,
        pool: &str,
        pod: &str,
        nic: &str,
        ip: &str,
        mac: Option<&str>,
        force: bool,
        dual_stack: bool,
    ) -> Result<Allocation, IpamError> {
        let ips = ip
            .split(',')
            .map(|s| IpAddress::parse(s.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        let subnet = self.allocatable_subnet(subnet)?;
        subnet.get_static_addresses(pool, pod, nic, &ips, mac, force, dual_stack)
    }

    /// Release every address of a pod in one subnet, or in all subnets when
    /// `subnet` is empty
    pub fn release_address_by_pod(&self, pod: &str, subnet: &str) {
        if subnet.is_empty() {
            for subnet in self.all_subnets() {
                subnet.release_address(pod);
            }
        } else if let Some(subnet) = self.subnet(subnet) {
            subnet.release_address(pod);
        }
    }

    pub fn release_address_by_nic(&self, pod: &str, nic: &str, subnet: &str) {
        if let Some(subnet) = self.subnet(subnet) {
            subnet.release_address_with_nic_name(pod, nic);
        }
    }

    /// Every address a pod holds, IPv4 before IPv6 for each NIC
    pub fn get_pod_address(&self, pod: &str) -> Vec<SubnetAddress> {
        let mut addresses = Vec::new();
        for subnet in self.all_subnets() {
            for nic in subnet.get_pod_address(pod) {
                for ip in nic.v4.into_iter().chain(nic.v6) {
                    addresses.push(SubnetAddress {
                        subnet: subnet.name().to_string(),
                        nic: nic.nic.clone(),
                        ip,
                        mac: nic.mac.clone().unwrap_or_default(),
                    });
                }
            }
        }
        addresses
    }

    /// Whether any subnet has `ip` bound
    pub fn contain_address(&self, ip: &str) -> bool {
        let Ok(ip) = IpAddress::parse(ip) else {
            return false;
        };
        self.all_subnets().iter().any(|s| s.contain_address(ip))
    }

    /// The pod holding `ip` in `subnet`, if it is not `pod`
    pub fn is_ip_assigned_to_other_pod(&self, ip: &str, subnet: &str, pod: &str) -> Option<String> {
        let ip = IpAddress::parse(ip).ok()?;
        self.subnet(subnet)?.is_ip_assigned_to_other_pod(ip, pod)
    }

    /// Prefix length of the IPv4 block of a subnet
    pub fn get_subnet_v4_mask(&self, subnet: &str) -> Result<u8, IpamError> {
        let subnet = self.existing_subnet(subnet)?;
        match subnet.block(Family::V4) {
            Some(IpNet::V4(net)) => Ok(net.prefix_len()),
            _ => Err(IpamError::NoAvailable(format!(
                "subnet {} has no IPv4 cidr",
                subnet.name()
            ))),
        }
    }

    /// In-use and available ranges of a subnet with `exclude_ips` taken out.
    ///
    /// Malformed exclude entries are ignored.
    pub fn get_subnet_ip_range_string(
        &self,
        subnet: &str,
        exclude_ips: &[String],
    ) -> Option<SubnetRangeStrings> {
        let subnet = self.subnet(subnet)?;
        let split = split_ips_by_protocol(exclude_ips);

        let mut strings = SubnetRangeStrings::default();
        for family in Family::ALL {
            let excluded = IpRangeList::from_strs(&split[family]).unwrap_or_else(|err| {
                warn!("ignoring exclude ips of subnet {}: {}", subnet.name(), err);
                IpRangeList::new()
            });
            strings.using[family] = subnet.using(family).separate(&excluded).to_string();
            strings.available[family] = subnet.available(family).separate(&excluded).to_string();
        }
        Some(strings)
    }

    pub fn add_or_update_ip_pool(
        &self,
        subnet: &str,
        pool: &str,
        ips: &[String],
    ) -> Result<(), IpamError> {
        self.existing_subnet(subnet)?.add_or_update_ip_pool(pool, ips)
    }

    pub fn remove_ip_pool(&self, subnet: &str, pool: &str) {
        if let Some(subnet) = self.subnet(subnet) {
            subnet.remove_ip_pool(pool);
        }
    }

    pub fn ip_pool_statistics(&self, subnet: &str, pool: &str) -> Option<PoolStatistics> {
        self.subnet(subnet)?.ip_pool_statistics(pool)
    }
}
