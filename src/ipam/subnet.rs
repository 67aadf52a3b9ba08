//! Allocator state of one logical subnet.
//!
//! A subnet owns one CIDR block per address family it carries, the pools
//! partitioning those blocks, and the NIC/address/MAC indices. All state
//! sits behind one read-write lock: allocation, release and pool changes
//! take it exclusively, queries share it.
//!
//! Allocation runs in two phases under a single write lock. Planning reads
//! the state, validates the whole request and picks every address and the
//! MAC; committing applies the plan and cannot fail. A request that fails
//! therefore never leaves a partial (for example v4-only) allocation behind.

use super::pool::{AddressPool, PoolRanges, PoolStatistics};
use crate::config::{DualStackMode, IpamOptions};
use crate::error::IpamError;
use crate::ip::{Family, FamilyMap, IpAddress, IpRangeList, Protocol};
use crate::utils::{
    eui64_address, expand_exclude_ips, generate_mac, normalize_mac, parse_cidrs,
    split_ips_by_protocol, usable_range,
};
use ipnet::{IpNet, Ipv6Net};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Name of the pool owning every address no named pool claims
pub const DEFAULT_POOL: &str = "";

/// Pod and NIC an address is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    pub pod: String,
    pub nic: String,
}

/// Result of an allocation: the address of each family and the MAC of the NIC
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    pub v4: Option<IpAddress>,
    pub v6: Option<IpAddress>,
    pub mac: String,
}

impl Allocation {
    pub fn ip(&self, family: Family) -> Option<IpAddress> {
        match family {
            Family::V4 => self.v4,
            Family::V6 => self.v6,
        }
    }

    fn set(&mut self, family: Family, ip: IpAddress) {
        match family {
            Family::V4 => self.v4 = Some(ip),
            Family::V6 => self.v6 = Some(ip),
        }
    }

    /// Bound addresses, IPv4 first
    pub fn ips(&self) -> impl Iterator<Item = IpAddress> {
        self.v4.into_iter().chain(self.v6)
    }
}

/// Addresses of one NIC of a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicAddress {
    pub nic: String,
    pub v4: Option<IpAddress>,
    pub v6: Option<IpAddress>,
    pub mac: Option<String>,
}

/// A binding of an address to a NIC
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Binding {
    pub pod: String,
    pub nic: String,
    pub ip: IpAddress,
}

/// Set an address is taken from when committing a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Free,
    Released,
    Reserved,
    /// From released after free ran dry; the rest of released is folded into free
    Fold,
}

#[derive(Debug)]
enum Claim {
    /// Already bound to the requesting NIC
    Keep,
    Take { pool: String, source: Source },
    /// Bound to another NIC, moved over to the requesting one
    Transfer(Owner),
}

#[derive(Debug)]
struct Pick {
    family: Family,
    ip: IpAddress,
    claim: Claim,
}

#[derive(Debug)]
struct Plan {
    /// Release the NIC's current addresses before applying the picks
    release_first: bool,
    picks: Vec<Pick>,
    mac: String,
}

/// Parsed CIDR and exclude list of a subnet
struct ParsedCidr {
    cidr: String,
    protocol: Protocol,
    blocks: FamilyMap<Option<IpNet>>,
    exclude_ips: Vec<String>,
    reserved: FamilyMap<IpRangeList>,
}

impl ParsedCidr {
    fn parse(cidr: &str, exclude_ips: &[String]) -> Result<Self, IpamError> {
        let (protocol, blocks) = parse_cidrs(cidr)?;
        let exclude_ips = expand_exclude_ips(exclude_ips, cidr);
        let split = split_ips_by_protocol(&exclude_ips);

        let mut reserved = FamilyMap::<IpRangeList>::default();
        for family in Family::ALL {
            reserved[family] = IpRangeList::from_strs(&split[family])?;
        }

        let cidr = blocks
            .iter()
            .filter_map(|(_, block)| block.as_ref().map(|b| b.to_string()))
            .collect::<Vec<_>>()
            .join(",");

        Ok(ParsedCidr {
            cidr,
            protocol,
            blocks,
            exclude_ips,
            reserved,
        })
    }
}

#[derive(Debug)]
struct SubnetState {
    cidr: String,
    protocol: Protocol,
    blocks: FamilyMap<Option<IpNet>>,
    exclude_ips: Vec<String>,
    reserved: FamilyMap<IpRangeList>,
    pools: BTreeMap<String, AddressPool>,
    nic_to_ip: FamilyMap<HashMap<String, IpAddress>>,
    ip_to_owner: HashMap<IpAddress, Owner>,
    nic_to_mac: HashMap<String, String>,
    mac_to_pod: HashMap<String, String>,
    pod_to_nics: HashMap<String, Vec<String>>,
}

/// One logical network and all of its allocator state
#[derive(Debug)]
pub struct Subnet {
    name: String,
    options: IpamOptions,
    state: RwLock<SubnetState>,
}

impl Subnet {
    pub fn new(name: &str, cidr: &str, exclude_ips: &[String]) -> Result<Self, IpamError> {
        Self::with_options(name, cidr, exclude_ips, IpamOptions::default())
    }

    pub fn with_options(
        name: &str,
        cidr: &str,
        exclude_ips: &[String],
        options: IpamOptions,
    ) -> Result<Self, IpamError> {
        let parsed = ParsedCidr::parse(cidr, exclude_ips)?;

        let mut pools = BTreeMap::new();
        pools.insert(
            DEFAULT_POOL.to_string(),
            AddressPool::new(DEFAULT_POOL, FamilyMap::default()),
        );

        let mut state = SubnetState {
            cidr: parsed.cidr,
            protocol: parsed.protocol,
            blocks: parsed.blocks,
            exclude_ips: parsed.exclude_ips,
            reserved: parsed.reserved,
            pools,
            nic_to_ip: FamilyMap::default(),
            ip_to_owner: HashMap::new(),
            nic_to_mac: HashMap::new(),
            mac_to_pod: HashMap::new(),
            pod_to_nics: HashMap::new(),
        };
        for family in Family::ALL {
            state.rebuild(family);
        }

        Ok(Subnet {
            name: name.to_string(),
            options,
            state: RwLock::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cidr(&self) -> String {
        self.state.read().cidr.clone()
    }

    pub fn protocol(&self) -> Protocol {
        self.state.read().protocol
    }

    pub fn block(&self, family: Family) -> Option<IpNet> {
        self.state.read().blocks[family]
    }

    /// Exclude list after expansion and clamping
    pub fn exclude_ips(&self) -> Vec<String> {
        self.state.read().exclude_ips.clone()
    }

    pub fn pool_names(&self) -> Vec<String> {
        self.state.read().pools.keys().cloned().collect()
    }

    pub fn reserved(&self, family: Family) -> IpRangeList {
        self.state.read().reserved[family].clone()
    }

    pub fn free(&self, family: Family) -> IpRangeList {
        self.state.read().union_of(family, |r| r.free.clone())
    }

    pub fn released(&self, family: Family) -> IpRangeList {
        self.state.read().union_of(family, |r| r.released.clone())
    }

    pub fn available(&self, family: Family) -> IpRangeList {
        self.state.read().union_of(family, PoolRanges::available)
    }

    pub fn using(&self, family: Family) -> IpRangeList {
        self.state.read().union_of(family, |r| r.using.clone())
    }

    /// Apply a new CIDR and exclude list.
    ///
    /// Families whose block or reserved set changed are recomputed and their
    /// released addresses become free again. Bindings left outside the new
    /// usable range are kept and reported; they are never handed out again
    /// and are not returned to any set when released.
    pub fn update(&self, cidr: &str, exclude_ips: &[String]) -> Result<(), IpamError> {
        let mut parsed = ParsedCidr::parse(cidr, exclude_ips)?;

        let mut state = self.state.write();
        state.cidr = parsed.cidr;
        state.protocol = parsed.protocol;
        state.exclude_ips = parsed.exclude_ips;

        for family in Family::ALL {
            let reserved = std::mem::take(&mut parsed.reserved[family]);
            if state.blocks[family] == parsed.blocks[family] && state.reserved[family] == reserved {
                continue;
            }
            state.blocks[family] = parsed.blocks[family];
            state.reserved[family] = reserved;
            state.rebuild(family);

            for binding in state.out_of_range(family) {
                error!(
                    "{} address {} of nic {} not in subnet {} new cidr {}",
                    binding.pod, binding.ip, binding.nic, self.name, state.cidr
                );
            }
        }

        info!("updated subnet {} cidr {} exclude ips {:?}", self.name, state.cidr, state.exclude_ips);
        Ok(())
    }

    /// Allocate the lowest available address of every family the request needs.
    ///
    /// A NIC that already holds its addresses gets them back unchanged. If one
    /// of them is listed in `skip`, the NIC is released and allocated afresh.
    /// A dual-stack subnet always hands out both families; `dual_stack` only
    /// decides whether the IPv6 address is paired with the IPv4 one.
    pub fn get_random_address(
        &self,
        pool: &str,
        pod: &str,
        nic: &str,
        mac: Option<&str>,
        skip: &[IpAddress],
        dual_stack: bool,
    ) -> Result<Allocation, IpamError> {
        let mut state = self.state.write();

        let families = state.protocol.families();
        let bound: Vec<IpAddress> = families
            .iter()
            .filter_map(|f| state.nic_to_ip[*f].get(nic).copied())
            .collect();
        let release_first = bound.iter().any(|ip| skip.contains(ip));

        if !release_first && bound.len() == families.len() && state.nic_to_mac.contains_key(nic) {
            let allocation = state.allocation_of(nic);
            debug!("nic {} of {} already holds {:?} in subnet {}", nic, pod, allocation, self.name);
            return Ok(allocation);
        }

        let mac = state.resolve_mac(pod, mac)?.unwrap_or_else(|| state.mac_for(nic));
        let pool_ref = state.pool(&self.name, pool)?;

        let mut picks = Vec::with_capacity(families.len());
        for &family in families {
            if !release_first {
                if let Some(ip) = state.nic_to_ip[family].get(nic) {
                    picks.push(Pick { family, ip: *ip, claim: Claim::Keep });
                    continue;
                }
            }
            let paired = dual_stack && families.len() == 2;
            picks.push(state.plan_family(
                &self.name,
                self.options.dual_stack_mode,
                pool_ref,
                family,
                pod,
                nic,
                &mac,
                skip,
                paired,
            )?);
        }

        let plan = Plan { release_first, picks, mac };
        let allocation = state.commit(&self.name, pod, nic, plan);
        log_allocation(&self.name, pool, pod, &allocation);
        Ok(allocation)
    }

    /// Bind a specific address to a NIC.
    ///
    /// On a dual-stack subnet the other family is allocated as well,
    /// atomically with the static one.
    #[allow(clippy::too_many_arguments)]
    pub fn get_static_address(
        &self,
        pool: &str,
        pod: &str,
        nic: &str,
        ip: IpAddress,
        mac: Option<&str>,
        force: bool,
        dual_stack: bool,
    ) -> Result<Allocation, IpamError> {
        self.get_static_addresses(pool, pod, nic, &[ip], mac, force, dual_stack)
    }

    /// Bind at most one address per family to a NIC, atomically
    #[allow(clippy::too_many_arguments)]
    pub fn get_static_addresses(
        &self,
        pool: &str,
        pod: &str,
        nic: &str,
        ips: &[IpAddress],
        mac: Option<&str>,
        force: bool,
        dual_stack: bool,
    ) -> Result<Allocation, IpamError> {
        let mut families = FamilyMap::new(false, false);
        for ip in ips {
            if std::mem::replace(&mut families[ip.family()], true) {
                let literal = ips.iter().map(|ip| ip.to_string()).collect::<Vec<_>>().join(",");
                return Err(IpamError::InvalidAddress(literal));
            }
        }

        let mut state = self.state.write();
        let mac = state.resolve_mac(pod, mac)?.unwrap_or_else(|| state.mac_for(nic));

        let mut picks = Vec::with_capacity(2);
        for ip in ips {
            picks.push(state.plan_static(&self.name, pool, pod, nic, *ip, force)?);
        }

        if state.protocol == Protocol::Dual {
            for family in Family::ALL {
                if families[family] {
                    continue;
                }
                if let Some(ip) = state.nic_to_ip[family].get(nic) {
                    picks.push(Pick { family, ip: *ip, claim: Claim::Keep });
                    continue;
                }
                let pool_ref = state.pool(&self.name, pool)?;
                picks.push(state.plan_family(
                    &self.name,
                    self.options.dual_stack_mode,
                    pool_ref,
                    family,
                    pod,
                    nic,
                    &mac,
                    &[],
                    dual_stack,
                )?);
            }
        }
        picks.sort_by_key(|p| p.family);

        let plan = Plan { release_first: false, picks, mac };
        let allocation = state.commit(&self.name, pod, nic, plan);
        log_allocation(&self.name, pool, pod, &allocation);
        Ok(allocation)
    }

    /// Release every NIC of a pod
    pub fn release_address(&self, pod: &str) {
        let mut state = self.state.write();
        let nics = state.pod_to_nics.get(pod).cloned().unwrap_or_default();
        for nic in nics {
            state.release_nic(&self.name, pod, &nic);
        }
    }

    pub fn release_address_with_nic_name(&self, pod: &str, nic: &str) {
        self.state.write().release_nic(&self.name, pod, nic);
    }

    /// Whether `ip` is bound to any NIC
    pub fn contain_address(&self, ip: IpAddress) -> bool {
        self.state.read().ip_to_owner.contains_key(&ip)
    }

    /// Addresses of every NIC of a pod, in the order the NICs were allocated
    pub fn get_pod_address(&self, pod: &str) -> Vec<NicAddress> {
        let state = self.state.read();
        let Some(nics) = state.pod_to_nics.get(pod) else {
            return Vec::new();
        };
        nics.iter()
            .map(|nic| NicAddress {
                nic: nic.clone(),
                v4: state.nic_to_ip[Family::V4].get(nic).copied(),
                v6: state.nic_to_ip[Family::V6].get(nic).copied(),
                mac: state.nic_to_mac.get(nic).cloned(),
            })
            .collect()
    }

    /// The pod holding `ip`, if it is not `pod`
    pub fn is_ip_assigned_to_other_pod(&self, ip: IpAddress, pod: &str) -> Option<String> {
        let state = self.state.read();
        let owner = state.ip_to_owner.get(&ip)?;
        debug!("check ip {} assigned, owner {}, pod {}", ip, owner.pod, pod);
        (owner.pod != pod).then(|| owner.pod.clone())
    }

    /// Bindings whose address lies outside the current usable range
    pub fn out_of_range_bindings(&self) -> Vec<Binding> {
        let state = self.state.read();
        let mut bindings: Vec<Binding> = Family::ALL.iter().flat_map(|f| state.out_of_range(*f)).collect();
        bindings.sort();
        bindings
    }

    /// Create or redefine a named pool.
    ///
    /// Addresses are clamped to the subnet's usable range and may not overlap
    /// another named pool. Whatever the pool gives up returns to the default pool.
    pub fn add_or_update_ip_pool(&self, name: &str, ips: &[String]) -> Result<(), IpamError> {
        if name.is_empty() {
            return Err(IpamError::InvalidPool(name.to_string()));
        }
        let all = IpRangeList::from_strs(ips)?;
        let requested = FamilyMap::from_fn(|family| all.family_subset(family));

        let mut state = self.state.write();
        for family in Family::ALL {
            let clamped = requested[family].intersect(&state.usable(family));
            for (other, pool) in &state.pools {
                if pool.is_default() || other == name {
                    continue;
                }
                let overlap = clamped.intersect(&pool.ranges(family).ips);
                if !overlap.is_empty() {
                    error!("ippool {} has conflict IPs with ippool {}: {}", name, other, overlap);
                    return Err(IpamError::PoolConflict {
                        pool: name.to_string(),
                        other: other.clone(),
                        ips: overlap.to_string(),
                    });
                }
            }
        }

        state.pools.insert(name.to_string(), AddressPool::new(name, requested));
        for family in Family::ALL {
            state.rebuild(family);
        }
        info!("add or update ippool {} of subnet {} with ips {:?}", name, self.name, ips);
        Ok(())
    }

    /// Drop a named pool; its addresses return to the default pool
    pub fn remove_ip_pool(&self, name: &str) {
        if name.is_empty() {
            warn!("refusing to remove the default ippool of subnet {}", self.name);
            return;
        }
        let mut state = self.state.write();
        if state.pools.remove(name).is_none() {
            return;
        }
        for family in Family::ALL {
            state.rebuild(family);
        }
        info!("removed ippool {} from subnet {}", name, self.name);
    }

    pub fn ip_pool_statistics(&self, name: &str) -> Option<PoolStatistics> {
        self.state.read().pools.get(name).map(AddressPool::statistics)
    }
}

fn log_allocation(subnet: &str, pool: &str, pod: &str, allocation: &Allocation) {
    let show = |ip: Option<IpAddress>| ip.map(|ip| ip.to_string()).unwrap_or_default();
    if pool.is_empty() {
        info!(
            "allocate v4 {}, v6 {}, mac {} for {} from subnet {}",
            show(allocation.v4), show(allocation.v6), allocation.mac, pod, subnet
        );
    } else {
        info!(
            "allocate v4 {}, v6 {}, mac {} for {} from ippool {} in subnet {}",
            show(allocation.v4), show(allocation.v6), allocation.mac, pod, pool, subnet
        );
    }
}

impl SubnetState {
    fn usable(&self, family: Family) -> IpRangeList {
        match self.blocks[family] {
            Some(net) => IpRangeList::from_ranges(vec![usable_range(&net)]),
            None => IpRangeList::new(),
        }
    }

    fn in_usable_range(&self, family: Family, ip: IpAddress) -> bool {
        self.blocks[family].is_some_and(|net| usable_range(&net).contains(ip))
    }

    fn union_of(&self, family: Family, f: impl Fn(&PoolRanges) -> IpRangeList) -> IpRangeList {
        self.pools
            .values()
            .fold(IpRangeList::new(), |acc, pool| acc.merge(&f(pool.ranges(family))))
    }

    fn pool(&self, subnet: &str, name: &str) -> Result<&AddressPool, IpamError> {
        self.pools.get(name).ok_or_else(|| {
            IpamError::NoAvailable(format!("ippool {:?} not found in subnet {}", name, subnet))
        })
    }

    /// Recompute every pool's sets for one family.
    ///
    /// In-use addresses are taken from the bindings, so this is also how
    /// using sets follow a CIDR change.
    fn rebuild(&mut self, family: Family) {
        let usable = self.usable(family);
        let using: IpRangeList = self.nic_to_ip[family]
            .values()
            .copied()
            .filter(|ip| usable.contains(*ip))
            .collect();
        let reserved = self.reserved[family].clone();

        let mut rest = usable.clone();
        for pool in self.pools.values_mut() {
            if pool.is_default() {
                continue;
            }
            let ips = pool.requested(family).intersect(&usable);
            rest = rest.separate(&ips);
            pool.ranges_mut(family).rebuild(ips, &reserved, &using);
        }
        if let Some(default) = self.pools.get_mut(DEFAULT_POOL) {
            default.ranges_mut(family).rebuild(rest, &reserved, &using);
        }
    }

    fn out_of_range(&self, family: Family) -> Vec<Binding> {
        self.nic_to_ip[family]
            .iter()
            .filter(|(_, ip)| !self.in_usable_range(family, **ip))
            .map(|(nic, ip)| Binding {
                pod: self.ip_to_owner.get(ip).map(|o| o.pod.clone()).unwrap_or_default(),
                nic: nic.clone(),
                ip: *ip,
            })
            .collect()
    }

    fn allocation_of(&self, nic: &str) -> Allocation {
        Allocation {
            v4: self.nic_to_ip[Family::V4].get(nic).copied(),
            v6: self.nic_to_ip[Family::V6].get(nic).copied(),
            mac: self.nic_to_mac.get(nic).cloned().unwrap_or_default(),
        }
    }

    /// Validate a requested MAC. `None` when no MAC was requested.
    fn resolve_mac(&self, pod: &str, mac: Option<&str>) -> Result<Option<String>, IpamError> {
        let Some(mac) = mac else {
            return Ok(None);
        };
        let mac = normalize_mac(mac)?;
        if let Some(owner) = self.mac_to_pod.get(&mac) {
            if owner != pod {
                error!("mac {} has been allocated to pod {}", mac, owner);
                return Err(IpamError::MacConflict { mac, owner: owner.clone() });
            }
        }
        Ok(Some(mac))
    }

    /// The NIC's current MAC, or a fresh one nobody in the subnet uses
    fn mac_for(&self, nic: &str) -> String {
        if let Some(mac) = self.nic_to_mac.get(nic) {
            return mac.clone();
        }
        loop {
            let mac = generate_mac();
            if !self.mac_to_pod.contains_key(&mac) {
                return mac;
            }
        }
    }

    /// Pick a not yet bound address of `family` for a random allocation
    #[allow(clippy::too_many_arguments)]
    fn plan_family(
        &self,
        subnet: &str,
        mode: DualStackMode,
        pool: &AddressPool,
        family: Family,
        pod: &str,
        nic: &str,
        mac: &str,
        skip: &[IpAddress],
        paired: bool,
    ) -> Result<Pick, IpamError> {
        if family == Family::V6 && paired && mode == DualStackMode::Eui64 {
            if let Some(IpNet::V6(net)) = self.blocks[Family::V6] {
                if net.prefix_len() <= 64 {
                    return self.plan_eui64(subnet, pool, &net, pod, nic, mac, skip);
                }
            }
        }

        let ranges = pool.ranges(family);
        let Some((ip, from_released)) = ranges.candidate(skip) else {
            error!("no free {} ip in ippool {:?} of subnet {}", family, pool.name(), subnet);
            return Err(IpamError::NoAvailable(format!(
                "no free {} address in ippool {:?} of subnet {}",
                family,
                pool.name(),
                subnet
            )));
        };
        let source = if from_released { Source::Fold } else { Source::Free };
        Ok(Pick {
            family,
            ip,
            claim: Claim::Take { pool: pool.name().to_string(), source },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_eui64(
        &self,
        subnet: &str,
        pool: &AddressPool,
        net: &Ipv6Net,
        pod: &str,
        nic: &str,
        mac: &str,
        skip: &[IpAddress],
    ) -> Result<Pick, IpamError> {
        let ip = eui64_address(net, mac)?;
        let take = |source| Pick {
            family: Family::V6,
            ip,
            claim: Claim::Take { pool: pool.name().to_string(), source },
        };

        if let Some(owner) = self.ip_to_owner.get(&ip) {
            if owner.pod != pod || owner.nic != nic {
                error!("eui-64 address {} has been allocated to {}", ip, owner.pod);
                return Err(IpamError::AddressConflict { ip, owner: owner.pod.clone() });
            }
            // held by this NIC, about to be released and taken again
            if !skip.contains(&ip) {
                return Ok(take(Source::Released));
            }
        }

        let ranges = pool.ranges(Family::V6);
        if !skip.contains(&ip) {
            if ranges.free.contains(ip) {
                return Ok(take(Source::Free));
            }
            if ranges.released.contains(ip) {
                return Ok(take(Source::Released));
            }
        }
        error!("eui-64 address {} is not available in subnet {}", ip, subnet);
        Err(IpamError::NoAvailable(format!(
            "eui-64 address {} is not available in ippool {:?} of subnet {}",
            ip,
            pool.name(),
            subnet
        )))
    }

    fn plan_static(
        &self,
        subnet: &str,
        pool_name: &str,
        pod: &str,
        nic: &str,
        ip: IpAddress,
        force: bool,
    ) -> Result<Pick, IpamError> {
        let family = ip.family();
        let out_of_range = || IpamError::OutOfRange { ip, subnet: subnet.to_string() };

        let in_cidr = self.blocks[family].is_some_and(|net| net.contains(&ip.addr()));
        if !in_cidr {
            return Err(out_of_range());
        }

        let pool = if pool_name.is_empty() {
            self.pools.values().find(|p| p.ranges(family).ips.contains(ip))
        } else {
            let pool = self.pool(subnet, pool_name)?;
            pool.ranges(family).ips.contains(ip).then_some(pool)
        };
        let pool = pool.ok_or_else(out_of_range)?;

        if let Some(owner) = self.ip_to_owner.get(&ip) {
            if owner.pod == pod && owner.nic == nic {
                return Ok(Pick { family, ip, claim: Claim::Keep });
            }
            if owner.pod != pod {
                if !force {
                    error!("ip {} has been allocated to {}", ip, owner.pod);
                    return Err(IpamError::AddressConflict { ip, owner: owner.pod.clone() });
                }
                warn!("ip {} is taken from {} by force for {}", ip, owner.pod, pod);
            }
            return Ok(Pick { family, ip, claim: Claim::Transfer(owner.clone()) });
        }

        let ranges = pool.ranges(family);
        let source = if ranges.reserved.contains(ip) {
            Source::Reserved
        } else if ranges.free.contains(ip) {
            Source::Free
        } else if ranges.released.contains(ip) {
            Source::Released
        } else {
            return Err(IpamError::NoAvailable(format!(
                "{} is not available in ippool {:?} of subnet {}",
                ip,
                pool.name(),
                subnet
            )));
        };
        Ok(Pick {
            family,
            ip,
            claim: Claim::Take { pool: pool.name().to_string(), source },
        })
    }

    fn commit(&mut self, subnet: &str, pod: &str, nic: &str, plan: Plan) -> Allocation {
        if plan.release_first {
            self.release_nic(subnet, pod, nic);
        }

        let mut allocation = Allocation { mac: plan.mac.clone(), ..Default::default() };
        for pick in plan.picks {
            let Pick { family, ip, claim } = pick;
            match claim {
                Claim::Keep => {}
                Claim::Take { pool, source } => {
                    self.release_replaced(subnet, family, nic, ip);
                    if let Some(pool) = self.pools.get_mut(&pool) {
                        let ranges = pool.ranges_mut(family);
                        match source {
                            Source::Free => {
                                ranges.free.remove(ip);
                            }
                            Source::Released => {
                                ranges.released.remove(ip);
                            }
                            Source::Reserved => {}
                            Source::Fold => {
                                ranges.released.remove(ip);
                                ranges.fold_released();
                            }
                        }
                        ranges.using.add(ip);
                    }
                    self.bind(family, ip, pod, nic);
                }
                Claim::Transfer(previous) => {
                    self.release_replaced(subnet, family, nic, ip);
                    self.nic_to_ip[family].remove(&previous.nic);
                    self.bind(family, ip, pod, nic);
                    if previous.nic != nic {
                        self.drop_nic_if_unbound(&previous.pod, &previous.nic);
                    }
                }
            }
            allocation.set(family, ip);
        }

        if let Some(old) = self.nic_to_mac.insert(nic.to_string(), plan.mac.clone()) {
            if old != plan.mac && self.mac_to_pod.get(&old).is_some_and(|p| p == pod) {
                self.mac_to_pod.remove(&old);
            }
        }
        self.mac_to_pod.insert(plan.mac, pod.to_string());

        let nics = self.pod_to_nics.entry(pod.to_string()).or_default();
        if !nics.iter().any(|n| n == nic) {
            nics.push(nic.to_string());
        }
        allocation
    }

    fn bind(&mut self, family: Family, ip: IpAddress, pod: &str, nic: &str) {
        self.nic_to_ip[family].insert(nic.to_string(), ip);
        self.ip_to_owner.insert(ip, Owner { pod: pod.to_string(), nic: nic.to_string() });
    }

    /// Release the address `nic` holds in `family` if it is about to be replaced by `ip`
    fn release_replaced(&mut self, subnet: &str, family: Family, nic: &str, ip: IpAddress) {
        if let Some(old) = self.nic_to_ip[family].get(nic).copied() {
            if old != ip {
                self.release_ip(subnet, family, old);
            }
        }
    }

    fn release_ip(&mut self, subnet: &str, family: Family, ip: IpAddress) {
        let owner = self.ip_to_owner.remove(&ip);
        if let Some(owner) = &owner {
            if self.nic_to_ip[family].get(&owner.nic) == Some(&ip) {
                self.nic_to_ip[family].remove(&owner.nic);
            }
        }
        let pod = owner.map(|o| o.pod).unwrap_or_default();

        if !self.in_usable_range(family, ip) {
            info!("release {} {} from subnet {} for {}, ignore ip out of range", family, ip, subnet, pod);
            return;
        }
        for pool in self.pools.values_mut() {
            let ranges = pool.ranges_mut(family);
            if !ranges.using.remove(ip) {
                continue;
            }
            if ranges.reserved.contains(ip) {
                info!("release {} {} from subnet {} for {}, ip is in reserved list", family, ip, subnet, pod);
            } else if ranges.released.add(ip) {
                info!("release {} {} from subnet {} for {}, add ip to released list", family, ip, subnet, pod);
            }
            break;
        }
    }

    fn release_nic(&mut self, subnet: &str, pod: &str, nic: &str) {
        for family in Family::ALL {
            let Some(ip) = self.nic_to_ip[family].get(nic).copied() else {
                continue;
            };
            if self.ip_to_owner.get(&ip).is_some_and(|owner| owner.pod != pod) {
                continue;
            }
            self.release_ip(subnet, family, ip);
        }
        self.drop_nic_if_unbound(pod, nic);
    }

    /// Forget the MAC and pod membership of a NIC once it holds no address
    fn drop_nic_if_unbound(&mut self, pod: &str, nic: &str) {
        if Family::ALL.iter().any(|f| self.nic_to_ip[*f].contains_key(nic)) {
            return;
        }
        if let Some(mac) = self.nic_to_mac.remove(nic) {
            let shared = self.nic_to_mac.values().any(|m| *m == mac);
            if !shared && self.mac_to_pod.get(&mac).is_some_and(|p| p == pod) {
                self.mac_to_pod.remove(&mac);
            }
        }
        if let Some(nics) = self.pod_to_nics.get_mut(pod) {
            nics.retain(|n| n != nic);
            if nics.is_empty() {
                self.pod_to_nics.remove(pod);
            }
        }
    }
}
