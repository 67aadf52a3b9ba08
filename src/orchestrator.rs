//! Configuration orchestrator.
//!
//! Builds an [`Ipam`] from a loaded configuration, replays the declared
//! allocations against it and renders the resulting subnet status, the
//! same figures a subnet reconciler would publish.

use crate::config::{AllocationConfig, Config};
use crate::error::IpamError;
use crate::ip::{Family, Protocol};
use crate::ipam::{Allocation, Ipam, PoolStatistics, Subnet, DEFAULT_POOL};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use serde::Serialize;
use std::path::Path;

/// Outcome of one replayed allocation
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AllocationOutcome {
    pub pod: String,
    pub nic: String,
    pub subnet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AllocationOutcome {
    fn new(request: &AllocationConfig, result: std::result::Result<Allocation, String>) -> Self {
        let mut outcome = AllocationOutcome {
            pod: request.pod.clone(),
            nic: request.nic_name().to_string(),
            subnet: request.subnet.clone(),
            v4: None,
            v6: None,
            mac: None,
            error: None,
        };
        match result {
            Ok(allocation) => {
                outcome.v4 = allocation.v4.map(|ip| ip.to_string());
                outcome.v6 = allocation.v6.map(|ip| ip.to_string());
                outcome.mac = Some(allocation.mac);
            }
            Err(err) => outcome.error = Some(err),
        }
        outcome
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Counters of one family. Counts are decimal strings, IPv6 ranges overflow u64.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FamilyStatus {
    pub available: String,
    pub using: String,
    pub available_range: String,
    pub using_range: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v4: Option<FamilyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v6: Option<FamilyStatus>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutOfRangeBinding {
    pub pod: String,
    pub nic: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubnetStatus {
    pub name: String,
    pub cidr: String,
    pub protocol: Protocol,
    pub exclude_ips: Vec<String>,
    pub pools: Vec<PoolStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub out_of_range: Vec<OutOfRangeBinding>,
}

/// Everything the `kube-ipam` binary reports
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub subnets: Vec<SubnetStatus>,
    pub allocations: Vec<AllocationOutcome>,
}

/// Create every subnet and pool declared in the configuration
pub fn build_ipam(config: &Config) -> Result<Ipam> {
    let ipam = Ipam::with_options(config.options());

    for subnet in &config.subnets {
        ipam.add_or_update_subnet(&subnet.name, &subnet.cidr, &subnet.exclude_ips)
            .wrap_err_with(|| format!("Failed to add subnet '{}'", subnet.name))?;

        for pool in &subnet.ip_pools {
            ipam.add_or_update_ip_pool(&subnet.name, &pool.name, &pool.ips)
                .wrap_err_with(|| {
                    format!("Failed to add ippool '{}' to subnet '{}'", pool.name, subnet.name)
                })?;
        }
    }

    info!("Created {} subnet(s)", config.subnets.len());
    Ok(ipam)
}

/// Replay the declared allocations in order.
///
/// A failing allocation does not stop the replay; its error is recorded in
/// the outcome, the way a controller would requeue it.
pub fn replay_allocations(ipam: &Ipam, config: &Config) -> Vec<AllocationOutcome> {
    config
        .allocations
        .iter()
        .map(|request| {
            let result = allocate(ipam, request);
            if let Err(err) = &result {
                warn!("Allocation for pod {} in subnet {} failed: {}", request.pod, request.subnet, err);
            }
            AllocationOutcome::new(request, result.map_err(|e| e.to_string()))
        })
        .collect()
}

fn allocate(ipam: &Ipam, request: &AllocationConfig) -> std::result::Result<Allocation, IpamError> {
    let nic = request.nic_name();
    let mac = request.mac.as_deref();
    match &request.ip {
        Some(ip) => ipam.get_static_address(
            &request.subnet,
            &request.pool,
            &request.pod,
            nic,
            ip,
            mac,
            request.force,
            request.dual_stack,
        ),
        None => ipam.get_random_address(
            &request.subnet,
            &request.pool,
            &request.pod,
            nic,
            mac,
            &request.skip,
            request.dual_stack,
        ),
    }
}

fn family_status(stats: &PoolStatistics, protocol: Protocol, family: Family) -> Option<FamilyStatus> {
    if !protocol.has(family) {
        return None;
    }
    let stats = stats.family(family);
    Some(FamilyStatus {
        available: stats.available.to_string(),
        using: stats.using.to_string(),
        available_range: stats.available_range.clone(),
        using_range: stats.using_range.clone(),
    })
}

fn subnet_status(subnet: &Subnet) -> SubnetStatus {
    let protocol = subnet.protocol();
    let pools = subnet
        .pool_names()
        .into_iter()
        .filter_map(|name| {
            let stats = subnet.ip_pool_statistics(&name)?;
            Some(PoolStatus {
                v4: family_status(&stats, protocol, Family::V4),
                v6: family_status(&stats, protocol, Family::V6),
                name: if name == DEFAULT_POOL { "default".to_string() } else { name },
            })
        })
        .collect();

    SubnetStatus {
        name: subnet.name().to_string(),
        cidr: subnet.cidr(),
        protocol,
        exclude_ips: subnet.exclude_ips(),
        pools,
        out_of_range: subnet
            .out_of_range_bindings()
            .into_iter()
            .map(|b| OutOfRangeBinding { pod: b.pod, nic: b.nic, ip: b.ip.to_string() })
            .collect(),
    }
}

/// Snapshot the status of every subnet
pub fn status_report(ipam: &Ipam, allocations: Vec<AllocationOutcome>) -> StatusReport {
    let subnets = ipam
        .subnet_names()
        .iter()
        .filter_map(|name| ipam.subnet(name))
        .map(|subnet| subnet_status(&subnet))
        .collect();
    StatusReport { subnets, allocations }
}

/// Build, replay and report
pub fn run(config: &Config) -> Result<StatusReport> {
    let ipam = build_ipam(config)?;
    let allocations = replay_allocations(&ipam, config);
    Ok(status_report(&ipam, allocations))
}

/// Serialize a report as YAML, or JSON when `json` is set
pub fn render_report(report: &StatusReport, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(report).wrap_err("Failed to serialize status report as JSON")
    } else {
        serde_yaml::to_string(report).wrap_err("Failed to serialize status report as YAML")
    }
}

pub fn write_report(report: &StatusReport, output_path: &Path, json: bool) -> Result<()> {
    let rendered = render_report(report, json)?;
    std::fs::write(output_path, rendered)
        .wrap_err_with(|| format!("Failed to write status report '{}'", output_path.display()))?;
    info!("Wrote status report to {:?}", output_path);
    Ok(())
}

pub fn print_summary(report: &StatusReport) {
    println!("IPAM status:");
    for subnet in &report.subnets {
        println!("  - Subnet {} ({}, {})", subnet.name, subnet.cidr, subnet.protocol);
        for pool in &subnet.pools {
            for (family, status) in [("v4", &pool.v4), ("v6", &pool.v6)] {
                if let Some(status) = status {
                    println!(
                        "    - {} {}: {} in use, {} available",
                        pool.name, family, status.using, status.available
                    );
                }
            }
        }
        if !subnet.out_of_range.is_empty() {
            println!("    - {} binding(s) outside the current cidr", subnet.out_of_range.len());
        }
    }

    let failed = report.allocations.iter().filter(|a| !a.is_ok()).count();
    println!(
        "  - Allocations: {} succeeded, {} failed",
        report.allocations.len() - failed,
        failed
    );
}
