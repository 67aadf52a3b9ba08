//! # kube-ipam - IP address management engine for Kubernetes overlay networks
//!
//! This library hands out IPv4 and IPv6 addresses (and MACs) to pod network
//! interfaces from named subnets, the way the kube-ovn controller does.
//!
//! ## Overview
//!
//! Every subnet tracks its address space as sorted, coalesced range lists:
//! what is free, what is reserved by the exclude list, what was released by
//! deleted pods and what is in use. Allocation is in-memory and synchronous;
//! the [`ipam::Ipam`] handle is shared between concurrent callers.
//!
//! ## Key Features
//!
//! - **Dual stack**: IPv4, IPv6 or both per subnet, allocated atomically
//! - **Released-address reuse**: freed addresses are only handed out again once
//!   the never-used ones run out
//! - **Static addresses**: reserved addresses are assignable on request,
//!   conflicts are reported (or overridden with `force`)
//! - **IP pools**: named, non-overlapping partitions of a subnet
//! - **Big address spaces**: counts of whole IPv6 blocks stay exact
//!
//! ## Architecture
//!
//! - `ip`: addresses, ranges and range lists
//! - `ipam`: address pools, subnets and the subnet registry
//! - `error`: the allocator's error kinds
//! - `utils`: CIDR, exclude-list and MAC helpers
//! - `config`: configuration structures and validation
//! - `config_loader`: configuration file loading and CLI overrides
//! - `orchestrator`: builds an `Ipam` from a configuration and reports its status
//!
//! ## Example Usage
//!
//! ```rust
//! use kube_ipam::ipam::Ipam;
//!
//! let ipam = Ipam::new();
//! ipam.add_or_update_subnet("ovn-default", "10.16.0.0/16", &["10.16.0.1".to_string()])?;
//!
//! let allocation = ipam.get_random_address("ovn-default", "", "default/nginx", "nginx.default", None, &[], true)?;
//! assert_eq!(allocation.v4.map(|ip| ip.to_string()).as_deref(), Some("10.16.0.2"));
//!
//! ipam.release_address_by_pod("default/nginx", "ovn-default");
//! assert!(!ipam.contain_address("10.16.0.2"));
//! # Ok::<(), kube_ipam::error::IpamError>(())
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`error::IpamError`]. The configuration layer
//! and the binary use `color_eyre` for error reports with context.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod ip;
pub mod ipam;
pub mod orchestrator;
pub mod utils;
