#[cfg(test)]
mod ipam_scenarios {
    use kube_ipam::error::IpamError;
    use kube_ipam::ip::{Family, IpAddress, IpRangeList};
    use kube_ipam::ipam::{Ipam, DEFAULT_POOL};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    fn scenario_ipam() -> Ipam {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet(
            "s",
            "10.0.0.0/24",
            &strings(&["10.0.0.2", "10.0.0.4", "10.0.0.100", "10.0.0.252..10.0.0.254"]),
        )
        .unwrap();
        ipam
    }

    /// Free set of a new subnet skips the exclude list
    #[test]
    fn test_new_subnet_free_set() {
        let ipam = scenario_ipam();
        let subnet = ipam.subnet("s").unwrap();
        let expected = IpRangeList::from_strs(&[
            "10.0.0.1",
            "10.0.0.3",
            "10.0.0.5..10.0.0.99",
            "10.0.0.101..10.0.0.251",
        ])
        .unwrap();
        assert_eq!(subnet.free(Family::V4), expected);
    }

    /// Random allocation takes the next free address, skipping reserved ones
    #[test]
    fn test_random_allocation_skips_reserved() {
        let ipam = scenario_ipam();
        let pod1 = ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap();
        let pod2 = ipam.get_random_address("s", "", "pod2", "pod2", None, &[], true).unwrap();
        assert_eq!(pod1.v4, Some(ip("10.0.0.1")));
        assert_eq!(pod2.v4, Some(ip("10.0.0.3")));
    }

    /// Reserved addresses are assignable statically, but only once
    #[test]
    fn test_static_reserved_address() {
        let ipam = scenario_ipam();
        let x = ipam
            .get_static_address("s", "", "podX", "podX", "10.0.0.2", None, false, true)
            .unwrap();
        assert_eq!(x.v4, Some(ip("10.0.0.2")));

        let err = ipam
            .get_static_address("s", "", "podY", "podY", "10.0.0.2", None, false, true)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    /// A released address is free to be handed out again
    #[test]
    fn test_release_makes_address_allocatable() {
        let ipam = scenario_ipam();
        ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap();
        ipam.release_address_by_pod("pod1", "s");

        let subnet = ipam.subnet("s").unwrap();
        assert!(!subnet.using(Family::V4).contains(ip("10.0.0.1")));
        assert!(subnet.available(Family::V4).contains(ip("10.0.0.1")));

        let again = ipam
            .get_static_address("s", "", "pod3", "pod3", "10.0.0.1", None, false, true)
            .unwrap();
        assert_eq!(again.v4, Some(ip("10.0.0.1")));
    }

    /// Inverted ranges are rejected, not swapped
    #[test]
    fn test_inverted_range_rejected() {
        let err = IpRangeList::from_strs(&["192.168.1.2..192.168.1.1"]).unwrap_err();
        assert!(matches!(err, IpamError::InvalidRange { .. }));
        assert!(err.to_string().contains("less than"));
    }

    #[test]
    fn test_to_cidrs() {
        let list = IpRangeList::from_strs(&["10.0.0.1..10.0.0.5"]).unwrap();
        assert_eq!(
            list.to_cidrs().unwrap(),
            vec!["10.0.0.1/32", "10.0.0.2/31", "10.0.0.4/31"]
        );
    }

    #[test]
    fn test_reuse_released_only_after_free() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("s", "10.16.0.0/30", &[]).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let a = ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap();
            seen.push(a.v4.unwrap().to_string());
            ipam.release_address_by_pod("pod1", "s");
        }
        assert_eq!(seen, vec!["10.16.0.1", "10.16.0.2", "10.16.0.1"]);
    }

    #[test]
    fn test_exclude_update_drops_released() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("s", "10.16.0.0/30", &[]).unwrap();
        ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap();
        ipam.release_address_by_pod("pod1", "s");

        ipam.add_or_update_subnet("s", "10.16.0.0/30", &strings(&["10.16.0.1..10.16.0.2"]))
            .unwrap();
        let err = ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap_err();
        assert!(err.is_no_available());
    }

    #[test]
    fn test_static_released_address() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("s", "10.16.0.0/16", &strings(&["10.16.0.1"])).unwrap();
        ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap();
        ipam.release_address_by_pod("pod1", "");

        let subnet = ipam.subnet("s").unwrap();
        assert!(subnet.released(Family::V4).contains(ip("10.16.0.2")));
        let a = ipam
            .get_static_address("s", "", "pod2", "pod2", "10.16.0.2", None, false, true)
            .unwrap();
        assert_eq!(a.v4, Some(ip("10.16.0.2")));
        assert!(subnet.released(Family::V4).is_empty());
    }

    #[test]
    fn test_dual_stack_subnet_lifecycle() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet(
            "dual",
            "10.16.0.0/16,fd00:10:16::/64",
            &strings(&["10.16.0.1", "fd00:10:16::1"]),
        )
        .unwrap();

        let a = ipam.get_random_address("dual", "", "pod1", "eth0", None, &[], true).unwrap();
        assert_eq!(a.v4, Some(ip("10.16.0.2")));
        assert_eq!(a.v6, Some(ip("fd00:10:16::2")));

        let addresses = ipam.get_pod_address("pod1");
        assert_eq!(addresses.len(), 2);
        assert!(addresses.iter().all(|a| a.nic == "eth0" && !a.mac.is_empty()));
        assert_eq!(addresses[0].ip.family(), Family::V4);
        assert_eq!(addresses[1].ip.family(), Family::V6);

        let stats = ipam.ip_pool_statistics("dual", DEFAULT_POOL).unwrap();
        assert_eq!(stats.family(Family::V4).using_range, "10.16.0.2");
        assert_eq!(stats.family(Family::V6).using_range, "fd00:10:16::2");

        ipam.release_address_by_pod("pod1", "dual");
        assert!(!ipam.contain_address("10.16.0.2"));
        assert!(!ipam.contain_address("fd00:10:16::2"));
    }

    #[test]
    fn test_subnet_becomes_dual_stack() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("s", "10.16.0.0/16", &strings(&["10.16.0.1"])).unwrap();
        let v4 = ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap();
        assert!(v4.v6.is_none());

        ipam.add_or_update_subnet("s", "10.16.0.0/16,fd00:10:16::/64", &strings(&["10.16.0.1"]))
            .unwrap();
        let dual = ipam.get_random_address("s", "", "pod1", "pod1", None, &[], true).unwrap();
        assert_eq!(dual.v4, v4.v4);
        assert_eq!(dual.mac, v4.mac);
        assert_eq!(dual.v6, Some(ip("fd00:10:16::1")));
    }

    #[test]
    fn test_ip_pool_lifecycle() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("s", "10.16.0.0/16", &strings(&["10.16.0.1"])).unwrap();
        ipam.add_or_update_ip_pool("s", "pool-a", &strings(&["10.16.1.10..10.16.1.11"])).unwrap();

        let a = ipam.get_random_address("s", "pool-a", "pod1", "pod1", None, &[], true).unwrap();
        let b = ipam.get_random_address("s", "pool-a", "pod2", "pod2", None, &[], true).unwrap();
        assert_eq!(a.v4, Some(ip("10.16.1.10")));
        assert_eq!(b.v4, Some(ip("10.16.1.11")));
        let err = ipam.get_random_address("s", "pool-a", "pod3", "pod3", None, &[], true).unwrap_err();
        assert!(err.is_no_available());

        let err = ipam
            .add_or_update_ip_pool("s", "pool-b", &strings(&["10.16.1.0/24"]))
            .unwrap_err();
        assert!(matches!(err, IpamError::PoolConflict { .. }));

        ipam.remove_ip_pool("s", "pool-a");
        let default = ipam.ip_pool_statistics("s", DEFAULT_POOL).unwrap();
        assert!(default.family(Family::V4).using_range.contains("10.16.1.10-10.16.1.11"));
        ipam.add_or_update_ip_pool("s", "pool-b", &strings(&["10.16.1.0/24"])).unwrap();
        let pool_b = ipam.ip_pool_statistics("s", "pool-b").unwrap();
        assert_eq!(pool_b.family(Family::V4).using_range, "10.16.1.10-10.16.1.11");
    }

    #[test]
    fn test_ipv6_counts_are_exact() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("v6", "fd00::/64", &[]).unwrap();
        let stats = ipam.ip_pool_statistics("v6", DEFAULT_POOL).unwrap();
        assert_eq!(stats.family(Family::V6).available.to_string(), "18446744073709551614");
    }
}
