#[cfg(test)]
mod concurrency {
    use kube_ipam::ip::{Family, IpAddress};
    use kube_ipam::ipam::Ipam;
    use num_bigint::BigUint;
    use std::collections::HashSet;
    use std::thread;

    const WORKERS: usize = 8;
    const PODS_PER_WORKER: usize = 50;

    /// Parallel workers never receive the same address or MAC
    #[test]
    fn test_parallel_allocations_are_unique() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("a", "10.16.0.0/16,fd00:10:16::/64", &[]).unwrap();
        ipam.add_or_update_subnet("b", "10.17.0.0/16", &[]).unwrap();

        let results: Vec<(String, Option<IpAddress>, Option<IpAddress>, String)> = thread::scope(|s| {
            let handles: Vec<_> = (0..WORKERS)
                .map(|worker| {
                    let ipam = &ipam;
                    s.spawn(move || {
                        let subnet = if worker % 2 == 0 { "a" } else { "b" };
                        (0..PODS_PER_WORKER)
                            .map(|i| {
                                let pod = format!("pod-{}-{}", worker, i);
                                let allocation = ipam
                                    .get_random_address(subnet, "", &pod, &pod, None, &[], true)
                                    .unwrap();
                                (subnet.to_string(), allocation.v4, allocation.v6, allocation.mac)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.len(), WORKERS * PODS_PER_WORKER);

        let mut addresses = HashSet::new();
        let mut macs = HashSet::new();
        for (subnet, v4, v6, mac) in &results {
            assert!(addresses.insert(v4.unwrap()));
            if let Some(v6) = v6 {
                assert!(addresses.insert(*v6));
            }
            assert!(macs.insert((subnet.clone(), mac.clone())));
        }

        let subnet = ipam.subnet("a").unwrap();
        assert_eq!(subnet.using(Family::V4).count(), BigUint::from(WORKERS / 2 * PODS_PER_WORKER));
    }

    /// Concurrent requests for the same NIC converge on one allocation
    #[test]
    fn test_same_nic_requests_converge() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("a", "10.16.0.0/24", &[]).unwrap();

        let results: Vec<Option<IpAddress>> = thread::scope(|s| {
            let handles: Vec<_> = (0..WORKERS)
                .map(|_| {
                    let ipam = &ipam;
                    s.spawn(move || {
                        ipam.get_random_address("a", "", "pod", "pod", None, &[], true)
                            .unwrap()
                            .v4
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|ip| *ip == results[0]));
        assert_eq!(ipam.get_pod_address("pod").len(), 1);
    }

    /// Allocation and release interleaved across threads leave no binding behind
    #[test]
    fn test_allocate_release_churn() {
        let ipam = Ipam::new();
        ipam.add_or_update_subnet("a", "10.16.0.0/26", &[]).unwrap();

        thread::scope(|s| {
            for worker in 0..WORKERS {
                let ipam = &ipam;
                s.spawn(move || {
                    for i in 0..20 {
                        let pod = format!("pod-{}-{}", worker, i);
                        ipam.get_random_address("a", "", &pod, &pod, None, &[], true).unwrap();
                        ipam.release_address_by_pod(&pod, "a");
                    }
                });
            }
        });

        let subnet = ipam.subnet("a").unwrap();
        assert!(subnet.using(Family::V4).is_empty());
        assert_eq!(subnet.available(Family::V4).count(), BigUint::from(62u32));
    }
}
