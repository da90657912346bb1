//! Two simulated hosts in one process, through the facade.
//!
//! Each host runs on its own thread with its own topology copy and bus
//! endpoint, mirroring how one rank of a distributed simulation is set
//! up in production.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use skein::prelude::*;

const PING: u32 = 1;

fn topology() -> Arc<Topology> {
    let mut topology = Topology::new();
    let n0 = topology.add_node();
    let n1 = topology.add_node();
    topology.connect_p2p(n0, n1, Time::from_ns(500));
    topology.set_system_id(n0, 0);
    topology.set_system_id(n1, 1);
    Arc::new(topology)
}

#[test]
fn facade_runs_a_two_host_distributed_simulation() {
    let mut cluster = MemoryBus::cluster(2);
    let bus_b = cluster.pop().unwrap();
    let bus_a = cluster.pop().unwrap();
    let observed = Arc::new(AtomicU64::new(0));

    let host_a = thread::spawn(move || {
        Simulator::enable_distributed(
            KernelConfig::default(),
            topology(),
            Box::new(bus_a),
            Arc::new(RegistryCodec::new()),
        )
        .unwrap();
        assert_eq!(Simulator::get_system_id(), 0, "bus-backed id is the rank");

        // At t=0 on the local node, send a ping across the 500ns link.
        Simulator::schedule_with_context(0, Time::ZERO, || {
            Simulator::schedule_event_with_context(
                1,
                Time::from_ns(500),
                Event::with_wire(PING, Vec::new(), || {}),
            );
        });
        Simulator::run().unwrap();
        assert!(Simulator::is_finished());
        Simulator::destroy();
    });

    let observed_b = observed.clone();
    let host_b = thread::spawn(move || {
        let mut codec = RegistryCodec::new();
        codec.register(PING, move |_| {
            let observed = observed_b.clone();
            Event::new(move || {
                observed.store(Simulator::now().ps() as u64, Ordering::SeqCst);
            })
        });
        Simulator::enable_distributed(
            KernelConfig::default(),
            topology(),
            Box::new(bus_b),
            Arc::new(codec),
        )
        .unwrap();
        assert_eq!(Simulator::get_system_id(), 1);
        Simulator::run().unwrap();
        assert_eq!(Simulator::get_event_count(), 1, "the ping ran here");
        Simulator::destroy();
    });

    host_a.join().unwrap();
    host_b.join().unwrap();
    assert_eq!(
        observed.load(Ordering::SeqCst),
        Time::from_ns(500).ps() as u64
    );
}

#[test]
fn facade_runs_a_two_host_hybrid_simulation() {
    let build = || {
        let mut topology = Topology::new();
        let a0 = topology.add_node();
        let a1 = topology.add_node();
        let b0 = topology.add_node();
        topology.connect_p2p(a0, a1, Time::from_ns(10));
        topology.connect_p2p(a1, b0, Time::from_ns(500));
        topology.set_system_id(a0, 0);
        topology.set_system_id(a1, 0);
        topology.set_system_id(b0, 1);
        Arc::new(topology)
    };
    let config = || KernelConfig {
        max_threads: 2,
        min_lookahead: Time::from_ns(100),
        ..KernelConfig::default()
    };

    let mut cluster = MemoryBus::cluster(2);
    let bus_b = cluster.pop().unwrap();
    let bus_a = cluster.pop().unwrap();
    let observed = Arc::new(AtomicU64::new(0));

    let topology_a = build();
    let host_a = thread::spawn(move || {
        Simulator::enable_hybrid(
            config(),
            topology_a,
            Box::new(bus_a),
            Arc::new(RegistryCodec::new()),
        )
        .unwrap();
        Simulator::schedule_with_context(0, Time::ZERO, || {
            // Hop the uncut 10ns link first, then cross hosts.
            Simulator::schedule_with_context(1, Time::from_ns(10), || {
                Simulator::schedule_event_with_context(
                    2,
                    Time::from_ns(500),
                    Event::with_wire(PING, Vec::new(), || {}),
                );
            });
        });
        Simulator::run().unwrap();
        Simulator::destroy();
    });

    let observed_b = observed.clone();
    let topology_b = build();
    let host_b = thread::spawn(move || {
        let mut codec = RegistryCodec::new();
        codec.register(PING, move |_| {
            let observed = observed_b.clone();
            Event::new(move || {
                observed.store(Simulator::now().ps() as u64, Ordering::SeqCst);
            })
        });
        Simulator::enable_hybrid(config(), topology_b, Box::new(bus_b), Arc::new(codec))
            .unwrap();
        Simulator::run().unwrap();
        Simulator::destroy();
    });

    host_a.join().unwrap();
    host_b.join().unwrap();
    assert_eq!(
        observed.load(Ordering::SeqCst),
        Time::from_ns(510).ps() as u64
    );
}
