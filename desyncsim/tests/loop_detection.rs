//! Path-vector loop detection in a three-node ring.

use desync::{LogKind, NodeState};
use desyncsim::{Duration, ProtocolConfig, ScenarioBuilder, Simulator, Timestamp};
use tracing_test::traced_test;

fn at(ticks: u64) -> Timestamp {
    Timestamp::from_ticks(ticks)
}

/// Ring of three where only node 0 runs before t = 2500, so its schedule is
/// known exactly: broadcast at 0, next broadcast nominally at 1000.
fn lone_ring(config: ProtocolConfig) -> Simulator {
    let (sim, _) = ScenarioBuilder::new(3)
        .ring_topology()
        .with_config(config)
        .with_start_offsets(vec![0, 2500, 2500])
        .build()
        .unwrap();
    sim
}

#[traced_test]
#[test]
fn test_crafted_loop_resets_and_restarts() {
    let mut sim = lone_ring(ProtocolConfig::default());

    // Own share 100 is short of the sender's 333, and the chain already
    // contains node 0.
    sim.inject_receive(at(900), 0, 1, 2, "2,0").unwrap();
    let result = sim.run_until(at(900));

    let node = sim.node(0).unwrap();
    assert_eq!(node.state(), NodeState::Inactive);
    assert!(node.timer().is_none());
    assert!(node.path_vector().is_empty());
    assert!(node.neighbor_map().is_empty());
    assert_eq!(result.metrics.resets, 1);

    let last = node.log().last().unwrap();
    assert_eq!(last.kind, LogKind::Reset);
    assert_eq!(last.time, at(900));
    assert_eq!(last.to_string(), "900\t0\treset\tNone");
    assert!(logs_contain("adjustment loop detected"));

    // Back within one period, starting from scratch.
    sim.run_until(at(1899));
    let node = sim.node(0).unwrap();
    assert!(node.is_active());
    assert_eq!(node.degree(), 0);

    let restart = node
        .log()
        .iter()
        .find(|r| r.kind == LogKind::Broadcast && r.time >= at(900))
        .map(|r| r.time)
        .unwrap();
    assert!(restart - at(900) < Duration::from_ticks(1000));
}

#[test]
fn test_same_message_without_path_vectors_adjusts() {
    let mut sim = lone_ring(ProtocolConfig::default().with_path_vector(false));

    sim.inject_receive(at(900), 0, 1, 2, "2,0").unwrap();
    let result = sim.run_until(at(900));

    let node = sim.node(0).unwrap();
    assert!(node.is_active());
    assert_eq!(result.metrics.resets, 0);
    // Target 900 + 333; successor of 1 heard at phase 900 is 1900; blend
    // (1000 + 1233) / 2.
    assert_eq!(node.next_broadcast(), at(1116));
}

#[test]
fn test_sender_path_without_own_id_is_extended() {
    let mut sim = lone_ring(ProtocolConfig::default());

    sim.inject_receive(at(900), 0, 1, 2, "2").unwrap();
    sim.run_until(at(900));

    let node = sim.node(0).unwrap();
    assert!(node.is_active());
    assert_eq!(node.path_vector(), &[2, 0]);
}

/// Jumps straight to the target so every adjustment is easy to follow.
fn direct_jumps() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_jitter_bound(0)
        .with_alpha(100)
        .with_clamping(false)
}

/// Ring of three with fixed schedules: broadcasts at 0, 100 and 200, then
/// node 0's broadcast at 1000 pushes nodes 1 and 2 onto 1333.
fn pinned_ring() -> Simulator {
    let (sim, _) = ScenarioBuilder::new(3)
        .ring_topology()
        .with_config(direct_jumps())
        .with_start_offsets(vec![0, 100, 200])
        .build()
        .unwrap();
    sim
}

#[traced_test]
#[test]
fn test_loop_travels_around_the_ring() {
    let mut sim = pinned_ring();

    // Pull node 1 off 1333 so node 2 transmits alone there.
    sim.inject_receive(at(1100), 1, 0, 2, "").unwrap();

    // Node 2 broadcasts [2]; node 1 is 100 ticks short and extends it.
    sim.run_until(at(1333));
    assert_eq!(sim.node(2).unwrap().latest_broadcast(), Some(at(1333)));
    assert_eq!(sim.node(1).unwrap().path_vector(), &[2, 1]);
    assert_eq!(sim.node(1).unwrap().next_broadcast(), at(1833));

    // Node 1 forwards [2, 1]; node 0 is short and extends it.
    sim.run_until(at(1833));
    assert!(sim.node(1).unwrap().path_vector().is_empty());
    assert_eq!(sim.node(0).unwrap().path_vector(), &[2, 1, 0]);
    assert_eq!(sim.node(0).unwrap().next_broadcast(), at(2166));

    // Node 0 forwards [2, 1, 0] and node 2 finds itself in it.
    let result = sim.run_until(at(2166));
    assert_eq!(result.metrics.resets, 1);
    assert_eq!(result.count(LogKind::Reset), 1);
    let reset = result.logs.iter().find(|r| r.kind == LogKind::Reset).unwrap();
    assert_eq!((reset.node, reset.time), (2, at(2166)));
    assert_eq!(sim.node(2).unwrap().state(), NodeState::Inactive);
    assert!(sim.node(0).unwrap().is_active());
    assert!(sim.node(1).unwrap().is_active());
    assert!(logs_contain("adjustment loop detected"));

    sim.run_until(at(3165));
    let restart = sim
        .node(2)
        .unwrap()
        .log()
        .iter()
        .find(|r| r.kind == LogKind::Broadcast && r.time >= at(2166))
        .map(|r| r.time);
    assert!(restart.is_some(), "node 2 did not restart within a period");
}

#[test]
fn test_pinned_ring_is_quiet_without_crafted_receive() {
    let mut sim = pinned_ring();
    let result = sim.run_until(at(8000));
    assert_eq!(result.metrics.resets, 0);
}

#[test]
fn test_every_reset_is_followed_by_restart() {
    let crafted = || {
        let mut sim = pinned_ring();
        sim.inject_receive(at(1100), 1, 0, 2, "").unwrap();
        sim
    };
    let seeded = |seed| {
        ScenarioBuilder::new(3)
            .ring_topology()
            .with_seed(seed)
            .build()
            .unwrap()
            .0
    };

    let end = at(30_000);
    let mut total_resets = 0;
    for (name, mut sim) in [
        ("crafted", crafted()),
        ("seed 0", seeded(0)),
        ("seed 1", seeded(1)),
        ("seed 2", seeded(2)),
    ] {
        let result = sim.run_until(end);
        assert_eq!(result.count(LogKind::Reset) as u64, result.metrics.resets);
        total_resets += result.metrics.resets;

        for reset in result.logs.iter().filter(|r| r.kind == LogKind::Reset) {
            if reset.time + Duration::from_ticks(1000) > end {
                continue;
            }
            let restarted = result.node_log(reset.node).any(|r| {
                r.kind == LogKind::Broadcast
                    && r.time >= reset.time
                    && r.time < reset.time + Duration::from_ticks(1000)
            });
            assert!(restarted, "{}: node {} never restarted", name, reset.node);
        }
    }
    assert!(total_resets >= 1);
}
