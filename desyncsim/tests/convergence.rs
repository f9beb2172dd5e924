//! Two nodes that hear each other settle half a period apart.
//!
//! With loop detection and clamping off, every rebalance halves the distance
//! to the fair split, so the phase gap approaches `period / 2` geometrically.

use desyncsim::{Duration, ProtocolConfig, ScenarioBuilder, Timestamp};

const PERIOD: u64 = 1000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn plain_blending() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_period(PERIOD)
        .with_path_vector(false)
        .with_clamping(false)
}

#[test]
fn test_two_nodes_converge_without_jitter() {
    init_tracing();

    for offsets in [[0, 100], [0, 900], [0, 1], [0, 500], [250, 260]] {
        let result = ScenarioBuilder::new(2)
            .complete()
            .with_config(plain_blending().with_jitter_bound(0))
            .with_start_offsets(offsets.to_vec())
            .run_until(Timestamp::from_ticks(40 * PERIOD))
            .unwrap();

        let gap = result.phase_gap(0, 1, PERIOD).unwrap();
        assert!(
            gap.abs_diff(PERIOD / 2) <= 2,
            "offsets {:?}: gap {}",
            offsets,
            gap
        );
        assert_eq!(result.metrics.resets, 0);
    }
}

#[test]
fn test_gap_shrinks_every_period() {
    let (mut sim, _) = ScenarioBuilder::new(2)
        .complete()
        .with_config(plain_blending().with_jitter_bound(0))
        .with_start_offsets(vec![0, 100])
        .build()
        .unwrap();

    let mut previous = PERIOD;
    for k in 1..=8 {
        let result = sim.run_until(Timestamp::from_ticks(k * PERIOD));
        let error = result.phase_gap(0, 1, PERIOD).unwrap().abs_diff(PERIOD / 2);
        assert!(error <= previous, "period {}: error {} > {}", k, error, previous);
        previous = error;
    }
    assert!(previous < 10);
}

#[test]
fn test_two_nodes_converge_with_jitter() {
    init_tracing();

    for seed in 0..5 {
        let result = ScenarioBuilder::new(2)
            .complete()
            .with_seed(seed)
            .with_config(plain_blending().with_jitter_bound(5))
            .run_for(Duration::from_ticks(60 * PERIOD))
            .unwrap();

        let gap = result.phase_gap(0, 1, PERIOD).unwrap();
        assert!(
            gap.abs_diff(PERIOD / 2) <= 40,
            "seed {}: gap {}",
            seed,
            gap
        );
    }
}
