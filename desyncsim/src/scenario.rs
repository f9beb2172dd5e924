//! Scenario builder for setting up and running simulations.

use desync::{ConfigError, Duration, NodeId, ProtocolConfig, Timestamp};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::metrics::SimulationResult;
use crate::sim::Simulator;
use crate::topology::{Topology, TopologyError};

/// Errors assembling a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("no topology specified")]
    MissingTopology,
    #[error("{expected} nodes but {got} start offsets")]
    OffsetCount { expected: usize, got: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Type of topology to generate.
#[derive(Debug, Clone)]
enum TopologyType {
    Complete,
    Chain,
    Ring,
    /// First node is hub.
    Star,
    RandomGeometric { radius: f64 },
    RandomGeometricAdaptive,
    ErdosRenyi { p: f64 },
    /// Custom topology provided by user; its node set replaces the count.
    Custom(Topology),
}

/// When each node first activates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOffsets {
    /// Everyone at time zero, in id order.
    Simultaneous,
    /// Offset in ticks per node, in id order.
    Explicit(Vec<u64>),
    /// Uniform in `[0, period)` from the scenario seed.
    Random,
}

/// Builder for simulation scenarios.
pub struct ScenarioBuilder {
    /// Number of nodes to create; ids are `0..num_nodes`.
    num_nodes: u32,
    /// Seed for topology generation and random start offsets.
    seed: u64,
    /// Protocol settings shared by every node.
    config: ProtocolConfig,
    /// Topology type to generate (must be explicitly specified).
    topology_type: Option<TopologyType>,
    start: StartOffsets,
    /// Snapshot interval.
    snapshot_interval: Option<Duration>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScenarioBuilder {
    /// Create a new scenario with the specified number of nodes.
    ///
    /// A topology must be chosen before calling [`build`](Self::build).
    pub fn new(num_nodes: u32) -> Self {
        Self {
            num_nodes,
            seed: 42,
            config: ProtocolConfig::default(),
            topology_type: None,
            start: StartOffsets::Random,
            snapshot_interval: None,
        }
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a custom network topology.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = Some(TopologyType::Custom(topo));
        self
    }

    /// Use fully connected topology.
    pub fn complete(mut self) -> Self {
        self.topology_type = Some(TopologyType::Complete);
        self
    }

    /// Use chain topology (each node connected only to neighbors).
    pub fn chain_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Chain);
        self
    }

    pub fn ring_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Ring);
        self
    }

    /// Use star topology (first node is hub).
    pub fn star_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Star);
        self
    }

    /// Use random geometric topology with specified radius.
    ///
    /// Connectivity is guaranteed by adding minimal MST edges if needed.
    pub fn random_geometric(mut self, radius: f64) -> Self {
        self.topology_type = Some(TopologyType::RandomGeometric { radius });
        self
    }

    /// Use random geometric topology with adaptive radius.
    pub fn random_geometric_adaptive(mut self) -> Self {
        self.topology_type = Some(TopologyType::RandomGeometricAdaptive);
        self
    }

    /// Use `G(n, p)`. The result may be disconnected.
    pub fn erdos_renyi(mut self, p: f64) -> Self {
        self.topology_type = Some(TopologyType::ErdosRenyi { p });
        self
    }

    /// Start every node at time zero.
    pub fn simultaneous_start(mut self) -> Self {
        self.start = StartOffsets::Simultaneous;
        self
    }

    /// Start node `i` (in id order) at `offsets[i]` ticks.
    pub fn with_start_offsets(mut self, offsets: Vec<u64>) -> Self {
        self.start = StartOffsets::Explicit(offsets);
        self
    }

    /// Start each node at a seeded random time in `[0, period)`. The default.
    pub fn random_start(mut self) -> Self {
        self.start = StartOffsets::Random;
        self
    }

    /// Set snapshot interval for metrics collection.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Build the simulator with all nodes added and their activations
    /// scheduled. Returns the node ids in ascending order.
    pub fn build(self) -> Result<(Simulator, Vec<NodeId>), ScenarioError> {
        let mut sim = Simulator::new(self.config)?;

        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        let ids: Vec<NodeId> = (0..self.num_nodes).collect();
        let topo = match self.topology_type {
            Some(TopologyType::Complete) => Topology::complete(&ids),
            Some(TopologyType::Chain) => Topology::chain(&ids),
            Some(TopologyType::Ring) => Topology::ring(&ids),
            Some(TopologyType::Star) => Topology::star(&ids),
            Some(TopologyType::RandomGeometric { radius }) => {
                Topology::random_geometric(&ids, self.seed, radius)
            }
            Some(TopologyType::RandomGeometricAdaptive) => {
                Topology::random_geometric_adaptive(&ids, self.seed)
            }
            Some(TopologyType::ErdosRenyi { p }) => Topology::erdos_renyi(&ids, self.seed, p),
            Some(TopologyType::Custom(t)) => t,
            None => return Err(ScenarioError::MissingTopology),
        };

        // Set topology BEFORE adding nodes
        sim = sim.with_topology(topo);
        let node_ids = sim.add_topology_nodes();

        let offsets = match self.start {
            StartOffsets::Simultaneous => vec![0; node_ids.len()],
            StartOffsets::Explicit(offsets) => {
                if offsets.len() != node_ids.len() {
                    return Err(ScenarioError::OffsetCount {
                        expected: node_ids.len(),
                        got: offsets.len(),
                    });
                }
                offsets
            }
            StartOffsets::Random => {
                // Separate stream from the one the topology generators use.
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                rng.set_stream(1);
                let period = self.config.period;
                node_ids.iter().map(|_| rng.gen_range(0..period)).collect()
            }
        };

        for (&id, offset) in node_ids.iter().zip(offsets) {
            sim.activate_at(id, Timestamp::from_ticks(offset))?;
        }

        Ok((sim, node_ids))
    }

    /// Build and run the simulation for the specified duration.
    pub fn run_for(self, duration: Duration) -> Result<SimulationResult, ScenarioError> {
        let (mut sim, _) = self.build()?;
        Ok(sim.run_for(duration))
    }

    /// Build and run until the specified time.
    pub fn run_until(self, time: Timestamp) -> Result<SimulationResult, ScenarioError> {
        let (mut sim, _) = self.build()?;
        Ok(sim.run_until(time))
    }
}

/// Convenience function to create a simple N-node fully connected scenario.
pub fn simple_scenario(num_nodes: u32) -> ScenarioBuilder {
    ScenarioBuilder::new(num_nodes).complete()
}
