//! Network topology: which nodes hear each other's broadcasts.
//!
//! Links are undirected and carry no properties; a broadcast reaches every
//! neighbor in the same logical instant. Adjacency is kept in ordered maps so
//! iteration (and therefore the whole simulation) is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::ops::Bound;

use desync::NodeId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

/// Errors building or parsing a topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("self loop on node {0}")]
    SelfLoop(NodeId),
    #[error("line {line}: invalid node id {token:?}")]
    InvalidNodeId { line: usize, token: String },
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

/// Undirected graph over node ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Topology with the given nodes and no links.
    pub fn isolated(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        for &node in nodes {
            topo.add_node(node);
        }
        topo
    }

    /// Create a fully connected topology for the given nodes.
    pub fn complete(nodes: &[NodeId]) -> Self {
        let mut topo = Self::isolated(nodes);
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.link(a, b);
            }
        }
        topo
    }

    /// Create a chain topology (each node connected only to neighbors).
    pub fn chain(nodes: &[NodeId]) -> Self {
        let mut topo = Self::isolated(nodes);
        for window in nodes.windows(2) {
            topo.link(window[0], window[1]);
        }
        topo
    }

    /// Chain with the ends joined. Fewer than three nodes gives a chain.
    pub fn ring(nodes: &[NodeId]) -> Self {
        let mut topo = Self::chain(nodes);
        if let [first, .., last] = nodes {
            if nodes.len() >= 3 {
                topo.link(*first, *last);
            }
        }
        topo
    }

    /// Create a star topology (first node is hub, connected to all others).
    pub fn star(nodes: &[NodeId]) -> Self {
        let mut topo = Self::isolated(nodes);
        if let Some((&hub, spokes)) = nodes.split_first() {
            for &spoke in spokes {
                topo.link(hub, spoke);
            }
        }
        topo
    }

    /// Create a random geometric topology.
    ///
    /// Nodes are placed uniformly in the unit square using a rng seeded with
    /// `seed`. Two nodes are linked if their distance is <= `radius`. Unlike
    /// a bare unit disk graph, a disconnected result is then repaired by
    /// adding the shortest missing edges until it is connected.
    pub fn random_geometric(nodes: &[NodeId], seed: u64, radius: f64) -> Self {
        let mut topo = Self::isolated(nodes);
        if nodes.len() <= 1 {
            return topo;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let positions: Vec<(f64, f64)> = (0..nodes.len())
            .map(|_| (rng.gen::<f64>(), rng.gen::<f64>()))
            .collect();

        let mut all_edges: Vec<(usize, usize, f64)> = Vec::new();
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let dx = positions[i].0 - positions[j].0;
                let dy = positions[i].1 - positions[j].1;
                let dist = (dx * dx + dy * dy).sqrt();
                all_edges.push((i, j, dist));

                if dist <= radius {
                    topo.link(nodes[i], nodes[j]);
                }
            }
        }

        ensure_connectivity(&mut topo, nodes, &mut all_edges);
        topo
    }

    /// Random geometric topology with a radius giving about five neighbors
    /// per node.
    pub fn random_geometric_adaptive(nodes: &[NodeId], seed: u64) -> Self {
        let radius = compute_adaptive_radius(nodes.len());
        Self::random_geometric(nodes, seed, radius)
    }

    /// Erdős–Rényi `G(n, p)`: every pair is linked independently with
    /// probability `p`. May be disconnected.
    pub fn erdos_renyi(nodes: &[NodeId], seed: u64, p: f64) -> Self {
        let mut topo = Self::isolated(nodes);
        let p = p.clamp(0.0, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                if rng.gen_bool(p) {
                    topo.link(a, b);
                }
            }
        }
        topo
    }

    /// One graph per isomorphism class of connected graphs on 1 to
    /// `max_nodes` nodes, with ids `0..n`. Ordered by node count, then link
    /// count. `max_nodes` is capped at [`MAX_SMALL_GRAPH_NODES`].
    pub fn small_connected(max_nodes: usize) -> Vec<Self> {
        let mut graphs = Vec::new();
        for n in 1..=max_nodes.min(MAX_SMALL_GRAPH_NODES) {
            let pairs: Vec<(usize, usize)> = (0..n)
                .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
                .collect();
            let relabelings = permutations(n);

            // (link count, smallest edge mask over all relabelings)
            let mut classes = BTreeSet::new();
            for mask in 0u32..(1 << pairs.len()) {
                if !mask_connected(n, &pairs, mask) {
                    continue;
                }
                let canonical = relabelings
                    .iter()
                    .map(|perm| relabel(n, &pairs, mask, perm))
                    .min()
                    .unwrap_or(mask);
                classes.insert((mask.count_ones(), canonical));
            }

            let ids: Vec<NodeId> = (0..n).filter_map(|i| NodeId::try_from(i).ok()).collect();
            for (_, mask) in classes {
                let mut topo = Self::isolated(&ids);
                for (bit, &(i, j)) in pairs.iter().enumerate() {
                    if mask & (1 << bit) != 0 {
                        topo.link(ids[i], ids[j]);
                    }
                }
                graphs.push(topo);
            }
        }
        graphs
    }

    /// Add a node with no links. Existing nodes are left alone.
    pub fn add_node(&mut self, node: NodeId) {
        self.adjacency.entry(node).or_default();
    }

    /// Add an undirected link, adding either node if missing.
    pub fn add_link(&mut self, a: NodeId, b: NodeId) -> Result<(), TopologyError> {
        if a == b {
            return Err(TopologyError::SelfLoop(a));
        }
        self.link(a, b);
        Ok(())
    }

    /// Remove a link. Returns whether it existed.
    pub fn remove_link(&mut self, a: NodeId, b: NodeId) -> bool {
        let removed = self.adjacency.get_mut(&a).is_some_and(|n| n.remove(&b));
        if let Some(n) = self.adjacency.get_mut(&b) {
            n.remove(&a);
        }
        removed
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }

    /// Check if two nodes share a link.
    pub fn has_link(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    /// All node ids in ascending order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.adjacency.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn link_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Neighbors of `node` in ascending order. Empty for unknown nodes.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.adjacency
            .get(&node)
            .map(|n| n.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether every node can reach every other node. True when empty.
    pub fn is_connected(&self) -> bool {
        let Some(&start) = self.adjacency.keys().next() else {
            return true;
        };

        let mut visited = BTreeSet::from([start]);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &next in &self.adjacency[&current] {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        visited.len() == self.adjacency.len()
    }

    /// Render as an adjacency list: one line per node, the node id followed
    /// by its neighbors with larger ids, so every edge appears once.
    pub fn to_adjlist(&self) -> String {
        let mut out = String::new();
        for (&node, neighbors) in &self.adjacency {
            let _ = write!(out, "{}", node);
            for &neighbor in neighbors.range((Bound::Excluded(node), Bound::Unbounded)) {
                let _ = write!(out, " {}", neighbor);
            }
            out.push('\n');
        }
        out
    }

    /// Parse the adjacency-list format written by [`to_adjlist`](Self::to_adjlist).
    ///
    /// Whitespace-separated ids; the first id on a line is the node, the
    /// rest its neighbors. Text after `#` is ignored, as are blank lines.
    pub fn from_adjlist(text: &str) -> Result<Self, TopologyError> {
        let mut topo = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default();
            let mut ids = line
                .split_whitespace()
                .map(|token| parse_node_id(token, index + 1));

            let Some(node) = ids.next().transpose()? else {
                continue;
            };
            topo.add_node(node);
            for neighbor in ids {
                topo.add_link(node, neighbor?)?;
            }
        }
        Ok(topo)
    }

    fn link(&mut self, a: NodeId, b: NodeId) {
        debug_assert_ne!(a, b);
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }
}

fn parse_node_id(token: &str, line: usize) -> Result<NodeId, TopologyError> {
    token.parse().map_err(|_| TopologyError::InvalidNodeId {
        line,
        token: token.to_owned(),
    })
}

/// Compute adaptive radius for random geometric graph.
///
/// Formula: r = sqrt(k / ((n-1) * pi)) where k ≈ 5 (target neighbors)
/// Clamped to [0.15, 0.70] for reasonable connectivity.
pub(crate) fn compute_adaptive_radius(num_nodes: usize) -> f64 {
    if num_nodes <= 1 {
        return 0.5;
    }

    let k = 5.0;
    let n = num_nodes as f64;
    let r = (k / ((n - 1.0) * std::f64::consts::PI)).sqrt();
    r.clamp(0.15, 0.70)
}

/// Largest node count [`Topology::small_connected`] enumerates.
pub const MAX_SMALL_GRAPH_NODES: usize = 6;

/// Bit of the pair `{a, b}` in an edge mask over `n` nodes.
fn pair_bit(n: usize, a: usize, b: usize) -> usize {
    let (lo, hi) = (a.min(b), a.max(b));
    lo * (2 * n - lo - 1) / 2 + (hi - lo - 1)
}

fn relabel(n: usize, pairs: &[(usize, usize)], mask: u32, perm: &[usize]) -> u32 {
    pairs
        .iter()
        .enumerate()
        .filter(|&(bit, _)| mask & (1 << bit) != 0)
        .fold(0, |out, (_, &(i, j))| out | 1 << pair_bit(n, perm[i], perm[j]))
}

fn mask_connected(n: usize, pairs: &[(usize, usize)], mask: u32) -> bool {
    let mut adjacent = vec![0u32; n];
    for (bit, &(i, j)) in pairs.iter().enumerate() {
        if mask & (1 << bit) != 0 {
            adjacent[i] |= 1 << j;
            adjacent[j] |= 1 << i;
        }
    }

    let mut seen = 1u32;
    loop {
        let grown = (0..n)
            .filter(|&i| seen & (1 << i) != 0)
            .fold(seen, |acc, i| acc | adjacent[i]);
        if grown == seen {
            return seen.count_ones() as usize == n;
        }
        seen = grown;
    }
}

/// All orderings of `0..n`.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::with_capacity(n)];
    for k in 0..n {
        out = out
            .into_iter()
            .flat_map(|perm: Vec<usize>| {
                (0..=perm.len()).map(move |at| {
                    let mut next = perm.clone();
                    next.insert(at, k);
                    next
                })
            })
            .collect();
    }
    out
}

/// Disjoint sets over node indices, with path halving.
struct Components {
    parent: Vec<usize>,
    count: usize,
}

impl Components {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            count: n,
        }
    }

    fn root(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Join the sets of `a` and `b`. False if they were already one set.
    fn join(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra == rb {
            return false;
        }
        self.parent[ra.max(rb)] = ra.min(rb);
        self.count -= 1;
        true
    }
}

/// Join the components left by the distance threshold, shortest candidate
/// edge first (Kruskal over the missing edges).
///
/// A plain unit disk graph can come out disconnected. This repair step goes
/// beyond that model so every generated node can hear at least one neighbor.
fn ensure_connectivity(topo: &mut Topology, nodes: &[NodeId], edges: &mut [(usize, usize, f64)]) {
    let mut components = Components::new(nodes.len());
    for &(i, j, _) in edges.iter() {
        if topo.has_link(nodes[i], nodes[j]) {
            components.join(i, j);
        }
    }
    if components.count <= 1 {
        return;
    }

    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    for &(i, j, _) in edges.iter() {
        if components.join(i, j) {
            topo.link(nodes[i], nodes[j]);
            if components.count == 1 {
                break;
            }
        }
    }
}
