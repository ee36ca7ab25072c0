//! Leiden community detection.
//!
//! Traag, Waltman, van Eck (2019). "From Louvain to Leiden: guaranteeing
//! well-connected communities." Scientific Reports 9, 5233.
//!
//! Each pass runs three phases until every community collapses into a single
//! aggregate node:
//!
//! 1. **Local moving**: visit nodes from a queue in random order and move each
//!    to the neighbouring community with the best quality gain (or to an empty
//!    one when every option loses quality).
//! 2. **Refinement**: inside every community, start from singletons and merge
//!    only well-connected nodes into well-connected sub-communities, picking
//!    among non-negative gains with probability `exp(gain / randomness)`.
//! 3. **Aggregation**: contract the refined communities into nodes; the
//!    unrefined partition seeds the next level.
//!
//! ## Objectives
//!
//! ```text
//! RB configuration:  Q = Σ_c [ e_c - γ K_c² / (4m) ]    (K_c = summed strength)
//! CPM:               Q = Σ_c [ e_c - γ n_c² / 2 ]       (n_c = community size)
//! ```
//!
//! Both reduce to `gain(v → C) = w(v, C) - penalty · w_v · W_C`, with
//! `penalty = γ / 2m` for RB configuration and `penalty = γ` for CPM.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::EdgeGraph;
use crate::sweep::Partitioner;

const GAIN_EPSILON: f64 = 1e-10;

/// Quality function optimised by [`Leiden`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// Modularity with a resolution parameter (Reichardt-Bornholdt, configuration null model).
    #[default]
    RbConfiguration,
    /// Constant Potts model.
    Cpm,
}

impl Objective {
    fn penalty(self, resolution: f64, total_weight: f64) -> f64 {
        match self {
            Objective::RbConfiguration if total_weight > 0.0 => resolution / (2.0 * total_weight),
            Objective::RbConfiguration => 0.0,
            Objective::Cpm => resolution,
        }
    }
}

/// Result of a community detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Community id per vertex; ids are consecutive, largest community first.
    membership: Vec<usize>,
    count: usize,
    quality: Option<f64>,
}

impl Partition {
    /// Relabel an arbitrary membership vector.
    pub fn from_membership(membership: Vec<usize>) -> Self {
        let (membership, count) = renumber_by_size(&membership);
        Partition {
            membership,
            count,
            quality: None,
        }
    }

    pub fn community_count(&self) -> usize {
        self.count
    }

    pub fn membership(&self) -> &[usize] {
        &self.membership
    }

    pub fn community_of(&self, vertex: usize) -> Option<usize> {
        self.membership.get(vertex).copied()
    }

    /// Vertices of each community, indexed by community id.
    pub fn communities(&self) -> Vec<Vec<usize>> {
        let mut communities = vec![Vec::new(); self.count];
        for (vertex, &community) in self.membership.iter().enumerate() {
            communities[community].push(vertex);
        }
        communities
    }

    /// Objective value, when produced by [`Leiden`].
    pub fn quality(&self) -> Option<f64> {
        self.quality
    }
}

/// Leiden community detection algorithm.
#[derive(Debug, Clone)]
pub struct Leiden {
    objective: Objective,
    /// Full passes over the graph; each starts from the previous partition.
    iterations: usize,
    /// Temperature of the randomized refinement merge. Zero merges greedily.
    randomness: f64,
    seed: u64,
}

impl Leiden {
    pub fn new() -> Self {
        Self {
            objective: Objective::RbConfiguration,
            iterations: 2,
            randomness: 0.01,
            seed: 42,
        }
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Set the number of passes. Passing stops early once nothing moves.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn with_randomness(mut self, randomness: f64) -> Self {
        self.randomness = randomness;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Partition `graph` at `resolution`.
    ///
    /// With `weights = None` every edge counts as 1. Otherwise `weights` must
    /// hold one finite, non-negative value per edge, in edge-index order.
    pub fn partition(
        &self,
        graph: &EdgeGraph,
        resolution: f64,
        weights: Option<&[f64]>,
    ) -> Result<Partition> {
        if !resolution.is_finite() || resolution < 0.0 {
            return Err(Error::InvalidResolution(resolution));
        }
        if graph.vertex_count() == 0 {
            return Err(Error::EmptyGraph);
        }
        if let Some(weights) = weights {
            if weights.len() != graph.edge_count() {
                return Err(Error::WeightCountMismatch {
                    expected: graph.edge_count(),
                    found: weights.len(),
                });
            }
            if let Some((edge, &weight)) = weights
                .iter()
                .enumerate()
                .find(|(_, w)| !w.is_finite() || **w < 0.0)
            {
                return Err(Error::InvalidWeight { edge, weight });
            }
        }

        let network = Network::from_graph(graph, weights, self.objective);
        let penalty = self.objective.penalty(resolution, network.total_weight);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut membership: Vec<usize> = (0..network.len()).collect();

        for iteration in 0..self.iterations {
            let moved = self.optimise(&network, &mut membership, penalty, &mut rng);
            debug!(resolution, iteration, moved, "leiden pass");
            if moved == 0 {
                break;
            }
        }

        let (membership, count) = renumber_by_size(&membership);
        let quality = network.quality(&membership, count, penalty);
        Ok(Partition {
            membership,
            count,
            quality: Some(quality),
        })
    }

    /// One full pass. Returns the number of node moves across all levels.
    fn optimise(
        &self,
        base: &Network,
        membership: &mut [usize],
        penalty: f64,
        rng: &mut StdRng,
    ) -> usize {
        let mut level: Option<Network> = None;
        let mut level_membership = renumber(membership).0;
        // base node -> node of the current level
        let mut node_of: Vec<usize> = (0..base.len()).collect();
        let mut moves = 0;

        loop {
            let network = level.as_ref().unwrap_or(base);
            moves += move_nodes(network, &mut level_membership, penalty, rng);

            let (communities, community_count) = renumber(&level_membership);
            if community_count == network.len() {
                level_membership = communities;
                break;
            }

            let refined = self.refine(network, &communities, community_count, penalty, rng);
            let (mut refined, mut refined_count) = renumber(&refined);
            if refined_count == network.len() {
                refined = communities.clone();
                refined_count = community_count;
            }

            let mut seeded = vec![0; refined_count];
            for (node, &aggregate) in refined.iter().enumerate() {
                seeded[aggregate] = communities[node];
            }
            for slot in node_of.iter_mut() {
                *slot = refined[*slot];
            }

            debug!(
                nodes = network.len(),
                communities = community_count,
                aggregates = refined_count,
                "leiden level"
            );
            let next = network.aggregate(&refined, refined_count);
            level_membership = seeded;
            level = Some(next);
        }

        for (node, slot) in membership.iter_mut().enumerate() {
            *slot = level_membership[node_of[node]];
        }
        moves
    }

    /// Split each community into well-connected sub-communities.
    fn refine(
        &self,
        network: &Network,
        communities: &[usize],
        community_count: usize,
        penalty: f64,
        rng: &mut StdRng,
    ) -> Vec<usize> {
        let n = network.len();
        let mut refined: Vec<usize> = (0..n).collect();
        let mut refined_weight = network.node_weight.clone();
        let mut refined_size = vec![1usize; n];

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); community_count];
        let mut community_weight = vec![0.0; community_count];
        for node in 0..n {
            members[communities[node]].push(node);
            community_weight[communities[node]] += network.node_weight[node];
        }

        // w(v, C - v) and w(R, C - R)
        let node_external: Vec<f64> = (0..n)
            .map(|node| {
                network.adj[node]
                    .iter()
                    .filter(|(neighbor, _)| communities[*neighbor] == communities[node])
                    .map(|(_, w)| w)
                    .sum::<f64>()
            })
            .collect();
        let mut refined_external = node_external.clone();

        let mut links = vec![0.0; n];
        let mut touched: Vec<usize> = Vec::new();
        let mut is_touched = vec![false; n];
        let mut candidates: Vec<(usize, f64)> = Vec::new();

        for (community, nodes) in members.iter_mut().enumerate() {
            if nodes.len() <= 1 {
                continue;
            }
            let total = community_weight[community];
            nodes.shuffle(rng);

            for &node in nodes.iter() {
                let own = refined[node];
                if refined_size[own] > 1 {
                    continue;
                }
                let weight = network.node_weight[node];
                if node_external[node] < penalty * weight * (total - weight) {
                    continue;
                }

                for &(neighbor, w) in &network.adj[node] {
                    if communities[neighbor] != community {
                        continue;
                    }
                    let target = refined[neighbor];
                    if !is_touched[target] {
                        is_touched[target] = true;
                        touched.push(target);
                    }
                    links[target] += w;
                }

                refined_weight[own] -= weight;
                refined_size[own] -= 1;

                candidates.clear();
                candidates.push((own, 0.0));
                for &target in &touched {
                    let target_weight = refined_weight[target];
                    let connected = refined_external[target]
                        >= penalty * target_weight * (total - target_weight);
                    let gain = links[target] - penalty * weight * target_weight;
                    if connected && gain >= 0.0 {
                        candidates.push((target, gain));
                    }
                }

                let chosen = self.choose(&candidates, rng);
                refined_weight[chosen] += weight;
                refined_size[chosen] += 1;
                if chosen != own {
                    refined[node] = chosen;
                    refined_external[chosen] += node_external[node] - 2.0 * links[chosen];
                }

                for &target in &touched {
                    links[target] = 0.0;
                    is_touched[target] = false;
                }
                touched.clear();
            }
        }

        refined
    }

    fn choose(&self, candidates: &[(usize, f64)], rng: &mut StdRng) -> usize {
        let best = candidates
            .iter()
            .copied()
            .fold((candidates[0].0, f64::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 { candidate } else { best }
            });
        if candidates.len() == 1 || self.randomness <= 0.0 {
            return best.0;
        }

        let odds = candidates
            .iter()
            .map(|(_, gain)| ((gain - best.1) / self.randomness).exp());
        match WeightedIndex::new(odds) {
            Ok(dist) => candidates[dist.sample(rng)].0,
            Err(_) => best.0,
        }
    }
}

impl Default for Leiden {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast local moving. Returns the number of moves made.
fn move_nodes(
    network: &Network,
    membership: &mut [usize],
    penalty: f64,
    rng: &mut StdRng,
) -> usize {
    let n = network.len();
    let mut community_weight = vec![0.0; n];
    let mut community_size = vec![0usize; n];
    for node in 0..n {
        community_weight[membership[node]] += network.node_weight[node];
        community_size[membership[node]] += 1;
    }
    let mut empty: Vec<usize> = (0..n).filter(|&c| community_size[c] == 0).collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let mut queue: VecDeque<usize> = order.into();
    let mut in_queue = vec![true; n];

    let mut links = vec![0.0; n];
    let mut touched: Vec<usize> = Vec::new();
    let mut is_touched = vec![false; n];
    let mut moves = 0;

    while let Some(node) = queue.pop_front() {
        in_queue[node] = false;
        let current = membership[node];
        let weight = network.node_weight[node];

        for &(neighbor, w) in &network.adj[node] {
            let community = membership[neighbor];
            if !is_touched[community] {
                is_touched[community] = true;
                touched.push(community);
            }
            links[community] += w;
        }

        community_weight[current] -= weight;
        community_size[current] -= 1;

        let mut best = current;
        let mut best_gain = links[current] - penalty * weight * community_weight[current];
        for &community in &touched {
            let gain = links[community] - penalty * weight * community_weight[community];
            if gain > best_gain + GAIN_EPSILON {
                best = community;
                best_gain = gain;
            }
        }
        if best_gain < -GAIN_EPSILON {
            if let Some(&vacant) = empty.last() {
                best = vacant;
            }
        }

        if best != current {
            if empty.last() == Some(&best) {
                empty.pop();
            }
            if community_size[current] == 0 {
                empty.push(current);
            }
            membership[node] = best;
            moves += 1;

            for &(neighbor, _) in &network.adj[node] {
                if !in_queue[neighbor] && membership[neighbor] != best {
                    in_queue[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        community_weight[best] += weight;
        community_size[best] += 1;

        for &community in &touched {
            links[community] = 0.0;
            is_touched[community] = false;
        }
        touched.clear();
    }

    moves
}

/// Weighted network with parallel edges summed and self-loops kept apart.
#[derive(Debug, Clone)]
struct Network {
    /// node -> [(neighbor, weight)], sorted by neighbor, no self-loops
    adj: Vec<Vec<(usize, f64)>>,
    self_weight: Vec<f64>,
    /// Strength for RB configuration, size for CPM.
    node_weight: Vec<f64>,
    /// m: every edge counted once.
    total_weight: f64,
}

impl Network {
    fn from_graph(graph: &EdgeGraph, weights: Option<&[f64]>, objective: Objective) -> Self {
        let n = graph.vertex_count();
        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut self_weight = vec![0.0; n];
        let mut total_weight = 0.0;

        for (edge, (u, v)) in graph.endpoints().enumerate() {
            let w = weights.map_or(1.0, |weights| weights[edge]);
            if u == v {
                self_weight[u] += w;
            } else {
                adj[u].push((v, w));
                adj[v].push((u, w));
            }
            total_weight += w;
        }
        for neighbors in adj.iter_mut() {
            merge_parallel(neighbors);
        }

        let node_weight = match objective {
            Objective::RbConfiguration => (0..n)
                .map(|node| {
                    adj[node].iter().map(|(_, w)| w).sum::<f64>() + 2.0 * self_weight[node]
                })
                .collect(),
            Objective::Cpm => vec![1.0; n],
        };

        Network {
            adj,
            self_weight,
            node_weight,
            total_weight,
        }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    /// Contract nodes sharing a group id into a single node.
    fn aggregate(&self, groups: &[usize], count: usize) -> Network {
        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); count];
        let mut self_weight = vec![0.0; count];
        let mut node_weight = vec![0.0; count];

        for node in 0..self.len() {
            let group = groups[node];
            node_weight[group] += self.node_weight[node];
            self_weight[group] += self.self_weight[node];
            for &(neighbor, w) in &self.adj[node] {
                let other = groups[neighbor];
                if other != group {
                    adj[group].push((other, w));
                } else if node < neighbor {
                    self_weight[group] += w;
                }
            }
        }
        for neighbors in adj.iter_mut() {
            merge_parallel(neighbors);
        }

        Network {
            adj,
            self_weight,
            node_weight,
            total_weight: self.total_weight,
        }
    }

    fn quality(&self, membership: &[usize], count: usize, penalty: f64) -> f64 {
        let mut internal = 0.0;
        let mut community_weight = vec![0.0; count];
        for node in 0..self.len() {
            let community = membership[node];
            community_weight[community] += self.node_weight[node];
            internal += self.self_weight[node];
            internal += self.adj[node]
                .iter()
                .filter(|(neighbor, _)| *neighbor > node && membership[*neighbor] == community)
                .map(|(_, w)| w)
                .sum::<f64>();
        }
        let expected: f64 = community_weight.iter().map(|w| w * w).sum();
        internal - penalty * expected / 2.0
    }
}

fn merge_parallel(neighbors: &mut Vec<(usize, f64)>) {
    neighbors.sort_unstable_by_key(|&(neighbor, _)| neighbor);
    let mut merged: Vec<(usize, f64)> = Vec::with_capacity(neighbors.len());
    for &(neighbor, w) in neighbors.iter() {
        match merged.last_mut() {
            Some(last) if last.0 == neighbor => last.1 += w,
            _ => merged.push((neighbor, w)),
        }
    }
    *neighbors = merged;
}

/// Renumber ids to `0..count` in order of first appearance.
fn renumber(membership: &[usize]) -> (Vec<usize>, usize) {
    let upper = membership.iter().max().map_or(0, |&m| m + 1);
    let mut mapping = vec![usize::MAX; upper];
    let mut count = 0;
    let renumbered = membership
        .iter()
        .map(|&id| {
            if mapping[id] == usize::MAX {
                mapping[id] = count;
                count += 1;
            }
            mapping[id]
        })
        .collect();
    (renumbered, count)
}

/// Renumber ids so that community 0 is the largest; ties go to the community
/// holding the lowest vertex.
fn renumber_by_size(membership: &[usize]) -> (Vec<usize>, usize) {
    let (first_seen, count) = renumber(membership);
    let mut sizes = vec![0usize; count];
    for &community in &first_seen {
        sizes[community] += 1;
    }
    let mut order: Vec<usize> = (0..count).collect();
    // first-seen ids already rank by lowest vertex
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));

    let mut mapping = vec![0; count];
    for (rank, &community) in order.iter().enumerate() {
        mapping[community] = rank;
    }
    (first_seen.iter().map(|&c| mapping[c]).collect(), count)
}

/// A graph bound to a [`Leiden`] configuration, ready to be swept.
pub struct Detector<'g> {
    graph: &'g EdgeGraph,
    leiden: Leiden,
    weights: Vec<f64>,
}

impl<'g> Detector<'g> {
    pub fn new(graph: &'g EdgeGraph, leiden: Leiden) -> Self {
        Detector {
            graph,
            leiden,
            weights: graph.weights(),
        }
    }

    pub fn graph(&self) -> &EdgeGraph {
        self.graph
    }
}

impl Partitioner for Detector<'_> {
    fn partition(&self, resolution: f64, use_weights: bool) -> Result<Partition> {
        let weights = use_weights.then_some(self.weights.as_slice());
        self.leiden.partition(self.graph, resolution, weights)
    }
}
