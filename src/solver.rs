//! Growth driver: validates the instance, grows Goemans-Williamson moats
//! over the global event queue, and hands the trace to the pruning engine.

use fixedbitset::FixedBitSet;
use nohash_hasher::IntMap;

use crate::cluster::{AbsorbedMerge, ClusterStore, EdgePart};
use crate::error::{Pruning, SolveError};
use crate::event_queue::{EventKind, EventQueue};
use crate::logging::Logger;
use crate::pruning::Pruner;
use crate::{log_changes, log_checks, log_debug};

/// Relative slack under which an edge counts as tight.
const EPS: f64 = 1e-10;

/// Absolute tolerance for clock regressions caused by rounding.
const TIME_SLACK: f64 = 1e-9;

/// Counters accumulated over one growth phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrowthStats {
    pub edge_events: u64,
    pub stale_edge_events: u64,
    pub reschedules: u64,
    pub merges_active_active: u64,
    pub merges_active_inactive: u64,
    pub deactivations: u64,
    pub stale_deactivations: u64,
}

/// Final selection, referring to the input node and edge indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveResult {
    pub node_ids: Vec<u32>,
    pub edge_ids: Vec<u32>,
}

/// One-shot solver instance. Construction validates the input and copies
/// it; the caller's buffers are never touched again.
pub struct PcsfSolver<'a> {
    edges: Vec<(u32, u32)>,
    prizes: Vec<f64>,
    costs: Vec<f64>,
    root: Option<u32>,
    target_num_active_clusters: u32,
    pruning: Pruning,
    logger: &'a Logger<'a>,

    store: ClusterStore,
    queue: EventQueue,
    current_time: f64,
    num_active: usize,
    good_edges: Vec<u32>,
    absorbed_merges: Vec<AbsorbedMerge>,
    edge_to_absorbed: IntMap<usize, usize>,
    node_good: FixedBitSet,
    stats: GrowthStats,
    started: bool,
}

/// Validates and solves in one call. See [`PcsfSolver`] for the two-step
/// form.
pub fn solve(
    edges: &[(u32, u32)],
    prizes: &[f64],
    costs: &[f64],
    root: Option<u32>,
    target_num_active_clusters: u32,
    pruning: Pruning,
    logger: &Logger,
) -> Result<SolveResult, SolveError> {
    let mut solver = PcsfSolver::new(
        edges,
        prizes,
        costs,
        root,
        target_num_active_clusters,
        pruning,
        logger,
    )?;
    solver.run()
}

impl<'a> PcsfSolver<'a> {
    pub fn new(
        edges: &[(u32, u32)],
        prizes: &[f64],
        costs: &[f64],
        root: Option<u32>,
        target_num_active_clusters: u32,
        pruning: Pruning,
        logger: &'a Logger<'a>,
    ) -> Result<Self, SolveError> {
        validate(edges, prizes, costs, root, target_num_active_clusters, pruning)?;
        Ok(PcsfSolver {
            edges: edges.to_vec(),
            prizes: prizes.to_vec(),
            costs: costs.to_vec(),
            root,
            target_num_active_clusters,
            pruning,
            logger,
            store: ClusterStore::with_capacity(prizes.len(), edges.len()),
            queue: EventQueue::new(),
            current_time: 0.0,
            num_active: 0,
            good_edges: Vec::new(),
            absorbed_merges: Vec::new(),
            edge_to_absorbed: IntMap::default(),
            node_good: FixedBitSet::with_capacity(prizes.len()),
            stats: GrowthStats::default(),
            started: false,
        })
    }

    pub fn run(&mut self) -> Result<SolveResult, SolveError> {
        if self.started {
            return Err(self.failure("solver instance already consumed by an earlier run"));
        }
        self.started = true;

        self.initialize();
        self.grow()?;
        self.mark_good_nodes();
        log_changes!(
            self.logger,
            "growth done at t={:.6}: {} tight edges, {} active-active and {} absorbing merges, {} deactivations, {} stale events",
            self.current_time,
            self.good_edges.len(),
            self.stats.merges_active_active,
            self.stats.merges_active_inactive,
            self.stats.deactivations,
            self.stats.stale_edge_events + self.stats.stale_deactivations
        );

        let pruner = Pruner {
            edges: &self.edges,
            prizes: &self.prizes,
            costs: &self.costs,
            store: &self.store,
            good_edges: &self.good_edges,
            node_good: &self.node_good,
            absorbed_merges: &self.absorbed_merges,
            edge_to_absorbed: &self.edge_to_absorbed,
            root: self.root,
            logger: self.logger,
            node_deleted: FixedBitSet::with_capacity(self.prizes.len()),
            cluster_necessary: FixedBitSet::with_capacity(self.store.clusters.len()),
        };
        let result = pruner.prune(self.pruning);
        log_changes!(
            self.logger,
            "{:?} pruning kept {} nodes and {} edges",
            self.pruning,
            result.node_ids.len(),
            result.edge_ids.len()
        );
        Ok(result)
    }

    pub fn stats(&self) -> GrowthStats {
        self.stats
    }

    // MARK: Initialization

    fn initialize(&mut self) {
        let n = self.prizes.len();
        for v in 0..n {
            let is_root = self.root == Some(v as u32);
            let id = self.store.add_singleton(self.prizes[v], is_root);
            debug_assert_eq!(id as usize, v);
            if self.store.clusters[v].active {
                self.num_active += 1;
                self.queue
                    .push(self.prizes[v], EventKind::Deactivation { cluster: id });
            }
        }
        for (e, &(u, v)) in self.edges.iter().enumerate() {
            let half = self.costs[e] / 2.0;
            for (side, node) in [(0, u), (1, v)] {
                let part = (2 * e + side) as u32;
                let handle = self.store.insert_part(node, half, part);
                self.store.edge_parts[part as usize] = EdgePart {
                    next_event_val: half,
                    deleted: false,
                    heap_node: handle,
                };
            }
        }
        for v in 0..n {
            if self.store.clusters[v].active {
                self.schedule_edge_event(v as u32);
            }
        }
        log_checks!(
            self.logger,
            "initialized {} clusters ({} active) and {} edge parts",
            n,
            self.num_active,
            2 * self.edges.len()
        );
    }

    // MARK: Growth

    fn grow(&mut self) -> Result<(), SolveError> {
        let target = self.target_num_active_clusters as usize;
        while self.num_active > target {
            let Some(event) = self.queue.pop() else {
                return Err(self.failure("event queue drained while clusters are still growing"));
            };
            if event.time < self.current_time - TIME_SLACK * (1.0 + self.current_time.abs()) {
                return Err(self.failure("event time regressed"));
            }
            match event.kind {
                EventKind::Deactivation { cluster } => self.on_deactivation(cluster, event.time),
                EventKind::EdgeTight { cluster, part } => {
                    self.on_edge_event(cluster, part, event.time)?
                }
            }
        }
        log_checks!(
            self.logger,
            "growth loop done at t={:.6} with {} active clusters",
            self.current_time,
            self.num_active
        );
        Ok(())
    }

    fn on_deactivation(&mut self, cluster: u32, time: f64) {
        let c = cluster as usize;
        if !self.store.clusters[c].is_top() || !self.store.clusters[c].active {
            self.stats.stale_deactivations += 1;
            log_debug!(self.logger, "stale deactivation for cluster {}", cluster);
            return;
        }
        self.current_time = self.current_time.max(time);
        let cl = &mut self.store.clusters[c];
        cl.active = false;
        cl.active_end_time = time;
        cl.moat = time - cl.active_start_time;
        self.num_active -= 1;
        self.stats.deactivations += 1;
        log_checks!(
            self.logger,
            "cluster {} deactivated at t={:.6} with moat {:.6}",
            cluster,
            time,
            self.store.clusters[c].moat
        );
    }

    fn on_edge_event(&mut self, cluster: u32, part: u32, time: f64) -> Result<(), SolveError> {
        {
            let cl = &self.store.clusters[cluster as usize];
            if !cl.is_top() || !cl.active {
                self.stats.stale_edge_events += 1;
                return Ok(());
            }
        }
        let Some((min_time, min_part)) = self.store.clean_min(cluster) else {
            self.stats.stale_edge_events += 1;
            return Ok(());
        };
        if min_part != part || (min_time - time).abs() > TIME_SLACK {
            // The heap top moved under this event. Requeue the current top so
            // the cluster keeps making progress even when the fresher event
            // was never scheduled.
            self.stats.stale_edge_events += 1;
            log_debug!(
                self.logger,
                "stale edge event for part {} of cluster {}",
                part,
                cluster
            );
            self.schedule_edge_event(cluster);
            return Ok(());
        }

        self.current_time = self.current_time.max(time);
        self.stats.edge_events += 1;
        let _ = self.store.pop_part(cluster);

        let e = (part / 2) as usize;
        let other = part ^ 1;
        let this_node = self.endpoint(part);
        let other_node = self.endpoint(other);
        let (sum_this, _, top_this) = self.store.sum_from(this_node, time);
        let (sum_other, fin_other, top_other) = self.store.sum_from(other_node, time);
        debug_assert_eq!(top_this, cluster);

        if top_this == top_other {
            self.store.edge_parts[part as usize].deleted = true;
            self.store.edge_parts[other as usize].deleted = true;
            log_debug!(self.logger, "edge {} became internal, dropped", e);
            self.schedule_edge_event(cluster);
            return Ok(());
        }

        let cost = self.costs[e];
        let remainder = cost - sum_this - sum_other;
        if remainder <= EPS * cost {
            self.good_edges.push(e as u32);
            self.store.edge_parts[part as usize].deleted = true;
            self.store.edge_parts[other as usize].deleted = true;
            self.merge_tight(e as u32, part, top_this, top_other, time)?;
        } else {
            self.reschedule(part, other, top_this, top_other, sum_this, sum_other, fin_other, remainder, time);
        }
        Ok(())
    }

    fn merge_tight(
        &mut self,
        edge: u32,
        fired_part: u32,
        top_this: u32,
        top_other: u32,
        time: f64,
    ) -> Result<(), SolveError> {
        if !self.store.clusters[top_this as usize].active {
            return Err(self.failure("edge event fired from an inactive cluster"));
        }
        let other_active = self.store.clusters[top_other as usize].active;
        if other_active {
            self.stats.merges_active_active += 1;
        } else {
            self.stats.merges_active_inactive += 1;
            self.edge_to_absorbed
                .insert(edge as usize, self.absorbed_merges.len());
            self.absorbed_merges.push(AbsorbedMerge {
                active_cluster: top_this,
                inactive_cluster: top_other,
                active_node: self.endpoint(fired_part),
                inactive_node: self.endpoint(fired_part ^ 1),
            });
        }

        let new_id = self.store.merge(top_this, top_other, edge, time);
        let new_active = self.store.clusters[new_id as usize].active;
        if other_active {
            self.num_active -= 1;
        }
        if !new_active {
            self.num_active -= 1;
        }
        log_checks!(
            self.logger,
            "edge {} tight at t={:.6}: clusters {} + {} -> {} ({})",
            edge,
            time,
            top_this,
            top_other,
            new_id,
            if new_active { "active" } else { "inactive" }
        );

        if new_active {
            let cl = &self.store.clusters[new_id as usize];
            let deactivation = time + cl.prize_sum - cl.subcluster_moat_sum;
            self.queue.push(
                deactivation.max(time),
                EventKind::Deactivation { cluster: new_id },
            );
            self.schedule_edge_event(new_id);
        }
        Ok(())
    }

    /// The edge turned out not to be tight yet: the fired threshold assumed
    /// more help from the other side than it delivered. Both active sides
    /// split the remaining slack; a frozen side contributes nothing, and its
    /// part is set to fire the moment its cluster is absorbed into a growing
    /// one. The two thresholds always pair-sum to the edge cost.
    #[allow(clippy::too_many_arguments)]
    fn reschedule(
        &mut self,
        part: u32,
        other: u32,
        top_this: u32,
        top_other: u32,
        sum_this: f64,
        sum_other: f64,
        fin_other: f64,
        remainder: f64,
        time: f64,
    ) {
        self.stats.reschedules += 1;
        let e = (part / 2) as usize;
        let other_cl_active = self.store.clusters[top_other as usize].active;
        if other_cl_active {
            let fire = time + remainder / 2.0;
            self.store.edge_parts[part as usize].next_event_val = sum_this + remainder / 2.0;
            let handle = self.store.insert_part(top_this, fire, part);
            self.store.edge_parts[part as usize].heap_node = handle;

            let other_start = self.store.clusters[top_other as usize].active_start_time;
            let other_from =
                other_start + self.store.edge_parts[other as usize].next_event_val - fin_other;
            let other_handle = self.store.edge_parts[other as usize].heap_node;
            self.store
                .decrease_part(top_other, other_handle, other_from, fire);
            self.store.edge_parts[other as usize].next_event_val = sum_other + remainder / 2.0;

            log_debug!(
                self.logger,
                "edge {} not tight (remainder {:.6}); both sides race to t={:.6}",
                e,
                remainder,
                fire
            );
            self.schedule_edge_event(top_this);
            self.schedule_edge_event(top_other);
        } else {
            let fire = time + remainder;
            self.store.edge_parts[part as usize].next_event_val = self.costs[e] - fin_other;
            let handle = self.store.insert_part(top_this, fire, part);
            self.store.edge_parts[part as usize].heap_node = handle;

            let other_end = self.store.clusters[top_other as usize].active_end_time;
            let other_from =
                other_end + self.store.edge_parts[other as usize].next_event_val - fin_other;
            let other_handle = self.store.edge_parts[other as usize].heap_node;
            self.store
                .decrease_part(top_other, other_handle, other_from, other_end);
            self.store.edge_parts[other as usize].next_event_val = fin_other;

            log_debug!(
                self.logger,
                "edge {} not tight (remainder {:.6}); growing side carries it to t={:.6}",
                e,
                remainder,
                fire
            );
            self.schedule_edge_event(top_this);
        }
    }

    fn schedule_edge_event(&mut self, cluster: u32) {
        if let Some((time, part)) = self.store.clean_min(cluster) {
            self.queue.push(time, EventKind::EdgeTight { cluster, part });
        }
    }

    fn endpoint(&self, part: u32) -> u32 {
        let (u, v) = self.edges[(part / 2) as usize];
        if part % 2 == 0 {
            u
        } else {
            v
        }
    }

    // MARK: Result marking

    /// Flags the nodes of every surviving cluster. A surviving cluster is an
    /// active one (unrooted) or the one holding the root; its merge subtree
    /// is enumerated by draining the subcluster heap.
    fn mark_good_nodes(&mut self) {
        let n = self.prizes.len();
        for c in 0..self.store.clusters.len() {
            {
                let cl = &self.store.clusters[c];
                if !cl.is_top() {
                    continue;
                }
                let keep = if self.root.is_some() {
                    cl.contains_root
                } else {
                    cl.active
                };
                if !keep {
                    continue;
                }
            }
            if c < n {
                self.node_good.insert(c);
            }
            let mut subs = std::mem::take(&mut self.store.clusters[c].subclusters);
            while let Some((_, sub)) = self.store.subheap.extract_min(&mut subs) {
                if (sub as usize) < n {
                    self.node_good.insert(sub as usize);
                }
            }
        }
        log_checks!(
            self.logger,
            "{} nodes retained by surviving clusters",
            self.node_good.count_ones(..)
        );
    }

    fn failure(&self, detail: &str) -> SolveError {
        SolveError::AlgorithmFailure {
            detail: detail.to_string(),
            num_nodes: self.prizes.len(),
            num_edges: self.edges.len(),
            root: self.root,
            target: self.target_num_active_clusters,
            pruning: self.pruning,
        }
    }
}

// MARK: Validation

fn validate(
    edges: &[(u32, u32)],
    prizes: &[f64],
    costs: &[f64],
    root: Option<u32>,
    target_num_active_clusters: u32,
    pruning: Pruning,
) -> Result<(), SolveError> {
    let num_nodes = prizes.len();
    for (index, &prize) in prizes.iter().enumerate() {
        if !prize.is_finite() {
            return Err(SolveError::NonFinite {
                what: "prize",
                index,
                value: prize,
            });
        }
        if prize < 0.0 {
            return Err(SolveError::NegativePrize { index, value: prize });
        }
    }
    for (index, &cost) in costs.iter().enumerate() {
        if !cost.is_finite() {
            return Err(SolveError::NonFinite {
                what: "cost",
                index,
                value: cost,
            });
        }
        if cost < 0.0 {
            return Err(SolveError::NegativeCost { index, value: cost });
        }
    }
    if edges.len() != costs.len() {
        return Err(SolveError::AlgorithmFailure {
            detail: format!(
                "edges and costs disagree in length: {} vs {}",
                edges.len(),
                costs.len()
            ),
            num_nodes,
            num_edges: edges.len(),
            root,
            target: target_num_active_clusters,
            pruning,
        });
    }
    for (index, &(u, v)) in edges.iter().enumerate() {
        for endpoint in [u, v] {
            if endpoint as usize >= num_nodes {
                return Err(SolveError::EdgeEndpointOutOfRange {
                    index,
                    endpoint,
                    num_nodes,
                });
            }
        }
    }
    if let Some(r) = root {
        if r as usize >= num_nodes {
            return Err(SolveError::RootOutOfRange {
                root: r,
                num_nodes,
            });
        }
        if target_num_active_clusters != 0 {
            return Err(SolveError::RootConflictsWithClusters {
                target: target_num_active_clusters,
            });
        }
        if pruning == Pruning::Gw {
            return Err(SolveError::RootedGwUnsupported);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_input() {
        let logger = Logger::silent();
        let edges = [(0u32, 1u32)];

        assert!(matches!(
            solve(&edges, &[1.0, -2.0], &[1.0], None, 1, Pruning::Strong, &logger),
            Err(SolveError::NegativePrize { index: 1, .. })
        ));
        assert!(matches!(
            solve(&edges, &[1.0, 1.0], &[-0.5], None, 1, Pruning::Strong, &logger),
            Err(SolveError::NegativeCost { index: 0, .. })
        ));
        assert!(matches!(
            solve(&edges, &[1.0, f64::NAN], &[1.0], None, 1, Pruning::Strong, &logger),
            Err(SolveError::NonFinite { what: "prize", index: 1, .. })
        ));
        assert!(matches!(
            solve(&edges, &[1.0, 1.0], &[f64::INFINITY], None, 1, Pruning::Strong, &logger),
            Err(SolveError::NonFinite { what: "cost", index: 0, .. })
        ));
        assert!(matches!(
            solve(&[(0, 5)], &[1.0, 1.0], &[1.0], None, 1, Pruning::Strong, &logger),
            Err(SolveError::EdgeEndpointOutOfRange { index: 0, endpoint: 5, .. })
        ));
        assert!(matches!(
            solve(&edges, &[1.0, 1.0], &[1.0], Some(9), 0, Pruning::Strong, &logger),
            Err(SolveError::RootOutOfRange { root: 9, .. })
        ));
        assert!(matches!(
            solve(&edges, &[1.0, 1.0], &[1.0], Some(0), 1, Pruning::Strong, &logger),
            Err(SolveError::RootConflictsWithClusters { target: 1 })
        ));
        assert!(matches!(
            solve(&edges, &[1.0, 1.0], &[1.0], Some(0), 0, Pruning::Gw, &logger),
            Err(SolveError::RootedGwUnsupported)
        ));
    }

    #[test]
    fn test_single_prized_node_survives_alone() {
        let logger = Logger::silent();
        let result = solve(&[], &[50.0], &[], None, 1, Pruning::Strong, &logger).unwrap();
        assert_eq!(result.node_ids, vec![0]);
        assert!(result.edge_ids.is_empty());
    }

    #[test]
    fn test_all_zero_prizes_yield_empty_result() {
        let logger = Logger::silent();
        let edges = [(0u32, 1u32), (1, 2)];
        for target in [0u32, 1] {
            let result = solve(
                &edges,
                &[0.0, 0.0, 0.0],
                &[1.0, 1.0],
                None,
                target,
                Pruning::Gw,
                &logger,
            )
            .unwrap();
            assert!(result.node_ids.is_empty());
            assert!(result.edge_ids.is_empty());
        }
    }

    #[test]
    fn test_solver_cannot_be_rerun() {
        let logger = Logger::silent();
        let mut solver =
            PcsfSolver::new(&[], &[1.0], &[], None, 1, Pruning::Strong, &logger).unwrap();
        solver.run().unwrap();
        assert!(matches!(
            solver.run(),
            Err(SolveError::AlgorithmFailure { .. })
        ));
    }

    #[test]
    fn test_stats_count_the_growth_work() {
        let logger = Logger::silent();
        let mut solver = PcsfSolver::new(
            &[(0, 1), (1, 2)],
            &[5.0, 5.0, 5.0],
            &[2.0, 2.0],
            None,
            1,
            Pruning::Strong,
            &logger,
        )
        .unwrap();
        solver.run().unwrap();
        let stats = solver.stats();
        assert_eq!(stats.merges_active_active + stats.merges_active_inactive, 2);
        assert!(stats.edge_events >= 2);
    }
}
