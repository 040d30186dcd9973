//! Pruning passes over the growth trace and final result assembly.
//!
//! Every strategy starts from the edges that went tight during growth, in
//! the order they went tight, and ends in [`Pruner::assemble`], which turns
//! the kept edges plus the surviving prize-bearing singletons into the
//! final selection.

use fixedbitset::FixedBitSet;
use nohash_hasher::IntMap;
use smallvec::SmallVec;

use crate::cluster::{AbsorbedMerge, ClusterStore};
use crate::error::Pruning;
use crate::log_debug;
use crate::logging::Logger;
use crate::solver::SolveResult;

type Adjacency = Vec<SmallVec<[(u32, u32); 4]>>;

pub(crate) struct Pruner<'a> {
    pub edges: &'a [(u32, u32)],
    pub prizes: &'a [f64],
    pub costs: &'a [f64],
    pub store: &'a ClusterStore,
    pub good_edges: &'a [u32],
    pub node_good: &'a FixedBitSet,
    pub absorbed_merges: &'a [AbsorbedMerge],
    pub edge_to_absorbed: &'a IntMap<usize, usize>,
    pub root: Option<u32>,
    pub logger: &'a Logger<'a>,

    pub node_deleted: FixedBitSet,
    pub cluster_necessary: FixedBitSet,
}

impl<'a> Pruner<'a> {
    pub fn prune(mut self, method: Pruning) -> SolveResult {
        match method {
            Pruning::None => {
                let kept = self.good_edges.to_vec();
                self.assemble(kept)
            }
            Pruning::Simple => {
                let kept = self.surviving_edges();
                let kept = self.trim_leaves(kept);
                self.assemble(kept)
            }
            Pruning::Gw => {
                let kept = self.surviving_edges();
                let kept = self.gw_pass(kept);
                self.assemble(kept)
            }
            Pruning::Strong => {
                let kept = self.surviving_edges();
                let kept = if self.root.is_some() {
                    kept
                } else {
                    self.gw_pass(kept)
                };
                let kept = self.strong_pass(kept);
                self.assemble(kept)
            }
        }
    }

    /// Tight edges whose endpoints belong to a surviving cluster. Growth
    /// merges both endpoints of a tight edge into one cluster, so either
    /// both are retained or neither is.
    fn surviving_edges(&self) -> Vec<u32> {
        self.good_edges
            .iter()
            .copied()
            .filter(|&e| {
                let (u, v) = self.edges[e as usize];
                self.node_good.contains(u as usize) && self.node_good.contains(v as usize)
            })
            .collect()
    }

    fn adjacency(&self, kept: &[u32]) -> Adjacency {
        let mut adj: Adjacency = vec![SmallVec::new(); self.prizes.len()];
        for &e in kept {
            let (u, v) = self.edges[e as usize];
            adj[u as usize].push((v, e));
            adj[v as usize].push((u, e));
        }
        adj
    }

    // MARK: Simple pruning

    /// Repeatedly drops a leaf together with its edge while the leaf's prize
    /// is below the edge cost. Dropping a leaf may expose its neighbor as
    /// the next candidate.
    fn trim_leaves(&mut self, kept: Vec<u32>) -> Vec<u32> {
        let adj = self.adjacency(&kept);
        let mut edge_alive = FixedBitSet::with_capacity(self.costs.len());
        for &e in &kept {
            edge_alive.insert(e as usize);
        }
        let mut degree = vec![0u32; self.prizes.len()];
        for &e in &kept {
            let (u, v) = self.edges[e as usize];
            degree[u as usize] += 1;
            degree[v as usize] += 1;
        }

        let mut candidates: Vec<u32> = (0..self.prizes.len() as u32)
            .filter(|&v| degree[v as usize] == 1)
            .collect();
        while let Some(v) = candidates.pop() {
            if degree[v as usize] != 1 || self.root == Some(v) {
                continue;
            }
            let Some(&(neighbor, e)) = adj[v as usize]
                .iter()
                .find(|&&(_, e)| edge_alive.contains(e as usize))
            else {
                continue;
            };
            if self.prizes[v as usize] < self.costs[e as usize] {
                edge_alive.set(e as usize, false);
                self.node_deleted.insert(v as usize);
                degree[v as usize] = 0;
                degree[neighbor as usize] -= 1;
                if degree[neighbor as usize] == 1 {
                    candidates.push(neighbor);
                }
                log_debug!(self.logger, "trimmed leaf {} over edge {}", v, e);
            }
        }

        kept.into_iter()
            .filter(|&e| edge_alive.contains(e as usize))
            .collect()
    }

    // MARK: Gw pruning

    /// Walks the kept edges newest-first. An edge that folded an inactive
    /// cluster into a growing one stays only if some newer kept edge needs a
    /// node inside the folded side; otherwise the folded subtree paid for
    /// itself with its own moats and is dropped wholesale.
    fn gw_pass(&mut self, kept: Vec<u32>) -> Vec<u32> {
        let mut result = Vec::with_capacity(kept.len());
        for &e in kept.iter().rev() {
            let (u, v) = self.edges[e as usize];
            if self.node_deleted.contains(u as usize) || self.node_deleted.contains(v as usize) {
                continue;
            }
            match self.edge_to_absorbed.get(&(e as usize)) {
                Some(&record_index) => {
                    let record = self.absorbed_merges[record_index];
                    if self.cluster_necessary.contains(record.inactive_cluster as usize) {
                        result.push(e);
                        self.mark_necessary(record.active_node);
                        self.mark_necessary(record.inactive_node);
                    } else {
                        self.delete_cluster_nodes(record.inactive_cluster);
                        log_debug!(self.logger, "gw dropped the side absorbed over edge {}", e);
                    }
                }
                None => {
                    result.push(e);
                    self.mark_necessary(u);
                    self.mark_necessary(v);
                }
            }
        }
        result.reverse();
        result
    }

    /// Marks every cluster containing `node`, from its singleton upward.
    fn mark_necessary(&mut self, node: u32) {
        let mut c = node as usize;
        loop {
            if self.cluster_necessary.contains(c) {
                break;
            }
            self.cluster_necessary.insert(c);
            let up = self.store.clusters[c].merged_into;
            if up < 0 {
                break;
            }
            c = up as usize;
        }
    }

    /// Deletes every node in a cluster's merge subtree.
    fn delete_cluster_nodes(&mut self, cluster: u32) {
        let num_nodes = self.prizes.len();
        let mut stack = vec![cluster as usize];
        while let Some(c) = stack.pop() {
            if c < num_nodes {
                self.node_deleted.insert(c);
                continue;
            }
            stack.push(self.store.clusters[c].child_left as usize);
            stack.push(self.store.clusters[c].child_right as usize);
        }
    }

    // MARK: Strong pruning

    /// Per component, roots the tree at its payoff-maximal node (or the
    /// given root) and drops every subtree whose payoff cannot cover its
    /// attaching edge. Dropping a subtree can turn its parent into the next
    /// candidate, which the bottom-up payoff accounting already reflects.
    fn strong_pass(&mut self, kept: Vec<u32>) -> Vec<u32> {
        let n = self.prizes.len();
        let adj = self.adjacency(&kept);
        let mut parent = vec![-1i32; n];
        let mut parent_cost = vec![0.0f64; n];
        let mut payoff = vec![0.0f64; n];
        let mut up = vec![0.0f64; n];
        let mut order: Vec<u32> = Vec::with_capacity(n);
        let mut mark = FixedBitSet::with_capacity(n);

        if let Some(r) = self.root {
            if !adj[r as usize].is_empty() {
                self.collect_tree(r, &adj, &mut parent, &mut parent_cost, &mut order, &mut mark);
                self.compute_payoffs(&order, &parent, &parent_cost, &mut payoff);
                self.drop_unpaid_subtrees(&order, &parent, &parent_cost, &payoff, &adj);
            }
        } else {
            for &e in &kept {
                let (start, _) = self.edges[e as usize];
                if mark.contains(start as usize) {
                    continue;
                }
                self.collect_tree(start, &adj, &mut parent, &mut parent_cost, &mut order, &mut mark);
                self.compute_payoffs(&order, &parent, &parent_cost, &mut payoff);
                let best = self.best_payoff_root(&order, &parent, &parent_cost, &payoff, &mut up);
                if best != start {
                    for &v in &order {
                        mark.set(v as usize, false);
                    }
                    self.collect_tree(best, &adj, &mut parent, &mut parent_cost, &mut order, &mut mark);
                    self.compute_payoffs(&order, &parent, &parent_cost, &mut payoff);
                }
                self.drop_unpaid_subtrees(&order, &parent, &parent_cost, &payoff, &adj);
            }
        }

        kept.into_iter()
            .filter(|&e| {
                let (u, v) = self.edges[e as usize];
                !self.node_deleted.contains(u as usize) && !self.node_deleted.contains(v as usize)
            })
            .collect()
    }

    /// Orients one tree from `root`; `order` comes out parents-first.
    fn collect_tree(
        &self,
        root: u32,
        adj: &Adjacency,
        parent: &mut [i32],
        parent_cost: &mut [f64],
        order: &mut Vec<u32>,
        mark: &mut FixedBitSet,
    ) {
        order.clear();
        parent[root as usize] = -1;
        mark.insert(root as usize);
        let mut stack = vec![root];
        while let Some(v) = stack.pop() {
            order.push(v);
            for &(neighbor, e) in &adj[v as usize] {
                if mark.contains(neighbor as usize) {
                    continue;
                }
                mark.insert(neighbor as usize);
                parent[neighbor as usize] = v as i32;
                parent_cost[neighbor as usize] = self.costs[e as usize];
                stack.push(neighbor);
            }
        }
    }

    /// payoff(v) = prize(v) + sum over children of max(0, payoff - edge).
    fn compute_payoffs(
        &self,
        order: &[u32],
        parent: &[i32],
        parent_cost: &[f64],
        payoff: &mut [f64],
    ) {
        for &v in order {
            payoff[v as usize] = self.prizes[v as usize];
        }
        for &v in order.iter().rev() {
            let p = parent[v as usize];
            if p < 0 {
                continue;
            }
            let contribution = payoff[v as usize] - parent_cost[v as usize];
            if contribution > 0.0 {
                payoff[p as usize] += contribution;
            }
        }
    }

    /// Reroots the payoff computation at every node in one pass and returns
    /// the node whose tree pays the most.
    fn best_payoff_root(
        &self,
        order: &[u32],
        parent: &[i32],
        parent_cost: &[f64],
        payoff: &[f64],
        up: &mut [f64],
    ) -> u32 {
        let root = order[0];
        up[root as usize] = 0.0;
        let mut best = root;
        let mut best_value = payoff[root as usize];
        for &v in &order[1..] {
            let p = parent[v as usize] as usize;
            let w = parent_cost[v as usize];
            let child_contribution = (payoff[v as usize] - w).max(0.0);
            up[v as usize] = (up[p] + payoff[p] - child_contribution - w).max(0.0);
            let total = payoff[v as usize] + up[v as usize];
            if total > best_value {
                best_value = total;
                best = v;
            }
        }
        best
    }

    fn drop_unpaid_subtrees(
        &mut self,
        order: &[u32],
        parent: &[i32],
        parent_cost: &[f64],
        payoff: &[f64],
        adj: &Adjacency,
    ) {
        for &v in order.iter().rev() {
            if parent[v as usize] < 0 || self.node_deleted.contains(v as usize) {
                continue;
            }
            if payoff[v as usize] < parent_cost[v as usize] {
                self.delete_tree_below(v, parent, adj);
                log_debug!(
                    self.logger,
                    "dropped subtree at {} (payoff {:.6} under edge cost {:.6})",
                    v,
                    payoff[v as usize],
                    parent_cost[v as usize]
                );
            }
        }
    }

    fn delete_tree_below(&mut self, top: u32, parent: &[i32], adj: &Adjacency) {
        let mut stack = vec![top];
        self.node_deleted.insert(top as usize);
        while let Some(v) = stack.pop() {
            for &(neighbor, _) in &adj[v as usize] {
                if parent[neighbor as usize] == v as i32
                    && !self.node_deleted.contains(neighbor as usize)
                {
                    self.node_deleted.insert(neighbor as usize);
                    stack.push(neighbor);
                }
            }
        }
    }

    // MARK: Assembly

    /// Endpoints of the kept edges, plus every surviving prize-bearing node
    /// that ended up isolated, plus the root when one was given. Nodes come
    /// out ascending; edges keep the order they went tight.
    fn assemble(&self, kept: Vec<u32>) -> SolveResult {
        let n = self.prizes.len();
        let mut included = FixedBitSet::with_capacity(n);
        for &e in &kept {
            let (u, v) = self.edges[e as usize];
            included.insert(u as usize);
            included.insert(v as usize);
        }
        for v in 0..n {
            if included.contains(v) {
                continue;
            }
            if self.node_good.contains(v) && !self.node_deleted.contains(v) && self.prizes[v] > 0.0
            {
                included.insert(v);
            }
        }
        if let Some(r) = self.root {
            included.insert(r as usize);
        }
        SolveResult {
            node_ids: included.ones().map(|v| v as u32).collect(),
            edge_ids: kept,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Pruning;
    use crate::logging::Logger;
    use crate::solver::solve;

    // Leaf 2 costs more to attach than it pays; simple pruning trims it and
    // only it.
    #[test]
    fn test_simple_trims_unprofitable_leaves() {
        let logger = Logger::silent();
        let edges = [(0u32, 1u32), (1, 2)];
        let prizes = [10.0, 10.0, 1.0];
        let costs = [2.0, 5.0];
        let result = solve(&edges, &prizes, &costs, None, 1, Pruning::Simple, &logger).unwrap();
        assert_eq!(result.edge_ids, vec![0]);
        assert_eq!(result.node_ids, vec![0, 1]);
    }

    // Strong pruning cascades: once the far leaf goes, the middle node is a
    // leaf that cannot pay for itself either.
    #[test]
    fn test_strong_cascades_through_interior_nodes() {
        let logger = Logger::silent();
        let edges = [(0u32, 1u32), (1, 2)];
        let prizes = [10.0, 1.0, 1.5];
        let costs = [2.0, 2.0];
        let result = solve(&edges, &prizes, &costs, None, 1, Pruning::Strong, &logger).unwrap();
        assert_eq!(result.edge_ids, Vec::<u32>::new());
        assert_eq!(result.node_ids, vec![0]);
    }

    // A zero-prize connector is kept when the prizes behind it pay off.
    #[test]
    fn test_strong_keeps_paying_steiner_nodes() {
        let logger = Logger::silent();
        let edges = [(0u32, 1u32), (1, 2)];
        let prizes = [10.0, 0.0, 10.0];
        let costs = [3.0, 3.0];
        let result = solve(&edges, &prizes, &costs, None, 1, Pruning::Strong, &logger).unwrap();
        assert_eq!(result.edge_ids, vec![0, 1]);
        assert_eq!(result.node_ids, vec![0, 1, 2]);
    }
}
