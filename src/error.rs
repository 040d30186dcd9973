//! Error taxonomy and pruning-mode selection.

use std::str::FromStr;

use thiserror::Error;

/// Post-processing applied to the growth trace before assembling the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Pruning {
    /// Return every edge that went tight, unpruned. For benchmarking.
    None,
    /// Iteratively trim leaves whose prize is below their edge cost.
    Simple,
    /// Goemans-Williamson reverse-order pruning of absorbed components.
    Gw,
    /// Gw followed by per-subtree payoff decisions from the best root.
    Strong,
}

impl FromStr for Pruning {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, SolveError> {
        match s {
            "none" => Ok(Pruning::None),
            "simple" => Ok(Pruning::Simple),
            "gw" => Ok(Pruning::Gw),
            "strong" => Ok(Pruning::Strong),
            _ => Err(SolveError::UnknownPruning { name: s.to_string() }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("edge cost {value} at index {index} is negative")]
    NegativeCost { index: usize, value: f64 },

    #[error("node prize {value} at index {index} is negative")]
    NegativePrize { index: usize, value: f64 },

    #[error("{what} at index {index} is not finite: {value}")]
    NonFinite {
        what: &'static str,
        index: usize,
        value: f64,
    },

    #[error("root node {root} is out of range for {num_nodes} nodes")]
    RootOutOfRange { root: u32, num_nodes: usize },

    #[error("target_num_active_clusters must be 0 for a rooted solve, got {target}")]
    RootConflictsWithClusters { target: u32 },

    #[error("edge {index} endpoint {endpoint} is out of range for {num_nodes} nodes")]
    EdgeEndpointOutOfRange {
        index: usize,
        endpoint: u32,
        num_nodes: usize,
    },

    #[error("gw pruning is not supported for rooted instances; use simple or strong")]
    RootedGwUnsupported,

    #[error("unknown pruning mode `{name}`; expected none, simple, gw or strong")]
    UnknownPruning { name: String },

    #[error(
        "internal solver failure: {detail} \
         (n={num_nodes} m={num_edges} root={root:?} target={target} pruning={pruning:?})"
    )]
    AlgorithmFailure {
        detail: String,
        num_nodes: usize,
        num_edges: usize,
        root: Option<u32>,
        target: u32,
        pruning: Pruning,
    },
}
