//! Prize-collecting Steiner tree/forest approximation.
//!
//! Grows Goemans-Williamson moats over a global event queue backed by
//! mergeable pairing heaps, then prunes the growth trace (`none`, `simple`,
//! `gw`, `strong`) into the final node and edge selection. Entry points:
//! [`solve`] or the two-step [`PcsfSolver`].

pub mod cluster;
pub mod error;
pub mod event_queue;
pub mod logging;
pub mod pairing_heap;
mod pruning;
pub mod solver;

pub use error::{Pruning, SolveError};
pub use logging::Logger;
pub use solver::{solve, GrowthStats, PcsfSolver, SolveResult};

#[cfg(feature = "python")]
mod python {
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    use crate::error::Pruning;
    use crate::logging::Logger;

    #[pyfunction]
    #[pyo3(signature = (edges, prizes, costs, root=None, num_clusters=1, pruning="gw", verbosity=0))]
    #[allow(clippy::too_many_arguments)]
    fn solve(
        edges: Vec<(u32, u32)>,
        prizes: Vec<f64>,
        costs: Vec<f64>,
        root: Option<u32>,
        num_clusters: u32,
        pruning: &str,
        verbosity: u8,
    ) -> PyResult<(Vec<u32>, Vec<u32>)> {
        let pruning: Pruning = pruning.parse().map_err(to_py_err)?;
        let sink = |message: &str| eprintln!("{message}");
        let logger = Logger::new(verbosity, &sink);
        let result = crate::solve(&edges, &prizes, &costs, root, num_clusters, pruning, &logger)
            .map_err(to_py_err)?;
        Ok((result.node_ids, result.edge_ids))
    }

    fn to_py_err(err: crate::SolveError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }

    #[pymodule]
    fn pcsf_router(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(solve, m)?)?;
        Ok(())
    }
}
