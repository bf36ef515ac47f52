use crate::csr::CsrMatrix;
use crate::error::Result;
use crate::graph::{Algorithm, KnnGraph, SearchParams};
use crate::idxjoin::idxjoin;
use crate::inverted::inverted_index;

use log::{debug, info};

/// Fluent entry point for building a k-NN graph.
///
/// ```
/// use findsim::builder::KnnGraphBuilder;
/// use findsim::csr::CsrMatrix;
/// use findsim::graph::Algorithm;
///
/// let mut docs = CsrMatrix::from_rows(4, &[
///     vec![(0, 1.0), (1, 1.0)],
///     vec![(0, 1.0), (1, 1.0)],
///     vec![(2, 1.0), (3, 1.0)],
/// ]).unwrap();
/// let graph = KnnGraphBuilder::new()
///     .with_k(2)
///     .with_eps(0.1)
///     .with_algorithm(Algorithm::InvertedIndex)
///     .build(&mut docs)
///     .unwrap();
/// assert_eq!(graph.neighbors_of(0).unwrap()[0].0, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KnnGraphBuilder {
    params: SearchParams,
    algorithm: Algorithm,
}

impl KnnGraphBuilder {
    pub fn new() -> Self {
        info!("Initializing new KnnGraphBuilder");
        Self::default()
    }

    /// Maximum number of neighbors kept per row.
    pub fn with_k(mut self, k: usize) -> Self {
        info!("Setting k: {}", k);
        self.params.k = k;
        self
    }

    /// Minimum similarity of a kept neighbor.
    pub fn with_eps(mut self, eps: f32) -> Self {
        info!("Setting eps: {}", eps);
        self.params.eps = eps;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        info!("Setting algorithm: {}", algorithm);
        self.algorithm = algorithm;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.params.verbosity = verbosity;
        self
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        debug!("Using search parameters: {:?}", params);
        self.params = params;
        self
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Runs the selected engine. `docs` is prepared in place (compacted,
    /// scaled and normalised) as part of the search.
    pub fn build(&self, docs: &mut CsrMatrix) -> Result<KnnGraph> {
        info!(
            "Building k-NN graph with {} over {} rows",
            self.algorithm,
            docs.nrows()
        );
        match self.algorithm {
            Algorithm::IdxJoin => idxjoin(docs, &self.params),
            Algorithm::InvertedIndex => inverted_index(docs, &self.params),
        }
    }
}
