use std::fmt;

use serde::{Deserialize, Serialize};

use crate::csr::{CsrMatrix, Orientation};
use crate::error::{FindSimError, Result};
use crate::select::Candidate;

use log::{debug, trace};

/// Search configuration shared by both engines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchParams {
    /// Maximum number of neighbors per row.
    pub k: usize,
    /// Minimum cosine similarity of a reported neighbor.
    pub eps: f32,
    /// 0 is quiet; from 1 up the engines log their progress every 10% of rows.
    pub verbosity: u8,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self { k: 10, eps: 0.5, verbosity: 0 }
    }
}

// Custom PartialEq implementation using approximate equality for floats
impl PartialEq for SearchParams {
    fn eq(&self, other: &Self) -> bool {
        self.k == other.k
            && approx::relative_eq!(self.eps, other.eps)
            && self.verbosity == other.verbosity
    }
}

impl SearchParams {
    pub fn new(k: usize, eps: f32) -> Self {
        Self { k, eps, ..Default::default() }
    }

    /// Rejects `k < 1` and `eps` outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.k < 1 {
            return Err(FindSimError::Configuration(format!(
                "k must be at least 1, got {}",
                self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.eps) {
            return Err(FindSimError::Configuration(format!(
                "eps must lie in [0, 1], got {}",
                self.eps
            )));
        }
        trace!("search parameters ok: {:?}", self);
        Ok(())
    }

    /// Rows between two progress messages, or `None` when progress is not
    /// reported.
    pub fn progress_step(&self, nrows: usize) -> Option<usize> {
        (self.verbosity > 0).then(|| (nrows / 10).max(1))
    }
}

/// Which search engine builds the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Per-row accumulation over the column index.
    #[default]
    IdxJoin,
    /// Incremental inverted index, each pair scored once.
    InvertedIndex,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::IdxJoin => write!(f, "idxjoin"),
            Algorithm::InvertedIndex => write!(f, "inverted-index"),
        }
    }
}

/// k-nearest-neighbor graph produced by a search engine.
///
/// Row `i` of `neighbors` lists the neighbors of document `i` (column index =
/// neighbor row id, value = cosine similarity) in decreasing similarity.
#[derive(Debug, Clone)]
pub struct KnnGraph {
    pub neighbors: CsrMatrix,
    /// Candidate similarities computed while searching.
    pub ncands: usize,
    /// Neighbors emitted.
    pub nsims: usize,
}

impl KnnGraph {
    /// Assembles the output matrix from per-row neighbor lists.
    pub(crate) fn from_neighbor_lists(
        nrows: usize,
        lists: &[Vec<Candidate>],
        ncands: usize,
    ) -> Result<Self> {
        let nsims: usize = lists.iter().map(Vec::len).sum();
        let mut neighbors = CsrMatrix::with_capacity(nrows, nsims)?;
        let mut ids = Vec::new();
        let mut sims = Vec::new();
        for list in lists {
            ids.clear();
            sims.clear();
            ids.extend(list.iter().map(|c| c.id));
            sims.extend(list.iter().map(|c| c.score));
            neighbors.push_row(&ids, &sims)?;
        }
        debug!("assembled neighbor graph: {} rows, {} neighbors", nrows, nsims);
        Ok(Self { neighbors, ncands, nsims })
    }

    pub fn nrows(&self) -> usize {
        self.neighbors.nrows()
    }

    /// Neighbors of row `i` as `(id, similarity)` pairs, best first.
    pub fn neighbors_of(&self, i: usize) -> Result<Vec<(usize, f32)>> {
        Ok(self.neighbors.row(i)?.iter().collect())
    }

    /// True when every neighbor relation appears in both directions with the
    /// same similarity. Only holds when no row was truncated at `k`.
    pub fn is_symmetric(&self, tolerance: f32) -> Result<bool> {
        let mut lookup = self.neighbors.clone();
        lookup.sort_indices(Orientation::Row)?;
        for i in 0..self.nrows() {
            for (j, s) in self.neighbors.row(i)?.iter() {
                let back = lookup.row(j)?;
                match back.indices.binary_search(&i) {
                    Ok(pos) if (back.value(pos) - s).abs() <= tolerance => {}
                    _ => return Ok(false),
                }
            }
        }
        Ok(true)
    }
}
