//! IdxJoin search engine.
//!
//! Every row is scored independently against the column index: for each of
//! its features, the posting list of that feature is walked and the product
//! of weights is accumulated per co-occurring row. Rows are processed in
//! parallel; each worker owns a `CandidateScratch`.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use rayon::prelude::*;

use crate::csr::{try_filled, CompressedView, CsrMatrix, Orientation};
use crate::error::{FindSimError, Result};
use crate::graph::{KnnGraph, SearchParams};
use crate::preprocess::prepare_documents;
use crate::select::{select_top_k, sort_by_score, Candidate, SortDirection};

const UNSEEN: usize = usize::MAX;

/// Per-worker accumulation buffers.
///
/// `marker[r]` is the slot of row `r` in `cand`, or `UNSEEN`. Only the slots
/// recorded in `cand` are reset after a query.
pub struct CandidateScratch {
    marker: Vec<usize>,
    cand: Vec<Candidate>,
}

impl CandidateScratch {
    pub fn new(nrows: usize) -> Result<Self> {
        Ok(Self {
            marker: try_filled(nrows, UNSEEN, "candidate marker")?,
            cand: Vec::new(),
        })
    }

    /// Accumulates the dot products of row `i` with every row that shares a
    /// feature with it (excluding `i` itself).
    fn accumulate(&mut self, rows: &CompressedView, cols: &CompressedView, i: usize) {
        for (f, w) in rows.segment(i).iter() {
            for (r, pw) in cols.segment(f).iter() {
                if r == i {
                    continue;
                }
                let slot = match self.marker[r] {
                    UNSEEN => {
                        self.marker[r] = self.cand.len();
                        self.cand.push(Candidate::new(r, 0.0));
                        self.cand.len() - 1
                    }
                    slot => slot,
                };
                // sums start at +0.0 so a -0.0 product never survives
                self.cand[slot].score += w * pw;
            }
        }
    }

    fn reset(&mut self) {
        for c in &self.cand {
            self.marker[c.id] = UNSEEN;
        }
        self.cand.clear();
    }
}

/// Neighbors of row `i`: the `k` best candidates with score at least `eps`,
/// in decreasing similarity. Also returns the number of candidates scored.
pub fn find_similar_rows(
    scratch: &mut CandidateScratch,
    rows: &CompressedView,
    cols: &CompressedView,
    i: usize,
    params: &SearchParams,
) -> (Vec<Candidate>, usize) {
    scratch.accumulate(rows, cols, i);
    let ncand = scratch.cand.len();

    let kept = if params.k < ncand {
        select_top_k(&mut scratch.cand, params.k)
    } else {
        ncand
    };
    let mut hits: Vec<Candidate> = scratch.cand[..kept]
        .iter()
        .filter(|c| c.score >= params.eps)
        .copied()
        .collect();
    sort_by_score(&mut hits, SortDirection::Decreasing);

    scratch.reset();
    (hits, ncand)
}

/// Builds the exact cosine k-NN graph of the rows of `docs`.
///
/// `docs` is prepared in place (see `prepare_documents`): columns are
/// compacted and renumbered, values IDF-scaled and normalised. Neighbor ids
/// are row ids of `docs`.
pub fn idxjoin(docs: &mut CsrMatrix, params: &SearchParams) -> Result<KnnGraph> {
    params.validate()?;
    info!("IdxJoin search: k={}, eps={}", params.k, params.eps);

    prepare_documents(docs)?;
    let nrows = docs.nrows();
    let rows = docs.view(Orientation::Row)?;
    let cols = docs.view(Orientation::Col)?;

    let done = AtomicUsize::new(0);
    let step = params.progress_step(nrows);

    let results: Vec<(Vec<Candidate>, usize)> = (0..nrows)
        .into_par_iter()
        .map_init(
            || CandidateScratch::new(nrows).ok(),
            |scratch, i| -> Result<(Vec<Candidate>, usize)> {
                let scratch = scratch.as_mut().ok_or(FindSimError::Allocation {
                    what: "candidate marker",
                    len: nrows,
                })?;
                let out = find_similar_rows(scratch, rows, cols, i, params);
                if let Some(step) = step {
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % step == 0 {
                        info!("IdxJoin progress: {}/{} rows", n, nrows);
                    }
                }
                Ok(out)
            },
        )
        .collect::<Result<Vec<_>>>()?;

    let ncands: usize = results.iter().map(|(_, n)| n).sum();
    let lists: Vec<Vec<Candidate>> = results.into_iter().map(|(hits, _)| hits).collect();
    debug!("IdxJoin scored {} candidate pairs", ncands);

    let graph = KnnGraph::from_neighbor_lists(nrows, &lists, ncands)?;
    info!(
        "IdxJoin done: {} rows, {} candidates, {} neighbors",
        nrows, graph.ncands, graph.nsims
    );
    Ok(graph)
}
