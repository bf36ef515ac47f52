//! Incremental inverted-index search engine.
//!
//! Documents are visited in row order. Each one is scored against the
//! postings built so far (so only against earlier documents), its matches
//! are recorded on both sides, and then it is appended to the postings of
//! its own features. Every unordered pair is therefore scored exactly once.

use log::{debug, info};
use rayon::prelude::*;

use crate::csr::{try_filled, CsrMatrix, Orientation};
use crate::error::Result;
use crate::graph::{KnnGraph, SearchParams};
use crate::preprocess::prepare_documents;
use crate::select::{top_k_sorted, Candidate};

/// Dense score buffer with a list of the entries touched by one document.
struct Accumulator {
    score: Vec<f32>,
    seen: Vec<bool>,
    touched: Vec<usize>,
}

impl Accumulator {
    fn new(nrows: usize) -> Result<Self> {
        Ok(Self {
            score: try_filled(nrows, 0f32, "score accumulator")?,
            seen: try_filled(nrows, false, "score accumulator")?,
            touched: Vec::new(),
        })
    }

    #[inline]
    fn add(&mut self, r: usize, x: f32) {
        if !self.seen[r] {
            self.seen[r] = true;
            self.touched.push(r);
        }
        self.score[r] += x;
    }

    fn drain(&mut self) -> impl Iterator<Item = Candidate> + '_ {
        let Self { score, seen, touched } = self;
        touched.drain(..).map(move |r| {
            let s = std::mem::take(&mut score[r]);
            seen[r] = false;
            Candidate::new(r, s)
        })
    }
}

/// Builds the exact cosine k-NN graph of the rows of `docs` with the
/// incremental inverted index. Same preparation and same result as
/// [`crate::idxjoin::idxjoin`].
pub fn inverted_index(docs: &mut CsrMatrix, params: &SearchParams) -> Result<KnnGraph> {
    params.validate()?;
    info!("inverted-index search: k={}, eps={}", params.k, params.eps);

    prepare_documents(docs)?;
    let (nrows, ncols) = (docs.nrows(), docs.ncols());
    let rows = docs.view(Orientation::Row)?;

    // Step 1: empty postings, empty per-document match lists
    let mut postings: Vec<Vec<(usize, f32)>> = try_filled(ncols, Vec::new(), "postings")?;
    let mut matches: Vec<Vec<Candidate>> = try_filled(nrows, Vec::new(), "match lists")?;
    let mut acc = Accumulator::new(nrows)?;
    let mut ncands = 0usize;
    let step = params.progress_step(nrows);

    // Step 2: score each document against the earlier ones, then index it
    for d in 0..nrows {
        let doc = rows.segment(d);
        for (f, w) in doc.iter() {
            for &(r, pw) in &postings[f] {
                acc.add(r, w * pw);
            }
        }

        for c in acc.drain() {
            if c.score >= params.eps {
                matches[d].push(c);
                matches[c.id].push(Candidate::new(d, c.score));
                ncands += 1;
            }
        }

        for (f, w) in doc.iter() {
            postings[f].push((d, w));
        }

        if step.is_some_and(|step| (d + 1) % step == 0) {
            info!("inverted-index progress: {}/{} rows", d + 1, nrows);
        }
    }
    debug!(
        "inverted-index recorded {} pairs over {} postings entries",
        ncands,
        postings.iter().map(Vec::len).sum::<usize>()
    );
    drop(postings);

    // Step 3: per-document top-k
    let k = params.k;
    let lists: Vec<Vec<Candidate>> = matches
        .into_par_iter()
        .map(|mut m| {
            top_k_sorted(&mut m, k);
            m
        })
        .collect();

    let graph = KnnGraph::from_neighbor_lists(nrows, &lists, ncands)?;
    info!(
        "inverted-index done: {} rows, {} candidates, {} neighbors",
        nrows, graph.ncands, graph.nsims
    );
    Ok(graph)
}
