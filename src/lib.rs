//! # findsim
//!
//! Exact cosine k-nearest-neighbor graph construction over sparse vectors.
//!
//! Documents are the rows of a [`csr::CsrMatrix`]. Both search engines
//! prepare them the same way (column compaction, IDF scaling, L2
//! normalisation, column index) and return a [`graph::KnnGraph`] whose row
//! `i` lists up to `k` neighbors of document `i` with similarity at least
//! `eps`, best first:
//!
//! - [`idxjoin::idxjoin`] scores every row against the column index,
//!   rows in parallel;
//! - [`inverted::inverted_index`] grows the index incrementally and scores
//!   every pair once.
//!
//! [`verify`] compares matrices and measures the recall of a graph against
//! a reference one; [`io`] reads and writes the text formats.

pub mod builder;
pub mod csr;
pub mod error;
pub mod graph;
pub mod idxjoin;
pub mod info;
pub mod inverted;
pub mod io;
pub mod preprocess;
pub mod select;
pub mod verify;

pub use error::{FindSimError, Result};

#[cfg(test)]
mod tests;
