//! Document preparation shared by both search engines.

use log::{debug, info};

use crate::csr::{CsrMatrix, Norm, Orientation};
use crate::error::Result;

/// Compacts, sorts, IDF-scales and L2-normalises the row view, then builds
/// the column index (the posting lists).
///
/// After this call every non-empty row has unit 2-norm, so a dot product of
/// two rows is their cosine similarity.
pub fn prepare_documents(docs: &mut CsrMatrix) -> Result<()> {
    let (nrows, ncols) = (docs.nrows(), docs.ncols());

    docs.compact_columns()?;
    info!(
        "documents: {} rows, {} columns ({} before compaction), {} nnz",
        docs.nrows(),
        docs.ncols(),
        ncols,
        docs.nnz()
    );

    docs.sort_indices(Orientation::Row)?;
    docs.scale_idf()?;
    docs.normalize(Orientation::Row, Norm::L2)?;
    docs.create_index(Orientation::Col)?;

    debug!("prepared {} documents for search", nrows);
    Ok(())
}
