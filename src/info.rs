//! Summary statistics of a sparse matrix.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::csr::{CsrMatrix, Orientation};
use crate::error::Result;

/// Min, max, mean and standard deviation of segment lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub stdev: f64,
}

impl LengthStats {
    fn of(lengths: impl Iterator<Item = usize>) -> Self {
        let (mut n, mut x1, mut x2) = (0usize, 0f64, 0f64);
        let (mut min, mut max) = (usize::MAX, 0usize);
        for l in lengths {
            n += 1;
            x1 += l as f64;
            x2 += (l * l) as f64;
            min = min.min(l);
            max = max.max(l);
        }
        if n == 0 {
            return Self { min: 0, max: 0, mean: 0.0, stdev: 0.0 };
        }
        let nf = n as f64;
        let mean = x1 / nf;
        let var = (x2 / nf - mean * mean).max(0.0);
        Self { min, max, mean, stdev: var.sqrt() }
    }
}

impl fmt::Display for LengthStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {}, max {} mean {:.2}, stdev {:.2}",
            self.min, self.max, self.mean, self.stdev
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixInfo {
    pub nrows: usize,
    pub ncols: usize,
    pub nnz: usize,
    pub density: f64,
    pub nonempty_cols: usize,
    pub row_stats: Option<LengthStats>,
    pub col_stats: Option<LengthStats>,
}

impl MatrixInfo {
    /// Describes `m`; column statistics are computed on the non-empty
    /// columns only. `m` is not modified.
    pub fn of(m: &CsrMatrix, with_stats: bool) -> Result<Self> {
        let (nrows, ncols, nnz) = (m.nrows(), m.ncols(), m.nnz());
        let density = if nrows == 0 || ncols == 0 {
            0.0
        } else {
            nnz as f64 / (nrows as f64 * ncols as f64)
        };

        let mut compact = m.clone();
        if !compact.has_view(Orientation::Row) {
            compact.create_index(Orientation::Row)?;
        }
        compact.compact_columns()?;

        let (row_stats, col_stats) = if with_stats {
            compact.create_index(Orientation::Col)?;
            let rows = compact.view(Orientation::Row)?;
            let cols = compact.view(Orientation::Col)?;
            (
                Some(LengthStats::of((0..rows.n_outer()).map(|i| rows.segment_len(i)))),
                Some(LengthStats::of((0..cols.n_outer()).map(|j| cols.segment_len(j)))),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            nrows,
            ncols,
            nnz,
            density,
            nonempty_cols: compact.ncols(),
            row_stats,
            col_stats,
        })
    }
}

impl fmt::Display for MatrixInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows, {} cols, {} nnzs, {} density, {} non-empty cols.",
            self.nrows, self.ncols, self.nnz, self.density, self.nonempty_cols
        )?;
        if let Some(s) = &self.row_stats {
            write!(f, "\nRow nnz stats: {s}.")?;
        }
        if let Some(s) = &self.col_stats {
            write!(f, "\nCol nnz stats: {s}.")?;
        }
        Ok(())
    }
}
