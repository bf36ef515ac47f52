//! # Compressed sparse matrix with row and column views
//!
//! `CsrMatrix` stores an `nrows × ncols` matrix in compressed form. It can
//! carry a row-major view (CSR), a column-major view (CSC), or both at the
//! same time. The column view of a document-term matrix is the inverted index
//! used by the search engines: for each feature, the list of documents that
//! contain it together with their weights (its posting list).
//!
//! Each view is a `CompressedView`:
//! - `ptr`: offsets, length `n_outer + 1`, `ptr[0] = 0`, non-decreasing,
//!   `ptr[n_outer] = nnz`
//! - `ind`: inner indices of every nonzero, each in `[0, n_inner)`
//! - `val`: optional values, same length as `ind`
//!
//! Both views, when present, describe the same logical set of nonzeros.
//! Operations that rewrite one view in a way that changes the logical
//! content (compaction, renumbering) drop the other one; operations that only
//! rescale values (normalisation, IDF scaling) leave the other view stale and
//! the caller must rebuild it with `create_index` before using it.
//!
//! Sortedness of the indices within a segment is tracked by the caller:
//! `is_sorted` checks it, `sort_indices` enforces it.
//!
//! ## Example
//!
//! ```
//! use findsim::csr::{CsrMatrix, Orientation};
//!
//! let mut m = CsrMatrix::from_rows(3, &[
//!     vec![(0, 1.0), (2, 2.0)],
//!     vec![(1, 3.0)],
//! ]).unwrap();
//! m.create_index(Orientation::Col).unwrap();
//! assert_eq!(m.col(2).unwrap().indices, &[0]);
//! ```

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

use crate::error::{FindSimError, Result};
use crate::select::{sort_by_score, Candidate, SortDirection};

/// Above this average fan-out (nnz per target segment) `create_index`
/// scatters indices and values in two separate passes.
const TWO_PASS_FANOUT: usize = 6;

/// Which of the two compressed views an operation works on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Row,
    Col,
}

impl Orientation {
    pub fn other(self) -> Self {
        match self {
            Orientation::Row => Orientation::Col,
            Orientation::Col => Orientation::Row,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Orientation::Row => "row",
            Orientation::Col => "column",
        }
    }
}

/// Vector norm used by `CsrMatrix::normalize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Norm {
    /// Sum of values (values are assumed non-negative).
    L1,
    /// Euclidean norm.
    L2,
}

impl TryFrom<u8> for Norm {
    type Error = FindSimError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Norm::L1),
            2 => Ok(Norm::L2),
            other => Err(FindSimError::Configuration(format!(
                "norm must be 1 or 2, got {other}"
            ))),
        }
    }
}

/// Allocates a vector of `len` copies of `fill`, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, fill: T, what: &'static str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| FindSimError::Allocation { what, len })?;
    v.resize(len, fill);
    Ok(v)
}

/// Empty vector with room for `len` elements.
pub(crate) fn try_with_capacity<T>(len: usize, what: &'static str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| FindSimError::Allocation { what, len })?;
    Ok(v)
}

fn reserve_total<T>(v: &mut Vec<T>, total: usize, what: &'static str) -> Result<()> {
    if total > v.len() {
        v.try_reserve_exact(total - v.len())
            .map_err(|_| FindSimError::Allocation { what, len: total })?;
    }
    Ok(())
}

/// Turns per-bucket counts stored in `a[..n]` into bucket start offsets,
/// with `a[n]` holding the total.
fn counts_to_offsets(a: &mut [usize]) {
    let n = a.len() - 1;
    for i in 1..n {
        a[i] += a[i - 1];
    }
    shift_offsets(a);
}

/// After a scatter pass `a[i]` holds the end of bucket `i`; shift right by
/// one so it holds the start again.
fn shift_offsets(a: &mut [usize]) {
    let n = a.len() - 1;
    for i in (1..=n).rev() {
        a[i] = a[i - 1];
    }
    a[0] = 0;
}

/// One compressed orientation of a sparse matrix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompressedView {
    pub(crate) ptr: Vec<usize>,
    pub(crate) ind: Vec<usize>,
    pub(crate) val: Option<Vec<f32>>,
}

impl CompressedView {
    fn empty(n_outer: usize) -> Self {
        Self { ptr: vec![0; n_outer + 1], ind: Vec::new(), val: Some(Vec::new()) }
    }

    pub fn ptr(&self) -> &[usize] {
        &self.ptr
    }

    pub fn ind(&self) -> &[usize] {
        &self.ind
    }

    pub fn val(&self) -> Option<&[f32]> {
        self.val.as_deref()
    }

    /// Number of segments (rows for a row view, columns for a column view).
    pub fn n_outer(&self) -> usize {
        self.ptr.len().saturating_sub(1)
    }

    pub fn nnz(&self) -> usize {
        self.ptr.last().copied().unwrap_or(0)
    }

    pub fn segment_len(&self, i: usize) -> usize {
        self.ptr[i + 1] - self.ptr[i]
    }

    pub fn max_segment_len(&self) -> usize {
        self.ptr.windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0)
    }

    /// Borrow segment `i`; panics if `i` is out of range.
    pub fn segment(&self, i: usize) -> SparseVecView<'_> {
        let (s, e) = (self.ptr[i], self.ptr[i + 1]);
        SparseVecView {
            indices: &self.ind[s..e],
            values: self.val.as_ref().map(|v| &v[s..e]),
        }
    }

    fn segment_sorted(&self, i: usize) -> bool {
        let (s, e) = (self.ptr[i], self.ptr[i + 1]);
        self.ind[s..e].windows(2).all(|w| w[0] <= w[1])
    }

    /// Checks the structural invariants against the matrix dimensions.
    fn validate(&self, n_outer: usize, n_inner: usize, what: Orientation) -> Result<()> {
        let name = what.name();
        if self.ptr.len() != n_outer + 1 {
            return Err(FindSimError::InconsistentInput(format!(
                "{name} pointer has length {}, expected {}",
                self.ptr.len(),
                n_outer + 1
            )));
        }
        if self.ptr[0] != 0 {
            return Err(FindSimError::InconsistentInput(format!(
                "{name} pointer must start at 0, starts at {}",
                self.ptr[0]
            )));
        }
        if let Some(i) = self.ptr.windows(2).position(|w| w[1] < w[0]) {
            return Err(FindSimError::InconsistentInput(format!(
                "{name} pointer decreases at {name} {i}"
            )));
        }
        if self.nnz() != self.ind.len() {
            return Err(FindSimError::InconsistentInput(format!(
                "{name} pointer ends at {} but there are {} indices",
                self.nnz(),
                self.ind.len()
            )));
        }
        if let Some(val) = &self.val {
            if val.len() != self.ind.len() {
                return Err(FindSimError::InconsistentInput(format!(
                    "{name} view has {} indices but {} values",
                    self.ind.len(),
                    val.len()
                )));
            }
        }
        if let Some(bad) = self.ind.iter().find(|&&c| c >= n_inner) {
            return Err(FindSimError::InconsistentInput(format!(
                "{name} view references index {bad} outside [0, {n_inner})"
            )));
        }
        Ok(())
    }

    /// Builds the opposite orientation of this view with a counting sort.
    ///
    /// `n_target` is the number of segments of the result. Entries keep their
    /// source order inside each target segment.
    fn reversed(&self, n_target: usize, allow_two_pass: bool) -> Result<CompressedView> {
        let n_source = self.n_outer();
        let nnz = self.nnz();

        let mut rptr = try_filled(n_target + 1, 0usize, "index pointer")?;
        for &k in &self.ind {
            if k >= n_target {
                return Err(FindSimError::InconsistentInput(format!(
                    "index {k} outside [0, {n_target}) while building index"
                )));
            }
            rptr[k] += 1;
        }
        counts_to_offsets(&mut rptr);

        let mut rind = try_filled(nnz, 0usize, "index entries")?;
        let mut rval = match self.val {
            Some(_) => Some(try_filled(nnz, 0f32, "index values")?),
            None => None,
        };

        if allow_two_pass && nnz > TWO_PASS_FANOUT * n_target {
            trace!("two-pass scatter: {} nnz over {} segments", nnz, n_target);
            for i in 0..n_source {
                for j in self.ptr[i]..self.ptr[i + 1] {
                    let k = self.ind[j];
                    rind[rptr[k]] = i;
                    rptr[k] += 1;
                }
            }
            shift_offsets(&mut rptr);

            if let (Some(fval), Some(rval)) = (self.val.as_ref(), rval.as_mut()) {
                for i in 0..n_source {
                    for j in self.ptr[i]..self.ptr[i + 1] {
                        let k = self.ind[j];
                        rval[rptr[k]] = fval[j];
                        rptr[k] += 1;
                    }
                }
                shift_offsets(&mut rptr);
            }
        } else {
            match (self.val.as_ref(), rval.as_mut()) {
                (Some(fval), Some(rval)) => {
                    for i in 0..n_source {
                        for j in self.ptr[i]..self.ptr[i + 1] {
                            let k = self.ind[j];
                            rind[rptr[k]] = i;
                            rval[rptr[k]] = fval[j];
                            rptr[k] += 1;
                        }
                    }
                }
                _ => {
                    for i in 0..n_source {
                        for j in self.ptr[i]..self.ptr[i + 1] {
                            let k = self.ind[j];
                            rind[rptr[k]] = i;
                            rptr[k] += 1;
                        }
                    }
                }
            }
            shift_offsets(&mut rptr);
        }

        Ok(CompressedView { ptr: rptr, ind: rind, val: rval })
    }
}

/// Borrowed sparse vector: one row or one column of a `CsrMatrix`.
#[derive(Clone, Copy, Debug)]
pub struct SparseVecView<'a> {
    pub indices: &'a [usize],
    pub values: Option<&'a [f32]>,
}

impl<'a> SparseVecView<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Value at position `pos`; pattern-only vectors read as 1.0.
    #[inline]
    pub fn value(&self, pos: usize) -> f32 {
        self.values.map_or(1.0, |v| v[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + 'a {
        let values = self.values;
        self.indices
            .iter()
            .enumerate()
            .map(move |(p, &i)| (i, values.map_or(1.0, |v| v[p])))
    }
}

/// Sparse matrix with optional row-major and column-major views.
#[derive(Clone, Debug, Default)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    rows: Option<CompressedView>,
    cols: Option<CompressedView>,
    rnorms: Option<Vec<f32>>,
    cnorms: Option<Vec<f32>>,
}

impl CsrMatrix {
    // -------------------- Construction --------------------

    /// An `nrows × ncols` matrix with no nonzeros (row view, with values).
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            rows: Some(CompressedView::empty(nrows)),
            ..Default::default()
        }
    }

    /// A matrix with zero rows and `ncols` columns, ready for `push_row`,
    /// with room reserved for `nnz` nonzeros.
    pub fn with_capacity(ncols: usize, nnz: usize) -> Result<Self> {
        let mut m = Self::new(0, ncols);
        m.grow(nnz)?;
        Ok(m)
    }

    /// Builds a matrix from per-row `(column, value)` lists.
    pub fn from_rows(ncols: usize, rows: &[Vec<(usize, f32)>]) -> Result<Self> {
        let nnz: usize = rows.iter().map(Vec::len).sum();
        let mut ptr = try_with_capacity(rows.len() + 1, "row pointer")?;
        let mut ind = try_with_capacity(nnz, "row indices")?;
        let mut val = try_with_capacity(nnz, "row values")?;
        ptr.push(0);
        for row in rows {
            for &(c, v) in row {
                ind.push(c);
                val.push(v);
            }
            ptr.push(ind.len());
        }
        Self::from_raw_parts(Orientation::Row, rows.len(), ncols, ptr, ind, Some(val))
    }

    /// Wraps existing compressed arrays after checking their invariants.
    pub fn from_raw_parts(
        orientation: Orientation,
        nrows: usize,
        ncols: usize,
        ptr: Vec<usize>,
        ind: Vec<usize>,
        val: Option<Vec<f32>>,
    ) -> Result<Self> {
        let view = CompressedView { ptr, ind, val };
        let mut m = Self { nrows, ncols, ..Default::default() };
        match orientation {
            Orientation::Row => {
                view.validate(nrows, ncols, orientation)?;
                m.rows = Some(view);
            }
            Orientation::Col => {
                view.validate(ncols, nrows, orientation)?;
                m.cols = Some(view);
            }
        }
        Ok(m)
    }

    /// Assembles a row view from `(row, col, value)` triplets. Entries of a
    /// row keep the order in which they appear in `triplets`.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, f32)],
    ) -> Result<Self> {
        let nnz = triplets.len();
        let mut ptr = try_filled(nrows + 1, 0usize, "row pointer")?;
        for &(i, j, _) in triplets {
            if i >= nrows || j >= ncols {
                return Err(FindSimError::InconsistentInput(format!(
                    "triplet ({i}, {j}) outside a {nrows}x{ncols} matrix"
                )));
            }
            ptr[i] += 1;
        }
        counts_to_offsets(&mut ptr);

        let mut ind = try_filled(nnz, 0usize, "row indices")?;
        let mut val = try_filled(nnz, 0f32, "row values")?;
        for &(i, j, v) in triplets {
            ind[ptr[i]] = j;
            val[ptr[i]] = v;
            ptr[i] += 1;
        }
        shift_offsets(&mut ptr);

        Ok(Self {
            nrows,
            ncols,
            rows: Some(CompressedView { ptr, ind, val: Some(val) }),
            ..Default::default()
        })
    }

    /// Converts an `sprs` matrix (either storage) into a row view.
    pub fn from_sprs(mat: &CsMat<f32>) -> Result<Self> {
        let triplets: Vec<(usize, usize, f32)> =
            mat.iter().map(|(&v, (i, j))| (i, j, v)).collect();
        Self::from_triplets(mat.rows(), mat.cols(), &triplets)
    }

    /// Converts the row view to an `sprs` CSR matrix.
    pub fn to_sprs(&self) -> Result<CsMat<f32>> {
        let rows = self.view(Orientation::Row)?;
        let mut triplets = TriMat::new((self.nrows, self.ncols));
        for i in 0..self.nrows {
            for (j, v) in rows.segment(i).iter() {
                triplets.add_triplet(i, j, v);
            }
        }
        let csr: CsMat<f32> = triplets.to_csr();
        Ok(csr)
    }

    /// Appends one row to the row view, keeping the entries' order.
    ///
    /// Any column view becomes stale and is dropped.
    pub fn push_row(&mut self, indices: &[usize], values: &[f32]) -> Result<()> {
        if indices.len() != values.len() {
            return Err(FindSimError::InconsistentInput(format!(
                "row has {} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|&&c| c >= self.ncols) {
            return Err(FindSimError::InconsistentInput(format!(
                "column {bad} outside [0, {})",
                self.ncols
            )));
        }
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| missing_view(Orientation::Row, "push_row"))?;
        let val = rows
            .val
            .as_mut()
            .ok_or_else(|| FindSimError::InvalidState("push_row needs row values".into()))?;

        let total = rows.ind.len() + indices.len();
        reserve_total(&mut rows.ind, total, "row indices")?;
        reserve_total(val, total, "row values")?;
        rows.ind.extend_from_slice(indices);
        val.extend_from_slice(values);
        rows.ptr.push(rows.ind.len());
        self.nrows += 1;

        self.cols = None;
        self.cnorms = None;
        self.rnorms = None;
        Ok(())
    }

    // -------------------- Accessors --------------------

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored nonzeros, read from whichever view exists.
    pub fn nnz(&self) -> usize {
        self.rows
            .as_ref()
            .or(self.cols.as_ref())
            .map_or(0, CompressedView::nnz)
    }

    pub fn has_view(&self, orientation: Orientation) -> bool {
        self.view_opt(orientation).is_some()
    }

    pub fn has_values(&self, orientation: Orientation) -> bool {
        self.view_opt(orientation).is_some_and(|v| v.val.is_some())
    }

    fn view_opt(&self, orientation: Orientation) -> Option<&CompressedView> {
        match orientation {
            Orientation::Row => self.rows.as_ref(),
            Orientation::Col => self.cols.as_ref(),
        }
    }

    pub fn view(&self, orientation: Orientation) -> Result<&CompressedView> {
        self.view_opt(orientation)
            .ok_or_else(|| missing_view(orientation, "view"))
    }

    fn view_mut(&mut self, orientation: Orientation, op: &str) -> Result<&mut CompressedView> {
        match orientation {
            Orientation::Row => self.rows.as_mut(),
            Orientation::Col => self.cols.as_mut(),
        }
        .ok_or_else(|| missing_view(orientation, op))
    }

    /// Number of segments in the given orientation.
    fn n_outer(&self, orientation: Orientation) -> usize {
        match orientation {
            Orientation::Row => self.nrows,
            Orientation::Col => self.ncols,
        }
    }

    pub fn row(&self, i: usize) -> Result<SparseVecView<'_>> {
        self.segment(Orientation::Row, i)
    }

    pub fn col(&self, j: usize) -> Result<SparseVecView<'_>> {
        self.segment(Orientation::Col, j)
    }

    pub fn segment(&self, orientation: Orientation, i: usize) -> Result<SparseVecView<'_>> {
        let view = self.view(orientation)?;
        if i >= view.n_outer() {
            return Err(FindSimError::InconsistentInput(format!(
                "{} {i} outside [0, {})",
                orientation.name(),
                view.n_outer()
            )));
        }
        Ok(view.segment(i))
    }

    /// Cached 2-norms from `compute_norms`, if any.
    pub fn norms(&self, orientation: Orientation) -> Option<&[f32]> {
        match orientation {
            Orientation::Row => self.rnorms.as_deref(),
            Orientation::Col => self.cnorms.as_deref(),
        }
    }

    pub fn drop_row_view(&mut self) {
        self.rows = None;
        self.rnorms = None;
    }

    pub fn drop_column_view(&mut self) {
        self.cols = None;
        self.cnorms = None;
    }

    // -------------------- Index construction --------------------

    /// Derives the `target` view from the opposite one (counting sort).
    ///
    /// Any existing `target` view is replaced. Entries are not sorted within
    /// the new segments beyond the order induced by the scan.
    pub fn create_index(&mut self, target: Orientation) -> Result<()> {
        self.build_index(target, true)
    }

    /// Same result as `create_index`, always scattering indices and values
    /// in a single pass.
    pub fn create_index_compact(&mut self, target: Orientation) -> Result<()> {
        self.build_index(target, false)
    }

    fn build_index(&mut self, target: Orientation, allow_two_pass: bool) -> Result<()> {
        let source = self
            .view_opt(target.other())
            .ok_or_else(|| missing_view(target.other(), "create_index"))?;
        let n_target = self.n_outer(target);
        let built = source.reversed(n_target, allow_two_pass)?;
        trace!(
            "built {} index: {} segments, {} nnz",
            target.name(),
            n_target,
            built.nnz()
        );
        match target {
            Orientation::Row => {
                self.rows = Some(built);
                self.rnorms = None;
            }
            Orientation::Col => {
                self.cols = Some(built);
                self.cnorms = None;
            }
        }
        Ok(())
    }

    // -------------------- Sorting --------------------

    /// Sorts each segment's indices increasingly, carrying values along.
    /// Already sorted segments are left untouched.
    pub fn sort_indices(&mut self, orientation: Orientation) -> Result<()> {
        let CompressedView { ptr, ind, val } = self.view_mut(orientation, "sort_indices")?;
        let n = ptr.len() - 1;
        let mut scratch: Vec<(usize, f32)> = Vec::new();
        let mut resorted = 0usize;

        for i in 0..n {
            let (s, e) = (ptr[i], ptr[i + 1]);
            if ind[s..e].windows(2).all(|w| w[0] <= w[1]) {
                continue;
            }
            resorted += 1;
            match val.as_mut() {
                Some(val) => {
                    scratch.clear();
                    scratch.extend(ind[s..e].iter().copied().zip(val[s..e].iter().copied()));
                    scratch.sort_by_key(|&(c, _)| c);
                    for (off, &(c, v)) in scratch.iter().enumerate() {
                        ind[s + off] = c;
                        val[s + off] = v;
                    }
                }
                None => ind[s..e].sort_unstable(),
            }
        }

        debug!("sorted {} of {} {} segments", resorted, n, orientation.name());
        Ok(())
    }

    /// True when every segment of the view has non-decreasing indices.
    pub fn is_sorted(&self, orientation: Orientation) -> Result<bool> {
        let view = self.view(orientation)?;
        Ok((0..view.n_outer()).all(|i| view.segment_sorted(i)))
    }

    /// Sorts each segment's entries by value. `max_len` sizes the scratch
    /// buffer; pass 0 to compute it from the data.
    pub fn sort_values(
        &mut self,
        orientation: Orientation,
        max_len: usize,
        direction: SortDirection,
    ) -> Result<()> {
        let view = self.view_mut(orientation, "sort_values")?;
        let nn = if max_len > 0 { max_len } else { view.max_segment_len() };
        let CompressedView { ptr, ind, val } = view;
        let val = val.as_mut().ok_or_else(|| {
            FindSimError::InvalidState(format!(
                "sort_values: values not present in {} view",
                orientation.name()
            ))
        })?;

        let mut cand: Vec<Candidate> = try_with_capacity(nn, "sort_values scratch")?;

        for i in 0..ptr.len() - 1 {
            let (s, e) = (ptr[i], ptr[i + 1]);
            if e - s < 2 {
                continue;
            }
            let in_order = val[s..e].windows(2).all(|w| match direction {
                SortDirection::Increasing => w[1] >= w[0],
                SortDirection::Decreasing => w[1] <= w[0],
            });
            if in_order {
                continue;
            }
            cand.clear();
            cand.extend((s..e).map(|j| Candidate::new(ind[j], val[j])));
            sort_by_score(&mut cand, direction);
            for (off, c) in cand.iter().enumerate() {
                ind[s + off] = c.id;
                val[s + off] = c.score;
            }
        }
        Ok(())
    }

    // -------------------- Compaction --------------------

    /// Removes empty columns and renumbers the remaining ones by decreasing
    /// frequency (the most frequent column becomes 0). Equally frequent
    /// columns keep their relative order.
    ///
    /// Works on the row view; the column view is dropped.
    pub fn compact_columns(&mut self) -> Result<()> {
        let ncols = self.ncols;
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| missing_view(Orientation::Row, "compact_columns"))?;

        let mut clens: Vec<(usize, usize)> = try_with_capacity(ncols, "column lengths")?;
        clens.extend((0..ncols).map(|c| (c, 0usize)));
        for &c in &rows.ind {
            match clens.get_mut(c) {
                Some(entry) => entry.1 += 1,
                None => {
                    return Err(FindSimError::InconsistentInput(format!(
                        "column {c} outside [0, {ncols})"
                    )))
                }
            }
        }
        clens.sort_by(|a, b| b.1.cmp(&a.1));

        let mut colmap = try_filled(ncols, usize::MAX, "column map")?;
        let mut nncols = 0usize;
        for &(c, len) in &clens {
            if len == 0 {
                break;
            }
            colmap[c] = nncols;
            nncols += 1;
        }
        for c in rows.ind.iter_mut() {
            *c = colmap[*c];
        }

        debug!("compacted columns: {} -> {}", ncols, nncols);
        self.ncols = nncols;
        self.drop_column_view();
        Ok(())
    }

    /// Removes empty rows, keeping the order of the others.
    ///
    /// Works on the row view; the column view is dropped.
    pub fn compact_rows(&mut self) -> Result<()> {
        let nrows = self.nrows;
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| missing_view(Orientation::Row, "compact_rows"))?;

        let mut kept = 0usize;
        for i in 0..nrows {
            if rows.ptr[i + 1] > rows.ptr[i] {
                rows.ptr[kept + 1] = rows.ptr[i + 1];
                if let Some(norms) = self.rnorms.as_mut() {
                    norms[kept] = norms[i];
                }
                kept += 1;
            }
        }
        rows.ptr.truncate(kept + 1);
        rows.ptr.shrink_to_fit();
        if let Some(norms) = self.rnorms.as_mut() {
            norms.truncate(kept);
        }

        debug!("compacted rows: {} -> {}", nrows, kept);
        self.nrows = kept;
        self.drop_column_view();
        Ok(())
    }

    // -------------------- Scaling --------------------

    /// Rescales each segment to unit 1-norm or 2-norm. All-zero segments are
    /// left unchanged; a view without values is a no-op.
    pub fn normalize(&mut self, orientation: Orientation, norm: Norm) -> Result<()> {
        let view = self.view_mut(orientation, "normalize")?;
        let Some(val) = view.val.as_mut() else {
            debug!("normalize: {} view has no values", orientation.name());
            return Ok(());
        };

        for w in view.ptr.windows(2) {
            let seg = &mut val[w[0]..w[1]];
            let sum: f64 = match norm {
                Norm::L2 => seg.iter().map(|&v| f64::from(v) * f64::from(v)).sum(),
                Norm::L1 => seg.iter().map(|&v| f64::from(v)).sum(),
            };
            if sum > 0.0 {
                let scale = match norm {
                    Norm::L2 => 1.0 / sum.sqrt(),
                    Norm::L1 => 1.0 / sum,
                };
                for v in seg.iter_mut() {
                    *v = (f64::from(*v) * scale) as f32;
                }
            }
        }

        match orientation {
            Orientation::Row => self.rnorms = None,
            Orientation::Col => self.cnorms = None,
        }
        Ok(())
    }

    /// IDF scaling of the row view: every value of column `j` is multiplied
    /// by `ln(nrows / df_j)`, where `df_j` is the number of rows containing
    /// `j`. The column view, if present, is not touched.
    pub fn scale_idf(&mut self) -> Result<()> {
        let (nrows, ncols) = (self.nrows, self.ncols);
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| missing_view(Orientation::Row, "scale_idf"))?;
        let val = rows
            .val
            .as_mut()
            .ok_or_else(|| FindSimError::InvalidState("scale_idf needs row values".into()))?;

        let mut collen = try_filled(ncols, 0usize, "document frequencies")?;
        for &c in &rows.ind {
            match collen.get_mut(c) {
                Some(n) => *n += 1,
                None => {
                    return Err(FindSimError::InconsistentInput(format!(
                        "column {c} outside [0, {ncols})"
                    )))
                }
            }
        }
        let cscale: Vec<f64> = collen
            .iter()
            .map(|&df| if df > 0 { (nrows as f64 / df as f64).ln() } else { 0.0 })
            .collect();

        for (v, &c) in val.iter_mut().zip(rows.ind.iter()) {
            *v = (f64::from(*v) * cscale[c]) as f32;
        }
        self.rnorms = None;
        Ok(())
    }

    /// Computes and caches the 2-norm of every segment.
    pub fn compute_norms(&mut self, orientation: Orientation) -> Result<()> {
        let view = self.view(orientation)?;
        let norms: Vec<f32> = (0..view.n_outer())
            .map(|i| {
                view.segment(i)
                    .iter()
                    .map(|(_, v)| f64::from(v) * f64::from(v))
                    .sum::<f64>()
                    .sqrt() as f32
            })
            .collect();
        match orientation {
            Orientation::Row => self.rnorms = Some(norms),
            Orientation::Col => self.cnorms = Some(norms),
        }
        Ok(())
    }

    // -------------------- Similarity --------------------

    /// Cosine similarity between segments `a` and `b` of one view, computed
    /// in a single merge pass. Both segments must have sorted indices.
    pub fn similarity(&self, orientation: Orientation, a: usize, b: usize) -> Result<f32> {
        let view = self.view(orientation)?;
        let n = view.n_outer();
        if a >= n || b >= n {
            return Err(FindSimError::InconsistentInput(format!(
                "similarity between {} {a} and {b} outside [0, {n})",
                orientation.name()
            )));
        }
        if !view.segment_sorted(a) || !view.segment_sorted(b) {
            return Err(FindSimError::InvalidState(format!(
                "similarity needs sorted {} indices",
                orientation.name()
            )));
        }

        let (x, y) = (view.segment(a), view.segment(b));
        let (mut i1, mut i2) = (0usize, 0usize);
        let (mut dot, mut s1, mut s2) = (0f64, 0f64, 0f64);
        while i1 < x.len() || i2 < y.len() {
            if i2 == y.len() || (i1 < x.len() && x.indices[i1] < y.indices[i2]) {
                let v = f64::from(x.value(i1));
                s1 += v * v;
                i1 += 1;
            } else if i1 == x.len() || x.indices[i1] > y.indices[i2] {
                let v = f64::from(y.value(i2));
                s2 += v * v;
                i2 += 1;
            } else {
                let (v1, v2) = (f64::from(x.value(i1)), f64::from(y.value(i2)));
                dot += v1 * v2;
                s1 += v1 * v1;
                s2 += v2 * v2;
                i1 += 1;
                i2 += 1;
            }
        }

        let denom = s1 * s2;
        Ok(if denom > 0.0 { (dot / denom.sqrt()) as f32 } else { 0.0 })
    }

    // -------------------- Structure --------------------

    /// Logical transpose: builds whichever view is missing, then swaps the
    /// two views, the dimensions and the cached norms. No data is copied.
    pub fn transpose(&mut self) -> Result<()> {
        if self.rows.is_none() && self.cols.is_none() {
            return Err(FindSimError::InvalidState(
                "transpose: matrix has neither a row nor a column view".into(),
            ));
        }
        if self.cols.is_none() {
            self.create_index(Orientation::Col)?;
        }
        if self.rows.is_none() {
            self.create_index(Orientation::Row)?;
        }
        std::mem::swap(&mut self.rows, &mut self.cols);
        std::mem::swap(&mut self.rnorms, &mut self.cnorms);
        std::mem::swap(&mut self.nrows, &mut self.ncols);
        Ok(())
    }

    /// Reserves room for `new_nnz` nonzeros in every index/value buffer that
    /// exists. Contents are preserved; buffers are never shrunk.
    pub fn grow(&mut self, new_nnz: usize) -> Result<()> {
        for view in [self.rows.as_mut(), self.cols.as_mut()].into_iter().flatten() {
            reserve_total(&mut view.ind, new_nnz, "index entries")?;
            if let Some(val) = view.val.as_mut() {
                reserve_total(val, new_nnz, "values")?;
            }
        }
        Ok(())
    }

    /// Structural and value equality on a view both matrices share (row view
    /// preferred). Indices must match exactly; values within `tolerance`.
    pub fn compare(&self, other: &CsrMatrix, tolerance: f32) -> bool {
        if self.nrows != other.nrows || self.ncols != other.ncols {
            return false;
        }
        let (a, b) = match (&self.rows, &other.rows, &self.cols, &other.cols) {
            (Some(a), Some(b), _, _) => (a, b),
            (_, _, Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        if a.nnz() != b.nnz() || a.ptr != b.ptr || a.ind != b.ind {
            return false;
        }
        match (&a.val, &b.val) {
            (Some(x), Some(y)) => x.iter().zip(y).all(|(p, q)| (p - q).abs() <= tolerance),
            (None, None) => true,
            _ => false,
        }
    }
}

fn missing_view(orientation: Orientation, op: &str) -> FindSimError {
    FindSimError::InvalidState(format!(
        "{op}: {} view of the matrix does not exist",
        orientation.name()
    ))
}
