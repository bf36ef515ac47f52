//! Matrix comparison and k-NN graph recall.
//!
//! Both checks return structured events instead of printing; `Display` on the
//! events gives the 1-based textual form used by the command line tool.

use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::csr::{try_filled, CompressedView, CsrMatrix, Orientation};
use crate::error::{FindSimError, Result};

// -------------------- Matrix comparison --------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    /// Same position in both, values differ by more than the tolerance.
    ValueMismatch,
    /// Present in `a` only.
    OnlyInA,
    /// Present in `b` only.
    OnlyInB,
}

/// One difference between two matrices.
///
/// `col` is a column index when indices are compared, otherwise the position
/// of the entry inside its row. Both are 0-based here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffEvent {
    pub row: usize,
    pub col: usize,
    pub kind: DiffKind,
    pub a: Option<f32>,
    pub b: Option<f32>,
}

impl fmt::Display for DiffEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (i, j) = (self.row + 1, self.col + 1);
        match (self.kind, self.a, self.b) {
            (DiffKind::ValueMismatch, Some(a), Some(b)) => {
                write!(f, "a[{i},{j},{a:.6}] != b[{i},{j},{b:.6}]")
            }
            (DiffKind::OnlyInA, Some(a), _) => write!(f, "!b[{i},{j},({a:.6})]"),
            (DiffKind::OnlyInB, _, Some(b)) => write!(f, "!a[{i},{j},({b:.6})]"),
            _ => write!(f, "[{i},{j}]"),
        }
    }
}

/// Result of `compare_matrices`.
#[derive(Debug, Clone, Default)]
pub struct MatrixDiff {
    /// Dimensions or nnz differ.
    pub stats_differ: bool,
    pub a_shape: (usize, usize, usize),
    pub b_shape: (usize, usize, usize),
    pub events: Vec<DiffEvent>,
}

impl MatrixDiff {
    pub fn ndiff(&self) -> usize {
        self.events.len()
    }

    pub fn is_identical(&self) -> bool {
        !self.stats_differ && self.events.is_empty()
    }
}

impl fmt::Display for MatrixDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stats_differ {
            let (a, b) = (self.a_shape, self.b_shape);
            writeln!(
                f,
                "Matrix stats differ: A[{},{},{}] != B[{},{},{}].",
                a.0, a.1, a.2, b.0, b.1, b.2
            )?;
        }
        let mut last_row = None;
        for e in &self.events {
            if last_row.is_some_and(|r| r != e.row) {
                writeln!(f)?;
            } else if last_row.is_some() {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
            last_row = Some(e.row);
        }
        if last_row.is_some() {
            writeln!(f)?;
        }
        write!(
            f,
            "Overall, {} differences were encountered between A and B.",
            self.ndiff()
        )
    }
}

/// Row view of a clone of `m`, building it from the column view if needed and
/// sorting indices when requested.
fn comparable_rows(m: &CsrMatrix, sort: bool) -> Result<CsrMatrix> {
    let mut c = m.clone();
    if !c.has_view(Orientation::Row) {
        c.create_index(Orientation::Row)?;
    }
    if sort {
        c.sort_indices(Orientation::Row)?;
    }
    Ok(c)
}

fn only_in(kind: DiffKind, row: usize, col: usize, v: f32) -> DiffEvent {
    match kind {
        DiffKind::OnlyInA => DiffEvent { row, col, kind, a: Some(v), b: None },
        _ => DiffEvent { row, col, kind: DiffKind::OnlyInB, a: None, b: Some(v) },
    }
}

/// Row-aligned diff of `a` and `b`.
///
/// With `compare_indices` both index lists are co-walked after sorting copies
/// of the inputs; otherwise rows are compared position by position on values
/// only. Rows present in only one matrix report all their entries.
pub fn compare_matrices(
    a: &CsrMatrix,
    b: &CsrMatrix,
    tolerance: f32,
    compare_indices: bool,
) -> Result<MatrixDiff> {
    if !(a.has_view(Orientation::Row) || a.has_view(Orientation::Col))
        || !(b.has_view(Orientation::Row) || b.has_view(Orientation::Col))
    {
        return Err(FindSimError::InvalidState(
            "compare_matrices: a matrix has neither a row nor a column view".into(),
        ));
    }
    let ca = comparable_rows(a, compare_indices)?;
    let cb = comparable_rows(b, compare_indices)?;
    let (va, vb) = (ca.view(Orientation::Row)?, cb.view(Orientation::Row)?);
    let compare_values = va.val().is_some() && vb.val().is_some();

    let mut diff = MatrixDiff {
        a_shape: (ca.nrows(), ca.ncols(), ca.nnz()),
        b_shape: (cb.nrows(), cb.ncols(), cb.nnz()),
        ..Default::default()
    };
    diff.stats_differ = diff.a_shape != diff.b_shape;
    if diff.stats_differ {
        warn!("matrix stats differ: A{:?} != B{:?}", diff.a_shape, diff.b_shape);
    }

    let shared = ca.nrows().min(cb.nrows());
    for i in 0..shared {
        if compare_indices {
            diff_by_index(&mut diff.events, va, vb, i, tolerance, compare_values);
        } else {
            diff_by_position(&mut diff.events, va, vb, i, tolerance);
        }
    }
    for (view, nrows, kind) in [
        (va, ca.nrows(), DiffKind::OnlyInA),
        (vb, cb.nrows(), DiffKind::OnlyInB),
    ] {
        for i in shared..nrows {
            for (p, (c, v)) in view.segment(i).iter().enumerate() {
                let col = if compare_indices { c } else { p };
                diff.events.push(only_in(kind, i, col, v));
            }
        }
    }

    debug!("compared matrices: {} differences", diff.ndiff());
    Ok(diff)
}

fn diff_by_index(
    events: &mut Vec<DiffEvent>,
    va: &CompressedView,
    vb: &CompressedView,
    i: usize,
    tolerance: f32,
    compare_values: bool,
) {
    let (x, y) = (va.segment(i), vb.segment(i));
    let (mut j, mut k) = (0usize, 0usize);
    while j < x.len() && k < y.len() {
        let (cx, cy) = (x.indices[j], y.indices[k]);
        if cx == cy {
            let (p, q) = (x.value(j), y.value(k));
            if compare_values && (p - q).abs() > tolerance {
                events.push(DiffEvent {
                    row: i,
                    col: cx,
                    kind: DiffKind::ValueMismatch,
                    a: Some(p),
                    b: Some(q),
                });
            }
            j += 1;
            k += 1;
        } else if cx > cy {
            events.push(only_in(DiffKind::OnlyInB, i, cy, y.value(k)));
            k += 1;
        } else {
            events.push(only_in(DiffKind::OnlyInA, i, cx, x.value(j)));
            j += 1;
        }
    }
    for p in j..x.len() {
        events.push(only_in(DiffKind::OnlyInA, i, x.indices[p], x.value(p)));
    }
    for q in k..y.len() {
        events.push(only_in(DiffKind::OnlyInB, i, y.indices[q], y.value(q)));
    }
}

fn diff_by_position(
    events: &mut Vec<DiffEvent>,
    va: &CompressedView,
    vb: &CompressedView,
    i: usize,
    tolerance: f32,
) {
    let (x, y) = (va.segment(i), vb.segment(i));
    let shared = x.len().min(y.len());
    for p in 0..shared {
        let (a, b) = (x.value(p), y.value(p));
        if (a - b).abs() > tolerance {
            events.push(DiffEvent {
                row: i,
                col: p,
                kind: DiffKind::ValueMismatch,
                a: Some(a),
                b: Some(b),
            });
        }
    }
    for p in shared..x.len() {
        events.push(only_in(DiffKind::OnlyInA, i, p, x.value(p)));
    }
    for p in shared..y.len() {
        events.push(only_in(DiffKind::OnlyInB, i, p, y.value(p)));
    }
}

// -------------------- Recall --------------------

/// Recall check configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VerifyParams {
    /// Two similarities at most this far apart are considered equal.
    pub tolerance: f32,
    /// Number of leading truth neighbors checked per row.
    pub check_width: usize,
    /// 0: no events, 1: score mismatches, 2: also misses and boundary ties,
    /// 3: also extra neighbors.
    pub verbosity: u8,
}

impl Default for VerifyParams {
    fn default() -> Self {
        Self { tolerance: 1e-4, check_width: 10, verbosity: 0 }
    }
}

impl VerifyParams {
    pub fn new(check_width: usize) -> Self {
        Self { check_width, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_width < 1 {
            return Err(FindSimError::Configuration(
                "check width must be at least 1".into(),
            ));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(FindSimError::Configuration(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecallEventKind {
    /// Neighbor found with a different similarity.
    ScoreMismatch,
    /// Neighbor not found, but its similarity equals the smallest candidate
    /// similarity of the row.
    TiedAtBoundary,
    Missed,
    /// Candidate neighbor absent from the checked truth neighbors. Reported
    /// only while the row report has fewer than `check_width` entries.
    Extra,
}

/// One recall discrepancy. `candidate` is the similarity reported by the
/// checked graph, `truth` the one from the reference graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecallEvent {
    pub row: usize,
    pub neighbor: usize,
    pub kind: RecallEventKind,
    pub truth: Option<f32>,
    pub candidate: Option<f32>,
}

impl fmt::Display for RecallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (i, n) = (self.row + 1, self.neighbor + 1);
        let t = self.truth.unwrap_or(f32::NAN);
        let c = self.candidate.unwrap_or(f32::NAN);
        match self.kind {
            RecallEventKind::ScoreMismatch => write!(f, "[{i} {n} {t:.6} {c:.6}]"),
            RecallEventKind::TiedAtBoundary => write!(f, "[{i} *{n} {t:.6}]"),
            RecallEventKind::Missed => write!(f, "[{i} -{n} {t:.6}]"),
            RecallEventKind::Extra => write!(f, "[{i} +{n} {c:.6}]"),
        }
    }
}

/// Outcome of `verify_knng`.
#[derive(Debug, Clone, Default)]
pub struct RecallReport {
    /// Mean fraction of truth neighbors found.
    pub recall: f64,
    /// Mean fraction of truth neighbors found with the right similarity, or
    /// tied with the row's smallest candidate similarity.
    pub corrected_recall: f64,
    /// Rows with a non-empty truth row.
    pub rows_checked: usize,
    pub events: Vec<RecallEvent>,
}

impl fmt::Display for RecallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recall: {:.4}", self.corrected_recall)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Slot {
    Unseen,
    Present(f32),
    Matched,
}

/// Recall of the `candidate` k-NN graph against the `truth` graph.
///
/// For every row, the first `check_width` truth neighbors are looked up in
/// the candidate row. The per-row denominator is
/// `min(check_width, truth row length)`; rows with an empty truth row are
/// not counted.
pub fn verify_knng(
    candidate: &CsrMatrix,
    truth: &CsrMatrix,
    params: &VerifyParams,
) -> Result<RecallReport> {
    params.validate()?;
    let nrows = candidate.nrows();
    if nrows != truth.nrows() {
        return Err(FindSimError::InconsistentInput(format!(
            "candidate graph has {} rows but the truth graph has {}",
            nrows,
            truth.nrows()
        )));
    }
    let cand = candidate.view(Orientation::Row)?;
    let tru = truth.view(Orientation::Row)?;
    let width = params.check_width;
    let tol = params.tolerance;
    let verbosity = params.verbosity;

    info!("checking recall of {} rows, width {}", nrows, width);

    let slots_len = candidate.ncols().max(truth.ncols()).max(nrows);
    let mut slots = try_filled(slots_len, Slot::Unseen, "recall scratch")?;
    let mut report = RecallReport::default();
    let (mut recall, mut crecall) = (0f64, 0f64);

    for i in 0..nrows {
        let crow = cand.segment(i);
        let trow = tru.segment(i);

        let mut lv = f32::MAX;
        for (id, v) in crow.iter() {
            slots[id] = Slot::Present(v);
            lv = lv.min(v);
        }

        let (mut found, mut correct) = (0usize, 0usize);
        let row_start = report.events.len();
        for (id, v) in trow.iter().take(width) {
            match slots[id] {
                Slot::Present(c) => {
                    found += 1;
                    if (c - v).abs() <= tol {
                        correct += 1;
                    } else if verbosity > 0 {
                        report.events.push(RecallEvent {
                            row: i,
                            neighbor: id,
                            kind: RecallEventKind::ScoreMismatch,
                            truth: Some(v),
                            candidate: Some(c),
                        });
                    }
                    slots[id] = Slot::Matched;
                }
                Slot::Unseen if !crow.is_empty() && (lv - v).abs() <= tol => {
                    correct += 1;
                    if verbosity > 1 {
                        report.events.push(RecallEvent {
                            row: i,
                            neighbor: id,
                            kind: RecallEventKind::TiedAtBoundary,
                            truth: Some(v),
                            candidate: None,
                        });
                    }
                }
                _ => {
                    if verbosity > 1 {
                        report.events.push(RecallEvent {
                            row: i,
                            neighbor: id,
                            kind: RecallEventKind::Missed,
                            truth: Some(v),
                            candidate: None,
                        });
                    }
                }
            }
        }

        let ln = width.min(trow.len());
        if ln > 0 {
            recall += found as f64 / ln as f64;
            crecall += correct as f64 / ln as f64;
            report.rows_checked += 1;
        }

        // extras fill the row report up to `width` lines, counting the
        // checked truth neighbors that were not reported
        let mut shown = ln - (report.events.len() - row_start);
        for (id, v) in crow.iter() {
            if verbosity > 2 && shown < width && slots[id] != Slot::Matched {
                shown += 1;
                report.events.push(RecallEvent {
                    row: i,
                    neighbor: id,
                    kind: RecallEventKind::Extra,
                    truth: None,
                    candidate: Some(v),
                });
            }
            slots[id] = Slot::Unseen;
        }
    }

    if report.rows_checked == 0 {
        warn!("no row of the truth graph has neighbors; recall is 0");
    } else {
        report.recall = recall / report.rows_checked as f64;
        report.corrected_recall = crecall / report.rows_checked as f64;
    }
    info!(
        "recall {:.4} (corrected {:.4}) over {} rows",
        report.recall, report.corrected_recall, report.rows_checked
    );
    Ok(report)
}
