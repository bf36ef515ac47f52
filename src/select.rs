//! Partial selection and ordering kernels for candidate neighbor lists.
//!
//! Both search engines rank candidates the same way: a quickselect pass moves
//! the `k` best candidates to the front of the buffer, then a sort of the
//! (much smaller) selected prefix produces the final decreasing order.
//!
//! Candidates are ranked by score, with ties broken by increasing id. The
//! ranking is therefore a total order and the selected set is unique for any
//! input, which keeps the two engines' outputs identical even when several
//! candidates share the score at the cut-off.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A (row id, accumulated score) pair used while searching.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Candidate {
    pub id: usize,
    pub score: f32,
}

impl Candidate {
    pub fn new(id: usize, score: f32) -> Self {
        Self { id, score }
    }
}

/// Direction used by the value sorts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Increasing,
    Decreasing,
}

/// Ordering where better candidates come first: higher score, then lower id.
#[inline]
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

#[inline]
fn outranks(a: &Candidate, b: &Candidate) -> bool {
    rank(a, b) == Ordering::Less
}

/// Median of `items[a]`, `items[b]`, `items[c]` under the ranking order.
fn median_of_three(items: &[Candidate], a: usize, b: usize, c: usize) -> usize {
    let (x, y, z) = (&items[a], &items[b], &items[c]);
    if outranks(x, y) {
        if outranks(y, z) {
            b
        } else if outranks(x, z) {
            c
        } else {
            a
        }
    } else if outranks(x, z) {
        a
    } else if outranks(y, z) {
        c
    } else {
        b
    }
}

/// Moves the `k` best candidates into `items[..k]` (in no particular order)
/// and returns `min(k, items.len())`.
///
/// When `k >= items.len()` the buffer is left untouched.
pub fn select_top_k(items: &mut [Candidate], k: usize) -> usize {
    let n = items.len();
    if n <= k {
        return n;
    }
    if k == 0 {
        return 0;
    }

    let (mut lo, mut hi) = (0usize, n - 1);
    while lo < hi {
        let mid = lo + ((hi - lo) >> 1);
        let pivot_at = median_of_three(items, lo, mid, hi);
        items.swap(pivot_at, hi);
        let pivot = items[hi];

        let mut store = lo;
        for j in lo..hi {
            if outranks(&items[j], &pivot) {
                items.swap(store, j);
                store += 1;
            }
        }
        items.swap(store, hi);

        match store.cmp(&k) {
            Ordering::Greater => hi = store - 1,
            Ordering::Less => lo = store + 1,
            Ordering::Equal => break,
        }
    }

    k
}

/// Full sort of a candidate buffer by score.
///
/// Equal scores are ordered by increasing id in both directions.
pub fn sort_by_score(items: &mut [Candidate], direction: SortDirection) {
    match direction {
        SortDirection::Decreasing => items.sort_unstable_by(rank),
        SortDirection::Increasing => items.sort_unstable_by(|a, b| {
            a.score.total_cmp(&b.score).then_with(|| a.id.cmp(&b.id))
        }),
    }
}

/// Select, sort and truncate: the `k` best candidates in decreasing order.
pub fn top_k_sorted(items: &mut Vec<Candidate>, k: usize) {
    let kept = select_top_k(items, k);
    items.truncate(kept);
    sort_by_score(items, SortDirection::Decreasing);
}
