use approx::assert_relative_eq;

use crate::csr::{CsrMatrix, Norm, Orientation};
use crate::error::FindSimError;
use crate::select::SortDirection;
use crate::tests::init;
use crate::tests::test_data::small_corpus;

fn indices(m: &CsrMatrix, o: Orientation, i: usize) -> Vec<usize> {
    m.segment(o, i).unwrap().indices.to_vec()
}

fn values(m: &CsrMatrix, o: Orientation, i: usize) -> Vec<f32> {
    m.segment(o, i).unwrap().iter().map(|(_, v)| v).collect()
}

#[test]
fn test_create_column_index_matches_sprs() {
    init();
    let mut m = small_corpus();
    m.create_index(Orientation::Col).unwrap();

    let csc = m.to_sprs().unwrap().to_csc();
    for j in 0..m.ncols() {
        let col = csc.outer_view(j).unwrap();
        assert_eq!(indices(&m, Orientation::Col, j), col.indices().to_vec());
        assert_eq!(values(&m, Orientation::Col, j), col.data().to_vec());
    }
}

#[test]
fn test_index_round_trip() {
    init();
    let original = small_corpus();
    let mut m = original.clone();
    m.create_index(Orientation::Col).unwrap();
    m.drop_row_view();
    assert!(!m.has_view(Orientation::Row));

    m.create_index(Orientation::Row).unwrap();
    assert_eq!(
        m.view(Orientation::Row).unwrap(),
        original.view(Orientation::Row).unwrap()
    );
}

#[test]
fn test_two_pass_and_single_pass_agree() {
    init();
    // 20 dense rows over 2 columns: fan-out far above the two-pass threshold
    let rows: Vec<Vec<(usize, f32)>> = (0..20)
        .map(|i| vec![(1, i as f32 + 1.0), (0, 0.5 * i as f32)])
        .collect();
    let mut a = CsrMatrix::from_rows(2, &rows).unwrap();
    let mut b = a.clone();
    a.create_index(Orientation::Col).unwrap();
    b.create_index_compact(Orientation::Col).unwrap();

    assert_eq!(a.view(Orientation::Col).unwrap(), b.view(Orientation::Col).unwrap());
    assert_eq!(a.col(1).unwrap().len(), 20);
    assert_eq!(indices(&a, Orientation::Col, 0), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_create_index_without_source_view() {
    let mut m = CsrMatrix::new(2, 2);
    m.drop_row_view();
    let err = m.create_index(Orientation::Col).unwrap_err();
    assert!(matches!(err, FindSimError::InvalidState(_)));
}

#[test]
fn test_sort_indices() {
    init();
    let mut m = CsrMatrix::from_rows(
        4,
        &[vec![(3, 0.3), (0, 1.0), (2, 0.2)], vec![(1, 1.0)]],
    )
    .unwrap();
    assert!(!m.is_sorted(Orientation::Row).unwrap());

    m.sort_indices(Orientation::Row).unwrap();
    assert!(m.is_sorted(Orientation::Row).unwrap());
    assert_eq!(indices(&m, Orientation::Row, 0), vec![0, 2, 3]);
    assert_eq!(values(&m, Orientation::Row, 0), vec![1.0, 0.2, 0.3]);
    assert_eq!(indices(&m, Orientation::Row, 1), vec![1]);
}

#[test]
fn test_sort_indices_missing_view() {
    let mut m = small_corpus();
    let err = m.sort_indices(Orientation::Col).unwrap_err();
    assert!(matches!(err, FindSimError::InvalidState(_)));
    assert!(m.is_sorted(Orientation::Col).is_err());
}

#[test]
fn test_sort_values() {
    let mut m = CsrMatrix::from_rows(3, &[vec![(0, 0.1), (1, 0.9), (2, 0.5)]]).unwrap();

    m.sort_values(Orientation::Row, 0, SortDirection::Decreasing).unwrap();
    assert_eq!(indices(&m, Orientation::Row, 0), vec![1, 2, 0]);
    assert_eq!(values(&m, Orientation::Row, 0), vec![0.9, 0.5, 0.1]);

    m.sort_values(Orientation::Row, 3, SortDirection::Increasing).unwrap();
    assert_eq!(indices(&m, Orientation::Row, 0), vec![0, 2, 1]);
}

#[test]
fn test_sort_values_requires_values() {
    let mut m =
        CsrMatrix::from_raw_parts(Orientation::Row, 1, 3, vec![0, 2], vec![0, 1], None).unwrap();
    let err = m
        .sort_values(Orientation::Row, 0, SortDirection::Decreasing)
        .unwrap_err();
    assert!(matches!(err, FindSimError::InvalidState(_)));
}

#[test]
fn test_compact_columns_orders_by_frequency() {
    init();
    let mut m = CsrMatrix::from_rows(
        6,
        &[
            vec![(1, 1.0), (5, 1.0)],
            vec![(5, 2.0)],
            vec![(3, 1.0), (5, 3.0)],
        ],
    )
    .unwrap();
    m.create_index(Orientation::Col).unwrap();
    m.compact_columns().unwrap();

    assert_eq!(m.ncols(), 3);
    assert!(!m.has_view(Orientation::Col));
    // 5 -> 0 (three rows), then 1 -> 1 and 3 -> 2 in their original order
    assert_eq!(indices(&m, Orientation::Row, 0), vec![1, 0]);
    assert_eq!(indices(&m, Orientation::Row, 1), vec![0]);
    assert_eq!(indices(&m, Orientation::Row, 2), vec![2, 0]);
    assert_eq!(values(&m, Orientation::Row, 2), vec![1.0, 3.0]);
}

#[test]
fn test_compact_rows() {
    let mut m = CsrMatrix::from_rows(
        3,
        &[vec![(0, 1.0)], vec![], vec![(2, 2.0), (1, 1.0)], vec![]],
    )
    .unwrap();
    m.compact_rows().unwrap();

    assert_eq!(m.nrows(), 2);
    assert_eq!(m.view(Orientation::Row).unwrap().ptr(), &[0, 1, 3]);
    assert_eq!(indices(&m, Orientation::Row, 1), vec![2, 1]);
}

#[test]
fn test_normalize() {
    init();
    let mut m = CsrMatrix::from_rows(
        3,
        &[vec![(0, 3.0), (1, 4.0)], vec![(2, 0.0)], vec![(0, 1.0), (2, 3.0)]],
    )
    .unwrap();
    let mut l1 = m.clone();

    m.normalize(Orientation::Row, Norm::L2).unwrap();
    let r0 = values(&m, Orientation::Row, 0);
    assert_relative_eq!(r0[0], 0.6, epsilon = 1e-6);
    assert_relative_eq!(r0[1], 0.8, epsilon = 1e-6);
    assert_eq!(values(&m, Orientation::Row, 1), vec![0.0]);

    l1.normalize(Orientation::Row, Norm::L1).unwrap();
    let r2 = values(&l1, Orientation::Row, 2);
    assert_relative_eq!(r2[0], 0.25, epsilon = 1e-6);
    assert_relative_eq!(r2[1], 0.75, epsilon = 1e-6);
}

#[test]
fn test_normalize_pattern_only_is_noop() {
    let mut m =
        CsrMatrix::from_raw_parts(Orientation::Row, 1, 3, vec![0, 2], vec![0, 1], None).unwrap();
    m.normalize(Orientation::Row, Norm::L2).unwrap();
    assert!(!m.has_values(Orientation::Row));
    assert!(m.normalize(Orientation::Col, Norm::L2).is_err());
}

#[test]
fn test_norm_from_u8() {
    assert_eq!(Norm::try_from(1).unwrap(), Norm::L1);
    assert_eq!(Norm::try_from(2).unwrap(), Norm::L2);
    assert!(matches!(Norm::try_from(3), Err(FindSimError::Configuration(_))));
}

#[test]
fn test_scale_idf() {
    init();
    let mut m = CsrMatrix::from_rows(
        2,
        &[vec![(0, 1.0), (1, 2.0)], vec![(0, 1.0)], vec![(0, 5.0)]],
    )
    .unwrap();
    m.scale_idf().unwrap();

    // column 0 appears everywhere: ln(3/3) = 0
    assert_eq!(values(&m, Orientation::Row, 1), vec![0.0]);
    let r0 = values(&m, Orientation::Row, 0);
    assert_eq!(r0[0], 0.0);
    assert_relative_eq!(r0[1], 2.0 * 3f32.ln(), epsilon = 1e-5);
}

#[test]
fn test_similarity() {
    init();
    let mut m = CsrMatrix::from_rows(
        4,
        &[
            vec![(0, 1.0), (1, 1.0)],
            vec![(1, 1.0), (2, 1.0)],
            vec![(3, 2.0)],
            vec![],
        ],
    )
    .unwrap();

    assert_relative_eq!(m.similarity(Orientation::Row, 0, 1).unwrap(), 0.5, epsilon = 1e-6);
    assert_relative_eq!(m.similarity(Orientation::Row, 1, 0).unwrap(), 0.5, epsilon = 1e-6);
    assert_eq!(m.similarity(Orientation::Row, 0, 2).unwrap(), 0.0);
    assert_relative_eq!(m.similarity(Orientation::Row, 2, 2).unwrap(), 1.0, epsilon = 1e-6);
    assert_eq!(m.similarity(Orientation::Row, 3, 3).unwrap(), 0.0);

    let err = m.similarity(Orientation::Row, 0, 4).unwrap_err();
    assert!(matches!(err, FindSimError::InconsistentInput(_)));

    m.create_index(Orientation::Col).unwrap();
    // columns 1 and 2 share row 1 only
    assert_relative_eq!(
        m.similarity(Orientation::Col, 1, 2).unwrap(),
        1.0 / 2f32.sqrt(),
        epsilon = 1e-6
    );
}

#[test]
fn test_similarity_requires_sorted_rows() {
    let m = CsrMatrix::from_rows(3, &[vec![(2, 1.0), (0, 1.0)], vec![(0, 1.0)]]).unwrap();
    let err = m.similarity(Orientation::Row, 0, 1).unwrap_err();
    assert!(matches!(err, FindSimError::InvalidState(_)));
}

#[test]
fn test_transpose() {
    init();
    let original = small_corpus();
    let mut t = original.clone();
    t.transpose().unwrap();

    assert_eq!(t.nrows(), original.ncols());
    assert_eq!(t.ncols(), original.nrows());
    assert!(t.has_view(Orientation::Row) && t.has_view(Orientation::Col));

    let csc = original.to_sprs().unwrap().to_csc();
    for j in 0..original.ncols() {
        assert_eq!(
            indices(&t, Orientation::Row, j),
            csc.outer_view(j).unwrap().indices().to_vec()
        );
    }

    t.transpose().unwrap();
    assert!(t.compare(&original, 0.0));
}

#[test]
fn test_transpose_caches_norms() {
    let mut m = CsrMatrix::from_rows(2, &[vec![(0, 3.0), (1, 4.0)]]).unwrap();
    m.compute_norms(Orientation::Row).unwrap();
    assert_eq!(m.norms(Orientation::Row), Some(&[5.0][..]));

    m.transpose().unwrap();
    assert_eq!(m.norms(Orientation::Col), Some(&[5.0][..]));
    assert!(m.norms(Orientation::Row).is_none());
}

#[test]
fn test_grow_preserves_content() {
    let original = small_corpus();
    let mut m = original.clone();
    m.create_index(Orientation::Col).unwrap();
    m.grow(10 * original.nnz()).unwrap();
    assert_eq!(m.nnz(), original.nnz());
    assert!(m.compare(&original, 0.0));
}

#[test]
fn test_compare() {
    let a = small_corpus();
    let mut b = a.clone();
    assert!(a.compare(&b, 0.0));

    let (ptr, ind, mut val) = {
        let v = b.view(Orientation::Row).unwrap();
        (v.ptr().to_vec(), v.ind().to_vec(), v.val().unwrap().to_vec())
    };
    val[0] += 0.01;
    b = CsrMatrix::from_raw_parts(Orientation::Row, a.nrows(), a.ncols(), ptr, ind, Some(val))
        .unwrap();
    assert!(!a.compare(&b, 1e-3));
    assert!(a.compare(&b, 0.1));

    let wider = CsrMatrix::new(a.nrows(), a.ncols() + 1);
    assert!(!a.compare(&wider, 1.0));
}

#[test]
fn test_from_raw_parts_validates() {
    let bad_ptr = CsrMatrix::from_raw_parts(Orientation::Row, 2, 3, vec![0, 2, 1], vec![0], None);
    assert!(matches!(bad_ptr, Err(FindSimError::InconsistentInput(_))));

    let bad_col =
        CsrMatrix::from_raw_parts(Orientation::Row, 1, 3, vec![0, 1], vec![3], Some(vec![1.0]));
    assert!(matches!(bad_col, Err(FindSimError::InconsistentInput(_))));

    let bad_len = CsrMatrix::from_raw_parts(Orientation::Row, 1, 3, vec![0, 1], vec![0, 1], None);
    assert!(matches!(bad_len, Err(FindSimError::InconsistentInput(_))));
}

#[test]
fn test_from_triplets_keeps_input_order() {
    let m = CsrMatrix::from_triplets(
        3,
        4,
        &[(2, 3, 1.0), (0, 1, 2.0), (2, 0, 3.0), (0, 0, 4.0)],
    )
    .unwrap();
    assert_eq!(indices(&m, Orientation::Row, 0), vec![1, 0]);
    assert_eq!(m.row(1).unwrap().len(), 0);
    assert_eq!(indices(&m, Orientation::Row, 2), vec![3, 0]);
    assert_eq!(values(&m, Orientation::Row, 2), vec![1.0, 3.0]);

    assert!(CsrMatrix::from_triplets(1, 1, &[(0, 1, 1.0)]).is_err());
}

#[test]
fn test_sprs_round_trip() {
    let original = small_corpus();
    let back = CsrMatrix::from_sprs(&original.to_sprs().unwrap()).unwrap();
    assert!(back.compare(&original, 0.0));
}

#[test]
fn test_push_row_drops_column_view() {
    let mut m = CsrMatrix::with_capacity(4, 8).unwrap();
    m.push_row(&[0, 3], &[1.0, 2.0]).unwrap();
    m.create_index(Orientation::Col).unwrap();
    m.push_row(&[1], &[1.0]).unwrap();

    assert_eq!(m.nrows(), 2);
    assert_eq!(m.nnz(), 3);
    assert!(!m.has_view(Orientation::Col));
    assert!(m.push_row(&[4], &[1.0]).is_err());
    assert!(m.push_row(&[1, 2], &[1.0]).is_err());
}
