use approx::assert_relative_eq;

use crate::info::MatrixInfo;
use crate::tests::test_data::twin_docs;

#[test]
fn test_info_without_stats() {
    let m = twin_docs();
    let info = MatrixInfo::of(&m, false).unwrap();

    assert_eq!((info.nrows, info.ncols, info.nnz), (4, 5, 5));
    assert_eq!(info.nonempty_cols, 3);
    assert_relative_eq!(info.density, 0.25);
    assert!(info.row_stats.is_none());
    assert_eq!(
        info.to_string(),
        "4 rows, 5 cols, 5 nnzs, 0.25 density, 3 non-empty cols."
    );
    // the input is left alone
    assert_eq!(m.ncols(), 5);
}

#[test]
fn test_info_with_stats() {
    let info = MatrixInfo::of(&twin_docs(), true).unwrap();

    let rows = info.row_stats.unwrap();
    assert_eq!((rows.min, rows.max), (0, 2));
    assert_relative_eq!(rows.mean, 1.25);
    assert_relative_eq!(rows.stdev, 0.6875f64.sqrt(), epsilon = 1e-12);

    let cols = info.col_stats.unwrap();
    assert_eq!((cols.min, cols.max), (1, 2));
    assert_relative_eq!(cols.mean, 5.0 / 3.0, epsilon = 1e-12);

    assert!(info.to_string().contains("\nRow nnz stats: min 0, max 2 mean 1.25, stdev 0.83."));
}
