use std::str::FromStr;

use crate::csr::{CsrMatrix, Orientation};
use crate::error::FindSimError;
use crate::io::{
    detect_format, guess_format, parse_matrix, read_from, read_matrix, write_matrix, write_to,
    Format, ReadOptions, WriteOptions,
};
use crate::tests::init;
use crate::tests::test_data::{small_corpus, twin_docs};

fn opts(format: Format) -> ReadOptions {
    ReadOptions { format: Some(format), ..Default::default() }
}

fn row(m: &CsrMatrix, i: usize) -> Vec<(usize, f32)> {
    m.row(i).unwrap().iter().collect()
}

#[test]
fn test_csr_round_trip_in_memory() {
    init();
    let m = small_corpus();
    let mut buf = Vec::new();
    write_to(&m, &mut buf, &WriteOptions::default()).unwrap();

    let text = String::from_utf8(buf.clone()).unwrap();
    assert!(text.starts_with("1 2 2 1 4 1\n"));

    let back = read_from(buf.as_slice(), &opts(Format::Csr)).unwrap();
    assert!(back.compare(&m, 0.0));
}

#[test]
fn test_cluto_round_trip_keeps_empty_rows() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.clu");
    let m = twin_docs();

    write_matrix(&m, &path, &WriteOptions { format: Format::Cluto, ..Default::default() })
        .unwrap();
    let back = read_matrix(&path, &ReadOptions::default()).unwrap();

    assert_eq!(back.nrows(), 4);
    assert_eq!(back.ncols(), 5);
    assert!(back.compare(&m, 0.0));
}

#[test]
fn test_ijv_round_trip_zero_based() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.ijv");
    let m = small_corpus();

    let wopts = WriteOptions { format: Format::Ijv, write_values: true, one_based: false };
    write_matrix(&m, &path, &wopts).unwrap();
    assert_eq!(detect_format(&path).unwrap(), Format::Ijv);

    let ropts = ReadOptions { format: None, read_values: true, one_based: false };
    let back = read_matrix(&path, &ropts).unwrap();
    assert!(back.compare(&m, 0.0));
}

#[test]
fn test_cluto_missing_trailing_rows() {
    let m = parse_matrix("% header next\n4 3 3\n1 1.0 3 2.0\n2 0.5\n", &opts(Format::Cluto))
        .unwrap();
    assert_eq!((m.nrows(), m.ncols(), m.nnz()), (4, 3, 3));
    assert_eq!(row(&m, 0), vec![(0, 1.0), (2, 2.0)]);
    assert_eq!(row(&m, 1), vec![(1, 0.5)]);
    assert!(row(&m, 3).is_empty());
}

#[test]
fn test_cluto_nnz_mismatch() {
    let err = parse_matrix("2 3 5\n1 1.0\n2 1.0\n", &opts(Format::Cluto)).unwrap_err();
    assert!(matches!(err, FindSimError::InconsistentInput(_)));

    let err = parse_matrix("2 3\n1 1.0\n", &opts(Format::Cluto)).unwrap_err();
    assert!(matches!(err, FindSimError::Parse { line: 1, .. }));
}

#[test]
fn test_csr_without_values() {
    let ropts = ReadOptions { format: Some(Format::Csr), read_values: false, one_based: true };
    let m = parse_matrix("1 3\n\n2\n", &ropts).unwrap();
    assert_eq!(m.nrows(), 3);
    assert_eq!(m.ncols(), 3);
    assert_eq!(row(&m, 0), vec![(0, 1.0), (2, 1.0)]);
    assert!(row(&m, 1).is_empty());
}

#[test]
fn test_csr_comments_and_errors() {
    let m = parse_matrix("% comment\n1 0.5\n% another\n2 1.5\n", &opts(Format::Csr)).unwrap();
    assert_eq!(m.nrows(), 2);
    assert_eq!(row(&m, 1), vec![(1, 1.5)]);

    let err = parse_matrix("1 0.5\n2\n", &opts(Format::Csr)).unwrap_err();
    assert!(matches!(err, FindSimError::Parse { line: 2, .. }));

    let err = parse_matrix("0 0.5\n", &opts(Format::Csr)).unwrap_err();
    assert!(matches!(err, FindSimError::Parse { line: 1, .. }));

    let err = parse_matrix("1 abc\n", &opts(Format::Csr)).unwrap_err();
    assert!(matches!(err, FindSimError::Parse { .. }));
}

#[test]
fn test_ijv_parse() {
    let m = parse_matrix("1\t2\t0.5\n3\t1\t1.5\n", &opts(Format::Ijv)).unwrap();
    assert_eq!((m.nrows(), m.ncols()), (3, 2));
    assert_eq!(row(&m, 0), vec![(1, 0.5)]);
    assert!(row(&m, 1).is_empty());
    assert_eq!(row(&m, 2), vec![(0, 1.5)]);

    let err = parse_matrix("1 2\n", &opts(Format::Ijv)).unwrap_err();
    assert!(matches!(err, FindSimError::Parse { line: 1, .. }));
}

#[test]
fn test_format_detection() {
    assert_eq!(guess_format("3 4 2\n1 1.0\n2 1.0\n\n"), Format::Cluto);
    assert_eq!(guess_format("1 1.0\n2 1.0\n"), Format::Csr);

    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("matrix");
    std::fs::write(&plain, "2 2 2\n1 1.0\n2 1.0\n").unwrap();
    assert_eq!(detect_format(&plain).unwrap(), Format::Cluto);
    let m = read_matrix(&plain, &ReadOptions::default()).unwrap();
    assert_eq!((m.nrows(), m.ncols(), m.nnz()), (2, 2, 2));

    let missing = dir.path().join("nothing");
    assert!(matches!(detect_format(&missing), Err(FindSimError::Configuration(_))));
    assert_eq!(detect_format(std::path::Path::new("x.CLU")).unwrap(), Format::Cluto);
}

#[test]
fn test_format_from_str() {
    assert_eq!(Format::from_str("csr").unwrap(), Format::Csr);
    assert_eq!(Format::from_str("cluto").unwrap(), Format::Cluto);
    assert_eq!(Format::from_str("ijv").unwrap(), Format::Ijv);
    assert!(Format::from_str("met").is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_matrix(dir.path().join("absent.csr"), &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, FindSimError::Io(_)));
}

#[test]
fn test_out_of_range_index_is_parse_error() {
    let err = parse_matrix("-9223372036854775808 1\n", &opts(Format::Csr)).unwrap_err();
    assert!(matches!(err, FindSimError::Parse { line: 1, .. }));

    let err = parse_matrix("1\t-9223372036854775808\t1.0\n", &opts(Format::Ijv)).unwrap_err();
    assert!(matches!(err, FindSimError::Parse { line: 1, .. }));
}

#[test]
fn test_cluto_writes_values_for_pattern_matrix() {
    init();
    let pattern = CsrMatrix::from_raw_parts(
        Orientation::Row,
        3,
        4,
        vec![0, 2, 2, 3],
        vec![0, 3, 1],
        None,
    )
    .unwrap();
    let mut buf = Vec::new();
    write_to(&pattern, &mut buf, &WriteOptions { format: Format::Cluto, ..Default::default() })
        .unwrap();
    assert_eq!(String::from_utf8(buf.clone()).unwrap(), "3 4 3\n1 1 4 1\n\n2 1\n");

    let back = read_from(buf.as_slice(), &opts(Format::Cluto)).unwrap();
    assert_eq!((back.nrows(), back.ncols(), back.nnz()), (3, 4, 3));
    assert_eq!(row(&back, 0), vec![(0, 1.0), (3, 1.0)]);
    assert_eq!(row(&back, 2), vec![(1, 1.0)]);
}
