//! Plain-text sparse matrix formats.
//!
//! - `Csr`: one line per row, `col [val]` pairs separated by whitespace.
//! - `Cluto`: a `nrows ncols nnz` header followed by CSR lines, always 1-based
//!   with values. Trailing empty rows may be omitted.
//! - `Ijv`: one `row col [val]` triplet per line.
//!
//! Lines starting with `%` are comments in every format.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::csr::{try_with_capacity, CsrMatrix, Orientation};
use crate::error::{FindSimError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Csr,
    Cluto,
    Ijv,
}

impl Format {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csr" => Some(Format::Csr),
            "clu" | "cluto" => Some(Format::Cluto),
            "ijv" => Some(Format::Ijv),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Csr => "csr",
            Format::Cluto => "clu",
            Format::Ijv => "ijv",
        }
    }
}

impl FromStr for Format {
    type Err = FindSimError;

    fn from_str(s: &str) -> Result<Self> {
        Format::from_extension(s)
            .ok_or_else(|| FindSimError::Configuration(format!("unknown matrix format '{s}'")))
    }
}

/// Options for the readers. `format: None` means detect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub format: Option<Format>,
    /// Each column index is followed by a value. When false, values are 1.
    pub read_values: bool,
    /// Indices in the file start at 1.
    pub one_based: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { format: None, read_values: true, one_based: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub format: Format,
    pub write_values: bool,
    pub one_based: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { format: Format::Csr, write_values: true, one_based: true }
    }
}

/// Non-comment lines with their 1-based line numbers.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.starts_with('%'))
        .map(|(n, l)| (n + 1, l))
}

/// Format guess for text without a known extension: a Cluto header adds
/// three numbers to an otherwise even count.
pub fn guess_format(text: &str) -> Format {
    let numbers: usize = data_lines(text).map(|(_, l)| l.split_whitespace().count()).sum();
    if numbers % 2 == 1 {
        Format::Cluto
    } else {
        Format::Csr
    }
}

/// Format from the file extension, or from the file content when the
/// extension is unknown and the file exists.
pub fn detect_format(path: &Path) -> Result<Format> {
    if let Some(fmt) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(Format::from_extension)
    {
        return Ok(fmt);
    }
    if path.exists() {
        let text = std::fs::read_to_string(path)?;
        return Ok(guess_format(&text));
    }
    Err(FindSimError::Configuration(format!(
        "cannot determine the matrix format of {}",
        path.display()
    )))
}

fn parse_index(tok: &str, line: usize, one_based: bool) -> Result<usize> {
    let raw: i64 = tok.parse().map_err(|_| FindSimError::Parse {
        line,
        msg: format!("invalid index '{tok}'"),
    })?;
    let idx = if one_based { raw.checked_sub(1) } else { Some(raw) };
    idx.and_then(|i| usize::try_from(i).ok()).ok_or_else(|| FindSimError::Parse {
        line,
        msg: format!("invalid index {raw}"),
    })
}

fn parse_value(tok: Option<&str>, line: usize) -> Result<f32> {
    let tok = tok.ok_or_else(|| FindSimError::Parse {
        line,
        msg: "value missing after column index".into(),
    })?;
    tok.parse().map_err(|_| FindSimError::Parse {
        line,
        msg: format!("invalid value '{tok}'"),
    })
}

/// Parses the pairs of one CSR line into `ind`/`val`; returns the largest
/// column index plus one.
fn parse_row(
    text: &str,
    line: usize,
    opts: &ReadOptions,
    ind: &mut Vec<usize>,
    val: &mut Vec<f32>,
) -> Result<usize> {
    let mut ncols = 0usize;
    let mut toks = text.split_whitespace();
    while let Some(tok) = toks.next() {
        let c = parse_index(tok, line, opts.one_based)?;
        let v = if opts.read_values { parse_value(toks.next(), line)? } else { 1.0 };
        ind.push(c);
        val.push(v);
        ncols = ncols.max(c + 1);
    }
    Ok(ncols)
}

fn parse_csr(text: &str, opts: &ReadOptions) -> Result<CsrMatrix> {
    let mut ptr = vec![0usize];
    let (mut ind, mut val) = (Vec::new(), Vec::new());
    let mut ncols = 0usize;
    for (line, l) in data_lines(text) {
        ncols = ncols.max(parse_row(l, line, opts, &mut ind, &mut val)?);
        ptr.push(ind.len());
    }
    let nrows = ptr.len() - 1;
    CsrMatrix::from_raw_parts(Orientation::Row, nrows, ncols, ptr, ind, Some(val))
}

fn parse_cluto(text: &str) -> Result<CsrMatrix> {
    let mut lines = data_lines(text);
    let (hline, header) = lines.next().ok_or_else(|| FindSimError::Parse {
        line: 1,
        msg: "premature end of input: missing header".into(),
    })?;
    let dims: Vec<usize> = header
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| FindSimError::Parse {
            line: hline,
            msg: "header line must contain 3 integers".into(),
        })?;
    let [nrows, ncols, nnz]: [usize; 3] =
        dims.as_slice().try_into().map_err(|_| FindSimError::Parse {
            line: hline,
            msg: "header line must contain 3 integers".into(),
        })?;

    let opts = ReadOptions { format: Some(Format::Cluto), read_values: true, one_based: true };
    let mut ptr = try_with_capacity(nrows + 1, "row pointer")?;
    let mut ind = try_with_capacity(nnz, "row indices")?;
    let mut val = try_with_capacity(nnz, "row values")?;
    ptr.push(0);
    let mut maxcol = 0usize;
    for (line, l) in lines.take(nrows) {
        maxcol = maxcol.max(parse_row(l, line, &opts, &mut ind, &mut val)?);
        ptr.push(ind.len());
    }
    // rows missing at the end of the file are empty
    while ptr.len() < nrows + 1 {
        ptr.push(ind.len());
    }
    if ind.len() != nnz {
        return Err(FindSimError::InconsistentInput(format!(
            "header declares {} nonzeros but {} were read",
            nnz,
            ind.len()
        )));
    }
    CsrMatrix::from_raw_parts(Orientation::Row, nrows, ncols.max(maxcol), ptr, ind, Some(val))
}

fn parse_ijv(text: &str, opts: &ReadOptions) -> Result<CsrMatrix> {
    let per_line = if opts.read_values { 3 } else { 2 };
    let mut triplets = Vec::new();
    let (mut nrows, mut ncols) = (0usize, 0usize);
    for (line, l) in data_lines(text) {
        let toks: Vec<&str> = l.split_whitespace().collect();
        if toks.is_empty() {
            continue;
        }
        if toks.len() != per_line {
            return Err(FindSimError::Parse {
                line,
                msg: format!("expected {} numbers, found {}", per_line, toks.len()),
            });
        }
        let i = parse_index(toks[0], line, opts.one_based)?;
        let j = parse_index(toks[1], line, opts.one_based)?;
        let v = if opts.read_values { parse_value(toks.get(2).copied(), line)? } else { 1.0 };
        nrows = nrows.max(i + 1);
        ncols = ncols.max(j + 1);
        triplets.push((i, j, v));
    }
    CsrMatrix::from_triplets(nrows, ncols, &triplets)
}

/// Parses a matrix held in memory. Without an explicit format the content
/// decides between `Csr` and `Cluto`.
pub fn parse_matrix(text: &str, opts: &ReadOptions) -> Result<CsrMatrix> {
    let format = opts.format.unwrap_or_else(|| guess_format(text));
    let m = match format {
        Format::Csr => parse_csr(text, opts)?,
        Format::Cluto => parse_cluto(text)?,
        Format::Ijv => parse_ijv(text, opts)?,
    };
    debug!(
        "parsed {} matrix: {} rows, {} cols, {} nnz",
        format.name(),
        m.nrows(),
        m.ncols(),
        m.nnz()
    );
    Ok(m)
}

/// Reads a matrix from any reader.
pub fn read_from<R: Read>(mut reader: R, opts: &ReadOptions) -> Result<CsrMatrix> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_matrix(&text, opts)
}

/// Reads a matrix file; the format comes from `opts`, then the extension,
/// then the content.
pub fn read_matrix(path: impl AsRef<Path>, opts: &ReadOptions) -> Result<CsrMatrix> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let format = match opts.format {
        Some(f) => f,
        None => path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Format::from_extension)
            .unwrap_or_else(|| guess_format(&text)),
    };
    info!("reading {} ({})", path.display(), format.name());
    parse_matrix(&text, &ReadOptions { format: Some(format), ..*opts })
}

/// Writes the row view of `mat`.
pub fn write_to<W: Write>(mat: &CsrMatrix, writer: W, opts: &WriteOptions) -> Result<()> {
    let rows = mat.view(Orientation::Row)?;
    let mut out = BufWriter::new(writer);
    let mut write_values = opts.write_values && rows.val().is_some();
    let mut base = usize::from(opts.one_based);

    match opts.format {
        Format::Ijv => {
            for i in 0..mat.nrows() {
                for (c, v) in rows.segment(i).iter() {
                    if write_values {
                        writeln!(out, "{}\t{}\t{}", i + base, c + base, v)?;
                    } else {
                        writeln!(out, "{}\t{}", i + base, c + base)?;
                    }
                }
            }
        }
        Format::Csr | Format::Cluto => {
            if opts.format == Format::Cluto {
                // Cluto always carries values; pattern-only rows read as 1.0
                writeln!(out, "{} {} {}", mat.nrows(), mat.ncols(), mat.nnz())?;
                write_values = true;
                base = 1;
            }
            for i in 0..mat.nrows() {
                let mut first = true;
                for (c, v) in rows.segment(i).iter() {
                    if !first {
                        write!(out, " ")?;
                    }
                    first = false;
                    write!(out, "{}", c + base)?;
                    if write_values {
                        write!(out, " {}", v)?;
                    }
                }
                writeln!(out)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Writes the row view of `mat` to a file.
pub fn write_matrix(mat: &CsrMatrix, path: impl AsRef<Path>, opts: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    info!("writing {} ({})", path.display(), opts.format.name());
    write_to(mat, File::create(path)?, opts)
}
