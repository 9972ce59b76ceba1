//! Plain-text persistence for vectors and matrices.
//!
//! The format is one header line `name dimension`, followed by the
//! whitespace-separated entries (`dimension` values for a vector,
//! `dimension²` row-major values for a matrix), newline-terminated.
//! The name is a single token; unlabeled objects are written as `vector`
//! or `matrix`.

use std::io::{BufRead, Write};

use crate::algebra::{SquareMatrix, Vector};
use crate::error::{Error, ErrorContext, Result};

pub fn write_vector<W: Write>(out: &mut W, vector: &Vector) -> Result<()> {
    write_values(
        out,
        vector.label().unwrap_or("vector"),
        vector.len(),
        vector.iter().copied(),
    )
    .in_op("write_vector")
}

pub fn read_vector<R: BufRead>(input: &mut R) -> Result<Vector> {
    let (name, dim) = read_header(input).in_op("read_vector")?;
    let values = read_values(input, dim).in_op("read_vector")?;
    let mut vector = Vector::from_vec(values);
    vector.set_label(name);
    Ok(vector)
}

pub fn write_matrix<W: Write>(out: &mut W, matrix: &SquareMatrix) -> Result<()> {
    let n = matrix.dim();
    let entries = (0..n * n).map(|idx| matrix.get(idx / n, idx % n));
    write_values(out, matrix.label().unwrap_or("matrix"), n, entries).in_op("write_matrix")
}

pub fn read_matrix<R: BufRead>(input: &mut R) -> Result<SquareMatrix> {
    let (name, dim) = read_header(input).in_op("read_matrix")?;
    let values = read_values(input, dim * dim).in_op("read_matrix")?;
    let mut matrix = SquareMatrix::from_row_slice(dim, &values);
    matrix.set_label(name);
    Ok(matrix)
}

fn write_values<W: Write>(
    out: &mut W,
    name: &str,
    dim: usize,
    values: impl Iterator<Item = f64>,
) -> Result<()> {
    writeln!(out, "{name} {dim}")?;
    for value in values {
        write!(out, " {value}")?;
    }
    writeln!(out)?;
    Ok(())
}

fn read_header<R: BufRead>(input: &mut R) -> Result<(String, usize)> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(Error::Parse("missing header line".into()));
    }
    let mut tokens = line.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| Error::Parse("empty header line".into()))?
        .to_string();
    let dim: usize = tokens
        .next()
        .ok_or_else(|| Error::Parse("header line has no dimension".into()))?
        .parse()
        .map_err(|_| Error::Parse(format!("malformed dimension in header: {line:?}")))?;
    Ok((name, dim))
}

fn read_values<R: BufRead>(input: &mut R, count: usize) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(count);
    let mut line = String::new();
    while values.len() < count {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(Error::Parse(format!(
                "expected {count} values, found {}",
                values.len()
            )));
        }
        for token in line.split_whitespace() {
            let value: f64 = token
                .parse()
                .map_err(|_| Error::Parse(format!("malformed value: {token:?}")))?;
            values.push(value);
            if values.len() == count {
                break;
            }
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    #[test]
    fn vector_round_trip() {
        let mut v = Vector::from_slice(&[1.0, -2.5, 3.25]);
        v.set_label("load");
        let mut buffer = Vec::new();
        write_vector(&mut buffer, &v).unwrap();

        let back = read_vector(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back.as_slice(), v.as_slice());
        assert_eq!(back.label(), Some("load"));
    }

    #[test]
    fn matrix_round_trip() {
        let m = SquareMatrix::from_row_slice(2, &[1.0, 2.0, 3.0, 4.5]);
        let mut buffer = Vec::new();
        write_matrix(&mut buffer, &m).unwrap();

        let back = read_matrix(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.label(), Some("matrix"));
    }

    #[test]
    fn format_is_header_then_values() {
        let mut v = Vector::from_slice(&[1.0, 2.0]);
        v.set_label("p");
        let mut buffer = Vec::new();
        write_vector(&mut buffer, &v).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "p 2\n 1 2\n");
    }

    #[test]
    fn truncated_input_is_a_parse_error() {
        let err = read_vector(&mut Cursor::new("v 3\n 1 2\n")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn garbage_value_is_a_parse_error() {
        let err = read_vector(&mut Cursor::new("v 2\n 1 x\n")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn missing_dimension_is_a_parse_error() {
        let err = read_matrix(&mut Cursor::new("m\n")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
