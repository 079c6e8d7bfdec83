//! Line-oriented ASCII readers and writers.
//!
//! Every artifact of the pipeline is a plain text file: one frame per line
//! for coordinates, one value per line for trajectories, populations and
//! free energies, `id value` pairs for maps, and five columns per line for
//! neighborhoods.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::errors::{FelError, Result};
use crate::types::{CoordMatrix, Neighbor, Neighborhood};

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| FelError::io(path, e))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| FelError::io(path, e))
}

/// Reads a whitespace-separated coordinate matrix, one frame per line.
///
/// All rows must have the same number of columns; blank lines are skipped.
pub fn read_coords(path: impl AsRef<Path>) -> Result<CoordMatrix> {
    let path = path.as_ref();
    let reader = open(path)?;
    let mut data: Vec<f32> = Vec::new();
    let mut n_rows = 0usize;
    let mut n_cols = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FelError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut cols = 0usize;
        for field in line.split_ascii_whitespace() {
            let value: f32 = field.parse().map_err(|_| {
                FelError::parse(path, lineno + 1, format!("not a float: '{field}'"))
            })?;
            data.push(value);
            cols += 1;
        }
        if n_rows == 0 {
            n_cols = cols;
        } else if cols != n_cols {
            return Err(FelError::parse(
                path,
                lineno + 1,
                format!("expected {n_cols} columns, found {cols}"),
            ));
        }
        n_rows += 1;
    }
    if n_rows == 0 {
        return Err(FelError::parse(path, 0, "empty coordinate file"));
    }
    Ok(CoordMatrix::new(data, n_rows, n_cols))
}

/// Reads a single-column file of parseable values, skipping blank lines.
pub fn read_column<T>(path: impl AsRef<Path>) -> Result<Vec<T>>
where
    T: FromStr,
{
    let path = path.as_ref();
    let reader = open(path)?;
    let mut values = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FelError::io(path, e))?;
        let field = line.trim();
        if field.is_empty() {
            continue;
        }
        let value = field
            .parse()
            .map_err(|_| FelError::parse(path, lineno + 1, format!("bad value: '{field}'")))?;
        values.push(value);
    }
    Ok(values)
}

/// Writes one value per line.
pub fn write_column<T: Display>(path: impl AsRef<Path>, values: &[T]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create(path)?;
    for v in values {
        writeln!(writer, "{v}").map_err(|e| FelError::io(path, e))?;
    }
    writer.flush().map_err(|e| FelError::io(path, e))
}

/// Writes free energies, one per line, in scientific notation.
pub fn write_free_energies(path: impl AsRef<Path>, values: &[f32]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create(path)?;
    for v in values {
        writeln!(writer, "{v:.6e}").map_err(|e| FelError::io(path, e))?;
    }
    writer.flush().map_err(|e| FelError::io(path, e))
}

/// Writes `key value` pairs, one per line, in ascending key order.
pub fn write_map<K: Display, V: Display>(
    path: impl AsRef<Path>,
    map: &BTreeMap<K, V>,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create(path)?;
    for (k, v) in map {
        writeln!(writer, "{k} {v}").map_err(|e| FelError::io(path, e))?;
    }
    writer.flush().map_err(|e| FelError::io(path, e))
}

/// Writes both neighborhoods as `i nh_idx nh_dist2 nh_hd_idx nh_hd_dist2`.
pub fn write_neighborhood(
    path: impl AsRef<Path>,
    nh: &Neighborhood,
    nh_hd: &Neighborhood,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create(path)?;
    for (i, (n, h)) in nh.iter().zip(nh_hd.iter()).enumerate() {
        writeln!(writer, "{} {} {} {} {}", i, n.index, n.dist2, h.index, h.dist2)
            .map_err(|e| FelError::io(path, e))?;
    }
    writer.flush().map_err(|e| FelError::io(path, e))
}

/// Reads a neighborhood file produced by [`write_neighborhood`].
///
/// Line `k` must describe frame `k`; the file must be complete.
pub fn read_neighborhood(path: impl AsRef<Path>) -> Result<(Neighborhood, Neighborhood)> {
    let path = path.as_ref();
    let reader = open(path)?;
    let mut nh = Vec::new();
    let mut nh_hd = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FelError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_ascii_whitespace().collect();
        if fields.len() != 5 {
            return Err(FelError::parse(
                path,
                lineno + 1,
                format!("expected 5 columns, found {}", fields.len()),
            ));
        }
        let frame: usize = fields[0]
            .parse()
            .map_err(|_| FelError::parse(path, lineno + 1, "bad frame index"))?;
        if frame != nh.len() {
            return Err(FelError::parse(
                path,
                lineno + 1,
                format!("expected frame {}, found {}", nh.len(), frame),
            ));
        }
        let parse_idx = |s: &str| -> Result<usize> {
            s.parse()
                .map_err(|_| FelError::parse(path, lineno + 1, "bad neighbor index"))
        };
        let parse_dist = |s: &str| -> Result<f32> {
            s.parse()
                .map_err(|_| FelError::parse(path, lineno + 1, "bad distance"))
        };
        nh.push(Neighbor {
            index: parse_idx(fields[1])?,
            dist2: parse_dist(fields[2])?,
        });
        nh_hd.push(Neighbor {
            index: parse_idx(fields[3])?,
            dist2: parse_dist(fields[4])?,
        });
    }
    Ok((nh, nh_hd))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tmp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_read_coords() {
        let f = write_tmp("0.0 1.0\n0.5 2.5\n\n3.0 -1.0\n");
        let m = read_coords(f.path()).unwrap();
        assert_eq!(m.n_rows(), 3);
        assert_eq!(m.n_cols(), 2);
        assert_eq!(m.row(1), &[0.5, 2.5]);
    }

    #[test]
    fn test_read_coords_ragged_row_fails() {
        let f = write_tmp("0.0 1.0\n0.5\n");
        let err = read_coords(f.path()).unwrap_err();
        assert!(matches!(err, FelError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_column_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.dat");
        write_column(&path, &[3usize, 1, 4, 1, 5]).unwrap();
        let back: Vec<usize> = read_column(&path).unwrap();
        assert_eq!(back, vec![3, 1, 4, 1, 5]);
    }

    #[test]
    fn test_neighborhood_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nh.dat");
        let nh = vec![
            Neighbor {
                index: 1,
                dist2: 0.25,
            },
            Neighbor {
                index: 0,
                dist2: 0.25,
            },
        ];
        let nh_hd = vec![
            Neighbor {
                index: 1,
                dist2: 0.25,
            },
            Neighbor::none(2),
        ];
        write_neighborhood(&path, &nh, &nh_hd).unwrap();
        let (nh2, nh_hd2) = read_neighborhood(&path).unwrap();
        assert_eq!(nh2, nh);
        assert_eq!(nh_hd2[1].index, 3);
        assert!(nh_hd2[1].dist2.is_infinite());
    }

    #[test]
    fn test_write_map_is_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pops.dat");
        let mut map = BTreeMap::new();
        map.insert(7usize, 2usize);
        map.insert(2, 40);
        write_map(&path, &map).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2 40\n7 2\n");
    }
}
