//! Minimal NPY (format version 1.0) reader/writer for 1-D f64 arrays.
//!
//! Result arrays are exchanged with the front-end tooling as `.npy` files, so
//! the on-disk format has to stay byte-compatible with `numpy.save` for the
//! `<f8` little-endian case. Nothing beyond 1-D f64 is needed here.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Write a 1-D f64 array as an NPY v1.0 file
pub fn write_npy<P: AsRef<Path>>(path: P, data: &[f64]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        data.len()
    );
    // Total header (magic + version + length field + dict + '\n') must be a
    // multiple of 64 bytes
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    writer.write_all(MAGIC)?;
    writer.write_all(&[0x01, 0x00])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()
}

/// Read a 1-D f64 array from an NPY file written by `write_npy` or numpy
pub fn read_npy<P: AsRef<Path>>(path: P) -> io::Result<Vec<f64>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(invalid("not an NPY file"));
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    if version[0] != 1 {
        return Err(invalid("unsupported NPY version"));
    }
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let header_len = u16::from_le_bytes(len_bytes) as usize;

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);
    if !header.contains("'descr': '<f8'") {
        return Err(invalid("only '<f8' arrays are supported"));
    }
    if !header.contains("'fortran_order': False") {
        return Err(invalid("fortran-order arrays are not supported"));
    }
    let count = parse_shape(&header).ok_or_else(|| invalid("missing or non-1-D shape"))?;

    let mut data = Vec::with_capacity(count);
    let mut buf = [0u8; 8];
    for _ in 0..count {
        reader.read_exact(&mut buf)?;
        data.push(f64::from_le_bytes(buf));
    }
    Ok(data)
}

fn parse_shape(header: &str) -> Option<usize> {
    let start = header.find("'shape': (")? + "'shape': (".len();
    let rest = &header[start..];
    let end = rest.find(|c| c == ',' || c == ')')?;
    let dims = rest[..end].trim();
    // "(N,)" gives the digits; "()" (0-d) and "(N, M)" (2-d) are rejected by
    // the trailing-character check below
    let after = rest[end..].trim_start_matches(',').trim_start();
    if !after.starts_with(')') {
        return None;
    }
    dims.parse::<usize>().ok()
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
