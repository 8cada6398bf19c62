//! Saving and loading arrays.
//!
//! # `.bpat` Format
//!
//! ```text
//! ┌────────────┬──────────────────────────────────┐
//! │ "bpat"[4]  │ magic                            │
//! │ u8         │ array count                      │
//! ├────────────┼──────────────────────────────────┤
//! │ u64        │ ndim            (per array)      │
//! │ [u64; ndim]│ shape                            │
//! │ [f64; ..]  │ row-major data, little-endian    │
//! └────────────┴──────────────────────────────────┘
//! ```
//!
//! Useful for snapshotting leaf values or accumulated gradients between runs.
//! Records read back from disk are untrusted: each one is validated through
//! [`Array::try_new`] before it is returned.
//!
//! # Limitations
//! - At most 255 arrays per file (`u8` count)
//! - No names or per-array metadata

use crate::array::Array;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const BPAT_MAGIC: &[u8; 4] = b"bpat";

/// Writes `arrays` to `path`.
///
/// # Errors
/// [`Error::BadFormat`] for more than 255 arrays, [`Error::Io`] on write failure.
pub fn save_arrays(path: impl AsRef<Path>, arrays: &[Array]) -> Result<()> {
    let count = u8::try_from(arrays.len()).map_err(|_| Error::BadFormat {
        reason: "more than 255 arrays",
    })?;
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(BPAT_MAGIC)?;
    file.write_all(&[count])?;

    for array in arrays {
        file.write_all(&(array.rank() as u64).to_le_bytes())?;
        for &dim in array.shape() {
            file.write_all(&(dim as u64).to_le_bytes())?;
        }
        for &v in array.data() {
            file.write_all(&v.to_le_bytes())?;
        }
    }
    file.flush()?;
    Ok(())
}

fn read_u64(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_len(r: &mut impl Read) -> Result<usize> {
    usize::try_from(read_u64(r)?).map_err(|_| Error::BadFormat {
        reason: "length does not fit in usize",
    })
}

/// Reads every array stored in `path`.
///
/// # Errors
/// [`Error::BadFormat`] for a wrong magic header, [`Error::InvalidData`] for a
/// record whose shape and data disagree, [`Error::Io`] for truncated files.
pub fn load_arrays(path: impl AsRef<Path>) -> Result<Vec<Array>> {
    let mut file = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != BPAT_MAGIC {
        return Err(Error::BadFormat {
            reason: "invalid magic header",
        });
    }
    let mut count = [0u8; 1];
    file.read_exact(&mut count)?;

    let mut arrays = Vec::with_capacity(usize::from(count[0]));
    for _ in 0..count[0] {
        let ndim = read_len(&mut file)?;
        let shape = (0..ndim)
            .map(|_| read_len(&mut file))
            .collect::<Result<Vec<_>>>()?;
        let size = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or(Error::BadFormat {
                reason: "shape overflows",
            })?;
        let data = (0..size)
            .map(|_| read_u64(&mut file).map(f64::from_bits))
            .collect::<Result<Vec<_>>>()?;
        arrays.push(Array::try_new(shape, data)?);
    }
    Ok(arrays)
}
