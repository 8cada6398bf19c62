//! Parallel CPU kernels.
//!
//! ## Implemented Kernels
//!
//! - `matmul`: row-parallel `m×k · k×n` product
//! - `transpose`: 2-D transpose
//! - `log_softmax` / `log_softmax_backward`: row-wise, max-subtracted
//! - `max_pool2x2` / `max_pool2x2_backward`: non-overlapping 2×2 windows with
//!   argmax-first tie-breaking
//!
//! Shape validation happens in the callers; the `_raw` variants trust their
//! dimension arguments.

use crate::array::Array;
use crate::error::{Error, Result};
use rayon::prelude::*;

/// Computes `C = A × B` for row-major buffers `A: m×k`, `B: k×n`.
///
/// Each output row is produced by one task, accumulating over `k` in order.
pub fn matmul_raw(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    let mut out = vec![0.0; m * n];
    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let a_row = &a[i * k..(i + 1) * k];
        for (l, &a_il) in a_row.iter().enumerate() {
            let b_row = &b[l * n..(l + 1) * n];
            for (o, &b_lj) in row.iter_mut().zip(b_row) {
                *o += a_il * b_lj;
            }
        }
    });
    out
}

/// Transposes a row-major `rows×cols` buffer.
pub fn transpose_raw(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; rows * cols];
    out.par_chunks_mut(rows).enumerate().for_each(|(j, col)| {
        for (i, o) in col.iter_mut().enumerate() {
            *o = a[i * cols + j];
        }
    });
    out
}

fn matrix_dims(op: &str, a: &Array) -> Result<(usize, usize)> {
    match *a.shape() {
        [r, c] if r > 0 && c > 0 => Ok((r, c)),
        _ => Err(Error::shape(op, format!("expected a 2-D operand, got {:?}", a.shape()))),
    }
}

/// Matrix product of two 2-D arrays.
///
/// # Errors
/// [`Error::ShapeMismatch`] if either operand is not 2-D or the inner
/// dimensions differ.
pub fn matmul(a: &Array, b: &Array) -> Result<Array> {
    let (m, k) = matrix_dims("dot", a)?;
    let (k2, n) = matrix_dims("dot", b)?;
    if k != k2 {
        return Err(Error::shape(
            "dot",
            format!("[{m}x{k}] · [{k2}x{n}]: inner dimensions differ"),
        ));
    }
    Ok(Array::new(vec![m, n], matmul_raw(a.data(), b.data(), m, k, n)))
}

/// Row-wise log-softmax of a `rows×cols` buffer.
///
/// Subtracts each row's maximum before exponentiating so large logits cannot
/// overflow.
pub fn log_softmax_raw(x: &[f64], cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; x.len()];
    out.par_chunks_mut(cols)
        .zip(x.par_chunks(cols))
        .for_each(|(o, row)| {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let lse = max + row.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
            for (o, &v) in o.iter_mut().zip(row) {
                *o = v - lse;
            }
        });
    out
}

/// Gradient of row-wise log-softmax expressed through its saved output:
/// `g − exp(out) · rowsum(g)`.
pub fn log_softmax_backward_raw(out: &[f64], grad: &[f64], cols: usize) -> Vec<f64> {
    let mut dx = vec![0.0; out.len()];
    dx.par_chunks_mut(cols)
        .zip(out.par_chunks(cols).zip(grad.par_chunks(cols)))
        .for_each(|(d, (y, g))| {
            let total: f64 = g.iter().sum();
            for ((d, &y), &g) in d.iter_mut().zip(y).zip(g) {
                *d = g - y.exp() * total;
            }
        });
    dx
}

/// 2×2, stride-2 max-pool over `planes` row-major `h×w` images.
///
/// Returns the pooled values and, per output element, the winning candidate
/// index `Y*2 + X` in `0..4`. Ties go to the lowest index; a NaN candidate
/// beats any number, and the first NaN in a window wins.
pub fn max_pool2x2_raw(x: &[f64], planes: usize, h: usize, w: usize) -> (Vec<f64>, Vec<u8>) {
    let (oh, ow) = (h / 2, w / 2);
    let mut out = vec![0.0; planes * oh * ow];
    let mut idx = vec![0u8; planes * oh * ow];
    out.par_chunks_mut(oh * ow)
        .zip(idx.par_chunks_mut(oh * ow))
        .zip(x.par_chunks(h * w))
        .for_each(|((out, idx), img)| {
            for oy in 0..oh {
                for ox in 0..ow {
                    let at = |k: usize| img[(2 * oy + k / 2) * w + 2 * ox + k % 2];
                    let (mut best, mut best_k) = (at(0), 0);
                    for k in 1..4 {
                        let v = at(k);
                        if v > best || (v.is_nan() && !best.is_nan()) {
                            best = v;
                            best_k = k;
                        }
                    }
                    out[oy * ow + ox] = best;
                    idx[oy * ow + ox] = best_k as u8;
                }
            }
        });
    (out, idx)
}

/// Routes each pooled gradient to the winning position recorded in `idx`.
pub fn max_pool2x2_backward_raw(grad: &[f64], idx: &[u8], planes: usize, h: usize, w: usize) -> Vec<f64> {
    let (oh, ow) = (h / 2, w / 2);
    let mut dx = vec![0.0; planes * h * w];
    dx.par_chunks_mut(h * w)
        .zip(grad.par_chunks(oh * ow).zip(idx.par_chunks(oh * ow)))
        .for_each(|(img, (g, idx))| {
            for oy in 0..oh {
                for ox in 0..ow {
                    let k = usize::from(idx[oy * ow + ox]);
                    img[(2 * oy + k / 2) * w + 2 * ox + k % 2] = g[oy * ow + ox];
                }
            }
        });
    dx
}
