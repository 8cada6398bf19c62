//! Convolution geometry, patch extraction and patch scatter.
//!
//! # Layout
//!
//! For an input `x: [n, cin, h, w]` and kernel `w: [cout, cin, kh, kw]` (stride 1,
//! no padding) the patch matrix has one row per output position and one column
//! per kernel tap:
//!
//! ```text
//! rows    (b, y, x)      n * oh * ow
//! columns (c, ky, kx)    cin * kh * kw   == w.reshape(cout, -1) column order
//! ```
//!
//! [`col2im`] is the exact adjoint of [`im2col`]: every patch-space value is
//! added back to the input location it was read from, so overlapping windows
//! accumulate. Changing the axis order of one without the other silently
//! corrupts gradients, which is why both are written against the same
//! [`ConvGeometry`] index helpers.

use crate::error::{Error, Result};
use rayon::prelude::*;

/// Sizes of a stride-1, unpadded 2-D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub batch: usize,
    pub cin: usize,
    pub h: usize,
    pub w: usize,
    pub cout: usize,
    pub kh: usize,
    pub kw: usize,
    pub oh: usize,
    pub ow: usize,
}

impl ConvGeometry {
    /// Validates input and kernel shapes.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] (attributed to `op`) if either shape is not 4-D,
    /// the channel counts differ or the kernel exceeds the input.
    pub fn new(op: &str, x: &[usize], k: &[usize]) -> Result<Self> {
        let (&[batch, cin, h, w], &[cout, kcin, kh, kw]) = (x, k) else {
            return Err(Error::shape(
                op,
                format!("expected 4-D input and kernel, got {x:?} and {k:?}"),
            ));
        };
        if cin != kcin {
            return Err(Error::shape(
                op,
                format!("input has {cin} channels but kernel expects {kcin}"),
            ));
        }
        if kh > h || kw > w {
            return Err(Error::shape(
                op,
                format!("kernel {kh}x{kw} is larger than input {h}x{w}"),
            ));
        }
        if [batch, cin, h, w, cout, kh, kw].contains(&0) {
            return Err(Error::shape(op, "zero-sized dimension"));
        }
        Ok(Self {
            batch,
            cin,
            h,
            w,
            cout,
            kh,
            kw,
            oh: h - kh + 1,
            ow: w - kw + 1,
        })
    }

    /// Elements in one flattened patch (`cin * kh * kw`).
    pub const fn patch_len(&self) -> usize {
        self.cin * self.kh * self.kw
    }

    /// Output positions per image (`oh * ow`).
    pub const fn positions(&self) -> usize {
        self.oh * self.ow
    }

    pub const fn input_len(&self) -> usize {
        self.batch * self.cin * self.h * self.w
    }

    pub fn input_shape(&self) -> Vec<usize> {
        vec![self.batch, self.cin, self.h, self.w]
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.batch, self.cout, self.oh, self.ow]
    }

    /// Offset within one image (`[cin, h, w]`) of patch column `col` for the
    /// window anchored at `(y, x)`.
    #[inline]
    fn image_offset(&self, col: usize, y: usize, x: usize) -> usize {
        let kx = col % self.kw;
        let ky = (col / self.kw) % self.kh;
        let c = col / (self.kw * self.kh);
        (c * self.h + y + ky) * self.w + x + kx
    }

    /// Copies the window anchored at `(y, x)` of image `img` into `row`.
    #[inline]
    pub fn gather(&self, img: &[f64], y: usize, x: usize, row: &mut [f64]) {
        for (col, r) in row.iter_mut().enumerate() {
            *r = img[self.image_offset(col, y, x)];
        }
    }

    /// Adds `row` back into the window anchored at `(y, x)` of image `img`.
    #[inline]
    pub fn scatter_add(&self, row: &[f64], y: usize, x: usize, img: &mut [f64]) {
        for (col, &r) in row.iter().enumerate() {
            img[self.image_offset(col, y, x)] += r;
        }
    }
}

/// Patch extraction: `[n, cin, h, w]` → `[n*oh*ow, cin*kh*kw]`.
pub fn im2col(x: &[f64], g: &ConvGeometry) -> Vec<f64> {
    let image = g.cin * g.h * g.w;
    let mut cols = vec![0.0; g.batch * g.positions() * g.patch_len()];
    cols.par_chunks_mut(g.patch_len())
        .enumerate()
        .for_each(|(r, row)| {
            let b = r / g.positions();
            let p = r % g.positions();
            g.gather(&x[b * image..(b + 1) * image], p / g.ow, p % g.ow, row);
        });
    cols
}

/// Patch scatter: the additive adjoint of [`im2col`].
///
/// Parallel over batch elements; every patch of image `b` writes only into
/// image `b`, in a fixed position order.
pub fn col2im(cols: &[f64], g: &ConvGeometry) -> Vec<f64> {
    let image = g.cin * g.h * g.w;
    let per_image = g.positions() * g.patch_len();
    let mut dx = vec![0.0; g.input_len()];
    dx.par_chunks_mut(image)
        .zip(cols.par_chunks(per_image))
        .for_each(|(img, rows)| {
            for (p, row) in rows.chunks(g.patch_len()).enumerate() {
                g.scatter_add(row, p / g.ow, p % g.ow, img);
            }
        });
    dx
}

/// Reorders GEMM output `[(b, y, x), cout]` into `[b, cout, y, x]`.
pub fn rows_to_nchw(rows: &[f64], g: &ConvGeometry) -> Vec<f64> {
    let pos = g.positions();
    let mut out = vec![0.0; g.batch * g.cout * pos];
    out.par_chunks_mut(pos).enumerate().for_each(|(bc, plane)| {
        let (b, co) = (bc / g.cout, bc % g.cout);
        for (p, o) in plane.iter_mut().enumerate() {
            *o = rows[(b * pos + p) * g.cout + co];
        }
    });
    out
}

/// Reorders an output gradient `[b, cout, y, x]` into `[cout, (b, y, x)]`.
pub fn nchw_to_channel_rows(grad: &[f64], g: &ConvGeometry) -> Vec<f64> {
    let pos = g.positions();
    let mut out = vec![0.0; g.cout * g.batch * pos];
    out.par_chunks_mut(g.batch * pos)
        .enumerate()
        .for_each(|(co, row)| {
            for (bp, o) in row.iter_mut().enumerate() {
                let (b, p) = (bp / pos, bp % pos);
                *o = grad[(b * g.cout + co) * pos + p];
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(x: &[usize], k: &[usize]) -> ConvGeometry {
        ConvGeometry::new("conv2d", x, k).unwrap()
    }

    #[test]
    fn geometry_rejects_oversized_kernel_and_channel_mismatch() {
        assert!(ConvGeometry::new("conv2d", &[1, 1, 2, 2], &[1, 1, 3, 3]).is_err());
        assert!(ConvGeometry::new("conv2d", &[1, 2, 4, 4], &[1, 3, 3, 3]).is_err());
        assert!(ConvGeometry::new("conv2d", &[1, 2, 4], &[1, 2, 3, 3]).is_err());
    }

    #[test]
    fn im2col_rows_are_flattened_windows() {
        let g = geometry(&[1, 1, 3, 3], &[1, 1, 2, 2]);
        let x: Vec<f64> = (0..9).map(f64::from).collect();
        let cols = im2col(&x, &g);
        assert_eq!(
            cols,
            vec![
                0.0, 1.0, 3.0, 4.0, //
                1.0, 2.0, 4.0, 5.0, //
                3.0, 4.0, 6.0, 7.0, //
                4.0, 5.0, 7.0, 8.0,
            ]
        );
    }

    #[test]
    fn col2im_counts_window_overlap() {
        let g = geometry(&[1, 1, 3, 3], &[1, 1, 2, 2]);
        let ones = vec![1.0; g.positions() * g.patch_len()];
        assert_eq!(
            col2im(&ones, &g),
            vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]
        );
    }

    #[test]
    fn col2im_is_adjoint_of_im2col() {
        // <im2col(x), c> == <x, col2im(c)>
        let g = geometry(&[2, 2, 4, 5], &[3, 2, 2, 3]);
        let x: Vec<f64> = (0..g.input_len()).map(|i| (i as f64 * 0.37).sin()).collect();
        let c: Vec<f64> = (0..g.batch * g.positions() * g.patch_len())
            .map(|i| (i as f64 * 0.11).cos())
            .collect();
        let lhs: f64 = im2col(&x, &g).iter().zip(&c).map(|(a, b)| a * b).sum();
        let rhs: f64 = x.iter().zip(col2im(&c, &g)).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-9 * lhs.abs().max(1.0));
    }

    #[test]
    fn reorders_are_inverse_layouts() {
        let g = geometry(&[2, 1, 3, 3], &[3, 1, 2, 2]);
        let rows: Vec<f64> = (0..g.batch * g.positions() * g.cout).map(|i| i as f64).collect();
        let nchw = rows_to_nchw(&rows, &g);
        let back = nchw_to_channel_rows(&nchw, &g);
        // back is [cout, (b, p)], rows is [(b, p), cout]
        for co in 0..g.cout {
            for bp in 0..g.batch * g.positions() {
                assert_eq!(back[co * g.batch * g.positions() + bp], rows[bp * g.cout + co]);
            }
        }
    }
}
