//! 2-D convolution (stride 1, no padding), two interchangeable strategies.
//!
//! Both take `x: [n, cin, h, w]` and `w: [cout, cin, kh, kw]` and produce
//! `[n, cout, h - kh + 1, w - kw + 1]`. They sum over the patch in the same
//! `(c, ky, kx)` order, so their forward outputs agree exactly and their
//! gradients agree up to summation order.

use super::expect_grad_shape;
use crate::array::Array;
use crate::error::Result;
use crate::function::{Function, Params};
use crate::ops::cpu::{matmul_raw, transpose_raw};
use crate::ops::patch::{self, ConvGeometry};

/// Saved state of [`Conv2dDirect`].
#[derive(Debug, Clone)]
pub struct Conv2dKernelSaved {
    pub input: Array,
    pub weight: Array,
    pub geometry: ConvGeometry,
}

/// Saved state of [`Conv2dIm2col`]. The patch matrix dominates its size.
#[derive(Debug, Clone)]
pub struct Conv2dPatchSaved {
    pub cols: Vec<f64>,
    pub weight: Array,
    pub geometry: ConvGeometry,
}

/// Reference strategy: one small product per output position.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conv2dDirect;

impl Function for Conv2dDirect {
    type Saved = Conv2dKernelSaved;

    fn arity(&self) -> usize {
        2
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Self::Saved)> {
        params.expect_none("conv2d_direct")?;
        let (x, w) = (inputs[0], inputs[1]);
        let g = ConvGeometry::new("conv2d_direct", x.shape(), w.shape())?;
        let (k, image) = (g.patch_len(), g.cin * g.h * g.w);
        let tw = transpose_raw(w.data(), g.cout, k);

        let mut out = vec![0.0; g.batch * g.cout * g.positions()];
        let mut patch = vec![0.0; g.batch * k];
        for y in 0..g.oh {
            for xx in 0..g.ow {
                for (b, row) in patch.chunks_mut(k).enumerate() {
                    g.gather(&x.data()[b * image..(b + 1) * image], y, xx, row);
                }
                let res = matmul_raw(&patch, &tw, g.batch, k, g.cout);
                for b in 0..g.batch {
                    for co in 0..g.cout {
                        out[((b * g.cout + co) * g.oh + y) * g.ow + xx] = res[b * g.cout + co];
                    }
                }
            }
        }

        let saved = Conv2dKernelSaved {
            input: x.clone(),
            weight: w.clone(),
            geometry: g,
        };
        Ok((Array::new(g.output_shape(), out), saved))
    }

    fn backward(
        &self,
        saved: &Self::Saved,
        grad: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        let g = saved.geometry;
        expect_grad_shape("conv2d_direct", grad, &g.output_shape())?;
        let (k, image) = (g.patch_len(), g.cin * g.h * g.w);
        let x = saved.input.data();
        let w = saved.weight.data();

        let mut dx = vec![0.0; g.input_len()];
        let mut dw = vec![0.0; g.cout * k];
        let mut patch = vec![0.0; g.batch * k];
        let mut gg = vec![0.0; g.batch * g.cout];
        for y in 0..g.oh {
            for xx in 0..g.ow {
                for b in 0..g.batch {
                    for co in 0..g.cout {
                        gg[b * g.cout + co] = grad.data()[((b * g.cout + co) * g.oh + y) * g.ow + xx];
                    }
                }
                if needs_grad[1] {
                    for (b, row) in patch.chunks_mut(k).enumerate() {
                        g.gather(&x[b * image..(b + 1) * image], y, xx, row);
                    }
                    let ggt = transpose_raw(&gg, g.batch, g.cout);
                    let step = matmul_raw(&ggt, &patch, g.cout, g.batch, k);
                    for (d, s) in dw.iter_mut().zip(step) {
                        *d += s;
                    }
                }
                if needs_grad[0] {
                    let dpatch = matmul_raw(&gg, w, g.batch, g.cout, k);
                    for (b, row) in dpatch.chunks(k).enumerate() {
                        g.scatter_add(row, y, xx, &mut dx[b * image..(b + 1) * image]);
                    }
                }
            }
        }

        Ok(vec![
            needs_grad[0].then(|| Array::new(g.input_shape(), dx)),
            needs_grad[1].then(|| Array::new(saved.weight.shape().to_vec(), dw)),
        ])
    }
}

/// Patch-matrix strategy: im2col, one GEMM, reorder; col2im on the way back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conv2dIm2col;

impl Function for Conv2dIm2col {
    type Saved = Conv2dPatchSaved;

    fn arity(&self) -> usize {
        2
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Self::Saved)> {
        params.expect_none("conv2d_im2col")?;
        let (x, w) = (inputs[0], inputs[1]);
        let g = ConvGeometry::new("conv2d_im2col", x.shape(), w.shape())?;
        let k = g.patch_len();
        let rows = g.batch * g.positions();

        let cols = patch::im2col(x.data(), &g);
        let tw = transpose_raw(w.data(), g.cout, k);
        let gemm = matmul_raw(&cols, &tw, rows, k, g.cout);
        let out = Array::new(g.output_shape(), patch::rows_to_nchw(&gemm, &g));

        let saved = Conv2dPatchSaved {
            cols,
            weight: w.clone(),
            geometry: g,
        };
        Ok((out, saved))
    }

    fn backward(
        &self,
        saved: &Self::Saved,
        grad: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        let g = saved.geometry;
        expect_grad_shape("conv2d_im2col", grad, &g.output_shape())?;
        let k = g.patch_len();
        let rows = g.batch * g.positions();

        // [cout, (b, y, x)]
        let ggt = patch::nchw_to_channel_rows(grad.data(), &g);

        let dw = needs_grad[1].then(|| {
            let dw = matmul_raw(&ggt, &saved.cols, g.cout, rows, k);
            Array::new(saved.weight.shape().to_vec(), dw)
        });
        let dx = needs_grad[0].then(|| {
            let gg = transpose_raw(&ggt, g.cout, rows);
            let dcols = matmul_raw(&gg, saved.weight.data(), rows, g.cout, k);
            Array::new(g.input_shape(), patch::col2im(&dcols, &g))
        });
        Ok(vec![dx, dw])
    }
}
