//! Matrix product.

use super::expect_grad_shape;
use crate::array::Array;
use crate::error::Result;
use crate::function::{Function, Params};
use crate::ops::cpu;

/// `a · b` for `a: [m, k]`, `b: [k, n]`.
///
/// Backward: `da = g · bᵀ`, `db = aᵀ · g`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dot;

impl Function for Dot {
    type Saved = (Array, Array);

    fn arity(&self) -> usize {
        2
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Self::Saved)> {
        params.expect_none("dot")?;
        let (a, b) = (inputs[0], inputs[1]);
        let out = cpu::matmul(a, b)?;
        Ok((out, (a.clone(), b.clone())))
    }

    fn backward(
        &self,
        (a, b): &Self::Saved,
        grad: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        let (m, k, n) = (a.shape()[0], a.shape()[1], b.shape()[1]);
        expect_grad_shape("dot", grad, &[m, n])?;

        let da = needs_grad[0].then(|| {
            let bt = cpu::transpose_raw(b.data(), k, n);
            Array::new(vec![m, k], cpu::matmul_raw(grad.data(), &bt, m, n, k))
        });
        let db = needs_grad[1].then(|| {
            let at = cpu::transpose_raw(a.data(), m, k);
            Array::new(vec![k, n], cpu::matmul_raw(&at, grad.data(), k, m, n))
        });
        Ok(vec![da, db])
    }
}
