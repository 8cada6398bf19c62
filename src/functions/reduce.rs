//! Reductions and row-wise normalisation.

use super::expect_grad_shape;
use crate::array::Array;
use crate::error::{Error, Result};
use crate::function::{Function, Params};
use crate::ops::cpu;

/// Sums every element into a one-element array of shape `[1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Function for Sum {
    type Saved = Vec<usize>;

    fn arity(&self) -> usize {
        1
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Vec<usize>)> {
        params.expect_none("sum")?;
        let x = inputs[0];
        Ok((Array::scalar(x.sum()), x.shape().to_vec()))
    }

    fn backward(
        &self,
        shape: &Vec<usize>,
        grad: &Array,
        _: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        let g = grad.item().ok_or_else(|| {
            Error::shape("sum", format!("expected a one-element gradient, got {:?}", grad.shape()))
        })?;
        Ok(vec![Some(Array::full(shape.clone(), g))])
    }
}

/// Log-softmax over axis 1 of a 2-D input. Saves only the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSoftmax;

impl Function for LogSoftmax {
    type Saved = Array;

    fn arity(&self) -> usize {
        1
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Array)> {
        params.expect_none("logsoftmax")?;
        let x = inputs[0];
        let (rows, cols) = match *x.shape() {
            [rows, cols] if rows > 0 && cols > 0 => (rows, cols),
            _ => {
                return Err(Error::shape(
                    "logsoftmax",
                    format!("expected a non-empty 2-D input, got {:?}", x.shape()),
                ));
            }
        };
        let out = Array::new(vec![rows, cols], cpu::log_softmax_raw(x.data(), cols));
        Ok((out.clone(), out))
    }

    fn backward(&self, out: &Array, grad: &Array, _: &[bool]) -> Result<Vec<Option<Array>>> {
        expect_grad_shape("logsoftmax", grad, out.shape())?;
        let cols = out.shape()[1];
        let dx = cpu::log_softmax_backward_raw(out.data(), grad.data(), cols);
        Ok(vec![Some(Array::new(out.shape().to_vec(), dx))])
    }
}
