//! Non-overlapping 2×2 max-pooling.

use super::expect_grad_shape;
use crate::array::Array;
use crate::error::{Error, Result};
use crate::function::{Function, Params};
use crate::ops::cpu;

/// Winner indices (`Y*2 + X` per output element) and the input shape.
#[derive(Debug, Clone)]
pub struct PoolSaved {
    pub winners: Vec<u8>,
    pub in_shape: Vec<usize>,
}

/// 2×2, stride-2 max-pool over `[n, c, h, w]` with even `h` and `w`.
///
/// Only the argmax indices are saved. Ties resolve to the lowest candidate
/// index, and the whole gradient goes to that one position.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxPool2x2;

impl Function for MaxPool2x2 {
    type Saved = PoolSaved;

    fn arity(&self) -> usize {
        1
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, PoolSaved)> {
        params.expect_none("maxpool2x2")?;
        let x = inputs[0];
        let &[n, c, h, w] = x.shape() else {
            return Err(Error::shape(
                "maxpool2x2",
                format!("expected a 4-D input, got {:?}", x.shape()),
            ));
        };
        if n * c == 0 || h == 0 || w == 0 || h % 2 != 0 || w % 2 != 0 {
            return Err(Error::shape(
                "maxpool2x2",
                format!("spatial dims {h}x{w} must be positive and even"),
            ));
        }
        let (out, winners) = cpu::max_pool2x2_raw(x.data(), n * c, h, w);
        let saved = PoolSaved {
            winners,
            in_shape: x.shape().to_vec(),
        };
        Ok((Array::new(vec![n, c, h / 2, w / 2], out), saved))
    }

    fn backward(&self, saved: &PoolSaved, grad: &Array, _: &[bool]) -> Result<Vec<Option<Array>>> {
        let &[n, c, h, w] = saved.in_shape.as_slice() else {
            unreachable!("forward only saves 4-D shapes");
        };
        expect_grad_shape("maxpool2x2", grad, &[n, c, h / 2, w / 2])?;
        let dx = cpu::max_pool2x2_backward_raw(grad.data(), &saved.winners, n * c, h, w);
        Ok(vec![Some(Array::new(saved.in_shape.clone(), dx))])
    }
}
