//! Built-in differentiable operations.
//!
//! | name            | inputs        | saved                         |
//! |-----------------|---------------|-------------------------------|
//! | `reshape`       | x             | input shape                   |
//! | `add`           | x, y          | nothing                       |
//! | `mul`           | x, y          | both operands                 |
//! | `relu`          | x             | input                         |
//! | `sum`           | x             | input shape                   |
//! | `logsoftmax`    | x `[n, c]`    | output                        |
//! | `dot`           | a, b          | both operands                 |
//! | `conv2d_direct` | x, w          | input and kernel              |
//! | `conv2d_im2col` | x, w          | patch matrix and kernel       |
//! | `maxpool2x2`    | x             | winner indices, input shape   |
//!
//! `conv2d` is an alias chosen by [`EngineConfig`](crate::config::EngineConfig).

mod conv;
mod dot;
mod elementwise;
mod pool;
mod reduce;
mod shape;

pub use conv::{Conv2dDirect, Conv2dIm2col, Conv2dKernelSaved, Conv2dPatchSaved};
pub use dot::Dot;
pub use elementwise::{Add, Mul, Relu};
pub use pool::{MaxPool2x2, PoolSaved};
pub use reduce::{LogSoftmax, Sum};
pub use shape::Reshape;

use crate::array::Array;
use crate::error::{Error, Result};

/// Fails unless the incoming gradient has the forward output's shape.
pub(crate) fn expect_grad_shape(op: &str, grad: &Array, shape: &[usize]) -> Result<()> {
    if grad.shape() == shape {
        Ok(())
    } else {
        Err(Error::shape(
            op,
            format!("gradient {:?} does not match output {:?}", grad.shape(), shape),
        ))
    }
}
