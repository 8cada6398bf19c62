//! Shape-only operations.

use crate::array::Array;
use crate::error::Result;
use crate::function::{Function, Params};

/// Reinterprets the input under `Params::Shape`; the element count must not change.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reshape;

impl Function for Reshape {
    type Saved = Vec<usize>;

    fn arity(&self) -> usize {
        1
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Vec<usize>)> {
        let target = params.expect_shape("reshape")?;
        let x = inputs[0];
        Ok((x.reshape(target)?, x.shape().to_vec()))
    }

    fn backward(
        &self,
        in_shape: &Vec<usize>,
        grad: &Array,
        _: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        Ok(vec![Some(grad.reshape(in_shape.clone())?)])
    }
}
