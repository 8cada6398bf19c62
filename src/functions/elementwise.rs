//! Elementwise operations on same-shaped operands.

use crate::array::Array;
use crate::error::Result;
use crate::function::{Function, Params};

/// `x + y`. Saves nothing; both gradients are the incoming gradient.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl Function for Add {
    type Saved = ();

    fn arity(&self) -> usize {
        2
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, ())> {
        params.expect_none("add")?;
        Ok((inputs[0].zip_map(inputs[1], "add", |a, b| a + b)?, ()))
    }

    fn backward(&self, _: &(), grad: &Array, needs_grad: &[bool]) -> Result<Vec<Option<Array>>> {
        Ok(needs_grad.iter().map(|&n| n.then(|| grad.clone())).collect())
    }
}

/// `x * y` elementwise, differentiated with the product rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl Function for Mul {
    type Saved = (Array, Array);

    fn arity(&self) -> usize {
        2
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Self::Saved)> {
        params.expect_none("mul")?;
        let (x, y) = (inputs[0], inputs[1]);
        let out = x.zip_map(y, "mul", |a, b| a * b)?;
        Ok((out, (x.clone(), y.clone())))
    }

    fn backward(
        &self,
        (x, y): &Self::Saved,
        grad: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        let dx = if needs_grad[0] {
            Some(grad.zip_map(y, "mul", |g, b| g * b)?)
        } else {
            None
        };
        let dy = if needs_grad[1] {
            Some(grad.zip_map(x, "mul", |g, a| g * a)?)
        } else {
            None
        };
        Ok(vec![dx, dy])
    }
}

/// `max(x, 0)`. The gradient is blocked wherever the input was negative.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl Function for Relu {
    type Saved = Array;

    fn arity(&self) -> usize {
        1
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Array)> {
        params.expect_none("relu")?;
        let x = inputs[0];
        Ok((x.map(|v| v.max(0.0)), x.clone()))
    }

    fn backward(&self, input: &Array, grad: &Array, _: &[bool]) -> Result<Vec<Option<Array>>> {
        let dx = grad.zip_map(input, "relu", |g, x| if x < 0.0 { 0.0 } else { g })?;
        Ok(vec![Some(dx)])
    }
}
