//! The differentiable-operation contract.
//!
//! # Typed Contexts
//!
//! An operation implements [`Function`] and names the exact record its backward
//! pass needs as `Function::Saved`. Forward returns that record alongside the
//! output, so a context is written exactly once per call and its shape is known
//! at compile time.
//!
//! The registry stores operations as `Arc<dyn Operation>`; [`Operation`] is the
//! object-safe, type-erased face of every [`Function`], with the saved record
//! boxed into a [`Context`].
//!
//! ## Gradient Placeholders
//!
//! Backward returns one `Option<Array>` per tensor input. `None` means "no
//! gradient" (a non-differentiable argument, or an input whose `needs_grad`
//! flag was false and was skipped).

use crate::array::Array;
use crate::error::{Error, Result};
use std::any::Any;
use std::fmt;

/// Non-tensor parameters of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Params {
    #[default]
    None,
    /// Target shape, e.g. for `reshape`.
    Shape(Vec<usize>),
}

impl Params {
    /// Rejects any parameter for operations that take none.
    ///
    /// # Errors
    /// [`Error::InvalidParams`] if parameters were supplied.
    pub fn expect_none(&self, op: &str) -> Result<()> {
        match self {
            Self::None => Ok(()),
            _ => Err(Error::InvalidParams {
                op: op.to_owned(),
                expected: "no parameters",
            }),
        }
    }

    /// The target shape.
    ///
    /// # Errors
    /// [`Error::InvalidParams`] if no shape was supplied.
    pub fn expect_shape(&self, op: &str) -> Result<&[usize]> {
        match self {
            Self::Shape(s) => Ok(s),
            _ => Err(Error::InvalidParams {
                op: op.to_owned(),
                expected: "a target shape",
            }),
        }
    }
}

impl From<Vec<usize>> for Params {
    fn from(shape: Vec<usize>) -> Self {
        Self::Shape(shape)
    }
}

impl From<&[usize]> for Params {
    fn from(shape: &[usize]) -> Self {
        Self::Shape(shape.to_vec())
    }
}

/// A differentiable operation with a statically typed saved-state record.
pub trait Function: Send + Sync + 'static {
    /// What forward keeps for backward.
    type Saved: 'static;

    /// Number of tensor inputs.
    fn arity(&self) -> usize;

    /// Computes the output and the record backward will need.
    ///
    /// # Errors
    /// Shape or parameter errors; nothing is recorded on failure.
    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Self::Saved)>;

    /// Maps the gradient at the output to one gradient slot per input.
    ///
    /// # Errors
    /// Shape errors if `grad_output` does not match the forward output.
    fn backward(
        &self,
        saved: &Self::Saved,
        grad_output: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>>;
}

/// Type-erased saved state owned by one graph node.
pub struct Context(Box<dyn Any>);

impl Context {
    pub fn new<T: 'static>(saved: T) -> Self {
        Self(Box::new(saved))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Context(..)")
    }
}

/// Object-safe operation descriptor stored in the registry.
pub trait Operation: Send + Sync {
    fn arity(&self) -> usize;

    /// Forward transform, returning the output and its boxed context.
    ///
    /// # Errors
    /// Whatever the underlying [`Function::forward`] reports.
    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Context)>;

    /// Backward transform over a context produced by this operation's forward.
    ///
    /// # Errors
    /// [`Error::ContextMismatch`] if `ctx` belongs to another operation, plus
    /// whatever [`Function::backward`] reports.
    fn backward(
        &self,
        name: &str,
        ctx: &Context,
        grad_output: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>>;
}

impl<F: Function> Operation for F {
    fn arity(&self) -> usize {
        Function::arity(self)
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Context)> {
        let (out, saved) = Function::forward(self, inputs, params)?;
        Ok((out, Context::new(saved)))
    }

    fn backward(
        &self,
        name: &str,
        ctx: &Context,
        grad_output: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        let saved = ctx
            .downcast_ref::<F::Saved>()
            .ok_or_else(|| Error::ContextMismatch {
                op: name.to_owned(),
            })?;
        Function::backward(self, saved, grad_output, needs_grad)
    }
}

/// Forward closure of a closure-defined operation: output plus saved arrays.
pub type ForwardFn = dyn Fn(&[&Array], &Params) -> Result<(Array, Vec<Array>)> + Send + Sync;

/// Backward closure of a closure-defined operation.
pub type BackwardFn =
    dyn Fn(&[Array], &Array, &[bool]) -> Result<Vec<Option<Array>>> + Send + Sync;

/// An operation built from a forward/backward closure pair.
///
/// Its context is the ordered list of arrays forward chose to save. Meant for
/// extending a registry at test time without writing a dedicated type.
pub struct FnOperation {
    arity: usize,
    forward: Box<ForwardFn>,
    backward: Box<BackwardFn>,
}

impl FnOperation {
    pub fn new<Fw, Bw>(arity: usize, forward: Fw, backward: Bw) -> Self
    where
        Fw: Fn(&[&Array], &Params) -> Result<(Array, Vec<Array>)> + Send + Sync + 'static,
        Bw: Fn(&[Array], &Array, &[bool]) -> Result<Vec<Option<Array>>> + Send + Sync + 'static,
    {
        Self {
            arity,
            forward: Box::new(forward),
            backward: Box::new(backward),
        }
    }
}

impl Function for FnOperation {
    type Saved = Vec<Array>;

    fn arity(&self) -> usize {
        self.arity
    }

    fn forward(&self, inputs: &[&Array], params: &Params) -> Result<(Array, Vec<Array>)> {
        (self.forward)(inputs, params)
    }

    fn backward(
        &self,
        saved: &Vec<Array>,
        grad_output: &Array,
        needs_grad: &[bool],
    ) -> Result<Vec<Option<Array>>> {
        (self.backward)(saved, grad_output, needs_grad)
    }
}
