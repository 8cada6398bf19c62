//! Graph-aware tensors.
//!
//! A [`Tensor`] is an immutable [`Array`] plus, optionally, the [`Node`] that
//! records where it came from:
//!
//! - constants carry no node and never receive gradients
//! - gradient-requiring leaves carry a leaf node holding their accumulator
//! - outputs of an operation carry an operation node whenever at least one
//!   input required gradients
//!
//! Cloning a tensor is cheap; clones share the value and the node, and
//! therefore the gradient.
//!
//! ## Example
//!
//! ```rust
//! use briny_autograd::{array, tensor::Tensor};
//!
//! let x = Tensor::param(array!([[1.0, 2.0], [3.0, 4.0]]));
//! let loss = x.mul(&x).unwrap().sum().unwrap();
//! loss.backward().unwrap();
//! assert_eq!(x.grad().unwrap(), array!([[2.0, 4.0], [6.0, 8.0]]));
//! ```

use crate::array::Array;
use crate::backprop;
use crate::error::Result;
use crate::function::Params;
use crate::graph::Node;
use crate::registry;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub struct Tensor {
    value: Rc<Array>,
    node: Option<Rc<Node>>,
}

impl Tensor {
    /// A constant: no history, no gradient.
    pub fn new(value: Array) -> Self {
        Self {
            value: Rc::new(value),
            node: None,
        }
    }

    /// A leaf that accumulates a gradient during backward.
    pub fn param(value: Array) -> Self {
        let node = Node::leaf(value.shape().to_vec());
        Self {
            value: Rc::new(value),
            node: Some(node),
        }
    }

    pub fn leaf(value: Array, requires_grad: bool) -> Self {
        if requires_grad {
            Self::param(value)
        } else {
            Self::new(value)
        }
    }

    pub(crate) fn from_parts(value: Array, node: Option<Rc<Node>>) -> Self {
        Self {
            value: Rc::new(value),
            node,
        }
    }

    pub fn value(&self) -> &Array {
        &self.value
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// The graph node behind this tensor, if any.
    pub fn node(&self) -> Option<&Rc<Node>> {
        self.node.as_ref()
    }

    pub fn requires_grad(&self) -> bool {
        self.node.is_some()
    }

    /// True for constants and gradient-requiring leaves.
    pub fn is_leaf(&self) -> bool {
        self.node.as_ref().is_none_or(|n| n.is_leaf())
    }

    /// Name of the operation that produced this tensor.
    pub fn op_name(&self) -> Option<&str> {
        self.node.as_ref().and_then(|n| n.op_name())
    }

    /// The accumulated gradient of a leaf, if any contribution has arrived.
    pub fn grad(&self) -> Option<Array> {
        self.node.as_ref().and_then(|n| n.grad())
    }

    /// Removes and returns the accumulated gradient.
    pub fn take_grad(&self) -> Option<Array> {
        self.node.as_ref().and_then(|n| n.take_grad())
    }

    pub fn zero_grad(&self) {
        self.take_grad();
    }

    /// Same value, cut off from any history.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            node: None,
        }
    }

    /// Backward from a one-element tensor, releasing saved contexts afterwards.
    ///
    /// # Errors
    /// See [`backprop::backward`].
    pub fn backward(&self) -> Result<()> {
        backprop::backward(self, None)
    }

    /// Backward with an explicit seed gradient, optionally keeping the graph
    /// differentiable for another pass.
    ///
    /// # Errors
    /// See [`backprop::backward`].
    pub fn backward_with(&self, seed: Option<&Array>, retain_graph: bool) -> Result<()> {
        if retain_graph {
            backprop::backward_retained(self, seed)
        } else {
            backprop::backward(self, seed)
        }
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        registry::apply("reshape", &[self], Params::from(shape))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(&self, other: &Self) -> Result<Self> {
        registry::apply("add", &[self, other], Params::None)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(&self, other: &Self) -> Result<Self> {
        registry::apply("mul", &[self, other], Params::None)
    }

    pub fn relu(&self) -> Result<Self> {
        registry::apply("relu", &[self], Params::None)
    }

    pub fn dot(&self, other: &Self) -> Result<Self> {
        registry::apply("dot", &[self, other], Params::None)
    }

    pub fn sum(&self) -> Result<Self> {
        registry::apply("sum", &[self], Params::None)
    }

    pub fn log_softmax(&self) -> Result<Self> {
        registry::apply("logsoftmax", &[self], Params::None)
    }

    /// Convolution with the globally configured strategy.
    pub fn conv2d(&self, weight: &Self) -> Result<Self> {
        registry::apply("conv2d", &[self, weight], Params::None)
    }

    pub fn max_pool2x2(&self) -> Result<Self> {
        registry::apply("maxpool2x2", &[self], Params::None)
    }
}

impl From<Array> for Tensor {
    fn from(value: Array) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad())
            .field("op", &self.op_name())
            .finish()
    }
}
