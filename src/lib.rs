//! briny_autograd: a minimal reverse-mode autodiff engine for dense tensors.
//!
//! Differentiable operations live in a registry, each pairing a forward
//! transform with its backward transform. Invoking them on [`tensor::Tensor`]s
//! builds a computation graph on the fly; one call to `backward` then pushes
//! gradients from a scalar loss back to every leaf that asked for one.
//!
//! # Features
//!
//! - Operation registry with typed per-operation saved contexts
//! - Reshape, add, mul, ReLU, sum, row-wise log-softmax, matrix product
//! - 2-D convolution via patch extraction + one matrix product, with a direct
//!   reference implementation selectable by configuration
//! - 2×2 max-pooling that saves only the argmax indices
//! - Cross-entropy with label smoothing and `none`/`sum`/`mean` reductions
//! - `.bpat` persistence for arrays
//!
//! # Modules
//!
//! - [`array`] — raw dense arrays and literal parsing
//! - [`tensor`] — graph-aware tensors and method sugar
//! - [`function`] — the operation contract and typed contexts
//! - [`functions`] — built-in operations
//! - [`registry`] — name → operation table and forward invocation
//! - [`graph`] — graph nodes
//! - [`backprop`] — the backward pass
//! - [`ops`] — numeric kernels (rayon-parallel)
//! - [`config`] — engine configuration
//! - [`loss`] — losses built from registered operations
//! - [`modelio`] — saving and loading arrays
//!
//! # Example
//!
//! ```rust
//! use briny_autograd::{array, tensor::Tensor};
//!
//! let x = Tensor::param(array!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
//! let w = Tensor::param(array!([[1.0], [0.0], [-1.0]]));
//! let loss = x.dot(&w)?.relu()?.sum()?;
//! loss.backward()?;
//! assert_eq!(w.grad().unwrap().shape(), &[3, 1]);
//! # Ok::<(), briny_autograd::Error>(())
//! ```

pub mod array;
pub mod backprop;
pub mod config;
pub mod error;
pub mod function;
pub mod functions;
pub mod graph;
pub mod loss;
pub mod modelio;
pub mod ops;
pub mod registry;
pub mod tensor;

pub use array::Array;
pub use error::{Error, Result};
pub use function::{Function, Operation, Params};
pub use registry::{Registry, apply};
pub use tensor::Tensor;
