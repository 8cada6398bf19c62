//! # Numeric Kernels
//!
//! Raw forward/backward building blocks over flat `f64` buffers. These know
//! nothing about graphs or contexts; the differentiable operations in
//! [`crate::functions`] call into them and decide what to save.
//!
//! ## Submodules
//!
//! - [`cpu`] — matrix product, transpose, row-wise log-softmax and 2×2 max-pool
//! - [`patch`] — convolution geometry plus patch extraction (im2col) and its
//!   exact adjoint, patch scatter (col2im)
//!
//! ## Parallelism
//!
//! Kernels split work with `rayon` so that every output element is written by
//! exactly one task and summed in a fixed order. Results are therefore
//! deterministic regardless of the thread count.

pub mod cpu;
pub mod patch;
