//! Operation registry and forward invocation.
//!
//! # Registry
//!
//! Maps operation names to [`Operation`] descriptors. Registration fails on a
//! duplicate name; nothing is ever overwritten. Once built, a registry is only
//! read, and since every descriptor is `Send + Sync` it can be shared freely
//! between threads.
//!
//! ## Process-wide vs. explicit
//!
//! - [`global`] is built once, on first use, from [`EngineConfig::from_env`]
//!   and is immutable afterwards. [`apply`] and the [`Tensor`] method sugar use it.
//! - [`Registry::new`] / [`Registry::with_defaults`] give isolated instances,
//!   e.g. for tests that register extra operations or pin a conv strategy.
//!
//! ## Invocation
//!
//! [`Registry::apply`] looks the operation up, runs its forward transform on
//! the raw input arrays and wraps the output. If any input requires gradients
//! the output gets a fresh graph node holding the context and one parent slot
//! per input; otherwise the context is dropped on the spot.

use crate::array::Array;
use crate::config::{ConvStrategy, EngineConfig};
use crate::error::{Error, Result};
use crate::function::{FnOperation, Function, Operation, Params};
use crate::functions::{
    Add, Conv2dDirect, Conv2dIm2col, Dot, LogSoftmax, MaxPool2x2, Mul, Relu, Reshape, Sum,
};
use crate::graph::Node;
use crate::tensor::Tensor;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

/// A name → operation table.
pub struct Registry {
    config: EngineConfig,
    ops: HashMap<String, Arc<dyn Operation>>,
}

impl Registry {
    /// An empty registry.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ops: HashMap::new(),
        }
    }

    /// A registry holding every built-in operation, with `conv2d` bound to the
    /// configured strategy.
    pub fn with_defaults(config: EngineConfig) -> Self {
        let mut reg = Self::new(config);
        let direct: Arc<dyn Operation> = Arc::new(Conv2dDirect);
        let im2col: Arc<dyn Operation> = Arc::new(Conv2dIm2col);
        let active = match config.conv {
            ConvStrategy::Direct => Arc::clone(&direct),
            ConvStrategy::PatchMatrix => Arc::clone(&im2col),
        };
        let builtins: [(&str, Arc<dyn Operation>); 11] = [
            ("reshape", Arc::new(Reshape)),
            ("add", Arc::new(Add)),
            ("mul", Arc::new(Mul)),
            ("relu", Arc::new(Relu)),
            ("dot", Arc::new(Dot)),
            ("sum", Arc::new(Sum)),
            ("logsoftmax", Arc::new(LogSoftmax)),
            ("maxpool2x2", Arc::new(MaxPool2x2)),
            (ConvStrategy::Direct.op_name(), direct),
            (ConvStrategy::PatchMatrix.op_name(), im2col),
            ("conv2d", active),
        ];
        for (name, op) in builtins {
            reg.ops.insert(name.to_owned(), op);
        }
        log::debug!(
            "registry built with {} operations, conv2d -> {}",
            reg.ops.len(),
            config.conv.op_name()
        );
        reg
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Installs a shared descriptor under `name`.
    ///
    /// # Errors
    /// [`Error::DuplicateRegistration`] if `name` is taken.
    pub fn register_shared(&mut self, name: &str, op: Arc<dyn Operation>) -> Result<()> {
        if self.ops.contains_key(name) {
            return Err(Error::DuplicateRegistration {
                name: name.to_owned(),
            });
        }
        log::debug!("registered operation `{name}`");
        self.ops.insert(name.to_owned(), op);
        Ok(())
    }

    /// Installs a typed operation under `name`.
    ///
    /// # Errors
    /// [`Error::DuplicateRegistration`] if `name` is taken.
    pub fn register<F: Function>(&mut self, name: &str, function: F) -> Result<()> {
        self.register_shared(name, Arc::new(function))
    }

    /// Installs an operation given as a forward/backward closure pair whose
    /// context is the list of arrays forward returns.
    ///
    /// # Errors
    /// [`Error::DuplicateRegistration`] if `name` is taken.
    pub fn register_fn<Fw, Bw>(
        &mut self,
        name: &str,
        arity: usize,
        forward: Fw,
        backward: Bw,
    ) -> Result<()>
    where
        Fw: Fn(&[&Array], &Params) -> Result<(Array, Vec<Array>)> + Send + Sync + 'static,
        Bw: Fn(&[Array], &Array, &[bool]) -> Result<Vec<Option<Array>>> + Send + Sync + 'static,
    {
        self.register(name, FnOperation::new(arity, forward, backward))
    }

    /// # Errors
    /// [`Error::UnknownOperation`] if nothing is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Operation>> {
        self.ops
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownOperation {
                name: name.to_owned(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs `name` forward on `inputs` and records the call in the graph.
    ///
    /// # Errors
    /// [`Error::UnknownOperation`], [`Error::ArityMismatch`], or whatever the
    /// operation's forward reports (typically [`Error::ShapeMismatch`]). No
    /// node is created on failure.
    pub fn apply(&self, name: &str, inputs: &[&Tensor], params: Params) -> Result<Tensor> {
        let op = self.lookup(name)?;
        if inputs.len() != op.arity() {
            return Err(Error::ArityMismatch {
                op: name.to_owned(),
                expected: op.arity(),
                got: inputs.len(),
            });
        }

        let arrays: Vec<&Array> = inputs.iter().map(|t| t.value()).collect();
        let (out, ctx) = op.forward(&arrays, &params)?;

        let parents: Vec<_> = inputs.iter().map(|t| t.node().cloned()).collect();
        if parents.iter().all(Option::is_none) {
            return Ok(Tensor::new(out));
        }
        let node = Node::op(name, op, ctx, parents, out.shape().to_vec());
        Ok(Tensor::from_parts(out, Some(node)))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults(EngineConfig::default())
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Registry = Registry::with_defaults(EngineConfig::from_env());
}

/// The process-wide registry.
pub fn global() -> &'static Registry {
    &GLOBAL_REGISTRY
}

/// [`Registry::apply`] on the process-wide registry.
///
/// # Errors
/// See [`Registry::apply`].
pub fn apply(name: &str, inputs: &[&Tensor], params: Params) -> Result<Tensor> {
    global().apply(name, inputs, params)
}
