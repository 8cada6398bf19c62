//! Computation-graph nodes.
//!
//! A [`Node`] is either a gradient-requiring leaf, which owns the leaf's
//! gradient accumulator, or the record of one forward invocation: operation,
//! saved context and parent links. Parent links point only at producers, so
//! the graph is a DAG kept alive by reference counts from the tensors that
//! still refer to it.
//!
//! Node ids are handed out from a process-wide counter, which means a node's
//! parents always carry smaller ids than the node itself.

use crate::array::Array;
use crate::error::Result;
use crate::function::{Context, Operation};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Unique, creation-ordered node identifier.
pub type NodeId = usize;

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// One forward invocation recorded in the graph.
pub struct OpRecord {
    pub name: String,
    pub op: Arc<dyn Operation>,
    /// `None` once a non-retaining backward pass has released it.
    pub ctx: RefCell<Option<Context>>,
    /// One entry per tensor input; `None` marks an input that needs no gradient.
    pub parents: Vec<Option<Rc<Node>>>,
}

/// Unlinks ancestors iteratively so dropping a long chain does not recurse
/// once per node. Only parents this record held the last reference to are
/// taken apart; shared ones are left to their other owners.
impl Drop for OpRecord {
    fn drop(&mut self) {
        let mut stack: Vec<Rc<Node>> = self.parents.drain(..).flatten().collect();
        while let Some(node) = stack.pop() {
            if let Some(mut node) = Rc::into_inner(node) {
                if let NodeKind::Op(rec) = &mut node.kind {
                    stack.extend(rec.parents.drain(..).flatten());
                }
            }
        }
    }
}

pub enum NodeKind {
    Leaf { grad: RefCell<Option<Array>> },
    Op(OpRecord),
}

/// A vertex of the differentiable history DAG.
pub struct Node {
    id: NodeId,
    shape: Vec<usize>,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn leaf(shape: Vec<usize>) -> Rc<Self> {
        Rc::new(Self {
            id: next_id(),
            shape,
            kind: NodeKind::Leaf {
                grad: RefCell::new(None),
            },
        })
    }

    pub(crate) fn op(
        name: &str,
        op: Arc<dyn Operation>,
        ctx: Context,
        parents: Vec<Option<Rc<Node>>>,
        shape: Vec<usize>,
    ) -> Rc<Self> {
        let id = next_id();
        debug_assert!(parents.iter().flatten().all(|p| p.id < id));
        Rc::new(Self {
            id,
            shape,
            kind: NodeKind::Op(OpRecord {
                name: name.to_owned(),
                op,
                ctx: RefCell::new(Some(ctx)),
                parents,
            }),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Shape of the tensor this node produced (or represents, for leaves).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn op_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Op(rec) => Some(&rec.name),
            NodeKind::Leaf { .. } => None,
        }
    }

    pub fn parents(&self) -> &[Option<Rc<Node>>] {
        match &self.kind {
            NodeKind::Op(rec) => &rec.parents,
            NodeKind::Leaf { .. } => &[],
        }
    }

    /// Whether this node still holds its saved context (always true for leaves).
    pub fn has_context(&self) -> bool {
        match &self.kind {
            NodeKind::Op(rec) => rec.ctx.borrow().is_some(),
            NodeKind::Leaf { .. } => true,
        }
    }

    /// Adds a gradient contribution into a leaf's accumulator, creating it on
    /// first use. A no-op for operation nodes.
    pub(crate) fn deposit(&self, grad: Array) -> Result<()> {
        if let NodeKind::Leaf { grad: slot } = &self.kind {
            let mut slot = slot.borrow_mut();
            match slot.as_mut() {
                Some(acc) => acc.accumulate(&grad)?,
                None => *slot = Some(grad),
            }
        }
        Ok(())
    }

    pub(crate) fn grad(&self) -> Option<Array> {
        match &self.kind {
            NodeKind::Leaf { grad } => grad.borrow().clone(),
            NodeKind::Op(_) => None,
        }
    }

    pub(crate) fn take_grad(&self) -> Option<Array> {
        match &self.kind {
            NodeKind::Leaf { grad } => grad.borrow_mut().take(),
            NodeKind::Op(_) => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("id", &self.id).field("shape", &self.shape);
        match &self.kind {
            NodeKind::Leaf { .. } => s.field("kind", &"leaf"),
            NodeKind::Op(rec) => s.field("op", &rec.name).field(
                "parents",
                &rec.parents
                    .iter()
                    .map(|p| p.as_ref().map(|p| p.id))
                    .collect::<Vec<_>>(),
            ),
        };
        s.finish()
    }
}
