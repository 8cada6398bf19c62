//! Reverse-mode gradient propagation.
//!
//! # Backward Pass
//!
//! 1. Seed the root with `ones` (one-element roots) or the caller's seed.
//! 2. Order the DAG reachable from the root topologically (producers first).
//! 3. Walk it in reverse. Each node dispatches once, after every consumer has
//!    summed its contribution into the node's pending gradient, so fan-out
//!    (e.g. a reused weight) is handled by plain accumulation.
//! 4. Operation nodes call their backward transform with the saved context;
//!    each returned gradient is checked against its parent's shape and summed
//!    into that parent's pending gradient. `None` gradients and parent-less
//!    inputs are skipped.
//! 5. Leaf nodes receive their gradient into the leaf accumulator.
//!
//! ## Failure Atomicity
//!
//! Nothing observable changes until every node has dispatched successfully:
//! leaf deposits and context releases are applied in a final commit step. A
//! failing backward therefore leaves both the gradients and the graph as they
//! were.
//!
//! ## Memory
//!
//! Pending gradients are dropped as soon as their node dispatches. With
//! [`backward`] the saved contexts (im2col patch matrices being the largest)
//! are released when the pass commits; [`backward_retained`] keeps them so
//! the graph can be differentiated again.

use crate::array::Array;
use crate::error::{Error, Result};
use crate::graph::{Node, NodeId, NodeKind};
use crate::tensor::Tensor;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Computes gradients of `root` for every gradient-requiring leaf it depends
/// on, then releases the saved contexts of the traversed graph.
///
/// `seed` defaults to ones for a one-element root.
///
/// # Errors
/// - [`Error::NoGraph`] if `root` carries no graph node
/// - [`Error::NonScalarRoot`] if `root` has several elements and no seed
/// - [`Error::ShapeMismatch`] if the seed or a computed gradient has the wrong shape
/// - [`Error::GraphReleased`] if an earlier pass already released a needed context
pub fn backward(root: &Tensor, seed: Option<&Array>) -> Result<()> {
    run(root, seed, false)
}

/// Like [`backward`] but keeps every saved context alive.
///
/// # Errors
/// Same as [`backward`].
pub fn backward_retained(root: &Tensor, seed: Option<&Array>) -> Result<()> {
    run(root, seed, true)
}

fn initial_gradient(root: &Tensor, seed: Option<&Array>) -> Result<Array> {
    match seed {
        Some(s) if s.shape() == root.shape() => Ok(s.clone()),
        Some(s) => Err(Error::shape(
            "backward",
            format!("seed {:?} does not match root {:?}", s.shape(), root.shape()),
        )),
        None if root.value().numel() == 1 => Ok(Array::ones(root.shape().to_vec())),
        None => Err(Error::NonScalarRoot {
            shape: root.shape().to_vec(),
        }),
    }
}

/// Post-order DFS: every node appears after all of its parents.
fn topo_order(root: &Rc<Node>) -> Vec<Rc<Node>> {
    let mut order = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![(Rc::clone(root), false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        stack.push((Rc::clone(&node), true));
        for parent in node.parents().iter().flatten() {
            if !visited.contains(&parent.id()) {
                stack.push((Rc::clone(parent), false));
            }
        }
    }
    order
}

fn run(root: &Tensor, seed: Option<&Array>, retain_graph: bool) -> Result<()> {
    let root_node = root.node().ok_or(Error::NoGraph)?;
    let seed = initial_gradient(root, seed)?;
    let order = topo_order(root_node);
    log::debug!(
        "backward from {:?}: {} node(s), retain_graph={retain_graph}",
        root_node.op_name().unwrap_or("leaf"),
        order.len()
    );

    let mut pending: HashMap<NodeId, Array> = HashMap::new();
    pending.insert(root_node.id(), seed);
    let mut deposits: Vec<(&Rc<Node>, Array)> = Vec::new();
    let mut dispatched: Vec<&Rc<Node>> = Vec::new();

    for node in order.iter().rev() {
        let Some(grad) = pending.remove(&node.id()) else {
            continue;
        };
        let rec = match node.kind() {
            NodeKind::Leaf { .. } => {
                deposits.push((node, grad));
                continue;
            }
            NodeKind::Op(rec) => rec,
        };
        log::trace!("backward through `{}` (node {})", rec.name, node.id());

        let needs_grad: Vec<bool> = rec.parents.iter().map(Option::is_some).collect();
        let grads = {
            let ctx = rec.ctx.borrow();
            let ctx = ctx.as_ref().ok_or_else(|| Error::GraphReleased {
                op: rec.name.clone(),
            })?;
            rec.op.backward(&rec.name, ctx, &grad, &needs_grad)?
        };
        drop(grad);
        dispatched.push(node);

        if grads.len() != rec.parents.len() {
            return Err(Error::shape(
                rec.name.as_str(),
                format!(
                    "backward produced {} gradient(s) for {} input(s)",
                    grads.len(),
                    rec.parents.len()
                ),
            ));
        }

        for (parent, g) in rec.parents.iter().zip(grads) {
            let (Some(parent), Some(g)) = (parent, g) else {
                continue;
            };
            if g.shape() != parent.shape() {
                return Err(Error::shape(
                    rec.name.as_str(),
                    format!(
                        "gradient {:?} does not match input {:?}",
                        g.shape(),
                        parent.shape()
                    ),
                ));
            }
            match pending.get_mut(&parent.id()) {
                Some(acc) => acc.accumulate(&g)?,
                None => {
                    pending.insert(parent.id(), g);
                }
            }
        }
    }

    for (leaf, grad) in deposits {
        leaf.deposit(grad)?;
    }
    if !retain_graph {
        for node in dispatched {
            if let NodeKind::Op(rec) = node.kind() {
                rec.ctx.borrow_mut().take();
            }
        }
    }
    log::debug!("backward complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array;

    #[test]
    fn constant_has_no_graph() {
        let c = Tensor::new(array!([1.0]));
        assert!(matches!(backward(&c, None), Err(Error::NoGraph)));
    }

    #[test]
    fn non_scalar_root_needs_seed() {
        let x = Tensor::param(array!([1.0, 2.0]));
        let y = x.relu().unwrap();
        assert!(matches!(backward(&y, None), Err(Error::NonScalarRoot { .. })));
        assert!(matches!(
            backward(&y, Some(&array!([1.0, 2.0, 3.0]))),
            Err(Error::ShapeMismatch { .. })
        ));
        backward(&y, Some(&array!([3.0, 4.0]))).unwrap();
        assert_eq!(x.grad().unwrap(), array!([3.0, 4.0]));
    }

    #[test]
    fn leaf_root_receives_seed() {
        let x = Tensor::param(array!([5.0]));
        backward(&x, None).unwrap();
        assert_eq!(x.grad().unwrap(), array!([1.0]));
    }

    #[test]
    fn topo_order_puts_parents_first() {
        let a = Tensor::param(array!([1.0, 2.0]));
        let b = a.relu().unwrap();
        let c = b.mul(&a).unwrap();
        let order = topo_order(c.node().unwrap());
        let pos = |t: &Tensor| {
            let id = t.node().unwrap().id();
            order.iter().position(|n| n.id() == id).unwrap()
        };
        assert_eq!(order.len(), 3);
        assert!(pos(&a) < pos(&b) && pos(&b) < pos(&c));
    }
}
