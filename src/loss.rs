//! Losses composed from registered operations.
//!
//! Nothing here has a dedicated backward: gradients come from the graph built
//! by the `logsoftmax`, `mul`, `dot`, `reshape` and `sum` calls.

use crate::array::Array;
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use core::str::FromStr;

/// How per-row losses are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Keep one loss per row.
    None,
    Sum,
    Mean,
}

impl FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            other => Err(Error::UnsupportedReduction {
                mode: other.to_owned(),
            }),
        }
    }
}

/// Cross-entropy of row-wise logits `[n, classes]` against target
/// distributions of the same shape.
///
/// Targets are smoothed to `(1 - label_smoothing) * y + label_smoothing / classes`
/// and the loss of a row is `-Σ logsoftmax(x) * y`. `reduction` is `"none"`
/// (shape `[n]`), `"sum"` or `"mean"` (shape `[1]`).
///
/// # Errors
/// [`Error::UnsupportedReduction`] for any other mode, [`Error::ShapeMismatch`]
/// if logits are not 2-D or targets differ in shape.
pub fn cross_entropy(
    logits: &Tensor,
    targets: &Array,
    reduction: &str,
    label_smoothing: f64,
) -> Result<Tensor> {
    let reduction: Reduction = reduction.parse()?;
    let &[n, classes] = logits.shape() else {
        return Err(Error::shape(
            "cross_entropy",
            format!("expected 2-D logits, got {:?}", logits.shape()),
        ));
    };
    if targets.shape() != logits.shape() {
        return Err(Error::shape(
            "cross_entropy",
            format!("targets {:?} vs logits {:?}", targets.shape(), logits.shape()),
        ));
    }

    let scale = match reduction {
        Reduction::Mean => -1.0 / n as f64,
        Reduction::None | Reduction::Sum => -1.0,
    };
    let spread = label_smoothing / classes as f64;
    let weights = Tensor::new(targets.map(|y| ((1.0 - label_smoothing) * y + spread) * scale));
    let weighted = logits.log_softmax()?.mul(&weights)?;

    match reduction {
        Reduction::None => weighted
            .dot(&Tensor::new(Array::ones(vec![classes, 1])))?
            .reshape(&[n]),
        Reduction::Sum | Reduction::Mean => weighted.sum(),
    }
}
