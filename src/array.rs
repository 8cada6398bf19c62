//! Dense row-major arrays.
//!
//! # Raw Array Storage
//!
//! [`Array`] is the plain numeric value every kernel reads and writes: a shape
//! plus a flat, row-major buffer. It carries no graph history; that lives on
//! [`crate::tensor::Tensor`].
//!
//! ## Invariants
//! - The shape is fixed at construction; reshaping produces a new array.
//! - `data.len()` always equals the product of the shape.
//!
//! ## Construction
//! - [`Array::new`] for internally computed buffers (panics on a broken invariant)
//! - [`Array::try_new`] / [`Array::parse`] for untrusted input, validated through
//!   `briny` before an array is ever built
//! - The [`array!`](crate::array!) macro for literals in code and tests
//!
//! ## Example
//!
//! ```rust
//! use briny_autograd::array::Array;
//! let a = Array::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(a.shape(), &[2, 3]);
//! ```

use crate::error::{Error, Result};
use briny::prelude::*;
use rayon::prelude::*;

/// An N-dimensional array with a fixed shape and flat row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct Array<T = f64> {
    shape: Vec<usize>,
    data: Vec<T>,
}

/// Untrusted shape/data pair, checked before it becomes an [`Array`].
struct RawArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> Validate for RawArray<T> {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if self.shape.contains(&0) {
            return Err(ValidationError);
        }
        if self.shape.iter().product::<usize>() != self.data.len() {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl<T> Array<T> {
    /// Creates an array from a shape and a flat buffer.
    ///
    /// # Panics
    /// Panics if the number of elements does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Validates and wraps externally supplied data.
    ///
    /// # Errors
    /// [`Error::InvalidData`] if a dimension is zero or the element count
    /// differs from the shape product.
    pub fn try_new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        let (dims, len) = (shape.clone(), data.len());
        let trusted = TrustedData::new(RawArray { shape, data }).map_err(|_| {
            Error::invalid_data(format!(
                "shape {dims:?} does not describe {len} elements with positive dimensions"
            ))
        })?;
        let raw = trusted.into_inner();
        Ok(Self {
            shape: raw.shape,
            data: raw.data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the elements; the shape itself stays fixed.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Reinterprets the buffer under a new shape with the same element count.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the element counts differ.
    pub fn into_reshaped(self, shape: impl Into<Vec<usize>>) -> Result<Self> {
        let shape = shape.into();
        let n: usize = shape.iter().product();
        if n != self.data.len() || shape.contains(&0) {
            return Err(Error::shape(
                "reshape",
                format!("cannot view {:?} as {:?}", self.shape, shape),
            ));
        }
        Ok(Self {
            shape,
            data: self.data,
        })
    }
}

impl<T: Clone> Array<T> {
    /// Array of the given shape with every element set to `value`.
    pub fn full(shape: impl Into<Vec<usize>>, value: T) -> Self {
        let shape = shape.into();
        let n = shape.iter().product();
        Self {
            shape,
            data: vec![value; n],
        }
    }

    /// Copying variant of [`Array::into_reshaped`].
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the element counts differ.
    pub fn reshape(&self, shape: impl Into<Vec<usize>>) -> Result<Self> {
        self.clone().into_reshaped(shape)
    }
}

impl Array {
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn ones(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, 1.0)
    }

    /// A one-element array of shape `[1]`.
    pub fn scalar(value: f64) -> Self {
        Self::new(vec![1], vec![value])
    }

    /// The single value of a one-element array.
    pub fn item(&self) -> Option<f64> {
        (self.data.len() == 1).then(|| self.data[0])
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64 + Sync + Send) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.par_iter().map(|&x| f(x)).collect(),
        }
    }

    /// Combines two same-shaped arrays elementwise.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] (attributed to `op`) if the shapes differ.
    pub fn zip_map(
        &self,
        other: &Self,
        op: &str,
        f: impl Fn(f64, f64) -> f64 + Sync + Send,
    ) -> Result<Self> {
        if self.shape != other.shape {
            return Err(Error::shape(
                op,
                format!("{:?} vs {:?}", self.shape, other.shape),
            ));
        }
        Ok(Self {
            shape: self.shape.clone(),
            data: self
                .data
                .par_iter()
                .zip(other.data.par_iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Adds `other` into `self` in place; used for gradient accumulation.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn accumulate(&mut self, other: &Self) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::shape(
                "accumulate",
                format!("{:?} += {:?}", self.shape, other.shape),
            ));
        }
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(a, &b)| *a += b);
        Ok(())
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Largest absolute elementwise difference, or infinity for different shapes.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        if self.shape != other.shape {
            return f64::INFINITY;
        }
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Elementwise closeness with combined absolute/relative tolerance.
    pub fn allclose(&self, other: &Self, tol: f64) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs())))
    }

    /// Parses a nested numeric literal such as `[[1, 2], [3.5, -4e2]]`.
    ///
    /// A bare number parses to a rank-0 array.
    ///
    /// # Errors
    /// [`Error::InvalidData`] for malformed text, ragged nesting or empty lists.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lit = Literal {
            src: text.as_bytes(),
            pos: 0,
            dims: Vec::new(),
            leaf_depth: None,
            data: Vec::new(),
        };
        lit.value(0)?;
        lit.skip_ws();
        if lit.pos != lit.src.len() {
            return Err(Error::invalid_data(format!(
                "trailing characters at offset {}",
                lit.pos
            )));
        }
        let shape = lit.dims.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
            Error::invalid_data("ragged literal")
        })?;
        Self::try_new(shape, lit.data)
    }
}

/// Recursive-descent reader for nested array literals.
struct Literal<'a> {
    src: &'a [u8],
    pos: usize,
    dims: Vec<Option<usize>>,
    leaf_depth: Option<usize>,
    data: Vec<f64>,
}

impl Literal<'_> {
    fn skip_ws(&mut self) {
        while self.src.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self, depth: usize) -> Result<()> {
        self.skip_ws();
        match self.src.get(self.pos) {
            Some(b'[') => self.list(depth),
            Some(_) => self.number(depth),
            None => Err(Error::invalid_data("unexpected end of literal")),
        }
    }

    fn list(&mut self, depth: usize) -> Result<()> {
        self.pos += 1;
        let mut count = 0;
        loop {
            self.value(depth + 1)?;
            count += 1;
            self.skip_ws();
            match self.src.get(self.pos) {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    return Err(Error::invalid_data(format!(
                        "expected `,` or `]` at offset {}",
                        self.pos
                    )));
                }
            }
        }
        if self.dims.len() <= depth {
            self.dims.resize(depth + 1, None);
        }
        match self.dims[depth] {
            None => self.dims[depth] = Some(count),
            Some(n) if n == count => {}
            Some(_) => return Err(Error::invalid_data("ragged literal")),
        }
        Ok(())
    }

    fn number(&mut self, depth: usize) -> Result<()> {
        if self.leaf_depth.is_some_and(|d| d != depth) {
            return Err(Error::invalid_data("ragged literal"));
        }
        self.leaf_depth = Some(depth);
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || b"+-.eE".contains(c))
        {
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| Error::invalid_data("non-utf8 number"))?;
        let value = token
            .parse::<f64>()
            .map_err(|_| Error::invalid_data(format!("bad number `{token}` at offset {start}")))?;
        self.data.push(value);
        Ok(())
    }
}

/// Defines an [`Array`] from nested literal arrays.
///
/// # Example
/// ```
/// use briny_autograd::array;
/// let a = array!([[1.0, -2.0], [3.0, 4.0]]);
/// assert_eq!(a.shape(), &[2, 2]);
/// ```
#[macro_export]
macro_rules! array {
    ([ $( [ $($row:tt)* ] ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::array!([ $($row)* ]) ),+ ];
        let first = children[0].shape().to_vec();
        assert!(children.iter().all(|c| c.shape() == first.as_slice()),
            "ragged array literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first);
        let mut data = Vec::with_capacity(children.len() * children[0].numel());
        for c in children { data.extend(c.into_data()); }
        $crate::array::Array::new(shape, data)
    }};

    ([ $( $x:expr ),+ $(,)? ]) => {{
        let data: Vec<f64> = vec![ $( $x as f64 ),+ ];
        $crate::array::Array::new(vec![data.len()], data)
    }};

    ($x:expr) => {
        $crate::array::Array::new(Vec::<usize>::new(), vec![$x as f64])
    };
}
