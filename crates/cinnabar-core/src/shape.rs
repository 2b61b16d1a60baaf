//! Tensor shapes: element type, dimension lengths, and strides.
//!
//! A `Shape` describes how a tensor's elements are laid out in its buffer.
//! The *standard* layout is densely packed row-major; non-trivial layouts
//! (broadcasts, transposes) are expressed purely through strides, so view
//! operations never need to touch the underlying data.

use crate::{Error, Result};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    F32,
    I64,
    I32,
    U8,
    Bool,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::F32 | DataType::I32 => 4,
            DataType::I64 => 8,
            DataType::U8 | DataType::Bool => 1,
        }
    }
}

/// Immutable tensor shape: element type, dimension lengths, and one stride
/// per dimension.
///
/// Invariant: `strides.len() == lens.len()`. A shape with no dimensions is a
/// scalar and counts as standard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    dtype: DataType,
    lens: Vec<usize>,
    strides: Vec<usize>,
}

/// Row-major strides for densely packed dimensions.
fn packed_strides(lens: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; lens.len()];
    for i in (0..lens.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * lens[i + 1];
    }
    strides
}

impl Shape {
    /// Create a standard (packed, row-major) shape.
    pub fn new(dtype: DataType, lens: Vec<usize>) -> Self {
        let strides = packed_strides(&lens);
        Self {
            dtype,
            lens,
            strides,
        }
    }

    /// Create a shape with explicit strides.
    ///
    /// # Errors
    ///
    /// Returns a shape error if `strides` and `lens` differ in length.
    pub fn with_strides(dtype: DataType, lens: Vec<usize>, strides: Vec<usize>) -> Result<Self> {
        if lens.len() != strides.len() {
            return Err(Error::Shape(format!(
                "lens {:?} and strides {:?} must have the same rank",
                lens, strides
            )));
        }
        Ok(Self {
            dtype,
            lens,
            strides,
        })
    }

    /// Create a scalar shape (rank 0).
    pub fn scalar(dtype: DataType) -> Self {
        Self::new(dtype, Vec::new())
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn lens(&self) -> &[usize] {
        &self.lens
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.lens.len()
    }

    /// Number of logical elements.
    pub fn elements(&self) -> usize {
        self.lens.iter().product()
    }

    /// Number of buffer elements the shape can address: the highest offset
    /// reachable through the strides, plus one. Smaller than `elements()`
    /// for broadcast layouts.
    pub fn element_space(&self) -> usize {
        if self.elements() == 0 {
            return 0;
        }
        self.lens
            .iter()
            .zip(&self.strides)
            .map(|(&l, &s)| (l - 1) * s)
            .sum::<usize>()
            + 1
    }

    /// Buffer size in bytes required to back this shape.
    pub fn bytes(&self) -> usize {
        self.element_space() * self.dtype.size_bytes()
    }

    /// Buffer offset (in elements) of a multi-dimensional index.
    pub fn index(&self, idx: &[usize]) -> usize {
        idx.iter().zip(&self.strides).map(|(&i, &s)| i * s).sum()
    }

    /// Whether the layout is canonical row-major and densely packed.
    pub fn standard(&self) -> bool {
        self.strides == packed_strides(&self.lens)
    }

    /// Whether some element is repeated through a zero stride.
    pub fn broadcasted(&self) -> bool {
        self.lens
            .iter()
            .zip(&self.strides)
            .any(|(&l, &s)| s == 0 && l > 1)
    }

    /// Whether the layout is a non-trivial permutation of the standard
    /// layout: not standard, no zero strides, but some reordering of the
    /// dimensions is packed row-major.
    pub fn transposed(&self) -> bool {
        if self.standard() || self.broadcasted() {
            return false;
        }
        let mut perm: Vec<usize> = (0..self.ndim()).collect();
        perm.sort_by(|&a, &b| self.strides[b].cmp(&self.strides[a]));
        let sorted_lens: Vec<usize> = perm.iter().map(|&i| self.lens[i]).collect();
        let sorted_strides: Vec<usize> = perm.iter().map(|&i| self.strides[i]).collect();
        sorted_strides == packed_strides(&sorted_lens)
    }

    /// The standard shape with the same element type and lengths.
    pub fn normalize(&self) -> Shape {
        Shape::new(self.dtype, self.lens.clone())
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}{{{:?}}}", self.dtype, self.lens, self.strides)
    }
}

/// Call `f` with every multi-dimensional index of `lens`, in row-major order.
pub fn for_each_index(lens: &[usize], mut f: impl FnMut(&[usize])) {
    if lens.iter().any(|&l| l == 0) {
        return;
    }
    let mut idx = vec![0usize; lens.len()];
    loop {
        f(&idx);
        let mut dim = lens.len();
        loop {
            if dim == 0 {
                return;
            }
            dim -= 1;
            idx[dim] += 1;
            if idx[dim] < lens[dim] {
                break;
            }
            idx[dim] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_strides() {
        let s = Shape::new(DataType::F32, vec![2, 3, 4]);
        assert_eq!(s.strides(), &[12, 4, 1]);
        assert!(s.standard());
        assert!(!s.broadcasted());
        assert!(!s.transposed());
        assert_eq!(s.elements(), 24);
        assert_eq!(s.element_space(), 24);
        assert_eq!(s.bytes(), 96);
    }

    #[test]
    fn test_scalar_is_standard() {
        let s = Shape::scalar(DataType::F32);
        assert!(s.standard());
        assert_eq!(s.elements(), 1);
        assert_eq!(s.index(&[]), 0);
    }

    #[test]
    fn test_transposed_layout() {
        // [2, 3] transposed to [3, 2]: lens [3, 2], strides [1, 3]
        let s = Shape::with_strides(DataType::F32, vec![3, 2], vec![1, 3]).unwrap();
        assert!(!s.standard());
        assert!(!s.broadcasted());
        assert!(s.transposed());
        assert_eq!(s.element_space(), 6);
    }

    #[test]
    fn test_broadcast_layout() {
        let s = Shape::with_strides(DataType::F32, vec![2, 2], vec![0, 1]).unwrap();
        assert!(!s.standard());
        assert!(s.broadcasted());
        assert!(!s.transposed());
        assert_eq!(s.elements(), 4);
        assert_eq!(s.element_space(), 2);
    }

    #[test]
    fn test_index() {
        let s = Shape::with_strides(DataType::F32, vec![2, 2], vec![1, 2]).unwrap();
        assert_eq!(s.index(&[0, 1]), 2);
        assert_eq!(s.index(&[1, 0]), 1);
    }

    #[test]
    fn test_with_strides_rank_mismatch() {
        assert!(Shape::with_strides(DataType::F32, vec![2, 2], vec![1]).is_err());
    }

    #[test]
    fn test_for_each_index_row_major() {
        let mut seen = Vec::new();
        for_each_index(&[2, 2], |idx| seen.push(idx.to_vec()));
        assert_eq!(
            seen,
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
    }

    #[test]
    fn test_for_each_index_empty_dim() {
        let mut count = 0;
        for_each_index(&[2, 0], |_| count += 1);
        assert_eq!(count, 0);
    }
}
