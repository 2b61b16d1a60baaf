//! Runtime tensor values: a shape paired with a byte buffer.
//!
//! Buffers are shared through `Arc`, so cloning an `Argument` (or building a
//! view with a different shape over the same buffer) aliases the storage
//! instead of copying it. Deep copies are explicit via [`Argument::copied`].

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::shape::{for_each_index, DataType, Shape};
use crate::{Error, Result};

/// A tensor value: a [`Shape`] plus the buffer it addresses.
#[derive(Clone)]
pub struct Argument {
    shape: Shape,
    data: Arc<[u8]>,
}

impl Argument {
    /// Create a zero-filled argument backed by a fresh buffer.
    pub fn new_zeroed(shape: Shape) -> Self {
        let data: Arc<[u8]> = vec![0u8; shape.bytes()].into();
        Self { shape, data }
    }

    /// Wrap raw bytes in an argument.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the buffer is too small for the shape.
    pub fn from_bytes(shape: Shape, data: Vec<u8>) -> Result<Self> {
        if data.len() < shape.bytes() {
            return Err(Error::Shape(format!(
                "buffer of {} bytes cannot back shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Self {
            shape,
            data: data.into(),
        })
    }

    /// Create a standard f32 argument from values.
    pub fn from_f32(lens: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let shape = Shape::new(DataType::F32, lens);
        if values.len() != shape.elements() {
            return Err(Error::Shape(format!(
                "{} values cannot fill shape {}",
                values.len(),
                shape
            )));
        }
        let bytes: Vec<u8> = bytemuck::cast_slice(&values).to_vec();
        Self::from_bytes(shape, bytes)
    }

    /// Create a standard i64 argument from values.
    pub fn from_i64(lens: Vec<usize>, values: Vec<i64>) -> Result<Self> {
        let shape = Shape::new(DataType::I64, lens);
        if values.len() != shape.elements() {
            return Err(Error::Shape(format!(
                "{} values cannot fill shape {}",
                values.len(),
                shape
            )));
        }
        let bytes: Vec<u8> = bytemuck::cast_slice(&values).to_vec();
        Self::from_bytes(shape, bytes)
    }

    /// Create a view over another argument's buffer with a different shape.
    /// The buffer is aliased, not copied.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the source buffer is too small for `shape`.
    pub fn view(shape: Shape, source: &Argument) -> Result<Self> {
        if source.data.len() < shape.bytes() {
            return Err(Error::Shape(format!(
                "source buffer of {} bytes cannot back view shape {}",
                source.data.len(),
                shape
            )));
        }
        Ok(Self {
            shape,
            data: Arc::clone(&source.data),
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The raw backing buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether this argument shares its buffer with `other`.
    pub fn aliases(&self, other: &Argument) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Deep-copy into a fresh buffer, preserving the shape (including any
    /// non-standard layout).
    pub fn copied(&self) -> Argument {
        Argument {
            shape: self.shape.clone(),
            data: self.data.to_vec().into(),
        }
    }

    /// Materialize the logical elements into a standard row-major argument.
    pub fn to_standard(&self) -> Argument {
        if self.shape.standard() {
            return self.copied();
        }
        let esize = self.shape.dtype().size_bytes();
        let mut out = Vec::with_capacity(self.shape.elements() * esize);
        for_each_index(self.shape.lens(), |idx| {
            let off = self.shape.index(idx) * esize;
            out.extend_from_slice(&self.data[off..off + esize]);
        });
        Argument {
            shape: self.shape.normalize(),
            data: out.into(),
        }
    }

    /// Logical elements as f32, in row-major order.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        if self.shape.dtype() != DataType::F32 {
            return Err(Error::Evaluation(format!(
                "expected f32 data, got {:?}",
                self.shape.dtype()
            )));
        }
        let std = self.to_standard();
        Ok(std
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Logical elements as i64, in row-major order. Accepts i32 data and
    /// widens it.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        let std = self.to_standard();
        match self.shape.dtype() {
            DataType::I64 => Ok(std
                .data
                .chunks_exact(8)
                .map(|c| {
                    i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                })
                .collect()),
            DataType::I32 => Ok(std
                .data
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64)
                .collect()),
            other => Err(Error::Evaluation(format!(
                "expected integer data, got {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Argument({}, {:?})", self.shape, &self.data[..])
    }
}

/// Logical equality: same element type and lengths, same elements in
/// row-major order. Layout and buffer identity are ignored.
impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        self.shape.dtype() == other.shape.dtype()
            && self.shape.lens() == other.shape.lens()
            && self.to_standard().data == other.to_standard().data
    }
}

/// Fill an argument with reproducible pseudo-random data, for tests and
/// verification runs.
pub fn generate_argument(shape: &Shape, seed: u64) -> Argument {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = shape.element_space();
    let mut bytes = Vec::with_capacity(shape.bytes());
    match shape.dtype() {
        DataType::F32 => {
            for _ in 0..n {
                let v: f32 = rng.gen_range(-1.0..1.0);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        DataType::I64 => {
            for _ in 0..n {
                let v: i64 = rng.gen_range(0..10);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        DataType::I32 => {
            for _ in 0..n {
                let v: i32 = rng.gen_range(0..10);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        DataType::U8 | DataType::Bool => {
            for _ in 0..n {
                bytes.push(rng.gen_range(0..2u8));
            }
        }
    }
    Argument {
        shape: shape.clone(),
        data: bytes.into(),
    }
}
