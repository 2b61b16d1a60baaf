//! Index-driven operators: gather and elementwise scatter.
//!
//! Both take an integer index tensor whose values may be negative; negative
//! indices wrap around the indexed dimension once (`-1` means the last
//! element). Out-of-range indices are an evaluation error, not undefined
//! behavior.

use std::any::Any;

use cinnabar_core::{
    for_each_index, normalize_axis, Argument, Attributes, DataType, Error, Module, Operation,
    Result, Shape,
};

fn check_index_dtype(name: &str, s: &Shape) -> Result<()> {
    match s.dtype() {
        DataType::I64 | DataType::I32 => Ok(()),
        other => Err(Error::Shape(format!(
            "{} indices must be integer, got {:?}",
            name, other
        ))),
    }
}

fn wrap_index(i: i64, dim: usize) -> Result<usize> {
    let d = dim as i64;
    let w = if i < 0 { i + d } else { i };
    if w < 0 || w >= d {
        return Err(Error::Evaluation(format!(
            "index {} out of range for dimension of length {}",
            i, dim
        )));
    }
    Ok(w as usize)
}

/// Pick slices of the data tensor along one axis, one per index element.
/// The indexed dimension is replaced by the index tensor's dimensions.
#[derive(Debug, Clone, Default)]
pub struct Gather {
    pub axis: i64,
}

impl Operation for Gather {
    fn name(&self) -> &str {
        "gather"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        let [data, indices] = inputs else {
            return Err(Error::Shape(format!(
                "gather expects 2 inputs, got {}",
                inputs.len()
            )));
        };
        check_index_dtype("gather", indices)?;
        let axis = normalize_axis(self.axis, data.ndim())?;
        let mut lens = data.lens()[..axis].to_vec();
        lens.extend_from_slice(indices.lens());
        lens.extend_from_slice(&data.lens()[axis + 1..]);
        Ok(Shape::new(data.dtype(), lens))
    }

    fn evaluate(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        let data = &args[0];
        let axis = normalize_axis(self.axis, data.shape().ndim())?;
        let dim = data.shape().lens()[axis];
        let vals = data.to_f32_vec()?;
        let data_packed = data.shape().normalize();
        let indices = args[1].to_i64_vec()?;
        let ind_rank = args[1].shape().ndim();
        let ind_packed = args[1].shape().normalize();

        let mut out = Vec::with_capacity(output.elements());
        let mut data_idx = vec![0usize; data.shape().ndim()];
        let mut result = Ok(());
        for_each_index(output.lens(), |idx| {
            if result.is_err() {
                return;
            }
            let (pre, rest) = idx.split_at(axis);
            let (ind_idx, post) = rest.split_at(ind_rank);
            let flat = ind_packed.index(ind_idx);
            match wrap_index(indices[flat], dim) {
                Ok(g) => {
                    data_idx[..axis].copy_from_slice(pre);
                    data_idx[axis] = g;
                    data_idx[axis + 1..].copy_from_slice(post);
                    out.push(vals[data_packed.index(&data_idx)]);
                }
                Err(e) => result = Err(e),
            }
        });
        result?;
        Argument::from_f32(output.lens().to_vec(), out)
    }

    fn attributes(&self) -> Attributes {
        Attributes {
            normalize_axes: true,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How scatter combines an update with the element already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScatterReduction {
    #[default]
    Assign,
    Add,
    Mul,
}

/// Elementwise scatter: write each update element into a copy of the data
/// tensor, at the position given by the matching index element along `axis`.
#[derive(Debug, Clone, Default)]
pub struct Scatter {
    pub axis: i64,
    pub reduction: ScatterReduction,
}

impl Operation for Scatter {
    fn name(&self) -> &str {
        "scatter"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        let [data, indices, updates] = inputs else {
            return Err(Error::Shape(format!(
                "scatter expects 3 inputs, got {}",
                inputs.len()
            )));
        };
        check_index_dtype("scatter", indices)?;
        let axis = normalize_axis(self.axis, data.ndim())?;
        if indices.ndim() != data.ndim() {
            return Err(Error::Shape(format!(
                "scatter indices rank {} does not match data rank {}",
                indices.ndim(),
                data.ndim()
            )));
        }
        // non-axis coordinates of each update land verbatim in the data
        // tensor, so those dimensions may not exceed the data's
        for (d, (&i, &dl)) in indices.lens().iter().zip(data.lens()).enumerate() {
            if d != axis && i > dl {
                return Err(Error::Shape(format!(
                    "scatter indices dimension {} has length {} but data has {}",
                    d, i, dl
                )));
            }
        }
        if indices.lens() != updates.lens() {
            return Err(Error::Shape(format!(
                "scatter indices {} and updates {} must agree",
                indices, updates
            )));
        }
        if updates.dtype() != data.dtype() {
            return Err(Error::Shape(format!(
                "scatter updates element type {:?} does not match data {:?}",
                updates.dtype(),
                data.dtype()
            )));
        }
        Ok(data.normalize())
    }

    fn evaluate(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        let axis = normalize_axis(self.axis, output.ndim())?;
        let dim = output.lens()[axis];
        let mut out = args[0].to_f32_vec()?;
        let indices = args[1].to_i64_vec()?;
        let updates = args[2].to_f32_vec()?;
        let ind_packed = args[1].shape().normalize();

        let mut result = Ok(());
        let mut target = vec![0usize; output.ndim()];
        for_each_index(args[1].shape().lens(), |idx| {
            if result.is_err() {
                return;
            }
            let flat = ind_packed.index(idx);
            match wrap_index(indices[flat], dim) {
                Ok(w) => {
                    target.copy_from_slice(idx);
                    target[axis] = w;
                    let dst = &mut out[output.index(&target)];
                    let upd = updates[flat];
                    *dst = match self.reduction {
                        ScatterReduction::Assign => upd,
                        ScatterReduction::Add => *dst + upd,
                        ScatterReduction::Mul => *dst * upd,
                    };
                }
                Err(e) => result = Err(e),
            }
        });
        result?;
        Argument::from_f32(output.lens().to_vec(), out)
    }

    fn attributes(&self) -> Attributes {
        Attributes {
            normalize_axes: true,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
