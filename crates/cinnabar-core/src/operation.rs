//! The `Operation` trait and the structural pseudo-operations.
//!
//! Operations are pluggable capabilities: given input shapes (and, for
//! control-flow or offload operations, referenced submodules) they compute
//! an output shape, and may optionally evaluate concrete arguments. The IR
//! never enumerates the operator catalog; anything implementing this trait
//! can appear in a graph.
//!
//! Names starting with `@` are reserved for structural instructions
//! (`@param`, `@literal`, `@outline`, `@return`), which passes treat
//! specially: they mark externally visible identity and must not be elided.

use std::any::Any;
use std::fmt;

use crate::argument::Argument;
use crate::module::Module;
use crate::shape::Shape;
use crate::{Error, Result};

/// Prefix reserved for structural instruction names.
pub const RESERVED_PREFIX: char = '@';

/// Operation-level configuration exposed to shape normalization tooling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes {
    /// Whether the operation's axis attributes use negative-axis wraparound
    /// and should be normalized against the input rank.
    pub normalize_axes: bool,
}

/// A polymorphic operation: one node kind of the computation graph.
pub trait Operation: fmt::Debug + Send + Sync {
    /// Stable operation name (e.g. "add", "transpose", "@param").
    fn name(&self) -> &str;

    /// Compute the output shape from input shapes and referenced submodules.
    ///
    /// Must reject incompatible inputs (wrong count, incompatible element
    /// types, wrong submodule count) with a shape or graph error.
    fn compute_shape(&self, inputs: &[Shape], mods: &[&Module]) -> Result<Shape>;

    /// Evaluate the operation on concrete arguments.
    ///
    /// Optional; operations without a reference implementation return
    /// `Error::Unsupported`.
    fn evaluate(&self, _output: &Shape, _args: &[Argument]) -> Result<Argument> {
        Err(Error::Unsupported(format!(
            "operation '{}' cannot be evaluated",
            self.name()
        )))
    }

    /// Declared attribute configuration (axis normalization rules).
    fn attributes(&self) -> Attributes {
        Attributes::default()
    }

    /// If the output is defined to share one input's buffer, the index of
    /// that input. Used by alias resolution ([`Module::get_output_alias`])
    /// to find the instruction that owns an output's storage.
    fn output_alias(&self) -> Option<usize> {
        None
    }

    /// Downcast support for structural operations (`@param`, `@literal`).
    fn as_any(&self) -> &dyn Any;
}

/// Normalize a possibly negative axis against a rank.
///
/// # Errors
///
/// Returns a shape error if the axis is out of bounds.
pub fn normalize_axis(axis: i64, rank: usize) -> Result<usize> {
    let r = rank as i64;
    let a = if axis < 0 { axis + r } else { axis };
    if a < 0 || a >= r {
        return Err(Error::Shape(format!(
            "axis {} out of bounds for rank {}",
            axis, rank
        )));
    }
    Ok(a as usize)
}

/// Normalize a list of axes against a rank, rejecting duplicates.
pub fn normalize_axes(axes: &[i64], rank: usize) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(axes.len());
    for &a in axes {
        let n = normalize_axis(a, rank)?;
        if out.contains(&n) {
            return Err(Error::Shape(format!("duplicate axis {} in {:?}", a, axes)));
        }
        out.push(n);
    }
    Ok(out)
}

// ─────────────────────── structural pseudo-operations ───────────────────────

/// A named module parameter. Externally supplied at evaluation time.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub shape: Shape,
}

impl Operation for Param {
    fn name(&self) -> &str {
        "@param"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        if !inputs.is_empty() {
            return Err(Error::Shape("@param takes no inputs".to_string()));
        }
        Ok(self.shape.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A literal constant owned by the instruction.
#[derive(Debug, Clone)]
pub struct Literal {
    pub value: Argument,
}

impl Operation for Literal {
    fn name(&self) -> &str {
        "@literal"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        if !inputs.is_empty() {
            return Err(Error::Shape("@literal takes no inputs".to_string()));
        }
        Ok(self.value.shape().clone())
    }

    fn evaluate(&self, _output: &Shape, _args: &[Argument]) -> Result<Argument> {
        Ok(self.value.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A shape-only placeholder with no data, used when copying graph fragments.
#[derive(Debug, Clone)]
pub struct Outline {
    pub shape: Shape,
}

impl Operation for Outline {
    fn name(&self) -> &str {
        "@outline"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        if !inputs.is_empty() {
            return Err(Error::Shape("@outline takes no inputs".to_string()));
        }
        Ok(self.shape.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Marks a module's externally visible outputs; always the last instruction.
#[derive(Debug, Clone, Default)]
pub struct Return;

impl Operation for Return {
    fn name(&self) -> &str {
        "@return"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        inputs
            .first()
            .cloned()
            .ok_or_else(|| Error::InvalidGraph("@return requires at least one input".to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::DataType;

    #[test]
    fn test_normalize_axis_wraparound() {
        assert_eq!(normalize_axis(-1, 4).unwrap(), 3);
        assert_eq!(normalize_axis(2, 4).unwrap(), 2);
        assert!(normalize_axis(4, 4).is_err());
        assert!(normalize_axis(-5, 4).is_err());
    }

    #[test]
    fn test_normalize_axes_rejects_duplicates() {
        assert_eq!(normalize_axes(&[0, -1], 3).unwrap(), vec![0, 2]);
        assert!(normalize_axes(&[0, -3], 3).is_err());
    }

    #[test]
    fn test_param_shape() {
        let p = Param {
            name: "x".to_string(),
            shape: Shape::new(DataType::F32, vec![2, 2]),
        };
        assert_eq!(p.name(), "@param");
        let s = p.compute_shape(&[], &[]).unwrap();
        assert_eq!(s.lens(), &[2, 2]);
        assert!(p
            .compute_shape(&[Shape::scalar(DataType::F32)], &[])
            .is_err());
    }

    #[test]
    fn test_return_requires_input() {
        let r = Return;
        assert!(r.compute_shape(&[], &[]).is_err());
        let s = r
            .compute_shape(&[Shape::new(DataType::F32, vec![3])], &[])
            .unwrap();
        assert_eq!(s.lens(), &[3]);
    }
}
