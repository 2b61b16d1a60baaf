//! Layout operators: aliasing wrappers, materializing copies, and the
//! stride-only view operators.
//!
//! `identity` and `broadcast` declare an output alias; their result shares
//! the input's buffer. `copy` and `contiguous` materialize into a fresh
//! buffer and therefore never alias. `transpose` produces a view at
//! evaluation time but deliberately declares no alias, so alias resolution
//! stops at it; copy propagation relies on that to keep a materializing copy
//! above a transposed parameter.

use std::any::Any;

use cinnabar_core::{
    normalize_axes, Argument, Error, Module, Operation, Result, Shape,
};

fn one_input<'a>(name: &str, inputs: &'a [Shape]) -> Result<&'a Shape> {
    match inputs {
        [s] => Ok(s),
        _ => Err(Error::Shape(format!(
            "{} expects 1 input, got {}",
            name,
            inputs.len()
        ))),
    }
}

/// Pass-through whose output aliases its first input. Accepts extra
/// operands so a rewrite can keep elided dependency edges alive; they do not
/// affect the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Operation for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        inputs
            .first()
            .cloned()
            .ok_or_else(|| Error::Shape("identity expects at least 1 input".to_string()))
    }

    fn evaluate(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].clone())
    }

    fn output_alias(&self) -> Option<usize> {
        Some(0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Materialize the input into a fresh buffer, preserving its layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOp;

impl Operation for CopyOp {
    fn name(&self) -> &str {
        "copy"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        one_input("copy", inputs).cloned()
    }

    fn evaluate(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].copied())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Materialize the input into a standard (packed row-major) buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Contiguous;

impl Operation for Contiguous {
    fn name(&self) -> &str {
        "contiguous"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        Ok(one_input("contiguous", inputs)?.normalize())
    }

    fn evaluate(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        Ok(args[0].to_standard())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Permute dimensions as a stride-only view; no data moves.
#[derive(Debug, Clone, Default)]
pub struct Transpose {
    pub permutation: Vec<i64>,
}

impl Operation for Transpose {
    fn name(&self) -> &str {
        "transpose"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        let input = one_input("transpose", inputs)?;
        if self.permutation.len() != input.ndim() {
            return Err(Error::Shape(format!(
                "permutation {:?} does not cover rank {}",
                self.permutation,
                input.ndim()
            )));
        }
        // normalize_axes rejects duplicates, so a full-length list of valid
        // axes is a permutation
        let perm = normalize_axes(&self.permutation, input.ndim())?;
        let lens = perm.iter().map(|&i| input.lens()[i]).collect();
        let strides = perm.iter().map(|&i| input.strides()[i]).collect();
        Shape::with_strides(input.dtype(), lens, strides)
    }

    fn evaluate(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Argument::view(output.clone(), &args[0])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Repeat the input across new dimensions through zero strides. The input's
/// dimensions land at `axis..axis + input rank` of `out_lens`; everything
/// else broadcasts. The output aliases the input's buffer.
#[derive(Debug, Clone, Default)]
pub struct Broadcast {
    pub axis: usize,
    pub out_lens: Vec<usize>,
}

impl Operation for Broadcast {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        let input = one_input("broadcast", inputs)?;
        if self.axis + input.ndim() > self.out_lens.len() {
            return Err(Error::Shape(format!(
                "rank-{} input at axis {} does not fit in output lens {:?}",
                input.ndim(),
                self.axis,
                self.out_lens
            )));
        }
        let mut strides = vec![0usize; self.out_lens.len()];
        for (i, (&len, &stride)) in input.lens().iter().zip(input.strides()).enumerate() {
            let out_len = self.out_lens[self.axis + i];
            if len == out_len {
                strides[self.axis + i] = stride;
            } else if len != 1 {
                return Err(Error::Shape(format!(
                    "cannot broadcast dimension of length {} to {}",
                    len, out_len
                )));
            }
        }
        Shape::with_strides(input.dtype(), self.out_lens.clone(), strides)
    }

    fn evaluate(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        Argument::view(output.clone(), &args[0])
    }

    fn output_alias(&self) -> Option<usize> {
        Some(0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
