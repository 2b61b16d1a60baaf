//! Elementwise arithmetic operators.
//!
//! Binary operators require both inputs to agree on element type and
//! lengths; layouts may differ (a broadcast view against a packed tensor is
//! fine) and the result is always standard.

use std::any::Any;

use cinnabar_core::{Argument, DataType, Error, Module, Operation, Result, Shape};

fn binary_shape(name: &str, inputs: &[Shape]) -> Result<Shape> {
    let [a, b] = inputs else {
        return Err(Error::Shape(format!(
            "{} expects 2 inputs, got {}",
            name,
            inputs.len()
        )));
    };
    if a.dtype() != b.dtype() {
        return Err(Error::Shape(format!(
            "{} element types differ: {} vs {}",
            name, a, b
        )));
    }
    if a.lens() != b.lens() {
        return Err(Error::Shape(format!(
            "{} input lengths differ: {} vs {}",
            name, a, b
        )));
    }
    Ok(a.normalize())
}

fn binary_eval(args: &[Argument], f: impl Fn(f32, f32) -> f32) -> Result<Argument> {
    let a = args[0].to_f32_vec()?;
    let b = args[1].to_f32_vec()?;
    let out: Vec<f32> = a.iter().zip(&b).map(|(&x, &y)| f(x, y)).collect();
    Argument::from_f32(args[0].shape().lens().to_vec(), out)
}

/// Elementwise addition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl Operation for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        binary_shape("add", inputs)
    }

    fn evaluate(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        binary_eval(args, |x, y| x + y)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Elementwise multiplication.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl Operation for Mul {
    fn name(&self) -> &str {
        "mul"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        binary_shape("mul", inputs)
    }

    fn evaluate(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        binary_eval(args, |x, y| x * y)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Elementwise rectified linear unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl Operation for Relu {
    fn name(&self) -> &str {
        "relu"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        let [a] = inputs else {
            return Err(Error::Shape(format!(
                "relu expects 1 input, got {}",
                inputs.len()
            )));
        };
        if a.dtype() != DataType::F32 {
            return Err(Error::Shape(format!("relu requires f32 input, got {}", a)));
        }
        Ok(a.normalize())
    }

    fn evaluate(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
        let out: Vec<f32> = args[0].to_f32_vec()?.iter().map(|v| v.max(0.0)).collect();
        Argument::from_f32(args[0].shape().lens().to_vec(), out)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
