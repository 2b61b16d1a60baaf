//! Reference evaluation of a module on concrete arguments.
//!
//! Walks the program order once, keeping every produced value keyed by
//! instruction. Instructions that reference a single submodule are evaluated
//! by recursing into that submodule with the same parameter map; partitions
//! split out of a module keep their parameter names, so the map carries
//! across the boundary unchanged.

use std::collections::HashMap;

use crate::argument::Argument;
use crate::instruction::InsId;
use crate::module::Module;
use crate::operation::Param;
use crate::program::Program;
use crate::{Error, Result};

/// Evaluate `module` with named parameter values, returning its outputs in
/// declaration order.
pub fn evaluate_module(
    program: &Program,
    module: &Module,
    params: &HashMap<String, Argument>,
) -> Result<Vec<Argument>> {
    let mut values: HashMap<InsId, Argument> = HashMap::new();

    for (id, ins) in module.iter() {
        if ins.name() == "@return" {
            break;
        }

        let result = if let Some(p) = ins.op_as::<Param>() {
            let arg = params.get(&p.name).ok_or_else(|| {
                Error::Evaluation(format!("missing parameter '{}'", p.name))
            })?;
            if arg.shape().dtype() != p.shape.dtype() || arg.shape().lens() != p.shape.lens() {
                return Err(Error::Evaluation(format!(
                    "parameter '{}' expects {} but was given {}",
                    p.name,
                    p.shape,
                    arg.shape()
                )));
            }
            arg.clone()
        } else {
            let args: Vec<Argument> = ins
                .inputs()
                .iter()
                .map(|i| {
                    values.get(i).cloned().ok_or_else(|| {
                        Error::Evaluation(format!("operand {:?} has no value", i))
                    })
                })
                .collect::<Result<_>>()?;

            match ins.module_refs() {
                [] => ins.op().evaluate(ins.shape(), &args)?,
                [sub] => {
                    let sub = program.module(*sub)?;
                    let mut outputs = evaluate_module(program, sub, params)?;
                    if outputs.len() != 1 {
                        return Err(Error::Evaluation(format!(
                            "submodule '{}' must produce exactly 1 output, got {}",
                            sub.name(),
                            outputs.len()
                        )));
                    }
                    outputs.remove(0)
                }
                more => {
                    return Err(Error::Unsupported(format!(
                        "instruction '{}' references {} submodules",
                        ins.name(),
                        more.len()
                    )))
                }
            }
        };
        values.insert(id, result);
    }

    module
        .output_ids()
        .iter()
        .map(|i| {
            values.get(i).cloned().ok_or_else(|| {
                Error::Evaluation(format!("output {:?} was never computed", i))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::shape::{DataType, Shape};

    #[derive(Debug, Clone)]
    struct Double;

    impl Operation for Double {
        fn name(&self) -> &str {
            "double"
        }

        fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
            inputs
                .first()
                .cloned()
                .ok_or_else(|| Error::Shape("double requires one input".to_string()))
        }

        fn evaluate(&self, _output: &Shape, args: &[Argument]) -> Result<Argument> {
            let vals: Vec<f32> = args[0].to_f32_vec()?.iter().map(|v| v * 2.0).collect();
            Argument::from_f32(args[0].shape().lens().to_vec(), vals)
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    // Calls into its single referenced submodule.
    #[derive(Debug, Clone)]
    struct Call;

    impl Operation for Call {
        fn name(&self) -> &str {
            "call"
        }

        fn compute_shape(&self, _inputs: &[Shape], mods: &[&Module]) -> Result<Shape> {
            let sub = mods
                .first()
                .ok_or_else(|| Error::InvalidGraph("call requires a submodule".to_string()))?;
            sub.get_output_shapes()
                .pop()
                .ok_or_else(|| Error::InvalidGraph("submodule has no outputs".to_string()))
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn param_map(name: &str, arg: Argument) -> HashMap<String, Argument> {
        HashMap::from([(name.to_string(), arg)])
    }

    #[test]
    fn test_evaluate_simple_chain() {
        let mut p = Program::new();
        let s = Shape::new(DataType::F32, vec![2]);
        let x = p.main_mut().add_parameter("x", s).unwrap();
        let d = p.main_mut().add_instruction(Double, &[x]).unwrap();
        p.main_mut().add_return(&[d]).unwrap();

        let arg = Argument::from_f32(vec![2], vec![1.0, 2.0]).unwrap();
        let out = evaluate_module(&p, p.main(), &param_map("x", arg)).unwrap();
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_missing_parameter_errors() {
        let mut p = Program::new();
        let s = Shape::new(DataType::F32, vec![2]);
        p.main_mut().add_parameter("x", s).unwrap();

        let err = evaluate_module(&p, p.main(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn test_parameter_shape_mismatch_errors() {
        let mut p = Program::new();
        let s = Shape::new(DataType::F32, vec![2]);
        p.main_mut().add_parameter("x", s).unwrap();

        let wrong = Argument::from_f32(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let err = evaluate_module(&p, p.main(), &param_map("x", wrong)).unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn test_recurses_into_submodule() {
        let mut p = Program::new();
        let s = Shape::new(DataType::F32, vec![2]);

        let sub_id = p.create_module("sub").unwrap();
        {
            let sub = p.module_mut(sub_id).unwrap();
            let x = sub.add_parameter("x", s.clone()).unwrap();
            let d = sub.add_instruction(Double, &[x]).unwrap();
            sub.add_return(&[d]).unwrap();
        }

        let (main, sub) = p.module_pair_mut(p.main_id(), sub_id).unwrap();
        let call = main
            .add_instruction_with_mods(Call, &[], vec![sub_id], &[&*sub])
            .unwrap();
        assert_eq!(main.instruction(call).unwrap().shape().lens(), &[2]);

        let arg = Argument::from_f32(vec![2], vec![3.0, 4.0]).unwrap();
        let out = evaluate_module(&p, p.main(), &param_map("x", arg)).unwrap();
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![6.0, 8.0]);
    }

    #[test]
    fn test_multi_output_submodule_errors() {
        let mut p = Program::new();
        let s = Shape::new(DataType::F32, vec![2]);

        let sub_id = p.create_module("sub").unwrap();
        {
            let sub = p.module_mut(sub_id).unwrap();
            let x = sub.add_parameter("x", s.clone()).unwrap();
            let d = sub.add_instruction(Double, &[x]).unwrap();
            sub.add_return(&[x, d]).unwrap();
        }

        let (main, sub) = p.module_pair_mut(p.main_id(), sub_id).unwrap();
        let call = main
            .add_instruction_with_mods(Call, &[], vec![sub_id], &[&*sub])
            .unwrap();
        main.add_return(&[call]).unwrap();

        let arg = Argument::from_f32(vec![2], vec![3.0, 4.0]).unwrap();
        let err = evaluate_module(&p, p.main(), &param_map("x", arg)).unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }
}
