//! Copy propagation: elide `copy` instructions that provably duplicate a
//! buffer nothing else observes.
//!
//! A `copy` survives when it does real work (layout change), when its source
//! memory belongs to a structural instruction (parameter, literal), or when
//! some instruction along the alias chain is shared with another consumer.
//! Everything else is rewritten to an `identity` that keeps the former
//! operands as dependency edges.

use tracing::debug;

use cinnabar_core::{InsId, Module, ModulePassManager, Pass, Result};
use cinnabar_operators::Identity;

/// Rewrites redundant `copy` instructions to `identity`.
pub struct PropagateCopy;

/// Certify that no instruction on the alias chain from `alias` down to
/// `input` is shared with another consumer. `alias` itself may have many
/// consumers; it is the chain below it that must be exclusive.
fn single_use(m: &Module, alias: InsId, input: InsId) -> bool {
    if input == alias {
        return true;
    }
    let Ok(ins) = m.instruction(input) else {
        return false;
    };
    if ins.outputs().len() != 1 {
        return false;
    }
    ins.inputs()
        .iter()
        .all(|&p| m.get_output_alias(p) != alias || single_use(m, alias, p))
}

impl Pass for PropagateCopy {
    fn name(&self) -> &str {
        "propagate_copy"
    }

    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let m = mpm.module_mut();
        for id in m.ids() {
            let ins = m.instruction(id)?;
            if ins.name() != "copy" {
                continue;
            }
            let &[input] = ins.inputs() else {
                continue;
            };
            let shape = ins.shape().clone();
            // a copy that changes layout is doing real work
            if m.instruction(input)?.shape() != &shape {
                continue;
            }
            let alias = m.get_output_alias(input);
            if m.instruction(alias)?.is_reserved() {
                continue;
            }
            if m.instruction(alias)?.shape() != &shape {
                continue;
            }
            if !single_use(m, alias, input) {
                continue;
            }
            debug!(copy = ?id, ?alias, "eliding copy");
            let operands = if alias == input {
                vec![input]
            } else {
                vec![alias, input]
            };
            m.replace_instruction(id, Identity, &operands)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinnabar_core::{DataType, Program, Shape};
    use cinnabar_operators::{CopyOp, Transpose};

    fn run(p: &mut Program) {
        let root = p.main_id();
        PropagateCopy.apply(&mut ModulePassManager::new(p, root)).unwrap();
    }

    #[test]
    fn test_copy_of_transpose_becomes_identity() {
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m.add_parameter("p", Shape::new(DataType::F32, vec![2, 2])).unwrap();
        let t = m
            .add_instruction(
                Transpose {
                    permutation: vec![1, 0],
                },
                &[x],
            )
            .unwrap();
        let c = m.add_instruction(CopyOp, &[t]).unwrap();
        m.add_return(&[c]).unwrap();
        let before = m.get_output_shapes();

        run(&mut p);

        let m = p.main();
        assert_eq!(m.instruction(c).unwrap().name(), "identity");
        assert_eq!(m.instruction(c).unwrap().inputs(), &[t]);
        assert_eq!(m.get_output_shapes(), before);
        m.validate().unwrap();
    }

    #[test]
    fn test_copy_of_parameter_is_kept() {
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m.add_parameter("p", Shape::new(DataType::F32, vec![2])).unwrap();
        let c = m.add_instruction(CopyOp, &[x]).unwrap();
        m.add_return(&[c]).unwrap();

        run(&mut p);

        assert_eq!(p.main().instruction(c).unwrap().name(), "copy");
    }

    #[test]
    fn test_copy_of_aliased_parameter_is_kept() {
        // identity resolves back to the parameter, so the copy must stay
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m.add_parameter("p", Shape::new(DataType::F32, vec![2])).unwrap();
        let i = m.add_instruction(Identity, &[x]).unwrap();
        let c = m.add_instruction(CopyOp, &[i]).unwrap();
        m.add_return(&[c]).unwrap();

        run(&mut p);

        assert_eq!(p.main().instruction(c).unwrap().name(), "copy");
    }

    #[test]
    fn test_shared_alias_chain_is_kept() {
        // the identity between the transpose and the copy has a second
        // consumer, so eliding the copy would expose shared storage
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m.add_parameter("p", Shape::new(DataType::F32, vec![2, 2])).unwrap();
        let t = m
            .add_instruction(
                Transpose {
                    permutation: vec![1, 0],
                },
                &[x],
            )
            .unwrap();
        let i = m.add_instruction(Identity, &[t]).unwrap();
        let c = m.add_instruction(CopyOp, &[i]).unwrap();
        let other = m.add_instruction(Identity, &[i]).unwrap();
        m.add_return(&[c, other]).unwrap();

        run(&mut p);

        assert_eq!(p.main().instruction(c).unwrap().name(), "copy");
    }

    #[test]
    fn test_exclusive_alias_chain_is_elided() {
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m.add_parameter("p", Shape::new(DataType::F32, vec![2, 2])).unwrap();
        let t = m
            .add_instruction(
                Transpose {
                    permutation: vec![1, 0],
                },
                &[x],
            )
            .unwrap();
        let i = m.add_instruction(Identity, &[t]).unwrap();
        let c = m.add_instruction(CopyOp, &[i]).unwrap();
        m.add_return(&[c]).unwrap();

        run(&mut p);

        let m = p.main();
        let ins = m.instruction(c).unwrap();
        assert_eq!(ins.name(), "identity");
        // data flow references the alias; the old operand is kept as an edge
        assert_eq!(ins.inputs(), &[t, i]);
        m.validate().unwrap();
    }
}
