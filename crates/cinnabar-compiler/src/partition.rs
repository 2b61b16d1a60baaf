//! Offload partitioning: extract a contiguous run of offload-eligible
//! instructions into a bypass submodule and splice a single placeholder
//! back into the source module.
//!
//! The placeholder carries the submodule reference and the boundary inputs
//! (parameters and literals of the source module); a target backend later
//! lowers it to an actual device invocation. The source module's external
//! output shape is unchanged: the placeholder's shape is defined to be the
//! submodule's single output shape.

use std::any::Any;
use std::collections::HashMap;

use tracing::debug;

use cinnabar_core::{
    copy_instructions, Error, InsId, Instruction, Literal, Module, ModulePassManager, Operation,
    Param, Pass, Result, Shape,
};

/// Stand-in for an extracted submodule. Requires exactly one referenced
/// submodule with exactly one declared output; its shape is that output's.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffloadPlaceholder;

impl Operation for OffloadPlaceholder {
    fn name(&self) -> &str {
        "offload::placeholder"
    }

    fn compute_shape(&self, _inputs: &[Shape], mods: &[&Module]) -> Result<Shape> {
        let [sub] = mods else {
            return Err(Error::InvalidGraph(format!(
                "offload::placeholder expects exactly 1 submodule, got {}",
                mods.len()
            )));
        };
        let mut outputs = sub.get_output_shapes();
        if outputs.len() != 1 {
            return Err(Error::InvalidGraph(format!(
                "submodule '{}' must declare exactly 1 output, got {}",
                sub.name(),
                outputs.len()
            )));
        }
        Ok(outputs.remove(0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Predicate = Box<dyn Fn(&Instruction) -> bool + Send + Sync>;

/// Extracts the eligible instruction run of a module into a submodule.
pub struct Partition {
    eligible: Predicate,
}

impl Partition {
    /// Default eligibility: any instruction with at least one data input,
    /// plus the structural instructions.
    pub fn new() -> Self {
        Self::with_predicate(|ins| !ins.inputs().is_empty() || ins.is_reserved())
    }

    /// Partition with a target-specific eligibility predicate.
    pub fn with_predicate<F>(eligible: F) -> Self
    where
        F: Fn(&Instruction) -> bool + Send + Sync + 'static,
    {
        Self {
            eligible: Box::new(eligible),
        }
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for Partition {
    fn name(&self) -> &str {
        "partition"
    }

    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let root_id = mpm.root_id();

        // scan: boundary inputs and the eligible run's endpoints
        let m = mpm.module();
        let root_name = m.name().to_string();
        let ids = m.ids();
        let mut boundary = Vec::new();
        let mut flags = Vec::with_capacity(ids.len());
        for &id in &ids {
            let ins = m.instruction(id)?;
            if ins.name() == "@param" || ins.name() == "@literal" {
                boundary.push(id);
            }
            flags.push((self.eligible)(ins));
        }
        let Some(first) = flags.iter().position(|&e| e) else {
            return Ok(()); // nothing to offload
        };
        let last = flags.iter().rposition(|&e| e).unwrap_or(first);
        if flags[first..=last].iter().any(|&e| !e) {
            return Err(Error::InvalidGraph(format!(
                "module '{}': eligible instructions are not contiguous",
                root_name
            )));
        }
        let range: Vec<InsId> = ids[first..=last].to_vec();

        let mut sub_name = format!("{}:offload", root_name);
        let mut n = 0;
        while mpm.program().find_module(&sub_name).is_some() {
            n += 1;
            sub_name = format!("{}:offload{}", root_name, n);
        }
        let sub_id = mpm.create_module(sub_name)?;

        let (root, sub) = mpm.program_mut().module_pair_mut(root_id, sub_id)?;

        // seed the boundary inputs so the copied run can reach them even
        // when the predicate excludes structural instructions
        let mut map: HashMap<InsId, InsId> = HashMap::new();
        for &b in &boundary {
            let ins = root.instruction(b)?;
            let seeded = if let Some(p) = ins.op_as::<Param>() {
                sub.add_parameter(&p.name, p.shape.clone())?
            } else if let Some(l) = ins.op_as::<Literal>() {
                sub.add_literal(l.value.clone())
            } else {
                continue;
            };
            map.insert(b, seeded);
        }

        let outputs = copy_instructions(sub, root, &range, &mut map)?;
        sub.replace_return(&outputs)?;
        sub.set_bypass(true);

        let ret = root.return_ins();
        let placeholder = root.insert_instruction_with_mods(
            ret,
            OffloadPlaceholder,
            &boundary,
            vec![sub_id],
            &[&*sub],
        )?;
        root.replace_return(&[placeholder])?;
        debug!(
            module = %root_name,
            extracted = range.len(),
            "offloaded instruction run to submodule"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinnabar_core::{DataType, Program};
    use cinnabar_operators::Relu;

    fn apply(pass: &dyn Pass, p: &mut Program) -> Result<()> {
        let root = p.main_id();
        pass.apply(&mut ModulePassManager::new(p, root))
    }

    #[test]
    fn test_placeholder_requires_one_submodule() {
        let err = OffloadPlaceholder.compute_shape(&[], &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));
    }

    #[test]
    fn test_placeholder_requires_single_output() {
        let mut sub = Module::new("sub");
        let a = sub
            .add_parameter("a", Shape::new(DataType::F32, vec![2]))
            .unwrap();
        let b = sub
            .add_parameter("b", Shape::new(DataType::F32, vec![2]))
            .unwrap();
        sub.add_return(&[a, b]).unwrap();
        assert!(OffloadPlaceholder.compute_shape(&[], &[&sub]).is_err());

        sub.replace_return(&[a]).unwrap();
        let s = OffloadPlaceholder.compute_shape(&[], &[&sub]).unwrap();
        assert_eq!(s.lens(), &[2]);
    }

    #[test]
    fn test_partition_simple_module() {
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m
            .add_parameter("x", Shape::new(DataType::F32, vec![2, 2]))
            .unwrap();
        let r = m.add_instruction(Relu, &[x]).unwrap();
        m.add_return(&[r]).unwrap();
        let before = m.get_output_shapes();

        apply(&Partition::new(), &mut p).unwrap();

        let main = p.main();
        main.validate().unwrap();
        assert_eq!(main.get_output_shapes(), before);

        // exactly one placeholder, immediately before the return
        let placeholders: Vec<_> = main
            .iter()
            .filter(|(_, i)| i.name() == "offload::placeholder")
            .collect();
        assert_eq!(placeholders.len(), 1);
        let (ph_id, ph) = placeholders[0];
        assert_eq!(main.output_ids(), vec![ph_id]);
        assert_eq!(ph.inputs(), &[x]);
        assert_eq!(ph.module_refs().len(), 1);

        let sub = p.module(ph.module_refs()[0]).unwrap();
        assert!(sub.bypass());
        sub.validate().unwrap();
        assert_eq!(sub.get_output_shapes(), vec![ph.shape().clone()]);
        assert_eq!(sub.parameter_names(), vec!["x".to_string()]);
    }

    #[test]
    fn test_partition_empty_module_is_noop() {
        let mut p = Program::new();
        apply(&Partition::new(), &mut p).unwrap();
        assert_eq!(p.modules().count(), 1);
    }

    #[test]
    fn test_non_contiguous_run_fails_fast() {
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m
            .add_parameter("x", Shape::new(DataType::F32, vec![2]))
            .unwrap();
        m.add_instruction(Relu, &[x]).unwrap();
        let i = m
            .add_instruction(cinnabar_operators::Identity, &[x])
            .unwrap();
        m.add_return(&[i]).unwrap();

        // relu sits between two eligible instructions
        let pass = Partition::with_predicate(|ins| ins.name() != "relu");
        let err = apply(&pass, &mut p).unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));
    }
}
