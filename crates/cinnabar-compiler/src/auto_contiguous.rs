//! Layout normalization: materialize every non-standard intermediate.
//!
//! After this pass, any instruction whose result carries a broadcast or
//! transposed layout feeds its consumers through an explicit `contiguous`.
//! Operators that require packed row-major input can then assume it without
//! checking.

use tracing::debug;

use cinnabar_core::{ModulePassManager, Pass, Result};
use cinnabar_operators::Contiguous;

/// Inserts a `contiguous` after every instruction with a non-standard,
/// non-empty result shape and redirects its consumers through it. Running
/// the pass again is a no-op: an instruction whose consumers are already all
/// `contiguous` is left alone.
pub struct AutoContiguous;

impl Pass for AutoContiguous {
    fn name(&self) -> &str {
        "auto_contiguous"
    }

    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let m = mpm.module_mut();
        let ids = m.ids();
        for (i, &id) in ids.iter().enumerate() {
            let ins = m.instruction(id)?;
            if ins.name() == "contiguous" || ins.name() == "@return" {
                continue;
            }
            let shape = ins.shape();
            if shape.standard() || shape.elements() == 0 {
                continue;
            }
            if !ins.outputs().is_empty()
                && ins
                    .outputs()
                    .iter()
                    .all(|&o| m.instruction(o).is_ok_and(|c| c.name() == "contiguous"))
            {
                continue;
            }
            debug!(?id, %shape, "inserting contiguous");
            let next = ids.get(i + 1).copied();
            let c = m.insert_instruction(next, Contiguous, &[id])?;
            m.replace_uses(id, c)?;
        }
        Ok(())
    }
}
