//! Dead code elimination.
//!
//! Removes every instruction that cannot reach the module's outputs along
//! input edges. Parameters are part of the module's external signature and
//! are always kept, dead or not.

use tracing::debug;

use cinnabar_core::{ModulePassManager, Pass, Result};

pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &str {
        "dead_code_elimination"
    }

    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let m = mpm.module_mut();
        let mut roots = m.output_ids();
        if let Some(ret) = m.return_ins() {
            roots.push(ret);
        }
        let live = m.reachable_from(&roots);

        // reverse program order, so consumers go before their producers
        let mut removed = 0usize;
        for id in m.ids().into_iter().rev() {
            if live.contains(&id) || m.instruction(id)?.name() == "@param" {
                continue;
            }
            m.remove_instruction(id)?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, module = m.name(), "removed dead instructions");
        }
        Ok(())
    }
}
