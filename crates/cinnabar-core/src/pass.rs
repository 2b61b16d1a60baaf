//! The pass framework.
//!
//! A pass is a named graph-to-graph transformation over one module. Passes
//! receive a [`ModulePassManager`] scoping them to the module they rewrite
//! while still letting them create submodules on the owning program (the
//! partitioner needs both).
//!
//! [`run_passes`] drives a pipeline: each pass visits every non-bypass
//! module of the program, and the touched module is re-validated after every
//! pass so a broken rewrite is caught at the pass that introduced it.

use tracing::debug_span;

use crate::module::Module;
use crate::program::{ModuleId, Program};
use crate::{Error, Result};

/// A named transformation over a single module.
pub trait Pass: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()>;
}

/// A pass's window onto the program: the module under transformation plus
/// the program owning it.
pub struct ModulePassManager<'a> {
    program: &'a mut Program,
    root: ModuleId,
}

impl<'a> ModulePassManager<'a> {
    pub fn new(program: &'a mut Program, root: ModuleId) -> Self {
        Self { program, root }
    }

    /// The module under transformation.
    pub fn module(&self) -> &Module {
        // root is validated by the pipeline before the pass runs
        self.program
            .module(self.root)
            .unwrap_or_else(|_| unreachable!("pass root module disappeared"))
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.program
            .module_mut(self.root)
            .unwrap_or_else(|_| unreachable!("pass root module disappeared"))
    }

    pub fn root_id(&self) -> ModuleId {
        self.root
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn program_mut(&mut self) -> &mut Program {
        self.program
    }

    /// Create a submodule on the owning program.
    pub fn create_module(&mut self, name: impl Into<String>) -> Result<ModuleId> {
        self.program.create_module(name)
    }
}

/// Run a pipeline over every non-bypass module of the program.
///
/// Modules created by a pass (offload partitions) are not revisited by that
/// pass; they are picked up from the next pass on if they are not marked
/// bypass.
pub fn run_passes(program: &mut Program, passes: &[Box<dyn Pass>]) -> Result<()> {
    for pass in passes {
        let roots: Vec<ModuleId> = program
            .modules()
            .filter(|(_, m)| !m.bypass())
            .map(|(id, _)| id)
            .collect();
        for root in roots {
            apply_one(program, root, pass.as_ref())?;
        }
    }
    Ok(())
}

/// Run a pipeline over a single module.
pub fn run_passes_on(
    program: &mut Program,
    root: ModuleId,
    passes: &[Box<dyn Pass>],
) -> Result<()> {
    for pass in passes {
        apply_one(program, root, pass.as_ref())?;
    }
    Ok(())
}

fn apply_one(program: &mut Program, root: ModuleId, pass: &dyn Pass) -> Result<()> {
    let module_name = program.module(root)?.name().to_string();
    let span = debug_span!("pass", name = pass.name(), module = %module_name);
    let _guard = span.enter();

    let mut mpm = ModulePassManager::new(program, root);
    pass.apply(&mut mpm)?;

    program.module(root)?.validate().map_err(|e| {
        Error::InvalidGraph(format!(
            "pass '{}' left module '{}' invalid: {}",
            pass.name(),
            module_name,
            e
        ))
    })
}
