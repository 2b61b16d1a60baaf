//! The program: the owner of all modules.
//!
//! Modules never own each other. An instruction that needs a submodule (an
//! offload placeholder, say) stores a [`ModuleId`], and the program resolves
//! it on demand. That keeps the module graph acyclic by construction and
//! sidesteps ownership cycles entirely.

use crate::module::Module;
use crate::{Error, Result};

/// Non-owning reference to a module, resolved through its [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A complete program: a main module plus any submodules passes have split
/// out of it.
pub struct Program {
    modules: Vec<Module>,
    main: ModuleId,
}

impl Program {
    /// Create a program with an empty main module.
    pub fn new() -> Self {
        Self {
            modules: vec![Module::new("main")],
            main: ModuleId(0),
        }
    }

    pub fn main_id(&self) -> ModuleId {
        self.main
    }

    pub fn main(&self) -> &Module {
        &self.modules[self.main.0]
    }

    pub fn main_mut(&mut self) -> &mut Module {
        &mut self.modules[self.main.0]
    }

    /// Create a new (sub)module with a unique name.
    ///
    /// # Errors
    ///
    /// Returns an error if a module with that name already exists.
    pub fn create_module(&mut self, name: impl Into<String>) -> Result<ModuleId> {
        let name = name.into();
        if self.find_module(&name).is_some() {
            return Err(Error::InvalidGraph(format!(
                "program already has a module named '{}'",
                name
            )));
        }
        self.modules.push(Module::new(name));
        Ok(ModuleId(self.modules.len() - 1))
    }

    pub fn module(&self, id: ModuleId) -> Result<&Module> {
        self.modules
            .get(id.0)
            .ok_or_else(|| Error::InvalidGraph(format!("module {:?} not found", id)))
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Result<&mut Module> {
        self.modules
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidGraph(format!("module {:?} not found", id)))
    }

    /// Mutable access to two distinct modules at once, for rewrites that
    /// move instructions across a module boundary.
    pub fn module_pair_mut(
        &mut self,
        a: ModuleId,
        b: ModuleId,
    ) -> Result<(&mut Module, &mut Module)> {
        if a == b {
            return Err(Error::InvalidGraph(
                "module pair must name two distinct modules".to_string(),
            ));
        }
        if a.0 >= self.modules.len() || b.0 >= self.modules.len() {
            return Err(Error::InvalidGraph(format!(
                "module pair ({:?}, {:?}) out of range",
                a, b
            )));
        }
        if a.0 < b.0 {
            let (lo, hi) = self.modules.split_at_mut(b.0);
            Ok((&mut lo[a.0], &mut hi[0]))
        } else {
            let (lo, hi) = self.modules.split_at_mut(a.0);
            Ok((&mut hi[0], &mut lo[b.0]))
        }
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name() == name)
            .map(ModuleId)
    }

    /// All modules, main first.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> + '_ {
        self.modules.iter().enumerate().map(|(i, m)| (ModuleId(i), m))
    }

    /// Resolve a list of module references, in order.
    pub fn resolve(&self, ids: &[ModuleId]) -> Result<Vec<&Module>> {
        ids.iter().map(|&id| self.module(id)).collect()
    }

    /// Validate every module's structural invariants.
    pub fn validate(&self) -> Result<()> {
        for m in &self.modules {
            m.validate()?;
        }
        Ok(())
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for m in &self.modules {
            writeln!(f, "{:?}", m)?;
        }
        Ok(())
    }
}
