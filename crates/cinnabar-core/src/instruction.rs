//! One node of the computation graph.
//!
//! An instruction pairs an operation with its data dependencies, its cached
//! result shape, and (for control-flow / offload operations) the submodules
//! it references. Instructions also track their consumers so graph rewrites
//! can fix up both edge directions in O(consumers).

use std::sync::Arc;

use petgraph::graph::NodeIndex;

use crate::operation::Operation;
use crate::program::ModuleId;
use crate::shape::Shape;

/// Stable instruction identity: an index into the owning module's arena,
/// never invalidated by unrelated mutations.
pub type InsId = NodeIndex;

/// A single instruction: operation, inputs, consumers, cached shape, and
/// referenced submodules.
///
/// Invariant: the input/output relation is its own transpose across the
/// owning module — every instruction listed as an input of `x` lists `x`
/// among its outputs, with matching multiplicity. The module's mutation
/// primitives maintain this; instructions are not edited directly.
pub struct Instruction {
    pub(crate) op: Arc<dyn Operation>,
    pub(crate) shape: Shape,
    pub(crate) inputs: Vec<InsId>,
    pub(crate) outputs: Vec<InsId>,
    pub(crate) mods: Vec<ModuleId>,
}

impl Instruction {
    pub(crate) fn new(
        op: Arc<dyn Operation>,
        shape: Shape,
        inputs: Vec<InsId>,
        mods: Vec<ModuleId>,
    ) -> Self {
        Self {
            op,
            shape,
            inputs,
            outputs: Vec::new(),
            mods,
        }
    }

    /// The operation's name.
    pub fn name(&self) -> &str {
        self.op.name()
    }

    pub fn op(&self) -> &dyn Operation {
        self.op.as_ref()
    }

    /// Shared handle to the operation, for structural copies.
    pub fn op_arc(&self) -> Arc<dyn Operation> {
        Arc::clone(&self.op)
    }

    /// Downcast the operation to a concrete type.
    pub fn op_as<T: 'static>(&self) -> Option<&T> {
        self.op.as_any().downcast_ref::<T>()
    }

    /// The cached result shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Data dependencies, in operand order.
    pub fn inputs(&self) -> &[InsId] {
        &self.inputs
    }

    /// Consumers; one entry per use.
    pub fn outputs(&self) -> &[InsId] {
        &self.outputs
    }

    /// Referenced submodules (non-owning; resolved through the program).
    pub fn module_refs(&self) -> &[ModuleId] {
        &self.mods
    }

    /// Whether the name marks a structural (`@`-reserved) instruction.
    pub fn is_reserved(&self) -> bool {
        self.name().starts_with(crate::operation::RESERVED_PREFIX)
    }
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({:?}) -> {}",
            self.name(),
            self.inputs
                .iter()
                .map(|i| i.index())
                .collect::<Vec<_>>(),
            self.shape
        )
    }
}
