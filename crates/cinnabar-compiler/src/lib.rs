//! Optimization and partitioning passes for the Cinnabar graph compiler.
//!
//! Passes are independent graph-to-graph rewrites built on the editing
//! primitives of `cinnabar-core`. [`default_passes`] gives the standard
//! optimization pipeline; the offload [`Partition`] pass is target-driven
//! and is scheduled separately by whoever owns the target.

pub mod auto_contiguous;
pub mod dead_code_elimination;
pub mod partition;
pub mod propagate_copy;

pub use auto_contiguous::AutoContiguous;
pub use dead_code_elimination::DeadCodeElimination;
pub use partition::{OffloadPlaceholder, Partition};
pub use propagate_copy::PropagateCopy;

use cinnabar_core::{run_passes, Pass, Program, Result};

/// The standard optimization pipeline, in order.
pub fn default_passes() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(AutoContiguous),
        Box::new(PropagateCopy),
        Box::new(DeadCodeElimination),
    ]
}

/// Run the standard pipeline over a program.
pub fn optimize(program: &mut Program) -> Result<()> {
    run_passes(program, &default_passes())
}
