//! Built-in operators for the Cinnabar graph compiler.
//!
//! Each operator implements [`cinnabar_core::Operation`]: shape inference
//! always, a reference evaluation where one exists, and alias/attribute
//! declarations where they matter to the passes. The catalog is open; this
//! crate is one provider, not an enumeration.

pub mod elementwise;
pub mod indexing;
pub mod layout;
pub mod reduce;

pub use elementwise::{Add, Mul, Relu};
pub use indexing::{Gather, Scatter, ScatterReduction};
pub use layout::{Broadcast, Contiguous, CopyOp, Identity, Transpose};
pub use reduce::{ReduceSum, Softmax};

use std::sync::Arc;

use cinnabar_core::{OperationRegistry, Result};

/// Register every built-in operator with default attributes.
pub fn register_builtin(reg: &mut OperationRegistry) -> Result<()> {
    reg.register(|| Arc::new(Identity))?;
    reg.register(|| Arc::new(CopyOp))?;
    reg.register(|| Arc::new(Contiguous))?;
    reg.register(|| Arc::new(Transpose::default()))?;
    reg.register(|| Arc::new(Broadcast::default()))?;
    reg.register(|| Arc::new(Add))?;
    reg.register(|| Arc::new(Mul))?;
    reg.register(|| Arc::new(Relu))?;
    reg.register(|| Arc::new(Softmax::default()))?;
    reg.register(|| Arc::new(ReduceSum::default()))?;
    reg.register(|| Arc::new(Gather::default()))?;
    reg.register(|| Arc::new(Scatter::default()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtin() {
        let mut reg = OperationRegistry::new();
        register_builtin(&mut reg).unwrap();

        for name in [
            "identity", "copy", "contiguous", "transpose", "broadcast", "add", "mul", "relu",
            "softmax", "reduce_sum", "gather", "scatter",
        ] {
            assert!(reg.contains(name), "missing operator '{}'", name);
        }
    }
}
