//! Core intermediate representation and pass framework for Cinnabar.
//!
//! This crate provides the foundational abstractions that the rest of the
//! compiler builds on:
//! - Tensor metadata and values (`Shape`, `Argument`)
//! - The instruction graph IR (`Instruction`, `Module`, `Program`)
//! - The `Operation` trait for the open operator set, plus the structural
//!   `@`-prefixed pseudo-operations (`@param`, `@literal`, `@outline`,
//!   `@return`)
//! - The `Pass` trait and `ModulePassManager` for running transformation
//!   pipelines
//! - An operation registry for name-based construction
//! - A reference evaluator used for testing and verification

pub mod argument;
pub mod eval;
pub mod instruction;
pub mod module;
pub mod operation;
pub mod pass;
pub mod program;
pub mod registry;
pub mod shape;

pub use argument::{generate_argument, Argument};
pub use eval::evaluate_module;
pub use instruction::{InsId, Instruction};
pub use module::{copy_instructions, Module};
pub use operation::{
    normalize_axes, normalize_axis, Attributes, Literal, Operation, Outline, Param, Return,
};
pub use pass::{run_passes, run_passes_on, ModulePassManager, Pass};
pub use program::{ModuleId, Program};
pub use registry::OperationRegistry;
pub use shape::{for_each_index, DataType, Shape};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for IR and pass operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation rejected its input shapes or submodules.
    #[error("shape error: {0}")]
    Shape(String),

    /// A structural invariant of the instruction graph was violated.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// The reference evaluator could not produce a value.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// The requested capability is not implemented by this operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}
