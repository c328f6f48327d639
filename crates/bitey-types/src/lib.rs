//! Language-neutral descriptions of native types.
//!
//! Every other bitey crate speaks in terms of [`TypeDescriptor`]: the
//! metadata extractor produces them, the layout resolver turns them into
//! concrete layouts and the binding synthesizer derives marshaling rules
//! from them.

mod descriptor;
mod display;
mod table;

pub use descriptor::{Field, FunctionType, StructType, TypeDescriptor};
pub use table::{StructTable, TypeError};
