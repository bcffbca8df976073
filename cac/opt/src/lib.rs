//! Passes that rewrite the CAC IR into a form the RTL backend accepts.
mod pass_manager;
pub mod passes;
mod traversal;

pub use pass_manager::{PassClosure, PassManager};
pub use traversal::{Named, Pass};
