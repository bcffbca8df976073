//! Internal representation for the CAC compiler: modules of primitive
//! resources, typed ports, and a connect-and-continue instruction graph.

mod builder;
mod common;
mod context;
mod from_ast;
mod instruction;
mod module;
pub mod primitives;
mod printer;
mod structure;

pub use builder::Builder;
pub use common::{IndexRef, InstIdx, InstrIdx, ModIdx};
pub use context::Context;
pub use from_ast::lower_program;
pub use instruction::{Activation, Bindings, Instruction, Operation};
pub use module::Module;
pub use primitives::{CmpOp, PrimKind, Prototype};
pub use printer::Printer;
pub use structure::{
    Direction, Instance, Port, PortDef, PortParent, StructuralConnection,
};

pub use cac_utils::{CacResult, Error, GetName, Id};
