//! Parser for the CAC surface language.
pub mod ast;
mod parser;

pub use ast::{
    ActivationDef, BinOp, Block, Direction, Edge, Event, Expr, ModuleDef,
    NamespaceDef, PortAst, Stmt, StmtBody,
};
pub use parser::CacParser;
