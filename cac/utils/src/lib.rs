//! Shared utilities for the CAC compiler.
mod errors;
mod id;
mod namegenerator;
mod out_file;

pub use errors::{CacResult, Error};
pub use id::{GSym, GetName, Id};
pub use namegenerator::NameGenerator;
pub use out_file::OutputFile;
