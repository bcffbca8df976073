//! Interface for a CAC backend.
use cac_ir as ir;
use cac_utils::{CacResult, OutputFile};

/// A backend for the CAC compiler.
pub trait Backend {
    /// The name of this backend.
    fn name(&self) -> &'static str;
    /// Validate this module for emitting using this backend. Returns an
    /// `Err(..)` if the module has unexpected constructs.
    fn validate(ctx: &ir::Context, module: ir::ModIdx) -> CacResult<()>;
    /// Transform the module into a formatted string and write it to `file`.
    fn emit(
        ctx: &ir::Context,
        module: ir::ModIdx,
        file: &mut OutputFile,
    ) -> CacResult<()>;
    /// Convenience function to validate and emit the module.
    fn run(
        &self,
        ctx: &ir::Context,
        module: ir::ModIdx,
        mut file: OutputFile,
    ) -> CacResult<()> {
        Self::validate(ctx, module)?;
        Self::emit(ctx, module, &mut file)
    }
}
