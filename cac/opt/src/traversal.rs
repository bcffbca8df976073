//! Traits implemented by IR passes.

use cac_ir as ir;
use cac_utils::CacResult;

/// Trait that describes named things. Calling
/// [`do_pass`](Pass::do_pass) requires this to be implemented.
///
/// This has to be a separate trait from [`Pass`] because these methods don't
/// receive `self` which means that it is impossible to create dynamic trait
/// objects.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
}

/// A transformation of one module. Passes may be re-run idempotently; none
/// assumes prior state beyond the structural invariants.
pub trait Pass {
    /// Precondition for this pass to run on the module. Violations abort
    /// the compile.
    fn precondition(
        _ctx: &ir::Context,
        _module: ir::ModIdx,
    ) -> CacResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }

    /// Consume and mutate one module.
    fn run(
        &mut self,
        ctx: &mut ir::Context,
        module: ir::ModIdx,
    ) -> CacResult<()>;

    /// Check the precondition and run a default-constructed instance of the
    /// pass.
    fn do_pass(ctx: &mut ir::Context, module: ir::ModIdx) -> CacResult<()>
    where
        Self: Default + Sized + Named,
    {
        Self::precondition(ctx, module)?;
        Self::default().run(ctx, module)
    }
}
