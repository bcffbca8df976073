//! Reduces every continuation delay to 0 or 1.

use crate::traversal::{Named, Pass};
use cac_ir::{self as ir};
use cac_utils::{CacResult, Error};

/// Splits every continuation with delay d > 1 through a chain of fresh
/// empty instructions until all delays are 0 or 1. The condition is
/// evaluated at the original source; the inserted hops are unconditional.
#[derive(Default)]
pub struct NormalizeDelays;

impl Named for NormalizeDelays {
    fn name() -> &'static str {
        "normalize-delays"
    }

    fn description() -> &'static str {
        "reduce every continuation delay to 0 or 1"
    }
}

impl Pass for NormalizeDelays {
    fn precondition(
        ctx: &ir::Context,
        module: ir::ModIdx,
    ) -> CacResult<()> {
        // By convention this pass runs after inlining.
        if ctx
            .module(module)
            .instrs()
            .any(|(_, instr)| instr.is_invoke())
        {
            return Err(Error::pass_assumption(
                Self::name(),
                format!(
                    "module `{}' still contains invokes",
                    ctx.module(module).name()
                ),
            ));
        }
        Ok(())
    }

    fn run(
        &mut self,
        ctx: &mut ir::Context,
        module: ir::ModIdx,
    ) -> CacResult<()> {
        // Every step strictly reduces the total excess delay.
        loop {
            let excess = ctx.module(module).instrs().find_map(|(idx, instr)| {
                instr
                    .continuations
                    .iter()
                    .position(|act| act.delay > 1)
                    .map(|pos| (idx, pos))
            });
            let Some((idx, pos)) = excess else {
                break;
            };

            let mut builder = ir::Builder::new(ctx, module);
            let hop = builder.add_empty();
            let one = builder.true_port()?;
            let act = ctx.module(module).instr(idx).continuations[pos];
            ctx.module_mut(module)
                .instr_mut(hop)
                .continue_to(one, act.dest, 1);
            let act = &mut ctx.module_mut(module).instr_mut(idx).continuations[pos];
            act.dest = hop;
            act.delay -= 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::NormalizeDelays;
    use crate::traversal::Pass;
    use cac_ir::{self as ir};

    #[test]
    fn delay_three_becomes_a_chain() {
        let mut ctx = ir::Context::new();
        let m = ctx.add_module("m").unwrap();
        let mut builder = ir::Builder::new(&mut ctx, m);
        let a = builder.add_empty();
        let b = builder.add_empty();
        let one = builder.true_port().unwrap();
        builder.continue_to(a, one, b, 3).unwrap();
        ctx.module_mut(m).instr_mut(a).is_start = true;

        NormalizeDelays::do_pass(&mut ctx, m).unwrap();

        let module = ctx.module(m);
        assert!(module
            .instrs()
            .all(|(_, i)| i.continuations.iter().all(|act| act.delay <= 1)));
        // Two fresh empties bridge the original edge: a -> e1 -> e2 -> b.
        let mut hops = 0;
        let mut cur = a;
        loop {
            let conts = &module.instr(cur).continuations;
            assert_eq!(conts.len(), 1);
            if conts[0].dest == b {
                break;
            }
            cur = conts[0].dest;
            hops += 1;
        }
        assert_eq!(hops, 2);
    }

    #[test]
    fn idempotent() {
        let mut ctx = ir::Context::new();
        let m = ctx.add_module("m").unwrap();
        let mut builder = ir::Builder::new(&mut ctx, m);
        let a = builder.add_empty();
        let b = builder.add_empty();
        let one = builder.true_port().unwrap();
        builder.continue_to(a, one, b, 2).unwrap();

        NormalizeDelays::do_pass(&mut ctx, m).unwrap();
        let before: Vec<_> =
            ctx.module(m).instrs().map(|(_, i)| i.clone()).collect();
        NormalizeDelays::do_pass(&mut ctx, m).unwrap();
        let after: Vec<_> =
            ctx.module(m).instrs().map(|(_, i)| i.clone()).collect();
        assert_eq!(before, after);
    }
}
