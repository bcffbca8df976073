//! Dead-instruction and dead-resource elimination.

use crate::traversal::{Named, Pass};
use cac_ir::{self as ir, PrimKind};
use cac_utils::{CacResult, Error};
use std::collections::HashSet;

/// To a fixed point: drops empty instructions with no continuations,
/// collapses combinational jumps, and tombstones resources none of whose
/// output-facing ports is read anywhere.
#[derive(Default)]
pub struct DeadCodeElimination;

impl Named for DeadCodeElimination {
    fn name() -> &'static str {
        "dce"
    }

    fn description() -> &'static str {
        "remove dead instructions and dead resources"
    }
}

impl Pass for DeadCodeElimination {
    fn precondition(
        ctx: &ir::Context,
        module: ir::ModIdx,
    ) -> CacResult<()> {
        if ctx.module(module).instrs().any(|(_, instr)| {
            instr.continuations.iter().any(|act| act.delay > 1)
        }) {
            return Err(Error::pass_assumption(
                Self::name(),
                format!(
                    "module `{}' has unnormalized delays",
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
        loop {
            let mut changed = false;
            changed |= collapse_jumps(ctx, module);
            changed |= drop_inert_empties(ctx, module);
            changed |= drop_dead_resources(ctx, module);
            if !changed {
                break;
            }
        }
        Ok(())
    }
}

/// True iff `port` is the output of a width-1 constant-1 instance.
fn is_true_const(
    ctx: &ir::Context,
    module: ir::ModIdx,
    port: &ir::Port,
) -> bool {
    let Some(inst) = port.instance() else {
        return false;
    };
    let source = ctx.module(module).instance(inst).source;
    matches!(
        ctx.module(source).prototype,
        Some(ir::Prototype {
            kind: PrimKind::Const { value: 1 },
            width: 1,
            ..
        })
    )
}

/// Bypass empty non-start instructions whose single continuation is
/// unconditional and combinational: every predecessor edge is retargeted at
/// the successor and the jump is dropped.
fn collapse_jumps(ctx: &mut ir::Context, module: ir::ModIdx) -> bool {
    let mut changed = false;
    for idx in ctx.module(module).instr_indices() {
        let instr = ctx.module(module).instr(idx);
        if !instr.is_empty()
            || instr.is_start
            || instr.continuations.len() != 1
        {
            continue;
        }
        let act = instr.continuations[0];
        if act.delay != 0
            || act.dest == idx
            || !is_true_const(ctx, module, &act.cond)
        {
            continue;
        }
        let succ = act.dest;
        for (pred, _) in ctx.module(module).predecessors(idx) {
            for edge in ctx
                .module_mut(module)
                .instr_mut(pred)
                .continuations
                .iter_mut()
            {
                if edge.dest == idx {
                    edge.dest = succ;
                }
            }
        }
        ctx.module_mut(module).remove_instr(idx);
        changed = true;
    }
    changed
}

/// Drop empty instructions with no continuations and strip edges pointing
/// at removed instructions.
fn drop_inert_empties(ctx: &mut ir::Context, module: ir::ModIdx) -> bool {
    let mut changed = false;
    for idx in ctx.module(module).instr_indices() {
        let instr = ctx.module(module).instr(idx);
        if instr.is_empty() && instr.continuations.is_empty() {
            ctx.module_mut(module).remove_instr(idx);
            changed = true;
        }
    }
    if changed {
        let m = ctx.module_mut(module);
        for idx in m.instr_indices() {
            let dead_dests: Vec<ir::InstrIdx> = m
                .instr(idx)
                .continuations
                .iter()
                .map(|act| act.dest)
                .filter(|dest| !m.instr(*dest).live())
                .collect();
            if !dead_dests.is_empty() {
                m.instr_mut(idx)
                    .continuations
                    .retain(|act| !dead_dests.contains(&act.dest));
            }
        }
    }
    changed
}

/// A resource is dead iff none of its output-facing ports appears in any
/// structural connection, instruction, or continuation condition.
fn drop_dead_resources(ctx: &mut ir::Context, module: ir::ModIdx) -> bool {
    let mut read: HashSet<ir::InstIdx> = HashSet::new();
    {
        let m = ctx.module(module);
        for (_, instr) in m.instrs() {
            for port in instr.ports() {
                if port.is_source() {
                    if let Some(inst) = port.instance() {
                        read.insert(inst);
                    }
                }
            }
        }
        for sc in &m.structural {
            if let Some(inst) = sc.src.instance() {
                read.insert(inst);
            }
        }
    }

    let dead: Vec<ir::InstIdx> = ctx
        .module(module)
        .instances()
        .filter(|(idx, _)| !read.contains(idx))
        .map(|(idx, _)| idx)
        .collect();
    for inst in &dead {
        ctx.module_mut(module).disconnect_instance(*inst);
        ctx.module_mut(module).remove_instance(*inst);
    }
    !dead.is_empty()
}
