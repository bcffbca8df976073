//! Inlines every invoke by splicing a rewritten copy of the callee's body
//! into the caller.

use crate::traversal::{Named, Pass};
use cac_ir::{self as ir, GetName};
use cac_utils::{CacResult, Error};
use std::collections::HashMap;

/// Replaces each `Invoke` with a copy of the callee's body: the callee's
/// resources are cloned into the caller, ports with no instance are resolved
/// through the invoke's binding map, and the inlined body exits through a
/// single fresh empty instruction that inherits the invoke's continuations.
#[derive(Default)]
pub struct InlineInvokes;

impl Named for InlineInvokes {
    fn name() -> &'static str {
        "inline"
    }

    fn description() -> &'static str {
        "inline the body of every invoked calling convention"
    }
}

impl Pass for InlineInvokes {
    fn run(
        &mut self,
        ctx: &mut ir::Context,
        module: ir::ModIdx,
    ) -> CacResult<()> {
        // Inlining a body can introduce fresh invokes (a calling convention
        // may itself invoke), so iterate to a fixed point.
        loop {
            let next = ctx
                .module(module)
                .instrs()
                .find(|(_, instr)| instr.is_invoke())
                .map(|(idx, _)| idx);
            let Some(invoke) = next else {
                break;
            };
            inline_one(ctx, module, invoke)?;
        }
        Ok(())
    }
}

/// Rewrite `port` for use in the caller: ports on the callee itself resolve
/// through the binding map, instance-qualified ports remap to the cloned
/// resource.
fn rewrite_port(
    port: &ir::Port,
    bindings: &[(ir::Id, ir::Port)],
    resource_map: &HashMap<ir::InstIdx, ir::InstIdx>,
    callee_name: ir::Id,
) -> CacResult<ir::Port> {
    match port.parent {
        ir::PortParent::This => bindings
            .iter()
            .find(|(name, _)| *name == port.name)
            .map(|(_, bound)| *bound)
            .ok_or_else(|| {
                Error::malformed_structure(format!(
                    "invoke of `{}' leaves port `{}' unbound",
                    callee_name, port.name
                ))
            }),
        ir::PortParent::Inst(inst) => Ok(ir::Port {
            parent: ir::PortParent::Inst(resource_map[&inst]),
            ..*port
        }),
    }
}

fn inline_one(
    ctx: &mut ir::Context,
    module: ir::ModIdx,
    invoke: ir::InstrIdx,
) -> CacResult<()> {
    let (callee, bindings) = match &ctx.module(module).instr(invoke).op {
        ir::Operation::Invoke { callee, bindings } => {
            (*callee, bindings.clone())
        }
        _ => unreachable!("inline_one called on a non-invoke"),
    };
    let callee_name = ctx.module(callee).name();

    // 1. Fresh caller-local instances for each of the callee's resources.
    let callee_insts: Vec<(ir::InstIdx, ir::Id, ir::ModIdx)> = ctx
        .module(callee)
        .instances()
        .map(|(idx, inst)| (idx, inst.name(), inst.source))
        .collect();
    let mut builder = ir::Builder::new(ctx, module);
    let mut resource_map: HashMap<ir::InstIdx, ir::InstIdx> = HashMap::new();
    for (idx, base, source) in callee_insts {
        let fresh = if builder.ctx.module(source).is_sequential {
            builder.fresh_sequential_instance(source, base)?
        } else {
            builder.fresh_instance(source, base)
        };
        resource_map.insert(idx, fresh);
    }

    // 2. The single exit of the inlined body inherits the invoke's
    // continuations.
    let inv_end = builder.add_empty();
    let true_port = builder.true_port()?;
    let conts = std::mem::take(
        &mut ctx.module_mut(module).instr_mut(invoke).continuations,
    );
    ctx.module_mut(module).instr_mut(inv_end).continuations = conts;

    // 3. Deep-clone the callee body, rewriting every port. Clones lose their
    // start marker; the invoke drives them instead.
    let callee_instrs: Vec<(ir::InstrIdx, ir::Instruction)> = ctx
        .module(callee)
        .instrs()
        .map(|(idx, instr)| (idx, instr.clone()))
        .collect();
    let mut clone_map: HashMap<ir::InstrIdx, ir::InstrIdx> = HashMap::new();
    let mut starts = Vec::new();
    for (idx, instr) in &callee_instrs {
        let mut clone = instr.clone();
        let was_start = clone.is_start;
        clone.is_start = false;
        let mut rewrite_err = None;
        clone.for_each_port(|port| {
            match rewrite_port(port, &bindings, &resource_map, callee_name) {
                Ok(new) => *port = new,
                Err(err) => rewrite_err = Some(err),
            }
        });
        if let Some(err) = rewrite_err {
            return Err(err);
        }
        let fresh = ctx.module_mut(module).add_instr(clone);
        clone_map.insert(*idx, fresh);
        if was_start {
            starts.push(fresh);
        }
    }

    // 4. Redirect cloned continuations through the clone map; conditions
    // were already rewritten above and delays are preserved.
    // 5. Clones with no continuations exit through `inv_end`.
    for fresh in clone_map.values() {
        let instr = ctx.module_mut(module).instr_mut(*fresh);
        if instr.continuations.is_empty() {
            instr.continue_to(true_port, inv_end, 0);
        } else {
            for act in instr.continuations.iter_mut() {
                act.dest = clone_map[&act.dest];
            }
        }
    }

    // 6. The invoke becomes a pure control node that fans out to the cloned
    // start instructions.
    let instr = ctx.module_mut(module).instr_mut(invoke);
    instr.erase();
    for start in starts {
        instr.continue_to(true_port, start, 0);
    }
    log::debug!(
        "inlined invoke of `{}' ({} instructions)",
        callee_name,
        callee_instrs.len()
    );
    Ok(())
}
