//! Replaces logical channels with per-path pipeline registers.

use crate::passes::InlineInvokes;
use crate::traversal::{Named, Pass};
use cac_ir::{self as ir, GetName, PrimKind, primitives};
use cac_utils::{CacResult, Error};
use std::collections::HashSet;

/// A channel has no temporal semantics: a delay-0 edge between its writer
/// and a reader means the reader observes the producer's combinational
/// value, while a delay-1 edge must cross a register boundary. This pass
/// walks the continuation graph from each channel's unique writer, carries
/// the live value port along, inserts a register store per visited node, and
/// rewrites readers to the register output (delay-1 hops) or the live value
/// (delay-0 hops). The channel is then erased and inlining re-runs to absorb
/// the inserted stores.
#[derive(Default)]
pub struct SynthesizeChannels;

impl Named for SynthesizeChannels {
    fn name() -> &'static str {
        "synthesize-channels"
    }

    fn description() -> &'static str {
        "replace channel instances with per-path pipeline registers"
    }
}

impl Pass for SynthesizeChannels {
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
        let channels: Vec<ir::InstIdx> = ctx
            .module(module)
            .instances()
            .filter(|(_, inst)| {
                matches!(
                    ctx.module(inst.source).prototype,
                    Some(ir::Prototype { kind: PrimKind::Channel, .. })
                )
            })
            .map(|(idx, _)| idx)
            .collect();
        for ch in &channels {
            synthesize_one(ctx, module, *ch)?;
        }
        if !channels.is_empty() {
            // Absorb the freshly inserted register stores.
            InlineInvokes::do_pass(ctx, module)?;
        }
        Ok(())
    }
}

fn synthesize_one(
    ctx: &mut ir::Context,
    module: ir::ModIdx,
    ch: ir::InstIdx,
) -> CacResult<()> {
    let ch_name = ctx.module(module).instance(ch).name();
    let ch_in = ctx.inst_pt(module, ch, "in")?;
    let ch_out = ctx.inst_pt(module, ch, "out")?;

    let writers = ctx.module(module).writers(&ch_in);
    if writers.len() > 1 {
        return Err(Error::pass_assumption(
            SynthesizeChannels::name(),
            format!("channel `{}' has multiple writers", ch_name),
        ));
    }
    let Some(writer) = writers.first().copied() else {
        // A channel nobody writes can only be erased if nobody reads it.
        let read = ctx.module(module).instrs().any(|(_, instr)| {
            instr.ports().iter().any(|p| *p == ch_out)
        }) || ctx
            .module(module)
            .structural
            .iter()
            .any(|sc| sc.src == ch_out);
        if read {
            return Err(Error::pass_assumption(
                SynthesizeChannels::name(),
                format!("channel `{}' is read but never written", ch_name),
            ));
        }
        ctx.module_mut(module).disconnect_instance(ch);
        ctx.module_mut(module).remove_instance(ch);
        return Ok(());
    };
    let origin = match &ctx.module(module).instr(writer).op {
        ir::Operation::Connect { src, .. } => *src,
        _ => unreachable!("writers() returned a non-connect"),
    };
    let width = origin.width;

    // Instructions present before synthesis; the walk never follows edges
    // into the stores it inserts.
    let original: HashSet<ir::InstrIdx> =
        ctx.module(module).instr_indices().into_iter().collect();

    let mut worklist: Vec<(ir::InstrIdx, ir::Port)> = vec![(writer, origin)];
    let mut visited: HashSet<ir::InstrIdx> = HashSet::new();
    while let Some((node, value)) = worklist.pop() {
        if !visited.insert(node) {
            continue;
        }

        // Register the live value so delay-1 successors can observe it.
        let mut builder = ir::Builder::new(ctx, module);
        let reg_mod = primitives::register(builder.ctx, width)?;
        let reg = builder.fresh_sequential_instance(reg_mod, "pipe_reg")?;
        let store = builder.add_invoke(reg, "st")?;
        builder.bind(store, "in", value)?;
        let en = builder.true_port()?;
        builder.bind(store, "en", en)?;
        let one = builder.true_port()?;
        builder.continue_to(node, one, store, 0)?;
        let reg_data = builder.inst_pt(reg, "data")?;

        let conts = ctx.module(module).instr(node).continuations.clone();
        for act in conts {
            if !original.contains(&act.dest) || visited.contains(&act.dest) {
                continue;
            }
            let replacement = if act.delay == 1 { reg_data } else { value };
            ctx.module_mut(module)
                .instr_mut(act.dest)
                .for_each_port(|p| {
                    if *p == ch_out {
                        *p = replacement;
                    }
                });
            worklist.push((act.dest, replacement));
        }
    }

    // Erase the channel; erasure empties any residual instruction that
    // still references it (the original writer included).
    ctx.module_mut(module).disconnect_instance(ch);
    ctx.module_mut(module).remove_instance(ch);
    log::debug!("synthesized channel `{}'", ch_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SynthesizeChannels;
    use crate::passes::NormalizeDelays;
    use crate::traversal::Pass;
    use cac_ir::{self as ir, GetName, PrimKind, primitives};

    /// Producer writes a wire's output into a channel; one consumer reads it
    /// a cycle later, another in the same cycle.
    fn channel_module(
        ctx: &mut ir::Context,
    ) -> (ir::ModIdx, ir::InstrIdx, ir::InstrIdx) {
        let m = ctx.add_module("m").unwrap();
        {
            let module = ctx.module_mut(m);
            module.add_in_port("in_data", 16).unwrap();
            module.add_out_port("seq_out", 16).unwrap();
            module.add_out_port("comb_out", 16).unwrap();
        }
        let mut builder = ir::Builder::new(ctx, m);
        let ch = builder.add_channel(16).unwrap();
        let ch_in = builder.inst_pt(ch, "in").unwrap();
        let ch_out = builder.inst_pt(ch, "out").unwrap();
        let write = builder
            .add_start_connect(builder.pt("in_data").unwrap(), ch_in)
            .unwrap();
        let read_seq = builder
            .add_connect(ch_out, builder.pt("seq_out").unwrap())
            .unwrap();
        let read_comb = builder
            .add_connect(ch_out, builder.pt("comb_out").unwrap())
            .unwrap();
        let one = builder.true_port().unwrap();
        builder.continue_to(write, one, read_seq, 1).unwrap();
        builder.continue_to(write, one, read_comb, 0).unwrap();
        (m, read_seq, read_comb)
    }

    fn channel_count(ctx: &ir::Context, m: ir::ModIdx) -> usize {
        ctx.module(m)
            .instances()
            .filter(|(_, inst)| {
                matches!(
                    ctx.module(inst.source).prototype,
                    Some(ir::Prototype { kind: PrimKind::Channel, .. })
                )
            })
            .count()
    }

    #[test]
    fn channels_are_erased() {
        let mut ctx = ir::Context::new();
        let (m, _, _) = channel_module(&mut ctx);
        NormalizeDelays::do_pass(&mut ctx, m).unwrap();
        SynthesizeChannels::do_pass(&mut ctx, m).unwrap();
        assert_eq!(channel_count(&ctx, m), 0);
        // No instance keeps the pipe_channel naming around either.
        assert!(ctx.module(m).instances().all(|(_, inst)| {
            !inst.name().as_ref().starts_with("pipe_channel_")
        }));
    }

    #[test]
    fn delay_one_reader_moves_to_register_data() {
        let mut ctx = ir::Context::new();
        let (m, read_seq, _) = channel_module(&mut ctx);
        SynthesizeChannels::do_pass(&mut ctx, m).unwrap();
        let module = ctx.module(m);
        let ir::Operation::Connect { src, .. } = &module.instr(read_seq).op
        else {
            panic!("reader is no longer a connect");
        };
        assert_eq!(src.name, "data");
        let reg = src.instance().unwrap();
        assert!(module.instance(reg).name().as_ref().starts_with("pipe_reg_"));
    }

    #[test]
    fn delay_zero_reader_moves_to_origin() {
        let mut ctx = ir::Context::new();
        let (m, _, read_comb) = channel_module(&mut ctx);
        SynthesizeChannels::do_pass(&mut ctx, m).unwrap();
        let module = ctx.module(m);
        let in_data = module.pt("in_data").unwrap();
        let ir::Operation::Connect { src, .. } = &module.instr(read_comb).op
        else {
            panic!("reader is no longer a connect");
        };
        assert_eq!(*src, in_data);
    }

    #[test]
    fn second_writer_is_fatal() {
        let mut ctx = ir::Context::new();
        let (m, _, _) = channel_module(&mut ctx);
        let mut builder = ir::Builder::new(&mut ctx, m);
        let wire_mod = primitives::wire(builder.ctx, 16).unwrap();
        let w = builder.fresh_instance(wire_mod, "w");
        let ch = ctx.module(m).find_instance("pipe_channel_0").unwrap();
        let ch_in = ctx.inst_pt(m, ch, "in").unwrap();
        let mut builder = ir::Builder::new(&mut ctx, m);
        let w_out = builder.inst_pt(w, "out").unwrap();
        builder.add_connect(w_out, ch_in).unwrap();
        assert!(SynthesizeChannels::do_pass(&mut ctx, m).is_err());
    }
}
