//! Promotes single-writer insensitive inputs to structural wires.

use crate::traversal::{Named, Pass};
use cac_ir::{self as ir};
use cac_utils::CacResult;

/// An insensitive resource input that is assigned in exactly one place
/// needs no arbitration: the writing connect becomes a pure control node
/// and the wiring moves into a structural connection.
#[derive(Default)]
pub struct ReduceStructures;

impl Named for ReduceStructures {
    fn name() -> &'static str {
        "reduce-structures"
    }

    fn description() -> &'static str {
        "promote insensitive single-writer inputs to structural wires"
    }
}

impl Pass for ReduceStructures {
    fn run(
        &mut self,
        ctx: &mut ir::Context,
        module: ir::ModIdx,
    ) -> CacResult<()> {
        let instances: Vec<ir::InstIdx> =
            ctx.module(module).instances().map(|(idx, _)| idx).collect();
        for inst in instances {
            let source = ctx.module(module).instance(inst).source;
            let port_names: Vec<ir::Id> = ctx
                .module(source)
                .ports
                .iter()
                .map(|(name, _)| *name)
                .collect();
            for name in port_names {
                let port = ctx.inst_pt(module, inst, name)?;
                if !port.is_sink() || port.sensitive {
                    continue;
                }
                // A structural driver already claims this port (for example
                // the implicit clk/rst wiring); promotion would double-drive.
                if ctx
                    .module(module)
                    .structural
                    .iter()
                    .any(|sc| sc.dst == port)
                {
                    continue;
                }
                let writers = ctx.module(module).writers(&port);
                let [writer] = writers.as_slice() else {
                    continue;
                };
                let src = match &ctx.module(module).instr(*writer).op {
                    ir::Operation::Connect { src, .. } => *src,
                    _ => unreachable!("writers() returned a non-connect"),
                };
                let m = ctx.module_mut(module);
                m.instr_mut(*writer).erase();
                m.structural
                    .push(ir::StructuralConnection { src, dst: port });
                log::debug!(
                    "promoted single write to `{}' to a structural wire",
                    port.name
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ReduceStructures;
    use crate::traversal::Pass;
    use cac_ir::{self as ir, primitives};

    #[test]
    fn single_writer_insensitive_input_is_promoted() {
        let mut ctx = ir::Context::new();
        let m = ctx.add_module("m").unwrap();
        ctx.module_mut(m).add_out_port("out", 8).unwrap();
        let mut builder = ir::Builder::new(&mut ctx, m);
        let c = builder.add_constant(42, 8).unwrap();
        let wire_mod = primitives::wire(builder.ctx, 8).unwrap();
        let w = builder.fresh_instance(wire_mod, "w");
        let c_out = builder.inst_pt(c, "out").unwrap();
        let w_in = builder.inst_pt(w, "in").unwrap();
        let write = builder.add_start_connect(c_out, w_in).unwrap();

        ReduceStructures::do_pass(&mut ctx, m).unwrap();

        let module = ctx.module(m);
        assert!(module.instr(write).is_empty());
        assert!(module
            .structural
            .iter()
            .any(|sc| sc.src == c_out && sc.dst == w_in));
    }

    #[test]
    fn sensitive_ports_keep_their_writers() {
        let mut ctx = ir::Context::new();
        let m = ctx.add_module("m").unwrap();
        let mut builder = ir::Builder::new(&mut ctx, m);
        let reg_mod = primitives::register(builder.ctx, 8).unwrap();
        let r = builder.fresh_sequential_instance(reg_mod, "r").unwrap();
        let one = builder.add_constant(1, 1).unwrap();
        let one_out = builder.inst_pt(one, "out").unwrap();
        let en = builder.inst_pt(r, "en").unwrap();
        let write = builder.add_start_connect(one_out, en).unwrap();

        ReduceStructures::do_pass(&mut ctx, m).unwrap();

        // `en` has a declared default, so its write keeps arbitration.
        assert!(ctx.module(m).instr(write).is_connect());
    }

    #[test]
    fn double_writers_are_untouched() {
        let mut ctx = ir::Context::new();
        let m = ctx.add_module("m").unwrap();
        ctx.module_mut(m).add_in_port("a", 8).unwrap();
        ctx.module_mut(m).add_in_port("b", 8).unwrap();
        let mut builder = ir::Builder::new(&mut ctx, m);
        let wire_mod = primitives::wire(builder.ctx, 8).unwrap();
        let w = builder.fresh_instance(wire_mod, "w");
        let w_in = builder.inst_pt(w, "in").unwrap();
        let w1 = builder
            .add_start_connect(builder.pt("a").unwrap(), w_in)
            .unwrap();
        let w2 = builder
            .add_connect(builder.pt("b").unwrap(), w_in)
            .unwrap();

        ReduceStructures::do_pass(&mut ctx, m).unwrap();

        assert!(ctx.module(m).instr(w1).is_connect());
        assert!(ctx.module(m).instr(w2).is_connect());
    }
}
