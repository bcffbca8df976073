//! Implements a formatter for the in-memory representation of modules.

use crate::{
    Context, Direction, IndexRef, Instruction, ModIdx, Module, Operation,
    Port, PortParent,
};
use itertools::Itertools;
use std::io;

/// Printer for the IR.
pub struct Printer;

impl Printer {
    /// Format a port reference relative to its enclosing module.
    pub fn port_str(module: &Module, port: &Port) -> String {
        match port.parent {
            PortParent::This => port.name.to_string(),
            PortParent::Inst(i) => {
                use cac_utils::GetName;
                format!("{}.{}", module.instance(i).name(), port.name)
            }
        }
    }

    /// Format one instruction with its continuation list.
    pub fn instr_str(
        ctx: &Context,
        module: &Module,
        instr: &Instruction,
    ) -> String {
        let op = match &instr.op {
            Operation::Empty => "{}".to_string(),
            Operation::Connect { src, dst } => format!(
                "({} -> {})",
                Self::port_str(module, src),
                Self::port_str(module, dst)
            ),
            Operation::Invoke { callee, bindings } => format!(
                "invoke {}[{}]",
                ctx.module(*callee).name(),
                bindings
                    .iter()
                    .map(|(name, port)| format!(
                        "{}={}",
                        name,
                        Self::port_str(module, port)
                    ))
                    .join(", ")
            ),
        };
        let conts = instr
            .continuations
            .iter()
            .map(|act| {
                format!(
                    "({}, i{}, {})",
                    Self::port_str(module, &act.cond),
                    act.dest.index(),
                    act.delay
                )
            })
            .join(" ");
        format!(
            "{}{} then continue to [{}]",
            if instr.is_start { "start " } else { "" },
            op,
            conts
        )
    }

    /// Formats and writes the module to the formatter.
    pub fn write_module<F: io::Write>(
        ctx: &Context,
        idx: ModIdx,
        f: &mut F,
    ) -> io::Result<()> {
        let module = ctx.module(idx);
        let ports = module
            .ports
            .iter()
            .map(|(name, def)| {
                // Declarations are stored from the inside view; print the
                // caller view.
                let dir = match def.direction {
                    Direction::Output => "input",
                    Direction::Input => "output",
                };
                format!("{} [{}] {}", dir, def.width, name)
            })
            .join(", ");
        writeln!(f, "module {}({})", module.name(), ports)?;
        for (name, value) in module.defaults.iter() {
            writeln!(f, "  default {} = {}", name, value)?;
        }
        for (_, inst) in module.instances() {
            use cac_utils::GetName;
            writeln!(
                f,
                "  {} {}",
                ctx.module(inst.source).name(),
                inst.name()
            )?;
        }
        for sc in &module.structural {
            writeln!(
                f,
                "  assign {} = {}",
                Self::port_str(module, &sc.dst),
                Self::port_str(module, &sc.src)
            )?;
        }
        for (i, instr) in module.instrs() {
            writeln!(
                f,
                "  i{}: {}",
                i.index(),
                Self::instr_str(ctx, module, instr)
            )?;
        }
        writeln!(f, "endmodule {}", module.name())
    }
}
