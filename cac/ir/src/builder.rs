//! IR Builder. Provides convenience methods to build various parts of the
//! internal representation while preserving the structural invariants.

use crate::{
    Bindings, Context, InstIdx, InstrIdx, Instruction, ModIdx, Operation,
    Port, primitives,
};
use cac_utils::{CacResult, Error, Id};

/// IR builder for one module.
/// Uses the context to construct and validate constructs when needed.
pub struct Builder<'a> {
    /// Context the module under construction lives in.
    pub ctx: &'a mut Context,
    /// Module this builder is constructing.
    pub module: ModIdx,
}

impl<'a> Builder<'a> {
    /// Instantiate a new builder for a module.
    pub fn new(ctx: &'a mut Context, module: ModIdx) -> Self {
        Self { ctx, module }
    }

    /// Reference to the module's own port.
    pub fn pt<S: Into<Id>>(&self, name: S) -> CacResult<Port> {
        self.ctx.module(self.module).pt(name)
    }

    /// Reference to a port on an instance of this module.
    pub fn inst_pt<S: Into<Id>>(
        &self,
        inst: InstIdx,
        name: S,
    ) -> CacResult<Port> {
        self.ctx.inst_pt(self.module, inst, name)
    }

    // =============== Instructions ===============

    /// Add a pure control node.
    pub fn add_empty(&mut self) -> InstrIdx {
        self.ctx
            .module_mut(self.module)
            .add_instr(Instruction::new(Operation::Empty, false))
    }

    /// Add a connect instruction. Direction and width mismatches are fatal.
    pub fn add_connect(&mut self, src: Port, dst: Port) -> CacResult<InstrIdx> {
        self.validate_connection(&src, &dst)?;
        Ok(self
            .ctx
            .module_mut(self.module)
            .add_instr(Instruction::new(Operation::Connect { src, dst }, false)))
    }

    /// Add a connect instruction that activates during the reset phase.
    pub fn add_start_connect(
        &mut self,
        src: Port,
        dst: Port,
    ) -> CacResult<InstrIdx> {
        self.validate_connection(&src, &dst)?;
        Ok(self
            .ctx
            .module_mut(self.module)
            .add_instr(Instruction::new(Operation::Connect { src, dst }, true)))
    }

    /// Add an invoke of `action` on `inst`. The callee's resource-facing
    /// ports are bound to `inst` here; caller-facing ports are bound with
    /// [`Builder::bind`].
    pub fn add_invoke<S: Into<Id>>(
        &mut self,
        inst: InstIdx,
        action: S,
    ) -> CacResult<InstrIdx> {
        let source = self.ctx.module(self.module).instance(inst).source;
        let callee = self.ctx.module(source).get_action(action)?;
        let bound: Vec<(Id, Id)> = self
            .ctx
            .module(callee)
            .bound_ports
            .iter()
            .map(|(cc, res)| (*cc, *res))
            .collect();
        let mut bindings = Bindings::new();
        for (cc_port, res_port) in bound {
            bindings.push((cc_port, self.inst_pt(inst, res_port)?));
        }
        Ok(self
            .ctx
            .module_mut(self.module)
            .add_instr(Instruction::new(
                Operation::Invoke { callee, bindings },
                false,
            )))
    }

    /// Record a binding for a caller-facing port of the invoked calling
    /// convention. The callee must declare `name`.
    pub fn bind<S: Into<Id>>(
        &mut self,
        invoke: InstrIdx,
        name: S,
        port: Port,
    ) -> CacResult<()> {
        let name = name.into();
        let callee = match &self.ctx.module(self.module).instr(invoke).op {
            Operation::Invoke { callee, .. } => *callee,
            _ => {
                return Err(Error::malformed_structure(
                    "bind on a non-invoke instruction",
                ))
            }
        };
        let decl = self.ctx.module(callee).pt(name)?;
        if decl.width != port.width {
            return Err(Error::malformed_structure(format!(
                "binding for `{}' on `{}' has width {}, expected {}",
                name,
                self.ctx.module(callee).name(),
                port.width,
                decl.width
            )));
        }
        if let Operation::Invoke { bindings, .. } =
            &mut self.ctx.module_mut(self.module).instr_mut(invoke).op
        {
            if let Some(entry) =
                bindings.iter_mut().find(|(n, _)| *n == name)
            {
                entry.1 = port;
            } else {
                bindings.push((name, port));
            }
        }
        Ok(())
    }

    /// Append a continuation from `src` to `dst`. The condition must be a
    /// width-1 source.
    pub fn continue_to(
        &mut self,
        src: InstrIdx,
        cond: Port,
        dst: InstrIdx,
        delay: u64,
    ) -> CacResult<()> {
        if cond.width != 1 {
            return Err(Error::malformed_structure(format!(
                "continuation condition `{}' has width {}",
                cond.name, cond.width
            )));
        }
        if !cond.is_source() {
            return Err(Error::malformed_structure(format!(
                "continuation condition `{}' is not a readable port",
                cond.name
            )));
        }
        self.ctx
            .module_mut(self.module)
            .instr_mut(src)
            .continue_to(cond, dst, delay);
        Ok(())
    }

    // =============== Resources ===============

    /// Instance of `source` with a locally unique `base_<n>` name.
    pub fn fresh_instance<S: Into<Id>>(
        &mut self,
        source: ModIdx,
        base: S,
    ) -> InstIdx {
        let module = self.ctx.module_mut(self.module);
        let name = module.generate_name(base);
        module
            .add_instance(source, name)
            .expect("generated instance name collided")
    }

    /// Like [`Builder::fresh_instance`] but additionally wires the
    /// instance's `clk`/`rst` to the enclosing module's `clk`/`rst`.
    pub fn fresh_sequential_instance<S: Into<Id>>(
        &mut self,
        source: ModIdx,
        base: S,
    ) -> CacResult<InstIdx> {
        let inst = self.fresh_instance(source, base);
        for sig in ["clk", "rst"] {
            let src = self.pt(sig)?;
            let dst = self.inst_pt(inst, sig)?;
            self.add_structural_connection(src, dst)?;
        }
        Ok(inst)
    }

    /// A channel instance carrying `width`-bit values. Channel instances are
    /// named `pipe_channel_<n>`; none survive channel synthesis.
    pub fn add_channel(&mut self, width: u64) -> CacResult<InstIdx> {
        let source = primitives::channel(self.ctx, width)?;
        Ok(self.fresh_instance(source, "pipe_channel"))
    }

    /// Record a compile-time wiring from `src` to `dst`.
    pub fn add_structural_connection(
        &mut self,
        src: Port,
        dst: Port,
    ) -> CacResult<()> {
        self.validate_connection(&src, &dst)?;
        self.ctx
            .module_mut(self.module)
            .structural
            .push(crate::StructuralConnection { src, dst });
        Ok(())
    }

    // =============== Constants ===============

    /// Instance of the `(val, width)` constant primitive, memoized per
    /// module by its canonical `_<val>_<width>` name.
    pub fn add_constant(&mut self, val: u64, width: u64) -> CacResult<InstIdx> {
        assert!(
            (64 - val.leading_zeros()) as u64 <= width,
            "Constant value {} cannot fit in {} bits",
            val,
            width
        );
        let name = Id::from(format!("_{}_{}", val, width));
        if let Some(inst) = self.ctx.module(self.module).find_instance(name) {
            return Ok(inst);
        }
        let source = primitives::constant(self.ctx, width, val)?;
        self.ctx.module_mut(self.module).add_instance(source, name)
    }

    /// The width-1 constant-1 output, used as an always-true condition.
    pub fn true_port(&mut self) -> CacResult<Port> {
        let one = self.add_constant(1, 1)?;
        self.inst_pt(one, "out")
    }

    // =============== Internal ===============

    fn validate_connection(&self, src: &Port, dst: &Port) -> CacResult<()> {
        let module = self.ctx.module(self.module);
        if !src.is_source() {
            return Err(Error::malformed_structure(format!(
                "`{}' is not an output port",
                crate::Printer::port_str(module, src)
            )));
        }
        if !dst.is_sink() {
            return Err(Error::malformed_structure(format!(
                "`{}' is not an input port",
                crate::Printer::port_str(module, dst)
            )));
        }
        if src.width != dst.width {
            return Err(Error::malformed_structure(format!(
                "`{}' and `{}' have different widths",
                crate::Printer::port_str(module, src),
                crate::Printer::port_str(module, dst)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{primitives, Builder, Context, GetName, IndexRef};

    #[test]
    fn duplicate_module_names_are_fatal() {
        let mut ctx = Context::new();
        ctx.add_module("m").unwrap();
        assert!(ctx.add_module("m").is_err());
    }

    #[test]
    fn width_mismatch_is_fatal() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m").unwrap();
        ctx.module_mut(m).add_in_port("a", 8).unwrap();
        ctx.module_mut(m).add_out_port("b", 16).unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let a = builder.pt("a").unwrap();
        let b = builder.pt("b").unwrap();
        assert!(builder.add_connect(a, b).is_err());
    }

    #[test]
    fn direction_mismatch_is_fatal() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m").unwrap();
        ctx.module_mut(m).add_in_port("a", 8).unwrap();
        ctx.module_mut(m).add_in_port("b", 8).unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        // Both ports are caller-driven sources; there is no sink.
        let a = builder.pt("a").unwrap();
        let b = builder.pt("b").unwrap();
        assert!(builder.add_connect(a, b).is_err());
    }

    #[test]
    fn constants_are_memoized_per_module() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m").unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let first = builder.add_constant(1, 1).unwrap();
        let second = builder.add_constant(1, 1).unwrap();
        assert_eq!(first, second);
        let other = builder.add_constant(0, 1).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn fresh_instances_count_up() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m").unwrap();
        let wire = primitives::wire(&mut ctx, 4).unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let w0 = builder.fresh_instance(wire, "w");
        let w1 = builder.fresh_instance(wire, "w");
        let module = builder.ctx.module(m);
        assert_eq!(module.instance(w0).name(), "w_0");
        assert_eq!(module.instance(w1).name(), "w_1");
    }

    #[test]
    fn sequential_instances_get_clock_wiring() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m").unwrap();
        let reg = primitives::register(&mut ctx, 8).unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let r = builder.fresh_sequential_instance(reg, "r").unwrap();
        let clk = builder.inst_pt(r, "clk").unwrap();
        let module = builder.ctx.module(m);
        assert!(module.structural.iter().any(|sc| sc.dst == clk));
        assert_eq!(module.structural.len(), 2);
    }

    #[test]
    fn binding_an_undeclared_port_is_fatal() {
        let mut ctx = Context::new();
        let adder = primitives::adder(&mut ctx, 8).unwrap();
        let m = ctx.add_module("m").unwrap();
        ctx.module_mut(m).add_in_port("x", 8).unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let a = builder.fresh_instance(adder, "a");
        let invoke = builder.add_invoke(a, "apply").unwrap();
        let x = builder.pt("x").unwrap();
        assert!(builder.bind(invoke, "nope", x).is_err());
    }

    #[test]
    fn continuation_conditions_must_be_one_bit() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m").unwrap();
        ctx.module_mut(m).add_in_port("wide", 8).unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let a = builder.add_empty();
        let b = builder.add_empty();
        let wide = builder.pt("wide").unwrap();
        assert!(builder.continue_to(a, wide, b, 0).is_err());
    }

    #[test]
    fn register_store_action_is_registered() {
        let mut ctx = Context::new();
        let reg = primitives::register(&mut ctx, 16).unwrap();
        let st = ctx.module(reg).get_action("st").unwrap();
        let cc = ctx.module(st);
        assert!(cc.is_action());
        assert_eq!(cc.num_actions(), 0);
        // The store body ends one cycle after the enable is set.
        assert!(cc
            .instrs()
            .any(|(_, i)| i.continuations.iter().any(|act| act.delay == 1)));

        // `en` carries a reset default, making it sensitive.
        let m = ctx.add_module("m").unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let r = builder.fresh_sequential_instance(reg, "r").unwrap();
        assert!(builder.inst_pt(r, "en").unwrap().sensitive);
        assert!(!builder.inst_pt(r, "in").unwrap().sensitive);
    }

    #[test]
    fn instruction_indices_survive_erasure() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m").unwrap();
        let mut builder = Builder::new(&mut ctx, m);
        let a = builder.add_empty();
        let b = builder.add_empty();
        let one = builder.true_port().unwrap();
        builder.continue_to(a, one, b, 1).unwrap();
        ctx.module_mut(m).instr_mut(b).erase();
        assert!(ctx.module(m).instr(b).is_empty());
        assert_eq!(ctx.module(m).instr(a).continuations[0].dest.index(), b.index());
    }
}
