//! Lowering from the surface-language AST into the IR.

use crate::{
    Builder, Context, InstIdx, InstrIdx, ModIdx, Port, PrimKind, Prototype,
    primitives,
};
use cac_frontend::ast;
use cac_utils::{CacResult, Error, Id};
use std::collections::HashMap;

/// Lower a parsed program into `ctx`. Returns the indices of the compiled
/// (non-external) modules in declaration order.
pub fn lower_program(
    ctx: &mut Context,
    ns: &ast::NamespaceDef,
) -> CacResult<Vec<ModIdx>> {
    // Declare every module first so resource types can refer to modules
    // defined later in the file.
    let mut compiled = Vec::new();
    for def in &ns.modules {
        let idx = declare_module(ctx, def)?;
        if !def.is_external() {
            compiled.push(idx);
        }
    }
    for (def, idx) in ns
        .modules
        .iter()
        .filter(|def| !def.is_external())
        .zip(compiled.iter())
    {
        lower_body(ctx, *idx, def)?;
    }
    Ok(compiled)
}

fn declare_module(ctx: &mut Context, def: &ast::ModuleDef) -> CacResult<ModIdx> {
    let idx = if def.is_external() {
        ctx.add_comb_module(def.name)?
    } else {
        ctx.add_module(def.name)?
    };
    let module = ctx.module_mut(idx);
    for port in &def.ports {
        match port.direction {
            ast::Direction::Input => {
                module.add_in_port(port.name, port.width)?
            }
            ast::Direction::Output => {
                module.add_out_port(port.name, port.width)?
            }
        }
    }
    if def.is_external() {
        module.is_sequential = module.find_pt("clk").is_some()
            && module.find_pt("rst").is_some();
        module.prototype = Some(Prototype {
            kind: PrimKind::Opaque,
            width: 0,
            instantiation: def.name.to_string(),
        });
    }
    Ok(idx)
}

fn lower_body(
    ctx: &mut Context,
    idx: ModIdx,
    def: &ast::ModuleDef,
) -> CacResult<()> {
    // Declarations before processes.
    for block in &def.blocks {
        match block {
            ast::Block::Default { port, value } => {
                ctx.module_mut(idx).set_default(*port, *value)?;
            }
            ast::Block::Resource { ty, name } => {
                let source = resolve_resource_type(ctx, *ty)?;
                let sequential = ctx.module(source).is_sequential
                    && ctx.module(idx).is_sequential;
                ctx.module_mut(idx).add_instance(source, *name)?;
                if sequential {
                    let inst = ctx
                        .module(idx)
                        .find_instance(*name)
                        .expect("instance was just added");
                    let mut builder = Builder::new(ctx, idx);
                    for sig in ["clk", "rst"] {
                        let src = builder.pt(sig)?;
                        let dst = builder.inst_pt(inst, sig)?;
                        builder.add_structural_connection(src, dst)?;
                    }
                }
            }
            _ => {}
        }
    }
    for block in &def.blocks {
        match block {
            ast::Block::Assign { dst, src } => {
                let mut builder = Builder::new(ctx, idx);
                let dst = lower_place(&builder, dst)?;
                let src =
                    lower_structural(&mut builder, src, Some(dst.width))?;
                builder.add_structural_connection(src, dst)?;
            }
            ast::Block::Sequence { event, body } => {
                lower_sequence(ctx, idx, event, body)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolve a resource type name: a module declared in the program, or one of
/// the built-in primitive spellings `wire_N`, `const_N_V`, `not_N`,
/// `register_N`, `add_N`, `cmp_<op>_N`, `channel_N`.
fn resolve_resource_type(ctx: &mut Context, ty: Id) -> CacResult<ModIdx> {
    if let Some(idx) = ctx.find_module(ty) {
        return Ok(idx);
    }
    let name = ty.to_string();
    let parts: Vec<&str> = name.split('_').collect();
    let parse = |s: &str| s.parse::<u64>().ok();
    match parts.as_slice() {
        ["wire", w] => {
            if let Some(w) = parse(w) {
                return primitives::wire(ctx, w);
            }
        }
        ["const", w, v] => {
            if let (Some(w), Some(v)) = (parse(w), parse(v)) {
                return primitives::constant(ctx, w, v);
            }
        }
        ["not", w] => {
            if let Some(w) = parse(w) {
                return primitives::not_gate(ctx, w);
            }
        }
        ["register", w] => {
            if let Some(w) = parse(w) {
                return primitives::register(ctx, w);
            }
        }
        ["add", w] => {
            if let Some(w) = parse(w) {
                return primitives::adder(ctx, w);
            }
        }
        ["cmp", op, w] => {
            if let (Some(op), Some(w)) = (crate::CmpOp::from_name(op), parse(w))
            {
                return primitives::comparator(ctx, op, w);
            }
        }
        ["channel", w] => {
            if let Some(w) = parse(w) {
                return primitives::channel(ctx, w);
            }
        }
        _ => {}
    }
    Err(Error::undefined(ty, "resource type"))
}

// =============== Sequence lowering ===============

struct Lowerer<'a, 'p> {
    builder: Builder<'a>,
    labels: HashMap<Id, InstrIdx>,
    gotos: Vec<(InstrIdx, &'p ast::ActivationDef)>,
}

fn lower_sequence(
    ctx: &mut Context,
    idx: ModIdx,
    event: &ast::Event,
    body: &ast::Stmt,
) -> CacResult<()> {
    // The event signals must name the module's implicit clock and reset.
    ctx.module(idx).pt(event.clk)?;
    ctx.module(idx).pt(event.synch)?;
    if event.edge == ast::Edge::Neg {
        log::warn!(
            "negedge sequence in `{}' is emitted as posedge logic",
            ctx.module(idx).name()
        );
    }

    let mut lowerer = Lowerer {
        builder: Builder::new(ctx, idx),
        labels: HashMap::new(),
        gotos: Vec::new(),
    };
    let (entry, _) = lowerer.lower_stmt(body)?;
    lowerer.builder.ctx.module_mut(idx).instr_mut(entry).is_start = true;

    // Resolve goto targets once every label has been seen.
    let pending = std::mem::take(&mut lowerer.gotos);
    for (instr, act) in pending {
        let dest = *lowerer.labels.get(&act.label).ok_or_else(|| {
            Error::undefined(act.label, "label in sequence")
        })?;
        let cond = lower_structural(&mut lowerer.builder, &act.cond, Some(1))?;
        lowerer.builder.continue_to(instr, cond, dest, act.delay)?;
    }
    Ok(())
}

impl<'a, 'p> Lowerer<'a, 'p> {
    /// Lower one statement. Returns its entry instruction and, unless the
    /// statement transfers control explicitly, the instruction fallthrough
    /// continues from.
    fn lower_stmt(
        &mut self,
        stmt: &'p ast::Stmt,
    ) -> CacResult<(InstrIdx, Option<InstrIdx>)> {
        let (entry, exit) = match &stmt.body {
            ast::StmtBody::Connect { dst, src } => {
                let dst = lower_place(&self.builder, dst)?;
                let mut prereqs = Vec::new();
                let src = self.lower_value(src, Some(dst.width), &mut prereqs)?;
                let src = coerce_int(&mut self.builder, src, dst.width)?;
                let connect = self.builder.add_connect(src, dst)?;
                prereqs.push(connect);
                self.chain(&prereqs)?;
                (prereqs[0], Some(connect))
            }
            ast::StmtBody::Invoke { inst, action, args } => {
                let inst = self
                    .builder
                    .ctx
                    .module(self.builder.module)
                    .find_instance(*inst)
                    .ok_or_else(|| {
                        Error::undefined(*inst, "instance in module")
                    })?;
                self.lower_invoke(inst, *action, args)?
            }
            ast::StmtBody::Begin(stmts) => {
                if stmts.is_empty() {
                    let instr = self.builder.add_empty();
                    (instr, Some(instr))
                } else {
                    let mut entry = None;
                    let mut prev_exit: Option<InstrIdx> = None;
                    for stmt in stmts {
                        let (e, x) = self.lower_stmt(stmt)?;
                        if entry.is_none() {
                            entry = Some(e);
                        }
                        if let Some(prev) = prev_exit {
                            let one = self.builder.true_port()?;
                            self.builder.continue_to(prev, one, e, 0)?;
                        }
                        prev_exit = x;
                    }
                    (entry.unwrap(), prev_exit)
                }
            }
            ast::StmtBody::Goto(acts) => {
                let instr = self.builder.add_empty();
                for act in acts {
                    self.gotos.push((instr, act));
                }
                (instr, None)
            }
        };
        if let Some(label) = stmt.label {
            if self.labels.insert(label, entry).is_some() {
                return Err(Error::already_bound(label, "label in sequence"));
            }
        }
        Ok((entry, exit))
    }

    fn lower_invoke(
        &mut self,
        inst: InstIdx,
        action: Id,
        args: &[ast::Expr],
    ) -> CacResult<(InstrIdx, Option<InstrIdx>)> {
        let invoke = self.builder.add_invoke(inst, action)?;
        let callee = match &self
            .builder
            .ctx
            .module(self.builder.module)
            .instr(invoke)
            .op
        {
            crate::Operation::Invoke { callee, .. } => *callee,
            _ => unreachable!("add_invoke returned a non-invoke"),
        };
        // Caller-facing ports are the callee ports that do not stand for a
        // port on the invoked resource; arguments bind to them positionally.
        let params: Vec<(Id, u64)> = {
            let cc = self.builder.ctx.module(callee);
            cc.ports
                .iter()
                .filter(|(name, _)| !cc.bound_ports.contains_key(*name))
                .map(|(name, def)| (*name, def.width))
                .collect()
        };
        if params.len() != args.len() {
            return Err(Error::malformed_structure(format!(
                "action `{}' takes {} arguments, got {}",
                action,
                params.len(),
                args.len()
            )));
        }
        let mut prereqs = Vec::new();
        for ((name, width), arg) in params.into_iter().zip(args) {
            let port = self.lower_value(arg, Some(width), &mut prereqs)?;
            let port = coerce_int(&mut self.builder, port, width)?;
            self.builder.bind(invoke, name, port)?;
        }
        prereqs.push(invoke);
        self.chain(&prereqs)?;
        Ok((prereqs[0], Some(invoke)))
    }

    /// Wire a delay-0 chain through `instrs` in order.
    fn chain(&mut self, instrs: &[InstrIdx]) -> CacResult<()> {
        for pair in instrs.windows(2) {
            let one = self.builder.true_port()?;
            self.builder.continue_to(pair[0], one, pair[1], 0)?;
        }
        Ok(())
    }

    /// Lower an expression in value position. Compound expressions
    /// materialize a combinational primitive whose inputs are driven by
    /// connect instructions appended to `prereqs`.
    fn lower_value(
        &mut self,
        expr: &ast::Expr,
        width_hint: Option<u64>,
        prereqs: &mut Vec<InstrIdx>,
    ) -> CacResult<Port> {
        match expr {
            ast::Expr::Id(_) | ast::Expr::Port { .. } | ast::Expr::Int(_) => {
                lower_simple(&mut self.builder, expr, width_hint)
            }
            ast::Expr::Binop { op, lhs, rhs } => {
                let (l, r) = self.binop_operands(lhs, rhs, prereqs)?;
                let inst = materialize_binop(&mut self.builder, *op, l.width)?;
                let in0 = self.builder.inst_pt(inst, "in0")?;
                let in1 = self.builder.inst_pt(inst, "in1")?;
                prereqs.push(self.builder.add_connect(l, in0)?);
                prereqs.push(self.builder.add_connect(r, in1)?);
                self.builder.inst_pt(inst, "out")
            }
        }
    }

    /// Lower both operands of a binary operator, inferring the width of an
    /// integer literal from the opposite side.
    fn binop_operands(
        &mut self,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        prereqs: &mut Vec<InstrIdx>,
    ) -> CacResult<(Port, Port)> {
        if matches!(lhs, ast::Expr::Int(_)) {
            let r = self.lower_value(rhs, None, prereqs)?;
            let l = self.lower_value(lhs, Some(r.width), prereqs)?;
            Ok((l, r))
        } else {
            let l = self.lower_value(lhs, None, prereqs)?;
            let r = self.lower_value(rhs, Some(l.width), prereqs)?;
            Ok((l, r))
        }
    }
}

// =============== Expression helpers ===============

/// Lower an expression in sink position.
fn lower_place(builder: &Builder, expr: &ast::Expr) -> CacResult<Port> {
    let port = match expr {
        ast::Expr::Id(name) => {
            builder.ctx.module(builder.module).pt(*name)?
        }
        ast::Expr::Port { inst, port } => {
            let inst = builder
                .ctx
                .module(builder.module)
                .find_instance(*inst)
                .ok_or_else(|| {
                    Error::undefined(*inst, "instance in module")
                })?;
            builder.inst_pt(inst, *port)?
        }
        _ => {
            return Err(Error::malformed_structure(
                "left-hand side of a connection must name a port",
            ))
        }
    };
    Ok(port)
}

/// Lower a simple (non-compound) expression in source position.
fn lower_simple(
    builder: &mut Builder,
    expr: &ast::Expr,
    width_hint: Option<u64>,
) -> CacResult<Port> {
    match expr {
        ast::Expr::Id(name) => builder.ctx.module(builder.module).pt(*name),
        ast::Expr::Port { inst, port } => {
            let inst = builder
                .ctx
                .module(builder.module)
                .find_instance(*inst)
                .ok_or_else(|| {
                    Error::undefined(*inst, "instance in module")
                })?;
            builder.inst_pt(inst, *port)
        }
        ast::Expr::Int(v) => {
            let width = width_hint.ok_or_else(|| {
                Error::misc(format!(
                    "cannot infer the width of integer literal {}",
                    v
                ))
            })?;
            let inst = builder.add_constant(*v, width)?;
            builder.inst_pt(inst, "out")
        }
        ast::Expr::Binop { .. } => unreachable!("compound expression"),
    }
}

/// Lower an expression in a structural context (an `assign` block or a
/// `goto` condition): compound operands are wired with structural
/// connections and therefore must be statically driven.
fn lower_structural(
    builder: &mut Builder,
    expr: &ast::Expr,
    width_hint: Option<u64>,
) -> CacResult<Port> {
    match expr {
        ast::Expr::Id(_) | ast::Expr::Port { .. } | ast::Expr::Int(_) => {
            lower_simple(builder, expr, width_hint)
        }
        ast::Expr::Binop { op, lhs, rhs } => {
            let (l, r) = if matches!(**lhs, ast::Expr::Int(_)) {
                let r = lower_structural(builder, rhs, None)?;
                let l = lower_structural(builder, lhs, Some(r.width))?;
                (l, r)
            } else {
                let l = lower_structural(builder, lhs, None)?;
                let r = lower_structural(builder, rhs, Some(l.width))?;
                (l, r)
            };
            let inst = materialize_binop(builder, *op, l.width)?;
            let in0 = builder.inst_pt(inst, "in0")?;
            let in1 = builder.inst_pt(inst, "in1")?;
            builder.add_structural_connection(l, in0)?;
            builder.add_structural_connection(r, in1)?;
            builder.inst_pt(inst, "out")
        }
    }
}

/// Instantiate the primitive backing a binary operator.
fn materialize_binop(
    builder: &mut Builder,
    op: ast::BinOp,
    width: u64,
) -> CacResult<InstIdx> {
    let (source, base) = match op {
        ast::BinOp::Add => {
            (primitives::adder(builder.ctx, width)?, "add")
        }
        ast::BinOp::Eq => {
            (primitives::comparator(builder.ctx, crate::CmpOp::Eq, width)?, "cmp")
        }
        ast::BinOp::Lt => {
            (primitives::comparator(builder.ctx, crate::CmpOp::Lt, width)?, "cmp")
        }
        ast::BinOp::Gt => {
            (primitives::comparator(builder.ctx, crate::CmpOp::Gt, width)?, "cmp")
        }
        ast::BinOp::Le => {
            (primitives::comparator(builder.ctx, crate::CmpOp::Le, width)?, "cmp")
        }
        ast::BinOp::Ge => {
            (primitives::comparator(builder.ctx, crate::CmpOp::Ge, width)?, "cmp")
        }
        ast::BinOp::Mul | ast::BinOp::Mod => {
            return Err(Error::misc(format!(
                "no primitive backs operator `{}'",
                op.as_str()
            )))
        }
    };
    Ok(builder.fresh_instance(source, base))
}

/// Re-lower an integer literal whose inferred width disagrees with the
/// context. Constants are memoized per `(value, width)` pair so this is a
/// no-op for everything else.
fn coerce_int(
    builder: &mut Builder,
    port: Port,
    width: u64,
) -> CacResult<Port> {
    if port.width == width {
        return Ok(port);
    }
    let source = builder
        .ctx
        .module(builder.module)
        .instance(match port.parent {
            crate::PortParent::Inst(i) => i,
            crate::PortParent::This => return Ok(port),
        })
        .source;
    match builder.ctx.module(source).prototype {
        Some(Prototype { kind: PrimKind::Const { value }, .. }) => {
            let inst = builder.add_constant(value, width)?;
            builder.inst_pt(inst, "out")
        }
        _ => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::lower_program;
    use crate::{Context, Operation, PrimKind};
    use cac_frontend::CacParser;

    fn lower(src: &str) -> (Context, Vec<crate::ModIdx>) {
        let ns = CacParser::parse(src.as_bytes()).unwrap();
        let mut ctx = Context::new();
        let compiled = lower_program(&mut ctx, &ns).unwrap();
        (ctx, compiled)
    }

    #[test]
    fn external_modules_become_primitives() {
        let (ctx, compiled) = lower(
            r#"
            module blackbox(input [7:0] a, output [7:0] b)
              external ;
            endmodule
            module top(output [7:0] out)
              blackbox bb;
              assign out = bb.b ;
            endmodule
            "#,
        );
        assert_eq!(compiled.len(), 1);
        let bb = ctx.get_module("blackbox").unwrap();
        let module = ctx.module(bb);
        assert!(module.is_primitive());
        assert!(matches!(
            module.prototype.as_ref().unwrap().kind,
            PrimKind::Opaque
        ));
    }

    #[test]
    fn counter_program_lowers() {
        let (ctx, compiled) = lower(
            r#"
            module counter(input [15:0] limit, output flag)
              register_16 cnt;
              sequence @(posedge clk, synch rst) begin
                top: cnt.st(cnt.data + 1, 1);
                goto (cnt.data == limit, top, 1);
              end
            endmodule
            "#,
        );
        let m = compiled[0];
        let module = ctx.module(m);

        // The register resource exists and its clock is wired structurally.
        let cnt = module.find_instance("cnt").unwrap();
        let clk = ctx.inst_pt(m, cnt, "clk").unwrap();
        assert!(module.structural.iter().any(|sc| sc.dst == clk));

        // Exactly one start instruction heads the sequence.
        assert_eq!(
            module.instrs().filter(|(_, i)| i.is_start).count(),
            1
        );

        // The goto resolved to a delay-1 back edge guarded by the
        // comparator's output.
        let back_edge = module.instrs().flat_map(|(_, i)| &i.continuations).any(
            |act| act.delay == 1 && act.cond.name == "out",
        );
        assert!(back_edge);

        // An adder backs the `+` and a comparator backs the `==`.
        assert!(module.find_instance("add_0").is_some());
        assert!(module.find_instance("cmp_0").is_some());
    }

    #[test]
    fn invoke_arguments_bind_positionally() {
        let (ctx, compiled) = lower(
            r#"
            module top(input [7:0] v, input go, output [7:0] q)
              register_8 r;
              sequence @(posedge clk, synch rst) begin
                r.st(v, go);
                q = r.data;
              end
            endmodule
            "#,
        );
        let m = compiled[0];
        let module = ctx.module(m);
        let (_, invoke) = module
            .instrs()
            .find(|(_, i)| i.is_invoke())
            .expect("invoke was lowered");
        let Operation::Invoke { bindings, .. } = &invoke.op else {
            unreachable!()
        };
        let v = module.pt("v").unwrap();
        let go = module.pt("go").unwrap();
        assert!(bindings.iter().any(|(n, p)| *n == "in" && *p == v));
        assert!(bindings.iter().any(|(n, p)| *n == "en" && *p == go));
        // Resource-facing ports were bound automatically.
        assert!(bindings.iter().any(|(n, _)| *n == "res_in"));
        assert!(bindings.iter().any(|(n, _)| *n == "res_en"));
    }

    #[test]
    fn unknown_resource_type_is_fatal() {
        let ns = CacParser::parse(
            r#"
            module top(output q)
              mystery m0;
            endmodule
            "#
            .as_bytes(),
        )
        .unwrap();
        let mut ctx = Context::new();
        assert!(lower_program(&mut ctx, &ns).is_err());
    }

    #[test]
    fn undefined_goto_label_is_fatal() {
        let ns = CacParser::parse(
            r#"
            module top(input a, output b)
              sequence @(posedge clk, synch rst) begin
                b = a;
                goto (1, nowhere, 1);
              end
            endmodule
            "#
            .as_bytes(),
        )
        .unwrap();
        let mut ctx = Context::new();
        assert!(lower_program(&mut ctx, &ns).is_err());
    }
}
