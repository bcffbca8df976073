//! Factory for parameterized primitive black-box modules.
//!
//! Primitives are opaque from the compiler's view: a name, a port list, and
//! a verbatim Verilog instantiation prefix resolved by the simulator's
//! `builtins.v`. Construction is memoized by mangled name so each
//! parameterization exists at most once per context.

use crate::{Builder, Context, ModIdx};
use cac_utils::{CacResult, Id};

/// The kind of a primitive module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimKind {
    /// Identity passthrough.
    Wire,
    /// Always emits its value.
    Const { value: u64 },
    /// Bitwise complement.
    Not,
    /// Edge-triggered latch.
    Register,
    /// Integer addition.
    Add,
    /// Comparison predicate.
    Cmp(CmpOp),
    /// Logical point-to-point unbuffered signal, resolved by channel
    /// synthesis.
    Channel,
    /// A black-box declared by the surface language (`external`).
    Opaque,
}

/// Comparison operators supported by the comparator primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Gt => "gt",
            CmpOp::Le => "le",
            CmpOp::Ge => "ge",
        }
    }

    /// Inverse of [`CmpOp::as_str`], used to resolve `cmp_<op>_<w>`
    /// resource-type names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            "lt" => Some(CmpOp::Lt),
            "gt" => Some(CmpOp::Gt),
            "le" => Some(CmpOp::Le),
            "ge" => Some(CmpOp::Ge),
            _ => None,
        }
    }
}

/// Metadata attached to a primitive module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype {
    pub kind: PrimKind,
    pub width: u64,
    /// Verbatim instantiation prefix, e.g. `add #(.WIDTH(16))`.
    pub instantiation: String,
}

/// Identity passthrough: `in -> out`.
pub fn wire(ctx: &mut Context, width: u64) -> CacResult<ModIdx> {
    let name = Id::from(format!("wire_{}", width));
    if let Some(idx) = ctx.find_module(name) {
        return Ok(idx);
    }
    let idx = ctx.add_comb_module(name)?;
    let module = ctx.module_mut(idx);
    module.add_in_port("in", width)?;
    module.add_out_port("out", width)?;
    module.prototype = Some(Prototype {
        kind: PrimKind::Wire,
        width,
        instantiation: format!("passthrough #(.WIDTH({}))", width),
    });
    Ok(idx)
}

/// Constant source of `value`.
pub fn constant(ctx: &mut Context, width: u64, value: u64) -> CacResult<ModIdx> {
    let name = Id::from(format!("const_{}_{}", width, value));
    if let Some(idx) = ctx.find_module(name) {
        return Ok(idx);
    }
    let idx = ctx.add_comb_module(name)?;
    let module = ctx.module_mut(idx);
    module.add_out_port("out", width)?;
    module.prototype = Some(Prototype {
        kind: PrimKind::Const { value },
        width,
        instantiation: format!(
            "constant #(.WIDTH({}), .VALUE({}))",
            width, value
        ),
    });
    Ok(idx)
}

/// Bitwise complement with an `apply` action.
pub fn not_gate(ctx: &mut Context, width: u64) -> CacResult<ModIdx> {
    let name = Id::from(format!("not_{}", width));
    if let Some(idx) = ctx.find_module(name) {
        return Ok(idx);
    }
    let idx = ctx.add_comb_module(name)?;
    let module = ctx.module_mut(idx);
    module.add_in_port("in", width)?;
    module.add_out_port("out", width)?;
    module.prototype = Some(Prototype {
        kind: PrimKind::Not,
        width,
        instantiation: format!("invert #(.WIDTH({}))", width),
    });

    let cc = unary_apply_cc(ctx, name, width, width)?;
    ctx.register_action(idx, Id::from("apply"), cc)?;
    Ok(idx)
}

/// Edge-triggered latch with a `st` action. `en` defaults to 0.
pub fn register(ctx: &mut Context, width: u64) -> CacResult<ModIdx> {
    let name = Id::from(format!("register_{}", width));
    if let Some(idx) = ctx.find_module(name) {
        return Ok(idx);
    }
    let idx = ctx.add_module(name)?;
    let module = ctx.module_mut(idx);
    module.add_in_port("en", 1)?;
    module.add_in_port("in", width)?;
    module.add_out_port("data", width)?;
    module.set_default("en", 0)?;
    module.prototype = Some(Prototype {
        kind: PrimKind::Register,
        width,
        instantiation: format!("register #(.WIDTH({}))", width),
    });

    // The store convention drives `in` and `en` in the same cycle and
    // completes one cycle later.
    let cc = ctx.add_comb_module(format!("{}_st", name))?;
    {
        let module = ctx.module_mut(cc);
        module.add_in_port("in", width)?;
        module.add_in_port("en", 1)?;
        module.add_out_port("res_in", width)?;
        module.add_out_port("res_en", 1)?;
        module.bound_ports.insert(Id::from("res_in"), Id::from("in"));
        module.bound_ports.insert(Id::from("res_en"), Id::from("en"));
    }
    let mut builder = Builder::new(ctx, cc);
    let one = builder.true_port()?;
    let set_in =
        builder.add_start_connect(builder.pt("in")?, builder.pt("res_in")?)?;
    let set_en =
        builder.add_connect(builder.pt("en")?, builder.pt("res_en")?)?;
    let done = builder.add_empty();
    builder.continue_to(set_in, one, set_en, 0)?;
    builder.continue_to(set_en, one, done, 1)?;
    ctx.register_action(idx, Id::from("st"), cc)?;
    Ok(idx)
}

/// Integer adder with an `apply` action.
pub fn adder(ctx: &mut Context, width: u64) -> CacResult<ModIdx> {
    let name = Id::from(format!("add_{}", width));
    if let Some(idx) = ctx.find_module(name) {
        return Ok(idx);
    }
    let idx = ctx.add_comb_module(name)?;
    let module = ctx.module_mut(idx);
    module.add_in_port("in0", width)?;
    module.add_in_port("in1", width)?;
    module.add_out_port("out", width)?;
    module.prototype = Some(Prototype {
        kind: PrimKind::Add,
        width,
        instantiation: format!("add #(.WIDTH({}))", width),
    });

    let cc = binary_apply_cc(ctx, name, width, width)?;
    ctx.register_action(idx, Id::from("apply"), cc)?;
    Ok(idx)
}

/// Comparator primitive with an `apply` action and a width-1 result.
pub fn comparator(
    ctx: &mut Context,
    op: CmpOp,
    width: u64,
) -> CacResult<ModIdx> {
    let name = Id::from(format!("cmp_{}_{}", op.as_str(), width));
    if let Some(idx) = ctx.find_module(name) {
        return Ok(idx);
    }
    let idx = ctx.add_comb_module(name)?;
    let module = ctx.module_mut(idx);
    module.add_in_port("in0", width)?;
    module.add_in_port("in1", width)?;
    module.add_out_port("out", 1)?;
    module.prototype = Some(Prototype {
        kind: PrimKind::Cmp(op),
        width,
        instantiation: format!("cmp_{} #(.WIDTH({}))", op.as_str(), width),
    });

    let cc = binary_apply_cc(ctx, name, width, 1)?;
    ctx.register_action(idx, Id::from("apply"), cc)?;
    Ok(idx)
}

/// Logical single-writer value carrier; erased by channel synthesis.
pub fn channel(ctx: &mut Context, width: u64) -> CacResult<ModIdx> {
    let name = Id::from(format!("channel_{}", width));
    if let Some(idx) = ctx.find_module(name) {
        return Ok(idx);
    }
    let idx = ctx.add_comb_module(name)?;
    let module = ctx.module_mut(idx);
    module.add_in_port("in", width)?;
    module.add_out_port("out", width)?;
    module.prototype = Some(Prototype {
        kind: PrimKind::Channel,
        width,
        instantiation: format!("channel #(.WIDTH({}))", width),
    });
    Ok(idx)
}

/// Calling convention for two-operand combinational primitives: forward
/// `in0`/`in1` to the resource and its result to `out`, all in one cycle.
fn binary_apply_cc(
    ctx: &mut Context,
    prim_name: Id,
    in_width: u64,
    out_width: u64,
) -> CacResult<ModIdx> {
    let cc = ctx.add_comb_module(format!("{}_apply", prim_name))?;
    {
        let module = ctx.module_mut(cc);
        module.add_in_port("in0", in_width)?;
        module.add_in_port("in1", in_width)?;
        module.add_out_port("out", out_width)?;
        module.add_out_port("res_in0", in_width)?;
        module.add_out_port("res_in1", in_width)?;
        module.add_in_port("res_out", out_width)?;
        module.bound_ports.insert(Id::from("res_in0"), Id::from("in0"));
        module.bound_ports.insert(Id::from("res_in1"), Id::from("in1"));
        module.bound_ports.insert(Id::from("res_out"), Id::from("out"));
    }
    let mut builder = Builder::new(ctx, cc);
    let one = builder.true_port()?;
    let set0 =
        builder.add_start_connect(builder.pt("in0")?, builder.pt("res_in0")?)?;
    let set1 =
        builder.add_connect(builder.pt("in1")?, builder.pt("res_in1")?)?;
    let read =
        builder.add_connect(builder.pt("res_out")?, builder.pt("out")?)?;
    builder.continue_to(set0, one, set1, 0)?;
    builder.continue_to(set1, one, read, 0)?;
    Ok(cc)
}

/// Calling convention for one-operand combinational primitives.
fn unary_apply_cc(
    ctx: &mut Context,
    prim_name: Id,
    in_width: u64,
    out_width: u64,
) -> CacResult<ModIdx> {
    let cc = ctx.add_comb_module(format!("{}_apply", prim_name))?;
    {
        let module = ctx.module_mut(cc);
        module.add_in_port("in", in_width)?;
        module.add_out_port("out", out_width)?;
        module.add_out_port("res_in", in_width)?;
        module.add_in_port("res_out", out_width)?;
        module.bound_ports.insert(Id::from("res_in"), Id::from("in"));
        module.bound_ports.insert(Id::from("res_out"), Id::from("out"));
    }
    let mut builder = Builder::new(ctx, cc);
    let one = builder.true_port()?;
    let set =
        builder.add_start_connect(builder.pt("in")?, builder.pt("res_in")?)?;
    let read =
        builder.add_connect(builder.pt("res_out")?, builder.pt("out")?)?;
    builder.continue_to(set, one, read, 0)?;
    Ok(cc)
}
