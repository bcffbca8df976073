//! Abstract syntax tree for the CAC surface language.

use cac_utils::Id;

/// Direction of a declared port, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The caller drives this port.
    Input,
    /// The caller reads this port.
    Output,
}

impl Direction {
    /// Return the direction opposite to this one.
    pub fn reverse(self) -> Self {
        match self {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        }
    }
}

/// Top level AST statement: a sequence of module definitions.
#[derive(Debug)]
pub struct NamespaceDef {
    pub modules: Vec<ModuleDef>,
}

/// AST statement for defining a module.
#[derive(Debug)]
pub struct ModuleDef {
    pub name: Id,
    pub ports: Vec<PortAst>,
    pub blocks: Vec<Block>,
}

impl ModuleDef {
    /// True iff the module body marks it `external`.
    pub fn is_external(&self) -> bool {
        self.blocks.iter().any(|b| matches!(b, Block::External))
    }
}

/// A port declaration: `input [15:0] data`.
#[derive(Debug, Clone)]
pub struct PortAst {
    pub direction: Direction,
    pub width: u64,
    pub name: Id,
}

/// One body block of a module.
#[derive(Debug)]
pub enum Block {
    /// `external ;` marks the module as a primitive black-box.
    External,
    /// `default <port> = <int> ;`
    Default { port: Id, value: u64 },
    /// `assign <dst> = <src> ;`
    Assign { dst: Expr, src: Expr },
    /// `<type> <name> ;`
    Resource { ty: Id, name: Id },
    /// `sequence @(posedge clk, synch rst) <stmt>`
    Sequence { event: Event, body: Stmt },
}

/// The activation event of a sequence block.
#[derive(Debug, Clone)]
pub struct Event {
    pub edge: Edge,
    pub clk: Id,
    pub synch: Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pos,
    Neg,
}

/// A statement, optionally labelled.
#[derive(Debug)]
pub struct Stmt {
    pub label: Option<Id>,
    pub body: StmtBody,
}

#[derive(Debug)]
pub enum StmtBody {
    /// `<dst> = <src> ;`, an implicit connect.
    Connect { dst: Expr, src: Expr },
    /// `<instance> . <action> ( <expr>, ... ) ;`
    Invoke { inst: Id, action: Id, args: Vec<Expr> },
    /// `begin <stmt>* end`
    Begin(Vec<Stmt>),
    /// `goto (cond, label, delay), ... ;`
    Goto(Vec<ActivationDef>),
}

/// One target of a `goto` statement.
#[derive(Debug)]
pub struct ActivationDef {
    pub cond: Expr,
    pub label: Id,
    pub delay: u64,
}

/// Binary operators, in increasing precedence group order:
/// comparisons, then `* % +`, with `.` handled as port selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Mod,
    Add,
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Mul => "*",
            BinOp::Mod => "%",
            BinOp::Add => "+",
            BinOp::Eq => "==",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug)]
pub enum Expr {
    /// A reference to a port on the enclosing module.
    Id(Id),
    /// An integer literal; width is inferred from context during lowering.
    Int(u64),
    /// `<instance> . <port>`
    Port { inst: Id, port: Id },
    Binop { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
}
