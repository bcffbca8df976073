#![allow(clippy::upper_case_acronyms)]

//! Parser for CAC surface-language programs.
use crate::ast::{self, BinOp};
use cac_utils::{CacResult, Id};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_consume::{match_nodes, Error, Parser};
use std::fs;
use std::io::Read;
use std::path::Path;

type ParseResult<T> = Result<T, Error<Rule>>;
type Node<'i> = pest_consume::Node<'i, Rule, ()>;

// include the grammar file so that Cargo knows to rebuild this file on
// grammar changes
const _GRAMMAR: &str = include_str!("syntax.pest");

// Define the precedence of binary operations. We use `lazy_static` so that
// this is only ever constructed once.
lazy_static::lazy_static! {
    static ref PRATT: PrattParser<Rule> =
    PrattParser::new()
        .op(Op::infix(Rule::op_eq, Assoc::Left)
            | Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left))
        .op(Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_mod, Assoc::Left)
            | Op::infix(Rule::op_add, Assoc::Left));
}

#[derive(Parser)]
#[grammar = "syntax.pest"]
pub struct CacParser;

impl CacParser {
    /// Parse a CAC program into an AST representation.
    pub fn parse_file(path: &Path) -> CacResult<ast::NamespaceDef> {
        let time = std::time::Instant::now();
        let content = &fs::read(path).map_err(|err| {
            cac_utils::Error::invalid_file(format!(
                "Failed to read {}: {err}",
                path.to_string_lossy(),
            ))
        })?;
        let string_content = std::str::from_utf8(content)?;
        let out = Self::parse_source(string_content).map_err(|e| {
            cac_utils::Error::parse_error(format!(
                "Failed to parse `{}`: {e}",
                path.to_string_lossy(),
            ))
        })?;
        log::info!(
            "Parsed `{}` in {}ms",
            path.to_string_lossy(),
            time.elapsed().as_millis()
        );
        Ok(out)
    }

    pub fn parse<R: Read>(mut r: R) -> CacResult<ast::NamespaceDef> {
        let mut buf = String::new();
        r.read_to_string(&mut buf).map_err(|err| {
            cac_utils::Error::invalid_file(format!(
                "Failed to parse buffer: {err}",
            ))
        })?;
        Self::parse_source(&buf)
            .map_err(|e| cac_utils::Error::parse_error(e.to_string()))
    }

    fn parse_source(content: &str) -> ParseResult<ast::NamespaceDef> {
        let inputs =
            CacParser::parse_with_userdata(Rule::file, content, ())?;
        let input = inputs.single()?;
        CacParser::file(input)
    }

    #[allow(clippy::result_large_err)]
    fn expr_helper(
        pairs: pest::iterators::Pairs<Rule>,
    ) -> ParseResult<ast::Expr> {
        PRATT
            .map_primary(|primary| match primary.as_rule() {
                Rule::term => {
                    Self::term(Node::new_with_user_data(primary, ()))
                }
                x => unreachable!("Unexpected rule {:?} for expr", x),
            })
            .map_infix(|lhs, op, rhs| {
                let op = match op.as_rule() {
                    Rule::op_mul => BinOp::Mul,
                    Rule::op_mod => BinOp::Mod,
                    Rule::op_add => BinOp::Add,
                    Rule::op_eq => BinOp::Eq,
                    Rule::op_lt => BinOp::Lt,
                    Rule::op_gt => BinOp::Gt,
                    Rule::op_le => BinOp::Le,
                    Rule::op_ge => BinOp::Ge,
                    x => unreachable!("Unexpected infix rule {:?}", x),
                };
                Ok(ast::Expr::Binop {
                    op,
                    lhs: Box::new(lhs?),
                    rhs: Box::new(rhs?),
                })
            })
            .parse(pairs)
    }
}

#[pest_consume::parser]
impl CacParser {
    fn EOI(_input: Node) -> ParseResult<()> {
        Ok(())
    }

    // ================ Literals =====================
    fn identifier(input: Node) -> ParseResult<Id> {
        Ok(Id::new(input.as_str()))
    }

    fn num(input: Node) -> ParseResult<u64> {
        input
            .as_str()
            .parse::<u64>()
            .map_err(|_| input.error("Expected valid number"))
    }

    fn direction(input: Node) -> ParseResult<ast::Direction> {
        match input.as_str() {
            "input" => Ok(ast::Direction::Input),
            "output" => Ok(ast::Direction::Output),
            _ => Err(input.error("Expected port direction")),
        }
    }

    fn bitrange(input: Node) -> ParseResult<u64> {
        match_nodes!(
            input.clone().into_children();
            [num(msb), num(lsb)] => {
                if msb < lsb {
                    Err(input.error("Malformed bit range"))
                } else {
                    Ok(msb - lsb + 1)
                }
            }
        )
    }

    fn edge(input: Node) -> ParseResult<ast::Edge> {
        match input.as_str() {
            "posedge" => Ok(ast::Edge::Pos),
            "negedge" => Ok(ast::Edge::Neg),
            _ => Err(input.error("Expected edge specifier")),
        }
    }

    // ================ Expressions =====================
    fn port_ref(input: Node) -> ParseResult<ast::Expr> {
        Ok(match_nodes!(
            input.into_children();
            [identifier(inst), identifier(port)] =>
                ast::Expr::Port { inst, port },
        ))
    }

    fn term(input: Node) -> ParseResult<ast::Expr> {
        Ok(match_nodes!(
            input.into_children();
            [num(n)] => ast::Expr::Int(n),
            [port_ref(p)] => p,
            [identifier(id)] => ast::Expr::Id(id),
            [expr(e)] => e,
        ))
    }

    fn expr(input: Node) -> ParseResult<ast::Expr> {
        Self::expr_helper(input.into_pair().into_inner())
    }

    // ================ Statements =====================
    fn label(input: Node) -> ParseResult<Id> {
        Ok(match_nodes!(
            input.into_children();
            [identifier(id)] => id,
        ))
    }

    fn activation(input: Node) -> ParseResult<ast::ActivationDef> {
        Ok(match_nodes!(
            input.into_children();
            [expr(cond), identifier(label), num(delay)] =>
                ast::ActivationDef { cond, label, delay },
        ))
    }

    fn goto_stmt(input: Node) -> ParseResult<ast::StmtBody> {
        Ok(match_nodes!(
            input.into_children();
            [activation(acts)..] => ast::StmtBody::Goto(acts.collect()),
        ))
    }

    fn begin_stmt(input: Node) -> ParseResult<ast::StmtBody> {
        Ok(match_nodes!(
            input.into_children();
            [stmt(stmts)..] => ast::StmtBody::Begin(stmts.collect()),
        ))
    }

    fn args(input: Node) -> ParseResult<Vec<ast::Expr>> {
        Ok(match_nodes!(
            input.into_children();
            [expr(exprs)..] => exprs.collect(),
        ))
    }

    fn invoke_stmt(input: Node) -> ParseResult<ast::StmtBody> {
        Ok(match_nodes!(
            input.into_children();
            [identifier(inst), identifier(action), args(args)] =>
                ast::StmtBody::Invoke { inst, action, args },
            [identifier(inst), identifier(action)] =>
                ast::StmtBody::Invoke { inst, action, args: Vec::new() },
        ))
    }

    fn connect_stmt(input: Node) -> ParseResult<ast::StmtBody> {
        Ok(match_nodes!(
            input.into_children();
            [expr(dst), expr(src)] => ast::StmtBody::Connect { dst, src },
        ))
    }

    fn stmt_body(input: Node) -> ParseResult<ast::StmtBody> {
        Ok(match_nodes!(
            input.into_children();
            [goto_stmt(s)] => s,
            [begin_stmt(s)] => s,
            [invoke_stmt(s)] => s,
            [connect_stmt(s)] => s,
        ))
    }

    fn stmt(input: Node) -> ParseResult<ast::Stmt> {
        Ok(match_nodes!(
            input.into_children();
            [label(label), stmt_body(body)] => ast::Stmt {
                label: Some(label),
                body,
            },
            [stmt_body(body)] => ast::Stmt { label: None, body },
        ))
    }

    // ================ Module blocks =====================
    fn external(_input: Node) -> ParseResult<ast::Block> {
        Ok(ast::Block::External)
    }

    fn default_decl(input: Node) -> ParseResult<ast::Block> {
        Ok(match_nodes!(
            input.into_children();
            [identifier(port), num(value)] =>
                ast::Block::Default { port, value },
        ))
    }

    fn assign_decl(input: Node) -> ParseResult<ast::Block> {
        Ok(match_nodes!(
            input.into_children();
            [expr(dst), expr(src)] => ast::Block::Assign { dst, src },
        ))
    }

    fn resource(input: Node) -> ParseResult<ast::Block> {
        Ok(match_nodes!(
            input.into_children();
            [identifier(ty), identifier(name)] =>
                ast::Block::Resource { ty, name },
        ))
    }

    fn sequence(input: Node) -> ParseResult<ast::Block> {
        Ok(match_nodes!(
            input.into_children();
            [edge(edge), identifier(clk), identifier(synch), stmt(body)] =>
                ast::Block::Sequence {
                    event: ast::Event { edge, clk, synch },
                    body,
                },
        ))
    }

    fn block(input: Node) -> ParseResult<ast::Block> {
        Ok(match_nodes!(
            input.into_children();
            [external(b)] => b,
            [default_decl(b)] => b,
            [assign_decl(b)] => b,
            [sequence(b)] => b,
            [resource(b)] => b,
        ))
    }

    fn port(input: Node) -> ParseResult<ast::PortAst> {
        Ok(match_nodes!(
            input.into_children();
            [direction(direction), bitrange(width), identifier(name)] =>
                ast::PortAst { direction, width, name },
            [direction(direction), identifier(name)] =>
                ast::PortAst { direction, width: 1, name },
        ))
    }

    fn ports(input: Node) -> ParseResult<Vec<ast::PortAst>> {
        Ok(match_nodes!(
            input.into_children();
            [port(ports)..] => ports.collect(),
        ))
    }

    fn module(input: Node) -> ParseResult<ast::ModuleDef> {
        Ok(match_nodes!(
            input.into_children();
            [identifier(name), ports(ports), block(blocks)..] =>
                ast::ModuleDef { name, ports, blocks: blocks.collect() },
            [identifier(name), block(blocks)..] =>
                ast::ModuleDef { name, ports: Vec::new(), blocks: blocks.collect() },
        ))
    }

    fn file(input: Node) -> ParseResult<ast::NamespaceDef> {
        Ok(match_nodes!(
            input.into_children();
            [module(modules).., EOI(_)] => ast::NamespaceDef {
                modules: modules.collect(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::CacParser;
    use crate::ast::{Block, Direction, Expr, StmtBody};

    #[test]
    fn parse_external_module() {
        let src = r#"
        module add16(input [15:0] in0, input [15:0] in1, output [15:0] out)
          external ;
        endmodule
        "#;
        let ns = CacParser::parse(src.as_bytes()).unwrap();
        assert_eq!(ns.modules.len(), 1);
        let m = &ns.modules[0];
        assert_eq!(m.name, "add16");
        assert!(m.is_external());
        assert_eq!(m.ports.len(), 3);
        assert_eq!(m.ports[0].width, 16);
        assert_eq!(m.ports[0].direction, Direction::Input);
        assert_eq!(m.ports[2].direction, Direction::Output);
    }

    #[test]
    fn parse_sequence_with_goto() {
        let src = r#"
        module counter(input [15:0] limit, output [15:0] count)
          register_16 cnt;
          sequence @(posedge clk, synch rst) begin
            top: cnt.st(cnt.data + 1);
            goto (cnt.data == limit, top, 1);
          end
        endmodule
        "#;
        let ns = CacParser::parse(src.as_bytes()).unwrap();
        let m = &ns.modules[0];
        assert!(!m.is_external());
        assert!(matches!(m.blocks[0], Block::Resource { .. }));
        let Block::Sequence { body, .. } = &m.blocks[1] else {
            panic!("expected sequence block");
        };
        let StmtBody::Begin(stmts) = &body.body else {
            panic!("expected begin block");
        };
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].label, Some("top".into()));
        assert!(matches!(stmts[1].body, StmtBody::Goto(_)));
    }

    #[test]
    fn parse_structural_assign() {
        let src = r#"
        module wrap(input [7:0] a, output [7:0] b)
          assign b = a ;
        endmodule
        "#;
        let ns = CacParser::parse(src.as_bytes()).unwrap();
        let Block::Assign { dst, src } = &ns.modules[0].blocks[0] else {
            panic!("expected assign block");
        };
        assert!(matches!(dst, Expr::Id(_)));
        assert!(matches!(src, Expr::Id(_)));
    }

    #[test]
    fn operator_precedence() {
        let src = r#"
        module m(input [3:0] a, input [3:0] b, output flag)
          sequence @(posedge clk, synch rst)
            flag = a + 1 == b ;
        endmodule
        "#;
        let ns = CacParser::parse(src.as_bytes()).unwrap();
        let Block::Sequence { body, .. } = &ns.modules[0].blocks[0] else {
            panic!("expected sequence block");
        };
        let StmtBody::Connect { src, .. } = &body.body else {
            panic!("expected connect");
        };
        // `==` binds looser than `+`.
        let Expr::Binop { op, lhs, .. } = src else {
            panic!("expected binop");
        };
        assert_eq!(op.as_str(), "==");
        assert!(matches!(**lhs, Expr::Binop { .. }));
    }
}
