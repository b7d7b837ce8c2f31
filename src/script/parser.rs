//! PEST-based parser for jump scripts
//!
//! Produces the AST in [`super::ast`], with spans for error reporting.

use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use std::sync::OnceLock;
use thiserror::Error;

use super::ast::{BinaryOp, Expr, FunctionDef, JmpBufDecl, ScriptDef, Span, Stmt, UnaryOp};

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "script/grammar.pest"]
struct ScriptParser;

/// Operator precedence, loosest first
fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::or, Assoc::Left))
            .op(Op::infix(Rule::and, Assoc::Left))
            .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
            .op(Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::le, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::ge, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::rem, Assoc::Left))
            .op(Op::prefix(Rule::not) | Op::prefix(Rule::neg))
    })
}

/* ===================== Error Types ===================== */

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    PestError(String, Option<Span>),

    #[error("{0}")]
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, col) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        let (start, end) = match err.location {
            pest::error::InputLocation::Pos(pos) => (pos, pos),
            pest::error::InputLocation::Span(span) => span,
        };
        ParseError::PestError(err.to_string(), Some(Span::new(start, end, line, col)))
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Helpers ===================== */

fn pair_span(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    let (line, col) = span.start_pos().line_col();
    Span::new(span.start(), span.end(), line, col)
}

fn unexpected(pair: &Pair<Rule>, context: &str) -> ParseError {
    ParseError::BuildError(
        format!("Unexpected {:?} in {}", pair.as_rule(), context),
        Some(pair_span(pair)),
    )
}

/// Take the next inner pair or report what was missing
fn next_pair<'i>(
    pairs: &mut Pairs<'i, Rule>,
    what: &str,
    span: Span,
) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::BuildError(format!("Missing {}", what), Some(span)))
}

/* ===================== Public API ===================== */

/// Parse a script source string
pub fn parse_script(source: &str) -> ParseResult<ScriptDef> {
    let mut pairs = ScriptParser::parse(Rule::script, source)?;
    let script = next_pair(&mut pairs, "script", Span::default())?;

    let mut def = ScriptDef::default();
    for pair in script.into_inner() {
        match pair.as_rule() {
            Rule::jmp_buf_decl => def.jmp_bufs.push(build_jmp_buf(pair)?),
            Rule::function => def.functions.push(build_function(pair)?),
            Rule::EOI => {}
            _ => return Err(unexpected(&pair, "script")),
        }
    }
    Ok(def)
}

/// Parse a single expression (testing API)
pub fn parse_expr(source: &str) -> ParseResult<Expr> {
    let mut pairs = ScriptParser::parse(Rule::expr, source)?;
    let expr = next_pair(&mut pairs, "expression", Span::default())?;
    if expr.as_span().end() != source.trim_end().len() {
        return Err(ParseError::BuildError(
            format!("Trailing input after expression: {:?}", &source[expr.as_span().end()..]),
            Some(pair_span(&expr)),
        ));
    }
    build_expr(expr)
}

/* ===================== AST Builder ===================== */

fn build_jmp_buf(pair: Pair<Rule>) -> ParseResult<JmpBufDecl> {
    let span = pair_span(&pair);
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "jmp_buf name", span)?;
    Ok(JmpBufDecl {
        name: name.as_str().to_string(),
        span,
    })
}

fn build_function(pair: Pair<Rule>) -> ParseResult<FunctionDef> {
    let span = pair_span(&pair);
    let mut inner = pair.into_inner();

    let name = next_pair(&mut inner, "function name", span)?.as_str().to_string();
    let params = next_pair(&mut inner, "parameter list", span)?
        .into_inner()
        .map(|p| p.as_str().to_string())
        .collect();
    let body = build_block(next_pair(&mut inner, "function body", span)?)?;

    Ok(FunctionDef {
        name,
        params,
        body,
        span,
    })
}

fn build_block(pair: Pair<Rule>) -> ParseResult<Vec<Stmt>> {
    pair.into_inner().map(build_statement).collect()
}

fn build_statement(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let span = pair_span(&pair);
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();

    match rule {
        Rule::let_stmt => {
            let name = next_pair(&mut inner, "variable name", span)?.as_str().to_string();
            let init = build_expr(next_pair(&mut inner, "initializer", span)?)?;
            Ok(Stmt::Let { name, init, span })
        }

        Rule::assign_stmt => {
            let name = next_pair(&mut inner, "variable name", span)?.as_str().to_string();
            let value = build_expr(next_pair(&mut inner, "assigned value", span)?)?;
            Ok(Stmt::Assign { name, value, span })
        }

        Rule::if_stmt => {
            let test = build_expr(next_pair(&mut inner, "if condition", span)?)?;
            let then_body = build_block(next_pair(&mut inner, "if body", span)?)?;
            let else_body = match inner.next() {
                Some(else_clause) => {
                    let else_span = pair_span(&else_clause);
                    let branch = next_pair(&mut else_clause.into_inner(), "else body", else_span)?;
                    match branch.as_rule() {
                        Rule::block => Some(build_block(branch)?),
                        Rule::if_stmt => Some(vec![build_statement(branch)?]),
                        _ => return Err(unexpected(&branch, "else clause")),
                    }
                }
                None => None,
            };
            Ok(Stmt::If {
                test,
                then_body,
                else_body,
            })
        }

        Rule::while_stmt => {
            let test = build_expr(next_pair(&mut inner, "while condition", span)?)?;
            let body = build_block(next_pair(&mut inner, "while body", span)?)?;
            Ok(Stmt::While { test, body })
        }

        Rule::return_stmt => {
            let value = inner.next().map(build_expr).transpose()?;
            Ok(Stmt::Return { value })
        }

        Rule::expr_stmt => {
            let expr = build_expr(next_pair(&mut inner, "expression", span)?)?;
            Ok(Stmt::Expr { expr })
        }

        _ => Err(ParseError::BuildError(
            format!("Unexpected {:?} in block", rule),
            Some(span),
        )),
    }
}

fn build_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    pratt()
        .map_primary(build_primary)
        .map_prefix(|op, operand| {
            let op = match op.as_rule() {
                Rule::not => UnaryOp::Not,
                Rule::neg => UnaryOp::Neg,
                _ => return Err(unexpected(&op, "prefix operator")),
            };
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand?),
            })
        })
        .map_infix(|left, op, right| {
            let op = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                Rule::rem => BinaryOp::Rem,
                _ => return Err(unexpected(&op, "binary operator")),
            };
            Ok(Expr::Binary {
                op,
                left: Box::new(left?),
                right: Box::new(right?),
            })
        })
        .parse(pair.into_inner())
}

fn build_primary(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = pair_span(&pair);
    match pair.as_rule() {
        Rule::int => {
            let v = pair.as_str().parse::<i64>().map_err(|e| {
                let msg = format!("Invalid integer {}: {}", pair.as_str(), e);
                ParseError::BuildError(msg, Some(span))
            })?;
            Ok(Expr::Int { v })
        }

        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expr::Str {
                v: unescape(raw, span)?,
            })
        }

        Rule::ident => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
            span,
        }),

        Rule::call => {
            let mut inner = pair.into_inner();
            let callee = next_pair(&mut inner, "callee", span)?.as_str().to_string();
            let args = next_pair(&mut inner, "arguments", span)?
                .into_inner()
                .map(build_expr)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::Call { callee, args, span })
        }

        Rule::expr => build_expr(pair),

        _ => Err(unexpected(&pair, "expression")),
    }
}

/// Resolve backslash escapes in a string literal body
fn unescape(raw: &str, span: Span) -> ParseResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            other => {
                let escape = other.map(String::from).unwrap_or_default();
                return Err(ParseError::BuildError(
                    format!("Invalid escape sequence \\{}", escape),
                    Some(span),
                ));
            }
        }
    }
    Ok(out)
}
