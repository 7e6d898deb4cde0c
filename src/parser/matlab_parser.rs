use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::{Ast, AstKind, FunctionDef, IfBlock, IfBranch, StringSpan};
use crate::error::ParseError;

#[derive(Parser)]
#[grammar = "parser/matlab_grammar.pest"]
pub struct MatlabParser;

fn span_of(pair: &Pair<Rule>) -> Option<StringSpan> {
    let span = pair.as_span();
    Some(StringSpan {
        pos_start: span.start(),
        pos_end: span.end(),
    })
}

fn unsupported(pair: Pair<'_, Rule>) -> ParseError {
    let (line, col) = pair.as_span().start_pos().line_col();
    let kw = pair
        .clone()
        .into_inner()
        .next()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| pair.as_str().to_owned());
    ParseError::UnsupportedConstruct { construct: kw, line, col }
}

/// Fold a left-associative chain `operand (op operand)*` into nested binops.
fn fold_binary<'a>(pair: Pair<'a, Rule>) -> Result<Ast<'a>, ParseError> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let first = inner.next().unwrap();
    let mut lhs = parse_value(first)?;
    while let Some(op) = inner.next() {
        let rhs = parse_value(inner.next().unwrap())?;
        lhs = Ast {
            kind: AstKind::Binop {
                op: op.as_str(),
                left: Box::new(lhs),
                right: Box::new(rhs),
            },
            span,
        };
    }
    Ok(lhs)
}

pub fn parse_value<'a>(pair: Pair<'a, Rule>) -> Result<Ast<'a>, ParseError> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::statement
        | Rule::expression
        | Rule::paren_expr
        | Rule::lhs
        | Rule::call_arg
        | Rule::lhs_item => parse_value(pair.into_inner().next().unwrap()),

        Rule::unsupported_stmt => Err(unsupported(pair)),

        Rule::or_expr
        | Rule::and_expr
        | Rule::bor_expr
        | Rule::band_expr
        | Rule::rel_expr
        | Rule::add_expr
        | Rule::mul_expr => fold_binary(pair),

        Rule::range_expr => {
            let mut args = pair
                .into_inner()
                .map(parse_value)
                .collect::<Result<Vec<_>, _>>()?;
            if args.len() == 1 {
                Ok(args.pop().unwrap())
            } else {
                Ok(Ast { kind: AstKind::Range { args }, span })
            }
        }

        Rule::unary_expr => {
            let mut ops = Vec::new();
            let mut child = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::un_op => ops.push(p.as_str().chars().next().unwrap()),
                    _ => child = Some(parse_value(p)?),
                }
            }
            let mut ast = child.unwrap();
            for op in ops.into_iter().rev() {
                ast = Ast {
                    kind: AstKind::Monop { op, child: Box::new(ast) },
                    span,
                };
            }
            Ok(ast)
        }

        // Right-associative by construction: the rhs re-enters pow via pow_rhs.
        Rule::pow_expr => {
            let mut inner = pair.into_inner();
            let base = parse_value(inner.next().unwrap())?;
            match inner.next() {
                None => Ok(base),
                Some(op) => {
                    let rhs = parse_value(inner.next().unwrap())?;
                    Ok(Ast {
                        kind: AstKind::Binop {
                            op: op.as_str(),
                            left: Box::new(base),
                            right: Box::new(rhs),
                        },
                        span,
                    })
                }
            }
        }
        Rule::pow_rhs => {
            let mut ops = Vec::new();
            let mut child = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::un_op => ops.push(p.as_str().chars().next().unwrap()),
                    _ => child = Some(parse_value(p)?),
                }
            }
            let mut ast = child.unwrap();
            for op in ops.into_iter().rev() {
                ast = Ast {
                    kind: AstKind::Monop { op, child: Box::new(ast) },
                    span,
                };
            }
            Ok(ast)
        }

        Rule::postfix_expr => {
            let mut inner = pair.into_inner();
            let mut ast = parse_value(inner.next().unwrap())?;
            for _op in inner {
                ast = Ast {
                    kind: AstKind::Transpose { child: Box::new(ast) },
                    span,
                };
            }
            Ok(ast)
        }

        Rule::primary => parse_value(pair.into_inner().next().unwrap()),

        Rule::number => {
            let value = pair
                .as_str()
                .parse::<f64>()
                .map_err(|_| ParseError::BadNumber {
                    text: pair.as_str().to_owned(),
                    line: pair.as_span().start_pos().line_col().0,
                })?;
            Ok(Ast { kind: AstKind::Number(value), span })
        }
        Rule::string => {
            let s = pair.as_str();
            Ok(Ast { kind: AstKind::Str(&s[1..s.len() - 1]), span })
        }
        Rule::name => Ok(Ast { kind: AstKind::Name(pair.as_str()), span }),
        Rule::colon => Ok(Ast { kind: AstKind::Colon, span }),
        Rule::tilde => Ok(Ast { kind: AstKind::Name("~"), span }),

        Rule::call | Rule::indexed_name => {
            let mut inner = pair.into_inner();
            let name = inner.next().unwrap().as_str();
            let args = inner.map(parse_value).collect::<Result<Vec<_>, _>>()?;
            Ok(Ast { kind: AstKind::Call { name, args }, span })
        }

        Rule::handle => {
            let inner = pair.into_inner().next().unwrap();
            match inner.as_rule() {
                Rule::name => Ok(Ast { kind: AstKind::Handle(inner.as_str()), span }),
                Rule::anon_fn => {
                    let mut params = Vec::new();
                    let mut body = None;
                    for p in inner.into_inner() {
                        match p.as_rule() {
                            Rule::name => params.push(p.as_str()),
                            _ => body = Some(parse_value(p)?),
                        }
                    }
                    Ok(Ast {
                        kind: AstKind::AnonFunction {
                            params,
                            body: Box::new(body.unwrap()),
                        },
                        span,
                    })
                }
                _ => unreachable!(),
            }
        }

        Rule::matrix => {
            let mut rows = Vec::new();
            if let Some(rows_pair) = pair.into_inner().next() {
                for row in rows_pair.into_inner() {
                    let elems = row
                        .into_inner()
                        .map(parse_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.push(elems);
                }
            }
            Ok(Ast { kind: AstKind::Matrix { rows }, span })
        }

        Rule::cell => {
            let (line, col) = pair.as_span().start_pos().line_col();
            Err(ParseError::UnsupportedConstruct {
                construct: "cell array".to_owned(),
                line,
                col,
            })
        }

        Rule::assignment => {
            let mut inner = pair.into_inner();
            let lhs = parse_value(inner.next().unwrap())?;
            let rhs = parse_value(inner.next().unwrap())?;
            Ok(Ast {
                kind: AstKind::Assignment { lhs: Box::new(lhs), rhs: Box::new(rhs) },
                span,
            })
        }

        Rule::multi_lhs => {
            let mut names = Vec::new();
            for p in pair.into_inner() {
                let item = parse_value(p)?;
                match item.kind {
                    AstKind::Name("~") => names.push(None),
                    AstKind::Name(n) => names.push(Some(n)),
                    _ => unreachable!(),
                }
            }
            Ok(Ast { kind: AstKind::MultiLhs { names }, span })
        }

        Rule::function_def => {
            let mut outputs = Vec::new();
            let mut name = "";
            let mut params = Vec::new();
            let mut body = Vec::new();
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::kw_function | Rule::kw_end => {}
                    Rule::output_list => {
                        outputs = p.into_inner().map(|n| n.as_str()).collect()
                    }
                    Rule::name => name = p.as_str(),
                    Rule::param_list => {
                        params = p.into_inner().map(|n| n.as_str()).collect()
                    }
                    Rule::fn_body => {
                        for stmt in p.into_inner() {
                            body.push(parse_value(stmt)?);
                        }
                    }
                    _ => unreachable!(),
                }
            }
            Ok(Ast {
                kind: AstKind::FunctionDef(FunctionDef { name, outputs, params, body }),
                span,
            })
        }

        Rule::if_block => {
            let mut branches = Vec::new();
            let mut otherwise = None;
            let mut inner = pair.into_inner();
            // leading `if cond` branch
            let mut pending_cond: Option<Ast> = None;
            while let Some(p) = inner.next() {
                match p.as_rule() {
                    Rule::kw_if | Rule::kw_end => {}
                    Rule::expression => pending_cond = Some(parse_value(p)?),
                    Rule::block => {
                        let body = p
                            .into_inner()
                            .map(parse_value)
                            .collect::<Result<Vec<_>, _>>()?;
                        branches.push(IfBranch {
                            condition: pending_cond.take().unwrap(),
                            body,
                        });
                    }
                    Rule::elseif_clause => {
                        let mut ei = p.into_inner();
                        ei.next(); // kw_elseif
                        let condition = parse_value(ei.next().unwrap())?;
                        let body = ei
                            .next()
                            .unwrap()
                            .into_inner()
                            .map(parse_value)
                            .collect::<Result<Vec<_>, _>>()?;
                        branches.push(IfBranch { condition, body });
                    }
                    Rule::else_clause => {
                        let mut ec = p.into_inner();
                        ec.next(); // kw_else
                        let body = ec
                            .next()
                            .unwrap()
                            .into_inner()
                            .map(parse_value)
                            .collect::<Result<Vec<_>, _>>()?;
                        otherwise = Some(body);
                    }
                    _ => unreachable!(),
                }
            }
            Ok(Ast {
                kind: AstKind::If(IfBlock { branches, otherwise }),
                span,
            })
        }

        r => unreachable!("unexpected rule {:?}", r),
    }
}
