use std::fmt;

/// Byte span of a node in the (preprocessed) source text. Offsets are
/// preserved by the comment/continuation pre-pass, so a span always maps back
/// to the original file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringSpan {
    pub pos_start: usize,
    pub pos_end: usize,
}

impl fmt::Display for StringSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}..{}]", self.pos_start, self.pos_end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef<'a> {
    pub name: &'a str,
    pub outputs: Vec<&'a str>,
    pub params: Vec<&'a str>,
    pub body: Vec<Ast<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch<'a> {
    pub condition: Ast<'a>,
    pub body: Vec<Ast<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock<'a> {
    pub branches: Vec<IfBranch<'a>>,
    pub otherwise: Option<Vec<Ast<'a>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstKind<'a> {
    Assignment {
        lhs: Box<Ast<'a>>,
        rhs: Box<Ast<'a>>,
    },

    FunctionDef(FunctionDef<'a>),

    If(IfBlock<'a>),

    Binop {
        op: &'a str,
        left: Box<Ast<'a>>,
        right: Box<Ast<'a>>,
    },

    Monop {
        op: char,
        child: Box<Ast<'a>>,
    },

    Transpose {
        child: Box<Ast<'a>>,
    },

    /// `a:b` or `a:s:b`
    Range {
        args: Vec<Ast<'a>>,
    },

    /// Either a function call or an array reference; MATLAB does not
    /// distinguish the two syntactically, so neither do we until
    /// interpretation.
    Call {
        name: &'a str,
        args: Vec<Ast<'a>>,
    },

    /// `[...]` literal as a list of rows, each a list of element expressions.
    Matrix {
        rows: Vec<Vec<Ast<'a>>>,
    },

    /// `[a, b]` or `[~, x]` on the left of an assignment.
    MultiLhs {
        names: Vec<Option<&'a str>>,
    },

    /// `@name`
    Handle(&'a str),

    /// `@(args) expr`
    AnonFunction {
        params: Vec<&'a str>,
        body: Box<Ast<'a>>,
    },

    /// A bare `:` in an argument list.
    Colon,

    Number(f64),

    Str(&'a str),

    Name(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ast<'a> {
    pub kind: AstKind<'a>,
    pub span: Option<StringSpan>,
}

impl<'a> Ast<'a> {
    pub fn as_function_def(&self) -> Option<&FunctionDef<'a>> {
        match &self.kind {
            AstKind::FunctionDef(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&'a str> {
        match &self.kind {
            AstKind::Name(n) => Some(n),
            _ => None,
        }
    }
}

fn expr_to_string(ast: &Ast) -> String {
    match &ast.kind {
        AstKind::Binop { op, left, right } => {
            format!("({} {} {})", expr_to_string(left), op, expr_to_string(right))
        }
        AstKind::Monop { op, child } => format!("({}{})", op, expr_to_string(child)),
        AstKind::Transpose { child } => format!("{}'", expr_to_string(child)),
        AstKind::Range { args } => args
            .iter()
            .map(expr_to_string)
            .collect::<Vec<_>>()
            .join(":"),
        AstKind::Call { name, args } => format!(
            "{}({})",
            name,
            args.iter()
                .map(expr_to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        AstKind::Matrix { rows } => {
            let rows_disp: Vec<String> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(expr_to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            format!("[{}]", rows_disp.join("; "))
        }
        AstKind::MultiLhs { names } => {
            let disp: Vec<&str> = names.iter().map(|n| n.unwrap_or("~")).collect();
            format!("[{}]", disp.join(", "))
        }
        AstKind::Handle(name) => format!("@{}", name),
        AstKind::AnonFunction { params, body } => {
            format!("@({}) {}", params.join(", "), expr_to_string(body))
        }
        AstKind::Colon => ":".to_string(),
        AstKind::Number(value) => value.to_string(),
        AstKind::Str(value) => format!("'{}'", value),
        AstKind::Name(value) => value.to_string(),
        _ => format!("{:?}", ast.kind),
    }
}

impl<'a> fmt::Display for Ast<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            AstKind::Assignment { lhs, rhs } => {
                write!(f, "{} = {}", expr_to_string(lhs), expr_to_string(rhs))
            }
            AstKind::FunctionDef(def) => write!(
                f,
                "function [{}] = {}({})",
                def.outputs.join(", "),
                def.name,
                def.params.join(", ")
            ),
            AstKind::If(block) => {
                write!(f, "if {} ...", expr_to_string(&block.branches[0].condition))
            }
            AstKind::MultiLhs { names } => {
                let disp: Vec<&str> = names.iter().map(|n| n.unwrap_or("~")).collect();
                write!(f, "[{}]", disp.join(", "))
            }
            _ => write!(f, "{}", expr_to_string(self)),
        }
    }
}
