use indexmap::IndexMap;

use crate::error::BuildError;

pub mod expr;
pub mod term;

pub use expr::{BinaryOp, Expr, UnaryOp};
pub use term::{expand, Term};

/// Functions with a direct MathML rendering. Anything else appearing in a
/// derivative is reported rather than silently carried through.
pub const KNOWN_FUNCTIONS: &[&str] = &[
    "exp", "log", "log10", "log2", "sqrt", "abs", "sin", "cos", "tan", "asin",
    "acos", "atan", "sinh", "cosh", "tanh", "floor", "ceil", "power", "min",
    "max",
];

/// An initial condition: either a plain number or an expression over
/// parameters that the output format has to carry symbolically.
#[derive(Debug, Clone, PartialEq)]
pub enum Initial {
    Number(f64),
    Symbolic(Expr),
}

/// What the interpreter hands over: one derivative expression per state, the
/// matching initial conditions, and every named parameter the derivatives
/// reference. A parameter carries `None` when the script never assigned the
/// name a concrete number, leaving it symbolic in the output.
/// Vector-parameter elements are already registered under their flattened id
/// (`k(2)` as `k_2`).
#[derive(Debug, Clone)]
pub struct OdeProgram {
    pub dependent_var: String,
    pub independent_var: String,
    pub derivatives: Vec<Expr>,
    pub initials: Vec<Initial>,
    pub parameters: IndexMap<String, Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct OdeVariable {
    pub id: String,
    /// 1-based subscript this variable had in the source
    pub index: usize,
    pub initial: Initial,
}

#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub id: String,
    /// `None` for a parameter that stays symbolic
    pub value: Option<f64>,
}

/// A system of first-order ODEs in expanded form: for each variable, the
/// signed terms of its derivative.
#[derive(Debug, Clone)]
pub struct OdeModel {
    pub variables: Vec<OdeVariable>,
    pub parameters: Vec<ParameterDef>,
    pub derivatives: Vec<Vec<Term>>,
}

impl OdeModel {
    pub fn build(program: OdeProgram) -> Result<OdeModel, BuildError> {
        if program.derivatives.len() != program.initials.len() {
            return Err(BuildError::DimensionMismatch {
                derivatives: program.derivatives.len(),
                initials: program.initials.len(),
            });
        }

        let variables: Vec<OdeVariable> = program
            .initials
            .iter()
            .enumerate()
            .map(|(i, initial)| OdeVariable {
                id: format!("{}_{}", program.dependent_var, i + 1),
                index: i + 1,
                initial: initial.clone(),
            })
            .collect();

        let mut derivatives = Vec::with_capacity(program.derivatives.len());
        for (i, expr) in program.derivatives.iter().enumerate() {
            check_calls(expr)?;
            check_states(expr, &program.dependent_var, variables.len())?;
            let terms = expand(expr).map_err(|term| {
                BuildError::NonPolynomialTerm {
                    variable: variables[i].id.clone(),
                    term,
                }
            })?;
            derivatives.push(terms);
        }

        let parameters = program
            .parameters
            .iter()
            .map(|(id, value)| ParameterDef {
                id: id.clone(),
                value: *value,
            })
            .collect();

        Ok(OdeModel {
            variables,
            parameters,
            derivatives,
        })
    }

    /// Derivative of variable `i` reassembled into a single expression,
    /// mainly for rate rules and diagnostics.
    pub fn derivative_expr(&self, i: usize) -> Expr {
        let mut terms = self.derivatives[i].iter();
        let first = match terms.next() {
            Some(t) => t.to_expr(),
            None => return Expr::Number(0.0),
        };
        terms.fold(first, |acc, t| {
            if t.coeff < 0.0 {
                let mut pos = t.clone();
                pos.coeff = -pos.coeff;
                Expr::binary(BinaryOp::Sub, acc, pos.to_expr())
            } else {
                Expr::binary(BinaryOp::Add, acc, t.to_expr())
            }
        })
    }
}

/// Reject state subscripts beyond the system size before anything downstream
/// indexes the variable list with them.
fn check_states(expr: &Expr, dep: &str, states: usize) -> Result<(), BuildError> {
    match expr {
        Expr::State(i) if *i > states => Err(BuildError::StateOutOfRange {
            reference: format!("{}({})", dep, i),
            states,
        }),
        Expr::Binary { left, right, .. } => {
            check_states(left, dep, states)?;
            check_states(right, dep, states)
        }
        Expr::Unary { child, .. } => check_states(child, dep, states),
        Expr::Call { args, .. } => {
            args.iter().try_for_each(|a| check_states(a, dep, states))
        }
        _ => Ok(()),
    }
}

fn check_calls(expr: &Expr) -> Result<(), BuildError> {
    match expr {
        Expr::Call { name, args } => {
            if !KNOWN_FUNCTIONS.contains(&name.as_str()) {
                return Err(BuildError::UnknownFunction(name.clone()));
            }
            args.iter().try_for_each(check_calls)
        }
        Expr::Binary { left, right, .. } => {
            check_calls(left)?;
            check_calls(right)
        }
        Expr::Unary { child, .. } => check_calls(child),
        _ => Ok(()),
    }
}
