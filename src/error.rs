use thiserror::Error;

use crate::parser::Rule;

/// Errors raised while turning source text into an AST.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(Box<pest::error::Error<Rule>>),
    #[error("unsupported MATLAB construct '{construct}' at line {line}, column {col}")]
    UnsupportedConstruct {
        construct: String,
        line: usize,
        col: usize,
    },
    #[error("cannot parse number '{text}' at line {line}")]
    BadNumber { text: String, line: usize },
}

/// Ways a solver call can disagree with the ODE function it names.
#[derive(Error, Debug)]
pub enum SolverMismatch {
    #[error("no definition of '{0}' was found")]
    UndefinedFunction(String),
    #[error(
        "'{name}' returns a vector of length {returned}, but the initial \
         conditions have length {expected}"
    )]
    Dimension {
        name: String,
        returned: usize,
        expected: usize,
    },
}

/// Errors raised while interpreting the script against its symbol table.
#[derive(Error, Debug)]
pub enum InterpretError {
    #[error("no call to a MATLAB ODE solver (ode45, ode15s, ...) was found")]
    MissingSolverCall,
    #[error("solver call does not match its ODE function: {0}")]
    SolverFunctionMismatch(SolverMismatch),
    #[error("symbol '{0}' cannot be resolved to a value")]
    UnresolvedSymbol(String),
    #[error(
        "conditional at line {line} depends on '{dependency}', \
         which is not known at translation time"
    )]
    UnsupportedConditional { dependency: String, line: usize },
    #[error("{0}")]
    Unsupported(String),
}

/// Errors raised while assembling the ODE model from interpreted derivatives.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("derivative of '{variable}' contains a non-algebraic term: {term}")]
    NonPolynomialTerm { variable: String, term: String },
    #[error(
        "derivative vector has {derivatives} entries but there are \
         {initials} initial conditions"
    )]
    DimensionMismatch {
        derivatives: usize,
        initials: usize,
    },
    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),
    #[error("state reference '{reference}' is outside the {states}-state system")]
    StateOutOfRange { reference: String, states: usize },
}

/// Errors raised while grouping rate terms into reactions.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(
        "terms with kinetics '{body}' have coefficients that are not \
         integer multiples of each other"
    )]
    AmbiguousGrouping { body: String },
}

/// Top-level error for a whole conversion run.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("interpretation error: {0}")]
    Interpret(#[from] InterpretError),
    #[error("model error: {0}")]
    Build(#[from] BuildError),
}

impl ParseError {
    /// Render the error against the original source, pointing at the line and
    /// column the way the interactive MATLAB prompt would.
    pub fn as_error_message(&self, input: &str) -> String {
        match self {
            ParseError::Syntax(e) => {
                let (line, col) = match e.line_col {
                    pest::error::LineColLocation::Pos((l, c)) => (l, c),
                    pest::error::LineColLocation::Span((l, c), _) => (l, c),
                };
                let src_line = input.lines().nth(line - 1).unwrap_or("");
                format!("Line {}, Column {}: syntax error\n  {}", line, col, src_line)
            }
            ParseError::UnsupportedConstruct { construct, line, col } => {
                let src_line = input.lines().nth(line - 1).unwrap_or("");
                format!(
                    "Line {}, Column {}: '{}' is outside the supported subset\n  {}",
                    line, col, construct, src_line
                )
            }
            ParseError::BadNumber { text, line } => {
                format!("Line {}: cannot parse number '{}'", line, text)
            }
        }
    }
}
