use std::fmt;

/// Arithmetic operators that survive into the model stage. Element-wise
/// MATLAB spellings (`.*`, `./`, `.^`) are normalised to their scalar
/// counterparts during interpretation, since every quantity here is scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn from_str(op: &str) -> Option<Self> {
        match op {
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Sub),
            "*" | ".*" => Some(BinaryOp::Mul),
            "/" | "./" => Some(BinaryOp::Div),
            "^" | ".^" => Some(BinaryOp::Pow),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// An owned scalar expression over states, parameters and time. Produced by
/// the interpreter once all script-level symbols have been resolved; state
/// references are 1-based, matching the `x(i)` subscripts they came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// a named parameter kept symbolic in the output
    Var(String),
    /// the i-th state variable, 1-based
    State(usize),
    /// the independent variable of the ODE system
    Time,
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        child: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn neg(child: Expr) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            child: Box::new(child),
        }
    }

    /// Evaluate a fully numeric expression. Returns `None` as soon as a
    /// state, time or unresolved name is encountered.
    pub fn eval_const(&self) -> Option<f64> {
        match self {
            Expr::Number(v) => Some(*v),
            Expr::Var(_) | Expr::State(_) | Expr::Time => None,
            Expr::Binary { op, left, right } => {
                let l = left.eval_const()?;
                let r = right.eval_const()?;
                Some(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Pow => l.powf(r),
                })
            }
            Expr::Unary { op: UnaryOp::Neg, child } => Some(-child.eval_const()?),
            Expr::Call { name, args } => {
                let vals: Option<Vec<f64>> =
                    args.iter().map(Expr::eval_const).collect();
                let vals = vals?;
                match (name.as_str(), vals.as_slice()) {
                    ("exp", [v]) => Some(v.exp()),
                    ("log", [v]) => Some(v.ln()),
                    ("log10", [v]) => Some(v.log10()),
                    ("log2", [v]) => Some(v.log2()),
                    ("sqrt", [v]) => Some(v.sqrt()),
                    ("abs", [v]) => Some(v.abs()),
                    ("sin", [v]) => Some(v.sin()),
                    ("cos", [v]) => Some(v.cos()),
                    ("tan", [v]) => Some(v.tan()),
                    ("floor", [v]) => Some(v.floor()),
                    ("ceil", [v]) => Some(v.ceil()),
                    ("power", [a, b]) => Some(a.powf(*b)),
                    ("min", [a, b]) => Some(a.min(*b)),
                    ("max", [a, b]) => Some(a.max(*b)),
                    _ => None,
                }
            }
        }
    }

    /// Whether the expression references a state variable or time, in which
    /// case it cannot be decided at translation time.
    pub fn depends_on_dynamics(&self) -> Option<String> {
        match self {
            Expr::State(i) => Some(format!("x({})", i)),
            Expr::Time => Some("t".to_owned()),
            Expr::Number(_) | Expr::Var(_) => None,
            Expr::Binary { left, right, .. } => left
                .depends_on_dynamics()
                .or_else(|| right.depends_on_dynamics()),
            Expr::Unary { child, .. } => child.depends_on_dynamics(),
            Expr::Call { args, .. } => {
                args.iter().find_map(Expr::depends_on_dynamics)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Var(n) => write!(f, "{}", n),
            Expr::State(i) => write!(f, "x({})", i),
            Expr::Time => write!(f, "t"),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Unary { op: UnaryOp::Neg, child } => write!(f, "(-{})", child),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}
