use indexmap::IndexMap;

use crate::ast::{Ast, AstKind, FunctionDef};
use crate::error::{InterpretError, SolverMismatch};
use crate::model::{BinaryOp, Expr, Initial, OdeProgram, UnaryOp};

pub mod symbol_table;

pub use symbol_table::{SymbolTable, Value};

/// The MATLAB solvers whose calls mark the ODE system to translate.
pub const SOLVERS: &[&str] = &[
    "ode45", "ode23", "ode113", "ode15s", "ode23s", "ode23t", "ode23tb",
];

fn line_of(source: &str, ast: &Ast) -> usize {
    match ast.span {
        Some(span) => source[..span.pos_start.min(source.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1,
        None => 0,
    }
}

/// Interpret a parsed script: locate the solver call, cross-check the ODE
/// function against the initial conditions, and reduce the function body to
/// one expression per state with all script symbols resolved.
pub fn interpret<'s>(
    source: &str,
    statements: &'s [Ast<'s>],
) -> Result<OdeProgram, InterpretError> {
    let (scope, functions) = script_scope(statements);

    let mut table = SymbolTable::new();
    table.collect(scope);

    let (handle_ast, xinit_ast) = find_solver_call(scope)?;

    // resolve the first solver argument down to an ODE function
    let ode_fn = match &handle_ast.kind {
        AstKind::Handle(n) => OdeFunction::named(n, &functions)?,
        AstKind::AnonFunction { params, body } => OdeFunction::anon(params, body)?,
        AstKind::Name(n) => match table.resolve(n)? {
            Value::Handle(h) => OdeFunction::named(h, &functions)?,
            Value::Anon { params, body } => OdeFunction::anon(&params, body)?,
            _ => {
                return Err(InterpretError::SolverFunctionMismatch(
                    SolverMismatch::UndefinedFunction((*n).to_owned()),
                ))
            }
        },
        _ => {
            return Err(InterpretError::Unsupported(format!(
                "first solver argument '{}' is not a function handle",
                handle_ast
            )))
        }
    };

    let mut interp = Interpreter {
        source,
        table,
        indep: ode_fn.indep,
        dep: ode_fn.dep,
        locals: IndexMap::new(),
        parameters: IndexMap::new(),
    };

    let derivatives = interp.derivatives_of(&ode_fn)?;
    let initials = interp.initials_of(xinit_ast)?;

    if derivatives.len() != initials.len() {
        return Err(InterpretError::SolverFunctionMismatch(
            SolverMismatch::Dimension {
                name: ode_fn.display_name(),
                returned: derivatives.len(),
                expected: initials.len(),
            },
        ));
    }

    Ok(OdeProgram {
        dependent_var: ode_fn.dep.to_owned(),
        independent_var: ode_fn.indep.to_owned(),
        derivatives,
        initials,
        parameters: interp.parameters,
    })
}

/// A script file may instead be a single function; its body is then the
/// working scope, as if it had been a plain script.
fn script_scope<'s>(
    statements: &'s [Ast<'s>],
) -> (&'s [Ast<'s>], IndexMap<&'s str, &'s FunctionDef<'s>>) {
    let mut functions = IndexMap::new();
    let mut scope = statements;
    let all_fns = !statements.is_empty()
        && statements
            .iter()
            .all(|s| matches!(s.kind, AstKind::FunctionDef(_)));
    if all_fns {
        if let AstKind::FunctionDef(entry) = &statements[0].kind {
            scope = &entry.body;
        }
    }
    for stmt in statements.iter().chain(scope.iter()) {
        if let AstKind::FunctionDef(def) = &stmt.kind {
            functions.insert(def.name, def);
        }
    }
    (scope, functions)
}

/// The first `[t, x] = odeNN(@f, tspan, xinit, ...)` in the scope wins.
/// Returns the handle argument and the initial-condition argument.
fn find_solver_call<'s>(
    scope: &'s [Ast<'s>],
) -> Result<(&'s Ast<'s>, &'s Ast<'s>), InterpretError> {
    for stmt in scope {
        let call = match &stmt.kind {
            AstKind::Assignment { rhs, .. } => rhs,
            _ => stmt,
        };
        if let AstKind::Call { name, args } = &call.kind {
            if SOLVERS.contains(name) {
                if args.len() < 3 {
                    return Err(InterpretError::Unsupported(format!(
                        "solver call '{}' needs a handle, a time span and \
                         initial conditions",
                        name
                    )));
                }
                return Ok((&args[0], &args[2]));
            }
        }
    }
    Err(InterpretError::MissingSolverCall)
}

enum OdeBody<'s> {
    Statements(&'s [Ast<'s>]),
    Expression(&'s Ast<'s>),
}

struct OdeFunction<'s> {
    name: Option<&'s str>,
    indep: &'s str,
    dep: &'s str,
    output: Option<&'s str>,
    body: OdeBody<'s>,
}

impl<'s> OdeFunction<'s> {
    fn named(
        name: &'s str,
        functions: &IndexMap<&'s str, &'s FunctionDef<'s>>,
    ) -> Result<Self, InterpretError> {
        let def = functions
            .get(name)
            .ok_or_else(|| {
                InterpretError::SolverFunctionMismatch(SolverMismatch::UndefinedFunction(
                    name.to_owned(),
                ))
            })?;
        if def.params.len() < 2 {
            return Err(InterpretError::Unsupported(format!(
                "ODE function '{}' must take (t, x)",
                name
            )));
        }
        let output = def.outputs.first().copied().ok_or_else(|| {
            InterpretError::Unsupported(format!(
                "ODE function '{}' has no output variable",
                name
            ))
        })?;
        Ok(OdeFunction {
            name: Some(name),
            indep: def.params[0],
            dep: def.params[1],
            output: Some(output),
            body: OdeBody::Statements(&def.body),
        })
    }

    fn anon(params: &[&'s str], body: &'s Ast<'s>) -> Result<Self, InterpretError> {
        if params.len() < 2 {
            return Err(InterpretError::Unsupported(
                "anonymous ODE function must take (t, x)".to_owned(),
            ));
        }
        Ok(OdeFunction {
            name: None,
            indep: params[0],
            dep: params[1],
            output: None,
            body: OdeBody::Expression(body),
        })
    }

    fn display_name(&self) -> String {
        match self.name {
            Some(n) => n.to_owned(),
            None => format!("@({}, {}) ...", self.indep, self.dep),
        }
    }
}

struct Interpreter<'a, 's> {
    source: &'a str,
    table: SymbolTable<'s>,
    indep: &'s str,
    dep: &'s str,
    locals: IndexMap<&'s str, Expr>,
    parameters: IndexMap<String, Option<f64>>,
}

impl<'a, 's> Interpreter<'a, 's> {
    fn derivatives_of(
        &mut self,
        ode_fn: &OdeFunction<'s>,
    ) -> Result<Vec<Expr>, InterpretError> {
        match &ode_fn.body {
            OdeBody::Expression(expr) => self.rows_of(expr),
            OdeBody::Statements(stmts) => {
                let output = ode_fn.output.unwrap_or("");
                let mut slots: Vec<Option<Expr>> = Vec::new();
                self.exec_block(stmts, output, &mut slots)?;
                slots
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| {
                        s.ok_or_else(|| {
                            InterpretError::Unsupported(format!(
                                "derivative '{}({})' is never assigned",
                                output,
                                i + 1
                            ))
                        })
                    })
                    .collect()
            }
        }
    }

    fn exec_block(
        &mut self,
        stmts: &'s [Ast<'s>],
        output: &'s str,
        slots: &mut Vec<Option<Expr>>,
    ) -> Result<(), InterpretError> {
        for stmt in stmts {
            match &stmt.kind {
                AstKind::Assignment { lhs, rhs } => match &lhs.kind {
                    AstKind::Name(n) if *n == output => {
                        *slots = self
                            .rows_of(rhs)?
                            .into_iter()
                            .map(Some)
                            .collect();
                    }
                    AstKind::Name(n) => {
                        let expr = self.translate(rhs)?;
                        self.locals.insert(n, expr);
                    }
                    AstKind::Call { name, args } if *name == output => {
                        let idx = self.const_index(args, stmt)?;
                        if slots.len() < idx {
                            slots.resize(idx, None);
                        }
                        slots[idx - 1] = Some(self.translate(rhs)?);
                    }
                    _ => {
                        return Err(InterpretError::Unsupported(format!(
                            "cannot assign to '{}' inside the ODE function",
                            lhs
                        )))
                    }
                },
                AstKind::If(block) => {
                    let mut taken = false;
                    for branch in &block.branches {
                        if self.cond_value(&branch.condition)? {
                            self.exec_block(&branch.body, output, slots)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        if let Some(body) = &block.otherwise {
                            self.exec_block(body, output, slots)?;
                        }
                    }
                }
                AstKind::FunctionDef(_) => {}
                _ => {
                    return Err(InterpretError::Unsupported(format!(
                        "statement '{}' is not supported inside the ODE function",
                        stmt
                    )))
                }
            }
        }
        Ok(())
    }

    /// Expand the right-hand side of `dx = ...` into one expression per
    /// state. A matrix literal contributes its elements in order; `zeros`
    /// and `ones` preallocate; anything else is a one-state system.
    fn rows_of(&mut self, rhs: &'s Ast<'s>) -> Result<Vec<Expr>, InterpretError> {
        let rhs = match &rhs.kind {
            AstKind::Transpose { child } => &**child,
            _ => rhs,
        };
        match &rhs.kind {
            AstKind::Matrix { rows } => {
                let mut out = Vec::new();
                for row in rows {
                    for elem in row {
                        out.push(self.translate(elem)?);
                    }
                }
                Ok(out)
            }
            AstKind::Call { name, .. } if *name == "zeros" || *name == "ones" => {
                match self.table.eval(rhs)? {
                    Value::Vector(xs) => {
                        let fill = if *name == "zeros" { 0.0 } else { 1.0 };
                        Ok(vec![Expr::Number(fill); xs.len()])
                    }
                    _ => Err(InterpretError::Unsupported(format!(
                        "cannot determine the size of '{}'",
                        rhs
                    ))),
                }
            }
            _ => Ok(vec![self.translate(rhs)?]),
        }
    }

    fn initials_of(
        &mut self,
        xinit: &'s Ast<'s>,
    ) -> Result<Vec<Initial>, InterpretError> {
        match self.table.eval(xinit)? {
            Value::Number(v) => return Ok(vec![Initial::Number(v)]),
            Value::Vector(xs) => {
                return Ok(xs.into_iter().map(Initial::Number).collect())
            }
            _ => {}
        }
        // fall back to element-wise translation for symbolic entries
        let matrix = match &xinit.kind {
            AstKind::Matrix { .. } => Some(xinit),
            AstKind::Name(n) => self.table.def_ast(n).filter(|a| {
                matches!(a.kind, AstKind::Matrix { .. })
            }),
            _ => None,
        };
        let matrix = match matrix {
            Some(m) => m,
            None => {
                return Err(InterpretError::UnresolvedSymbol(xinit.to_string()))
            }
        };
        let mut out = Vec::new();
        if let AstKind::Matrix { rows } = &matrix.kind {
            for row in rows {
                for elem in row {
                    if let Ok(Value::Number(v)) = self.table.eval(elem) {
                        out.push(Initial::Number(v));
                    } else {
                        let expr = self.translate(elem)?;
                        if let Some(dep) = expr.depends_on_dynamics() {
                            return Err(InterpretError::Unsupported(format!(
                                "initial condition depends on '{}'",
                                dep
                            )));
                        }
                        out.push(Initial::Symbolic(expr));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Translate an AST in ODE-function scope into a model expression.
    /// Parameters stay named; their resolved values are recorded on the
    /// side. Local assignments are substituted in place.
    fn translate(&mut self, ast: &'s Ast<'s>) -> Result<Expr, InterpretError> {
        match &ast.kind {
            AstKind::Number(v) => Ok(Expr::Number(*v)),
            AstKind::Name(n) => {
                if let Some(expr) = self.locals.get(*n) {
                    return Ok(expr.clone());
                }
                if *n == self.indep {
                    return Ok(Expr::Time);
                }
                if *n == self.dep {
                    return Err(InterpretError::Unsupported(format!(
                        "the state vector '{}' can only be used element-wise",
                        n
                    )));
                }
                match self.table.resolve(n)? {
                    Value::Number(v) => {
                        self.parameters.entry((*n).to_owned()).or_insert(Some(v));
                        Ok(Expr::Var((*n).to_owned()))
                    }
                    Value::Vector(_) => Err(InterpretError::Unsupported(format!(
                        "vector '{}' can only be used element-wise here",
                        n
                    ))),
                    // assigned but never folding to a number: the name is
                    // kept as a symbolic constant with no value
                    Value::Opaque => {
                        self.parameters.entry((*n).to_owned()).or_insert(None);
                        Ok(Expr::Var((*n).to_owned()))
                    }
                    _ => Err(InterpretError::Unsupported(format!(
                        "'{}' is not a numeric value",
                        n
                    ))),
                }
            }
            AstKind::Call { name, args } => self.translate_call(ast, name, args),
            AstKind::Binop { op, left, right } => {
                let bop = BinaryOp::from_str(op).ok_or_else(|| {
                    InterpretError::Unsupported(format!(
                        "operator '{}' outside a condition",
                        op
                    ))
                })?;
                Ok(Expr::binary(
                    bop,
                    self.translate(left)?,
                    self.translate(right)?,
                ))
            }
            AstKind::Monop { op, child } => match op {
                '-' => Ok(Expr::neg(self.translate(child)?)),
                '+' => self.translate(child),
                _ => Err(InterpretError::Unsupported(format!(
                    "operator '{}' in a derivative",
                    op
                ))),
            },
            AstKind::Transpose { child } => self.translate(child),
            _ => Err(InterpretError::Unsupported(format!(
                "'{}' cannot appear in a derivative expression",
                ast
            ))),
        }
    }

    fn translate_call(
        &mut self,
        ast: &'s Ast<'s>,
        name: &'s str,
        args: &'s [Ast<'s>],
    ) -> Result<Expr, InterpretError> {
        if name == self.dep {
            let idx = self.const_index(args, ast)?;
            return Ok(Expr::State(idx));
        }
        if name == "piecewise" {
            return self.translate_piecewise(ast, args);
        }
        if self.table.is_defined(name) {
            // vector-parameter element like k(2), flattened to k_2; the
            // separator widens until the flat name clashes with nothing
            // the script defines
            if let Value::Vector(xs) = self.table.resolve(name)? {
                let idx = self.const_index(args, ast)?;
                if idx > xs.len() {
                    return Err(InterpretError::Unsupported(format!(
                        "index {} is out of bounds for '{}'",
                        idx, name
                    )));
                }
                let mut sep = "_".to_owned();
                let flat = loop {
                    let candidate = format!("{}{}{}", name, sep, idx);
                    if !self.table.is_defined(&candidate)
                        && !self.locals.contains_key(candidate.as_str())
                    {
                        break candidate;
                    }
                    sep.push('_');
                };
                self.parameters
                    .entry(flat.clone())
                    .or_insert(Some(xs[idx - 1]));
                return Ok(Expr::Var(flat));
            }
            return Err(InterpretError::Unsupported(format!(
                "'{}' cannot be called in a derivative",
                name
            )));
        }
        let args = args
            .iter()
            .map(|a| self.translate(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::Call {
            name: name.to_owned(),
            args,
        })
    }

    /// `piecewise(v1, c1, v2, c2, ..., default)`: the conditions are decided
    /// now, so exactly one branch survives into the model.
    fn translate_piecewise(
        &mut self,
        ast: &'s Ast<'s>,
        args: &'s [Ast<'s>],
    ) -> Result<Expr, InterpretError> {
        if args.len() < 3 || args.len() % 2 == 0 {
            return Err(InterpretError::Unsupported(format!(
                "piecewise needs value/condition pairs and a default: '{}'",
                ast
            )));
        }
        let mut i = 0;
        while i + 1 < args.len() {
            if self.cond_value(&args[i + 1])? {
                return self.translate(&args[i]);
            }
            i += 2;
        }
        self.translate(&args[args.len() - 1])
    }

    fn const_index(
        &mut self,
        args: &'s [Ast<'s>],
        context: &Ast,
    ) -> Result<usize, InterpretError> {
        if args.len() != 1 {
            return Err(InterpretError::Unsupported(format!(
                "expected a single subscript in '{}'",
                context
            )));
        }
        let expr = self.translate(&args[0])?;
        match self.eval_with_params(&expr) {
            Some(v) if v.fract() == 0.0 && v >= 1.0 => Ok(v as usize),
            _ => Err(InterpretError::Unsupported(format!(
                "subscript in '{}' is not a positive integer constant",
                context
            ))),
        }
    }

    /// Decide a condition at translation time. Conditions over states or
    /// time cannot be decided and are reported with their source line.
    fn cond_value(&mut self, cond: &'s Ast<'s>) -> Result<bool, InterpretError> {
        match &cond.kind {
            AstKind::Binop { op, left, right }
                if matches!(*op, "&&" | "&" | "||" | "|") =>
            {
                let l = self.cond_value(left)?;
                let r = self.cond_value(right)?;
                Ok(match *op {
                    "&&" | "&" => l && r,
                    _ => l || r,
                })
            }
            AstKind::Binop { op, left, right }
                if matches!(*op, "<" | ">" | "<=" | ">=" | "==" | "~=") =>
            {
                let l = self.cond_number(left)?;
                let r = self.cond_number(right)?;
                Ok(match *op {
                    "<" => l < r,
                    ">" => l > r,
                    "<=" => l <= r,
                    ">=" => l >= r,
                    "==" => l == r,
                    _ => l != r,
                })
            }
            AstKind::Monop { op: '~', child } => Ok(!self.cond_value(child)?),
            _ => Ok(self.cond_number(cond)? != 0.0),
        }
    }

    fn cond_number(&mut self, ast: &'s Ast<'s>) -> Result<f64, InterpretError> {
        if let Some(dep) = self.dynamic_dependency(ast) {
            return Err(InterpretError::UnsupportedConditional {
                dependency: dep,
                line: line_of(self.source, ast),
            });
        }
        let expr = self.translate(ast)?;
        if let Some(dep) = expr.depends_on_dynamics() {
            return Err(InterpretError::UnsupportedConditional {
                dependency: dep,
                line: line_of(self.source, ast),
            });
        }
        self.eval_with_params(&expr).ok_or_else(|| {
            InterpretError::UnresolvedSymbol(ast.to_string())
        })
    }

    /// Syntactic scan for a reference to the state vector or to time, so
    /// a bare `x` in a condition is reported as a conditional over the
    /// dynamics rather than as a misuse of the vector.
    fn dynamic_dependency(&self, ast: &'s Ast<'s>) -> Option<String> {
        match &ast.kind {
            AstKind::Name(n) if *n == self.dep || *n == self.indep => {
                if self.locals.contains_key(*n) {
                    return None;
                }
                Some((*n).to_owned())
            }
            AstKind::Call { name, args } => {
                if *name == self.dep {
                    return Some(ast.to_string());
                }
                args.iter().find_map(|a| self.dynamic_dependency(a))
            }
            AstKind::Binop { left, right, .. } => self
                .dynamic_dependency(left)
                .or_else(|| self.dynamic_dependency(right)),
            AstKind::Monop { child, .. } | AstKind::Transpose { child } => {
                self.dynamic_dependency(child)
            }
            _ => None,
        }
    }

    /// Like `Expr::eval_const`, but parameters take their recorded values.
    fn eval_with_params(&self, expr: &Expr) -> Option<f64> {
        match expr {
            Expr::Var(n) => self.parameters.get(n).copied().flatten(),
            Expr::Binary { op, left, right } => {
                let l = self.eval_with_params(left)?;
                let r = self.eval_with_params(right)?;
                Some(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Pow => l.powf(r),
                })
            }
            Expr::Unary { op: UnaryOp::Neg, child } => {
                Some(-self.eval_with_params(child)?)
            }
            Expr::Call { .. } | Expr::Number(_) => expr.eval_const(),
            Expr::State(_) | Expr::Time => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_string, preprocess};
    use approx::assert_relative_eq;

    fn run(src: &str) -> Result<OdeProgram, InterpretError> {
        let pre = preprocess(src);
        let stmts = parse_string(&pre).unwrap();
        interpret(&pre, &stmts)
    }

    const README_EXAMPLE: &str = "\
tspan  = [0 300];
xinit  = [0; 0];
a      = 0.01 * 60;
b      = 0.0058 * 60;
c      = 0.006 * 60;
d      = 0.000192 * 60;

[t, x] = ode45(@f, tspan, xinit);

function dx = f(t, x)
  dx = [a - b * x(1); c * x(1) - d * x(2)];
end
";

    #[test]
    fn readme_example_interprets() {
        let program = run(README_EXAMPLE).unwrap();
        assert_eq!(program.dependent_var, "x");
        assert_eq!(program.independent_var, "t");
        assert_eq!(program.derivatives.len(), 2);
        assert_eq!(program.initials.len(), 2);
        let names: Vec<&str> =
            program.parameters.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_relative_eq!(
            program.parameters["a"].unwrap(),
            0.6,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            program.parameters["d"].unwrap(),
            0.01152,
            max_relative = 1e-12
        );
        assert_eq!(
            program.derivatives[0].to_string(),
            "(a - (b * x(1)))"
        );
    }

    #[test]
    fn missing_solver_call() {
        let err = run("a = 1;\nb = a * 2;\n").unwrap_err();
        assert!(matches!(err, InterpretError::MissingSolverCall));
    }

    #[test]
    fn missing_ode_function() {
        let err = run("[t, x] = ode45(@nosuch, [0 1], [0]);\n").unwrap_err();
        assert!(matches!(
            err,
            InterpretError::SolverFunctionMismatch(
                SolverMismatch::UndefinedFunction(n)
            ) if n == "nosuch"
        ));
    }

    #[test]
    fn length_mismatch_is_reported() {
        let src = "\
[t, x] = ode45(@f, [0 1], [0; 0; 0]);
function dx = f(t, x)
  dx = [x(2); -x(1)];
end
";
        match run(src).unwrap_err() {
            InterpretError::SolverFunctionMismatch(SolverMismatch::Dimension {
                name,
                returned,
                expected,
            }) => {
                assert_eq!(name, "f");
                assert_eq!(returned, 2);
                assert_eq!(expected, 3);
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn anonymous_ode_function() {
        let src = "\
a = 2;
[t, y] = ode45(@(t, y) [-a * y(1)], [0 1], [1]);
";
        let program = run(src).unwrap();
        assert_eq!(program.dependent_var, "y");
        assert_eq!(program.derivatives.len(), 1);
        assert_eq!(program.derivatives[0].to_string(), "((-a) * y(1))");
    }

    #[test]
    fn handle_stored_in_a_variable() {
        let src = "\
g = @f;
[t, x] = ode45(g, [0 1], [1]);
function dx = f(t, x)
  dx = -x(1);
end
";
        assert!(run(src).is_ok());
    }

    #[test]
    fn locals_are_substituted() {
        let src = "\
k = 3;
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  r = k * x(1);
  dx = -r;
end
";
        let program = run(src).unwrap();
        assert_eq!(program.derivatives[0].to_string(), "(-(k * x(1)))");
        assert_relative_eq!(program.parameters["k"].unwrap(), 3.0);
    }

    #[test]
    fn indexed_output_assignments() {
        let src = "\
[t, x] = ode45(@f, [0 1], [1; 2]);
function dx = f(t, x)
  dx = zeros(2, 1);
  dx(1) = x(2);
  dx(2) = -x(1);
end
";
        let program = run(src).unwrap();
        assert_eq!(program.derivatives[0].to_string(), "x(2)");
        assert_eq!(program.derivatives[1].to_string(), "(-x(1))");
    }

    #[test]
    fn constant_conditionals_are_resolved() {
        let src = "\
mode = 2;
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  if mode == 1
    dx = -x(1);
  else
    dx = -2 * x(1);
  end
end
";
        let program = run(src).unwrap();
        assert_eq!(program.derivatives[0].to_string(), "(-(2 * x(1)))");
    }

    #[test]
    fn state_dependent_conditional_is_rejected() {
        let src = "\
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  if x(1) > 5
    dx = 0;
  else
    dx = 1;
  end
end
";
        match run(src).unwrap_err() {
            InterpretError::UnsupportedConditional { dependency, line } => {
                assert_eq!(dependency, "x(1)");
                assert_eq!(line, 3);
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn state_dependent_piecewise_is_rejected() {
        let src = "\
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = piecewise(1, x(1) > 5, 0);
end
";
        assert!(matches!(
            run(src).unwrap_err(),
            InterpretError::UnsupportedConditional { .. }
        ));
    }

    #[test]
    fn bare_state_vector_in_condition_is_rejected() {
        let src = "\
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = piecewise(1, x > 5, 0);
end
";
        match run(src).unwrap_err() {
            InterpretError::UnsupportedConditional { dependency, .. } => {
                assert_eq!(dependency, "x");
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn constant_piecewise_selects_a_branch() {
        let src = "\
thr = 1;
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = piecewise(-x(1), thr > 0, x(1));
end
";
        let program = run(src).unwrap();
        assert_eq!(program.derivatives[0].to_string(), "(-x(1))");
    }

    #[test]
    fn vector_parameters_record_flattened_values() {
        let src = "\
k = [0.5 1.5];
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = k(2) * x(1) - k(1) * x(1);
end
";
        let program = run(src).unwrap();
        assert_relative_eq!(program.parameters["k_2"].unwrap(), 1.5);
        assert_relative_eq!(program.parameters["k_1"].unwrap(), 0.5);
    }

    #[test]
    fn vector_element_avoids_a_scalar_name_clash() {
        let src = "\
k = [0.5 1.5];
k_2 = 7;
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = k(2) * x(1) - k_2 * x(1);
end
";
        let program = run(src).unwrap();
        assert_relative_eq!(program.parameters["k__2"].unwrap(), 1.5);
        assert_relative_eq!(program.parameters["k_2"].unwrap(), 7.0);
        assert_eq!(
            program.derivatives[0].to_string(),
            "((k__2 * x(1)) - (k_2 * x(1)))"
        );
    }

    #[test]
    fn non_numeric_constant_stays_symbolic() {
        let src = "\
c = loadvalue('c');
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = -c * x(1);
end
";
        let program = run(src).unwrap();
        assert_eq!(program.parameters["c"], None);
        assert_eq!(program.derivatives[0].to_string(), "((-c) * x(1))");
    }

    #[test]
    fn whole_file_function_scope() {
        let src = "\
function main()
  xinit = [1; 0];
  w = 2;
  [t, x] = ode45(@f, [0 10], xinit);
end
function dx = f(t, x)
  dx = [x(2); -w * x(1)];
end
";
        let program = run(src).unwrap();
        assert_eq!(program.derivatives.len(), 2);
        assert_relative_eq!(program.parameters["w"].unwrap(), 2.0);
    }

    #[test]
    fn unresolved_symbol_in_derivative() {
        let src = "\
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = -q * x(1);
end
";
        assert!(matches!(
            run(src).unwrap_err(),
            InterpretError::UnresolvedSymbol(n) if n == "q"
        ));
    }
}
