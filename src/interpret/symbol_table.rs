use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ast::{Ast, AstKind};
use crate::error::InterpretError;

/// A script-level value. `Opaque` stands for anything we cannot and do not
/// need to evaluate (solver outputs, `odeset` option structs, plot handles);
/// it propagates through arithmetic and only becomes an error if the model
/// actually depends on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'s> {
    Number(f64),
    Vector(Vec<f64>),
    Handle(&'s str),
    Anon {
        params: Vec<&'s str>,
        body: &'s Ast<'s>,
    },
    Str(&'s str),
    Opaque,
}

enum Slot<'s> {
    Expr(&'s Ast<'s>),
    Opaque,
}

/// Lazily-evaluated workspace of script assignments. The last assignment to
/// a name wins, as it would when running the script top to bottom.
pub struct SymbolTable<'s> {
    defs: IndexMap<&'s str, Slot<'s>>,
    cache: HashMap<&'s str, Option<Value<'s>>>,
}

impl<'s> SymbolTable<'s> {
    pub fn new() -> Self {
        SymbolTable {
            defs: IndexMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Record the assignments of one scope's statements. Multi-output
    /// destinations like `[t, x] = ode45(...)` bind each name to an opaque
    /// value since we never simulate the solver.
    pub fn collect(&mut self, statements: &'s [Ast<'s>]) {
        for stmt in statements {
            if let AstKind::Assignment { lhs, rhs } = &stmt.kind {
                match &lhs.kind {
                    AstKind::Name(name) => {
                        self.defs.insert(name, Slot::Expr(rhs));
                        self.cache.remove(name);
                    }
                    AstKind::MultiLhs { names } => {
                        for name in names.iter().flatten() {
                            self.defs.insert(name, Slot::Opaque);
                            self.cache.remove(name);
                        }
                    }
                    // indexed assignment outside the ODE body is rare
                    // enough to ignore at script level
                    _ => {}
                }
            }
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defs.contains_key(name) || name == "pi"
    }

    /// The AST a name was last assigned from, if it was a plain assignment.
    pub fn def_ast(&self, name: &str) -> Option<&'s Ast<'s>> {
        match self.defs.get(name) {
            Some(Slot::Expr(ast)) => Some(ast),
            _ => None,
        }
    }

    /// Resolve a name to a value, following chains of assignments. Cyclic
    /// definitions and unknown names report as unresolved.
    pub fn resolve(&mut self, name: &'s str) -> Result<Value<'s>, InterpretError> {
        if name == "pi" {
            return Ok(Value::Number(std::f64::consts::PI));
        }
        if let Some(cached) = self.cache.get(name) {
            return match cached {
                Some(v) => Ok(v.clone()),
                // in-progress marker, we are inside our own definition
                None => Err(InterpretError::UnresolvedSymbol(name.to_owned())),
            };
        }
        let ast = match self.defs.get(name) {
            None => return Err(InterpretError::UnresolvedSymbol(name.to_owned())),
            Some(Slot::Opaque) => return Ok(Value::Opaque),
            Some(Slot::Expr(ast)) => *ast,
        };
        self.cache.insert(name, None);
        let value = self.eval(ast)?;
        self.cache.insert(name, Some(value.clone()));
        Ok(value)
    }

    /// Evaluate an expression in script scope.
    pub fn eval(&mut self, ast: &'s Ast<'s>) -> Result<Value<'s>, InterpretError> {
        match &ast.kind {
            AstKind::Number(v) => Ok(Value::Number(*v)),
            AstKind::Str(s) => Ok(Value::Str(s)),
            AstKind::Name(n) => self.resolve(n),
            AstKind::Handle(n) => Ok(Value::Handle(n)),
            AstKind::AnonFunction { params, body } => Ok(Value::Anon {
                params: params.clone(),
                body,
            }),
            AstKind::Transpose { child } => self.eval(child),
            AstKind::Monop { op, child } => {
                let v = self.eval(child)?;
                match (op, v) {
                    ('-', Value::Number(x)) => Ok(Value::Number(-x)),
                    ('-', Value::Vector(xs)) => {
                        Ok(Value::Vector(xs.iter().map(|x| -x).collect()))
                    }
                    ('+', v) => Ok(v),
                    (_, Value::Opaque) => Ok(Value::Opaque),
                    _ => Ok(Value::Opaque),
                }
            }
            AstKind::Binop { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                eval_binop(op, l, r)
            }
            AstKind::Range { args } => {
                let nums: Result<Vec<f64>, _> = args
                    .iter()
                    .map(|a| match self.eval(a)? {
                        Value::Number(v) => Ok(v),
                        _ => Err(InterpretError::Unsupported(format!(
                            "non-numeric range bound in '{}'",
                            ast
                        ))),
                    })
                    .collect();
                let nums = nums?;
                let (start, step, stop) = match nums.as_slice() {
                    [a, b] => (*a, 1.0, *b),
                    [a, s, b] => (*a, *s, *b),
                    _ => return Ok(Value::Opaque),
                };
                if step == 0.0 {
                    return Ok(Value::Opaque);
                }
                let count = ((stop - start) / step).floor();
                if !count.is_finite() || count < 0.0 || count > 1e6 {
                    return Ok(Value::Opaque);
                }
                Ok(Value::Vector(
                    (0..=count as usize)
                        .map(|i| start + step * i as f64)
                        .collect(),
                ))
            }
            AstKind::Matrix { rows } => {
                let mut out = Vec::new();
                for row in rows {
                    for elem in row {
                        match self.eval(elem)? {
                            Value::Number(v) => out.push(v),
                            Value::Vector(vs) => out.extend(vs),
                            _ => return Ok(Value::Opaque),
                        }
                    }
                }
                Ok(Value::Vector(out))
            }
            AstKind::Call { name, args } => self.eval_call(name, args),
            _ => Ok(Value::Opaque),
        }
    }

    fn eval_call(
        &mut self,
        name: &'s str,
        args: &'s [Ast<'s>],
    ) -> Result<Value<'s>, InterpretError> {
        // indexing into a script vector: k(2)
        if self.defs.contains_key(name) {
            let base = self.resolve(name)?;
            if let Value::Vector(xs) = base {
                if args.len() == 1 {
                    if let Value::Number(idx) = self.eval(&args[0])? {
                        let i = idx as usize;
                        if idx.fract() == 0.0 && i >= 1 && i <= xs.len() {
                            return Ok(Value::Number(xs[i - 1]));
                        }
                    }
                }
                return Ok(Value::Opaque);
            }
            return Ok(Value::Opaque);
        }
        let mut nums = Vec::with_capacity(args.len());
        for a in args {
            match self.eval(a)? {
                Value::Number(v) => nums.push(v),
                _ => return Ok(Value::Opaque),
            }
        }
        Ok(builtin_call(name, &nums))
    }
}

fn eval_binop<'s>(
    op: &str,
    l: Value<'s>,
    r: Value<'s>,
) -> Result<Value<'s>, InterpretError> {
    use Value::*;
    let apply = |a: f64, b: f64| -> Option<f64> {
        Some(match op {
            "+" => a + b,
            "-" => a - b,
            "*" | ".*" => a * b,
            "/" | "./" => a / b,
            "^" | ".^" => a.powf(b),
            "<" => (a < b) as u8 as f64,
            ">" => (a > b) as u8 as f64,
            "<=" => (a <= b) as u8 as f64,
            ">=" => (a >= b) as u8 as f64,
            "==" => (a == b) as u8 as f64,
            "~=" => (a != b) as u8 as f64,
            "&&" | "&" => ((a != 0.0) && (b != 0.0)) as u8 as f64,
            "||" | "|" => ((a != 0.0) || (b != 0.0)) as u8 as f64,
            _ => return None,
        })
    };
    match (l, r) {
        (Number(a), Number(b)) => {
            Ok(apply(a, b).map(Number).unwrap_or(Opaque))
        }
        (Vector(xs), Number(b)) => {
            let out: Option<Vec<f64>> = xs.iter().map(|a| apply(*a, b)).collect();
            Ok(out.map(Vector).unwrap_or(Opaque))
        }
        (Number(a), Vector(ys)) => {
            let out: Option<Vec<f64>> = ys.iter().map(|b| apply(a, *b)).collect();
            Ok(out.map(Vector).unwrap_or(Opaque))
        }
        (Vector(xs), Vector(ys)) if xs.len() == ys.len() => {
            let out: Option<Vec<f64>> = xs
                .iter()
                .zip(ys.iter())
                .map(|(a, b)| apply(*a, *b))
                .collect();
            Ok(out.map(Vector).unwrap_or(Opaque))
        }
        _ => Ok(Opaque),
    }
}

fn builtin_call<'s>(name: &str, args: &[f64]) -> Value<'s> {
    match (name, args) {
        ("zeros", [n]) => Value::Vector(vec![0.0; *n as usize]),
        ("zeros", [n, m]) => Value::Vector(vec![0.0; (*n * *m) as usize]),
        ("ones", [n]) => Value::Vector(vec![1.0; *n as usize]),
        ("ones", [n, m]) => Value::Vector(vec![1.0; (*n * *m) as usize]),
        ("linspace", [a, b, n]) if *n >= 2.0 => {
            let n = *n as usize;
            let step = (b - a) / (n - 1) as f64;
            Value::Vector((0..n).map(|i| a + step * i as f64).collect())
        }
        ("exp", [v]) => Value::Number(v.exp()),
        ("log", [v]) => Value::Number(v.ln()),
        ("log10", [v]) => Value::Number(v.log10()),
        ("log2", [v]) => Value::Number(v.log2()),
        ("sqrt", [v]) => Value::Number(v.sqrt()),
        ("abs", [v]) => Value::Number(v.abs()),
        ("sin", [v]) => Value::Number(v.sin()),
        ("cos", [v]) => Value::Number(v.cos()),
        ("tan", [v]) => Value::Number(v.tan()),
        ("floor", [v]) => Value::Number(v.floor()),
        ("ceil", [v]) => Value::Number(v.ceil()),
        ("power", [a, b]) => Value::Number(a.powf(*b)),
        ("min", [a, b]) => Value::Number(a.min(*b)),
        ("max", [a, b]) => Value::Number(a.max(*b)),
        ("length", [..]) => Value::Opaque,
        _ => Value::Opaque,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_string, preprocess};
    use approx::assert_relative_eq;

    fn eval_src(src: &str, name: &str) -> Value<'static> {
        // leak the source so values borrowing from it live long enough
        let pre: &'static str = Box::leak(preprocess(src).into_boxed_str());
        let stmts: &'static Vec<Ast<'static>> =
            Box::leak(Box::new(parse_string(pre).unwrap()));
        let mut table = SymbolTable::new();
        table.collect(stmts);
        let name: &'static str = Box::leak(name.to_owned().into_boxed_str());
        table.resolve(name).unwrap()
    }

    #[test]
    fn resolves_arithmetic_chains() {
        match eval_src("a = 0.01 * 60;\nb = a / 2;\n", "b") {
            Value::Number(v) => assert_relative_eq!(v, 0.3),
            v => panic!("expected number, got {:?}", v),
        }
    }

    #[test]
    fn last_assignment_wins() {
        match eval_src("a = 1;\na = 2;\n", "a") {
            Value::Number(v) => assert_relative_eq!(v, 2.0),
            v => panic!("expected number, got {:?}", v),
        }
    }

    #[test]
    fn matrix_literals_become_vectors() {
        match eval_src("v = [0 300];\n", "v") {
            Value::Vector(xs) => assert_eq!(xs, vec![0.0, 300.0]),
            v => panic!("expected vector, got {:?}", v),
        }
        match eval_src("v = [1; 2; 3];\n", "v") {
            Value::Vector(xs) => assert_eq!(xs, vec![1.0, 2.0, 3.0]),
            v => panic!("expected vector, got {:?}", v),
        }
    }

    #[test]
    fn ranges_enumerate() {
        match eval_src("v = 0:2:6;\n", "v") {
            Value::Vector(xs) => assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0]),
            v => panic!("expected vector, got {:?}", v),
        }
    }

    #[test]
    fn zeros_builds_a_vector() {
        match eval_src("v = zeros(2, 1);\n", "v") {
            Value::Vector(xs) => assert_eq!(xs, vec![0.0, 0.0]),
            v => panic!("expected vector, got {:?}", v),
        }
    }

    #[test]
    fn vector_indexing() {
        match eval_src("k = [1.5 2.5];\nx = k(2);\n", "x") {
            Value::Number(v) => assert_relative_eq!(v, 2.5),
            v => panic!("expected number, got {:?}", v),
        }
    }

    #[test]
    fn solver_outputs_are_opaque() {
        let v = eval_src("[t, x] = ode45(@f, tspan, xinit);\ntspan = [0 1];\nxinit = [0];\n", "t");
        assert_eq!(v, Value::Opaque);
    }

    #[test]
    fn unknown_name_is_unresolved() {
        let pre = preprocess("a = b + 1;\n");
        let stmts = parse_string(&pre).unwrap();
        let mut table = SymbolTable::new();
        table.collect(&stmts);
        assert!(matches!(
            table.resolve("a"),
            Err(InterpretError::UnresolvedSymbol(n)) if n == "b"
        ));
    }

    #[test]
    fn cyclic_definition_is_unresolved() {
        let pre = preprocess("a = b;\nb = a;\n");
        let stmts = parse_string(&pre).unwrap();
        let mut table = SymbolTable::new();
        table.collect(&stmts);
        assert!(table.resolve("a").is_err());
    }
}
