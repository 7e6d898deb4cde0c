use itertools::Itertools;

use super::expr::{BinaryOp, Expr, UnaryOp};

/// One signed monomial-like summand of a derivative expression:
/// `coeff * prod(params^e) * prod(species^e) * prod(others)`.
///
/// `params` and `species` are kept sorted so that two terms with the same
/// kinetics compare equal regardless of the order factors appeared in the
/// source. Factors that are not powers of a parameter or a state (function
/// calls, time, whole fractions with a composite denominator) are carried
/// verbatim in `others`.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub coeff: f64,
    pub params: Vec<(String, i32)>,
    pub species: Vec<(usize, i32)>,
    pub others: Vec<Expr>,
}

impl Term {
    fn constant(coeff: f64) -> Term {
        Term {
            coeff,
            params: Vec::new(),
            species: Vec::new(),
            others: Vec::new(),
        }
    }

    fn param(name: &str) -> Term {
        Term {
            coeff: 1.0,
            params: vec![(name.to_owned(), 1)],
            species: Vec::new(),
            others: Vec::new(),
        }
    }

    fn state(index: usize) -> Term {
        Term {
            coeff: 1.0,
            params: Vec::new(),
            species: vec![(index, 1)],
            others: Vec::new(),
        }
    }

    fn opaque(expr: Expr) -> Term {
        Term {
            coeff: 1.0,
            params: Vec::new(),
            species: Vec::new(),
            others: vec![expr],
        }
    }

    fn mul(&self, rhs: &Term) -> Term {
        let mut out = Term {
            coeff: self.coeff * rhs.coeff,
            params: self.params.clone(),
            species: self.species.clone(),
            others: self.others.clone(),
        };
        for (name, e) in &rhs.params {
            merge_factor(&mut out.params, name.clone(), *e);
        }
        for (idx, e) in &rhs.species {
            merge_factor(&mut out.species, *idx, *e);
        }
        out.others.extend(rhs.others.iter().cloned());
        out.normalise();
        out
    }

    fn invert(&self) -> Term {
        Term {
            coeff: 1.0 / self.coeff,
            params: self.params.iter().map(|(n, e)| (n.clone(), -e)).collect(),
            species: self.species.iter().map(|(i, e)| (*i, -e)).collect(),
            others: self.others.clone(),
        }
    }

    fn pow(&self, exponent: i32) -> Term {
        Term {
            coeff: self.coeff.powi(exponent),
            params: self
                .params
                .iter()
                .map(|(n, e)| (n.clone(), e * exponent))
                .collect(),
            species: self
                .species
                .iter()
                .map(|(i, e)| (*i, e * exponent))
                .collect(),
            others: self.others.clone(),
        }
    }

    fn normalise(&mut self) {
        self.params.retain(|(_, e)| *e != 0);
        self.species.retain(|(_, e)| *e != 0);
        self.params.sort();
        self.species.sort();
        self.others
            .sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    }

    /// Structural identity of the term ignoring its numeric coefficient.
    /// Terms with equal bodies belong to the same reaction.
    pub fn body_key(&self) -> String {
        self.body_expr().to_string()
    }

    /// The term without its coefficient, as an expression. A term with no
    /// factors at all yields `1`.
    pub fn body_expr(&self) -> Expr {
        let mut factors: Vec<Expr> = Vec::new();
        for (name, e) in &self.params {
            factors.push(power_of(Expr::Var(name.clone()), *e));
        }
        for (idx, e) in &self.species {
            factors.push(power_of(Expr::State(*idx), *e));
        }
        factors.extend(self.others.iter().cloned());
        match factors.len() {
            0 => Expr::Number(1.0),
            _ => factors
                .into_iter()
                .reduce(|a, b| Expr::binary(BinaryOp::Mul, a, b))
                .unwrap(),
        }
    }

    /// The full term back as an expression, coefficient included.
    pub fn to_expr(&self) -> Expr {
        let body = self.body_expr();
        if self.coeff == 1.0 {
            body
        } else if self.coeff == -1.0 {
            Expr::neg(body)
        } else if body == Expr::Number(1.0) {
            Expr::Number(self.coeff)
        } else {
            Expr::binary(BinaryOp::Mul, Expr::Number(self.coeff), body)
        }
    }
}

fn merge_factor<K: PartialEq>(factors: &mut Vec<(K, i32)>, key: K, exp: i32) {
    if let Some(slot) = factors.iter_mut().find(|(k, _)| *k == key) {
        slot.1 += exp;
    } else {
        factors.push((key, exp));
    }
}

fn power_of(base: Expr, exp: i32) -> Expr {
    match exp {
        1 => base,
        -1 => Expr::binary(BinaryOp::Div, Expr::Number(1.0), base),
        e if e < 0 => Expr::binary(
            BinaryOp::Div,
            Expr::Number(1.0),
            Expr::binary(BinaryOp::Pow, base, Expr::Number(-e as f64)),
        ),
        e => Expr::binary(BinaryOp::Pow, base, Expr::Number(e as f64)),
    }
}

/// Expand an expression into a flat signed sum of terms, distributing
/// products over sums and folding numeric subexpressions. Like terms are
/// merged and zero terms dropped. Fails only on a power whose exponent is
/// not a numeric constant, which cannot be distributed; the offending
/// subexpression is returned for the error message.
pub fn expand(expr: &Expr) -> Result<Vec<Term>, String> {
    let terms = expand_inner(expr)?;
    Ok(merge_like_terms(terms))
}

fn expand_inner(expr: &Expr) -> Result<Vec<Term>, String> {
    if let Some(v) = expr.eval_const() {
        return Ok(vec![Term::constant(v)]);
    }
    match expr {
        Expr::Number(v) => Ok(vec![Term::constant(*v)]),
        Expr::Var(name) => Ok(vec![Term::param(name)]),
        Expr::State(i) => Ok(vec![Term::state(*i)]),
        Expr::Time => Ok(vec![Term::opaque(Expr::Time)]),
        Expr::Unary { op: UnaryOp::Neg, child } => {
            let mut terms = expand_inner(child)?;
            for t in &mut terms {
                t.coeff = -t.coeff;
            }
            Ok(terms)
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::Add => {
                let mut terms = expand_inner(left)?;
                terms.extend(expand_inner(right)?);
                Ok(terms)
            }
            BinaryOp::Sub => {
                let mut terms = expand_inner(left)?;
                let mut rhs = expand_inner(right)?;
                for t in &mut rhs {
                    t.coeff = -t.coeff;
                }
                terms.extend(rhs);
                Ok(terms)
            }
            BinaryOp::Mul => {
                let lhs = expand_inner(left)?;
                let rhs = expand_inner(right)?;
                Ok(lhs
                    .iter()
                    .cartesian_product(rhs.iter())
                    .map(|(a, b)| a.mul(b))
                    .collect())
            }
            BinaryOp::Div => {
                let lhs = expand_inner(left)?;
                let rhs = expand_inner(right)?;
                if rhs.len() == 1 && rhs[0].others.is_empty() {
                    let inv = rhs[0].invert();
                    Ok(lhs.iter().map(|t| t.mul(&inv)).collect())
                } else {
                    // composite denominator, keep the whole fraction opaque
                    Ok(vec![Term::opaque(expr.clone())])
                }
            }
            BinaryOp::Pow => {
                let exponent = right
                    .eval_const()
                    .ok_or_else(|| expr.to_string())?;
                if exponent.fract() != 0.0 {
                    return Ok(vec![Term::opaque(expr.clone())]);
                }
                let base = expand_inner(left)?;
                if base.len() == 1 && base[0].others.is_empty() {
                    Ok(vec![base[0].pow(exponent as i32)])
                } else {
                    Ok(vec![Term::opaque(expr.clone())])
                }
            }
        },
        Expr::Call { .. } => Ok(vec![Term::opaque(expr.clone())]),
    }
}

fn merge_like_terms(terms: Vec<Term>) -> Vec<Term> {
    let mut merged: Vec<Term> = Vec::new();
    for mut term in terms {
        term.normalise();
        if let Some(existing) = merged.iter_mut().find(|t| {
            t.params == term.params
                && t.species == term.species
                && t.others == term.others
        }) {
            existing.coeff += term.coeff;
        } else {
            merged.push(term);
        }
    }
    merged.retain(|t| t.coeff != 0.0);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn var(n: &str) -> Expr {
        Expr::Var(n.to_owned())
    }

    #[test]
    fn simple_sum_of_products() {
        // a - b*x(1)
        let e = Expr::binary(
            BinaryOp::Sub,
            var("a"),
            Expr::binary(BinaryOp::Mul, var("b"), Expr::State(1)),
        );
        let terms = expand(&e).unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].params, vec![("a".to_owned(), 1)]);
        assert_relative_eq!(terms[0].coeff, 1.0);
        assert_eq!(terms[1].params, vec![("b".to_owned(), 1)]);
        assert_eq!(terms[1].species, vec![(1, 1)]);
        assert_relative_eq!(terms[1].coeff, -1.0);
    }

    #[test]
    fn distributes_over_sums() {
        // k*(x(1) + x(2)) -> k*x(1) + k*x(2)
        let e = Expr::binary(
            BinaryOp::Mul,
            var("k"),
            Expr::binary(BinaryOp::Add, Expr::State(1), Expr::State(2)),
        );
        let terms = expand(&e).unwrap();
        assert_eq!(terms.len(), 2);
        for t in &terms {
            assert_eq!(t.params, vec![("k".to_owned(), 1)]);
        }
    }

    #[test]
    fn merges_like_terms() {
        // 2*x(1) + 3*x(1)
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Mul, Expr::Number(2.0), Expr::State(1)),
            Expr::binary(BinaryOp::Mul, Expr::Number(3.0), Expr::State(1)),
        );
        let terms = expand(&e).unwrap();
        assert_eq!(terms.len(), 1);
        assert_relative_eq!(terms[0].coeff, 5.0);
    }

    #[test]
    fn cancelling_terms_vanish() {
        let e = Expr::binary(BinaryOp::Sub, Expr::State(1), Expr::State(1));
        assert!(expand(&e).unwrap().is_empty());
    }

    #[test]
    fn integer_power_raises_exponents() {
        // x(1)^2 * k
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Pow, Expr::State(1), Expr::Number(2.0)),
            var("k"),
        );
        let terms = expand(&e).unwrap();
        assert_eq!(terms[0].species, vec![(1, 2)]);
    }

    #[test]
    fn composite_denominator_stays_opaque() {
        // v*x(1)/(km + x(1))
        let num = Expr::binary(BinaryOp::Mul, var("v"), Expr::State(1));
        let den = Expr::binary(BinaryOp::Add, var("km"), Expr::State(1));
        let e = Expr::binary(BinaryOp::Div, num, den);
        let terms = expand(&e).unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].others.len(), 1);
        assert!(terms[0].params.is_empty());
    }

    #[test]
    fn symbolic_exponent_is_an_error() {
        let e = Expr::binary(BinaryOp::Pow, Expr::State(1), var("n"));
        assert!(expand(&e).is_err());
    }

    #[test]
    fn body_key_ignores_coefficient() {
        let a = expand(&Expr::binary(
            BinaryOp::Mul,
            Expr::Number(2.0),
            Expr::binary(BinaryOp::Mul, var("k"), Expr::State(1)),
        ))
        .unwrap();
        let b = expand(&Expr::binary(
            BinaryOp::Mul,
            Expr::Number(-7.0),
            Expr::binary(BinaryOp::Mul, Expr::State(1), var("k")),
        ))
        .unwrap();
        assert_eq!(a[0].body_key(), b[0].body_key());
    }

    fn eval(expr: &Expr, k: f64, x: &[f64]) -> f64 {
        match expr {
            Expr::Number(v) => *v,
            Expr::Var(_) => k,
            Expr::State(i) => x[i - 1],
            Expr::Binary { op, left, right } => {
                let l = eval(left, k, x);
                let r = eval(right, k, x);
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Pow => l.powf(r),
                }
            }
            Expr::Unary { op: UnaryOp::Neg, child } => -eval(child, k, x),
            e => panic!("unexpected node {:?}", e),
        }
    }

    #[test]
    fn expansion_preserves_value() {
        // k*(x(1) + x(2)) - x(1)^2 / 2
        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::binary(
                BinaryOp::Mul,
                var("k"),
                Expr::binary(BinaryOp::Add, Expr::State(1), Expr::State(2)),
            ),
            Expr::binary(
                BinaryOp::Div,
                Expr::binary(BinaryOp::Pow, Expr::State(1), Expr::Number(2.0)),
                Expr::Number(2.0),
            ),
        );
        let terms = expand(&e).unwrap();
        for (k, x) in [(0.7, [1.3, 0.4]), (2.0, [0.0, 5.0]), (-1.1, [2.5, 2.5])] {
            let sum: f64 = terms.iter().map(|t| eval(&t.to_expr(), k, &x)).sum();
            assert_relative_eq!(sum, eval(&e, k, &x), max_relative = 1e-12);
        }
    }

    #[test]
    fn roundtrip_through_expr() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::Number(2.5),
            Expr::binary(BinaryOp::Mul, var("k"), Expr::State(2)),
        );
        let terms = expand(&e).unwrap();
        let back = terms[0].to_expr();
        // same value under any assignment: spot-check the structure instead
        assert_eq!(back.to_string(), "(2.5 * (k * x(2)))");
    }
}
