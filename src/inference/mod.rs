//! Turn the expanded derivative terms back into a reaction network. Terms
//! with the same kinetic body appearing with opposite signs across several
//! variables are the consumption and production sides of a single reaction;
//! single-signed terms become plain synthesis or degradation steps.

use indexmap::IndexMap;

use crate::error::InferenceError;
use crate::model::{Expr, OdeModel, Term};

#[derive(Debug, Clone)]
pub struct InferredReaction {
    pub id: String,
    /// (species id, stoichiometry)
    pub reactants: Vec<(String, u32)>,
    pub products: Vec<(String, u32)>,
    /// species that appear in the rate law but on neither side
    pub modifiers: Vec<String>,
    pub rate: Expr,
}

pub fn infer_reactions(
    model: &OdeModel,
) -> Result<Vec<InferredReaction>, InferenceError> {
    // group terms by kinetic body, keeping first-occurrence order
    let mut groups: IndexMap<String, Vec<(usize, &Term)>> = IndexMap::new();
    for (var, terms) in model.derivatives.iter().enumerate() {
        for term in terms {
            groups.entry(term.body_key()).or_default().push((var, term));
        }
    }

    let mut reactions = Vec::new();
    for (_, entries) in groups {
        let has_pos = entries.iter().any(|(_, t)| t.coeff > 0.0);
        let has_neg = entries.iter().any(|(_, t)| t.coeff < 0.0);
        if has_pos && has_neg {
            reactions.push(balanced_reaction(model, &entries)?);
        } else {
            for (var, term) in entries {
                reactions.push(one_sided_reaction(model, var, term));
            }
        }
    }
    for (i, r) in reactions.iter_mut().enumerate() {
        r.id = format!("r{}", i + 1);
    }
    Ok(reactions)
}

/// A group with both signs is one reaction: consumers on the left,
/// producers on the right, stoichiometries given by how many times the
/// smallest coefficient divides each entry.
fn balanced_reaction(
    model: &OdeModel,
    entries: &[(usize, &Term)],
) -> Result<InferredReaction, InferenceError> {
    let min_abs = entries
        .iter()
        .map(|(_, t)| t.coeff.abs())
        .fold(f64::INFINITY, f64::min);

    let mut reactants = Vec::new();
    let mut products = Vec::new();
    for (var, term) in entries {
        let ratio = term.coeff.abs() / min_abs;
        if (ratio - ratio.round()).abs() > 1e-9 {
            return Err(InferenceError::AmbiguousGrouping {
                body: term.body_key(),
            });
        }
        let id = model.variables[*var].id.clone();
        let stoich = ratio.round() as u32;
        if term.coeff < 0.0 {
            reactants.push((id, stoich));
        } else {
            products.push((id, stoich));
        }
    }

    let sample = entries[0].1;
    let mut rate_term = sample.clone();
    rate_term.coeff = min_abs;
    let modifiers = rate_modifiers(model, sample, &reactants, &products);

    Ok(InferredReaction {
        id: String::new(),
        reactants,
        products,
        modifiers,
        rate: rate_term.to_expr(),
    })
}

/// A term that only ever adds to (or only removes from) one variable is a
/// synthesis or degradation reaction for that variable alone.
fn one_sided_reaction(
    model: &OdeModel,
    var: usize,
    term: &Term,
) -> InferredReaction {
    let id = model.variables[var].id.clone();
    let (reactants, products) = if term.coeff < 0.0 {
        (vec![(id, 1)], Vec::new())
    } else {
        (Vec::new(), vec![(id, 1)])
    };
    let mut rate_term = term.clone();
    rate_term.coeff = term.coeff.abs();
    let modifiers = rate_modifiers(model, term, &reactants, &products);
    InferredReaction {
        id: String::new(),
        reactants,
        products,
        modifiers,
        rate: rate_term.to_expr(),
    }
}

fn rate_modifiers(
    model: &OdeModel,
    term: &Term,
    reactants: &[(String, u32)],
    products: &[(String, u32)],
) -> Vec<String> {
    let mut ids = Vec::new();
    let mut indices: Vec<usize> = term.species.iter().map(|(i, _)| *i).collect();
    for other in &term.others {
        collect_states(other, &mut indices);
    }
    indices.sort_unstable();
    indices.dedup();
    for idx in indices {
        let id = &model.variables[idx - 1].id;
        let on_either_side = reactants.iter().chain(products.iter()).any(|(s, _)| s == id);
        if !on_either_side {
            ids.push(id.clone());
        }
    }
    ids
}

fn collect_states(expr: &Expr, out: &mut Vec<usize>) {
    match expr {
        Expr::State(i) => out.push(*i),
        Expr::Binary { left, right, .. } => {
            collect_states(left, out);
            collect_states(right, out);
        }
        Expr::Unary { child, .. } => collect_states(child, out),
        Expr::Call { args, .. } => {
            for a in args {
                collect_states(a, out);
            }
        }
        _ => {}
    }
}
