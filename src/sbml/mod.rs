//! SBML Level 3 Version 1 output. The document is small and regular enough
//! to write directly; everything model-shaped stays in [`crate::model`] and
//! only serialisation lives here.

use std::fmt::Write;

use crate::inference::InferredReaction;
use crate::model::{BinaryOp, Expr, Initial, OdeModel, OdeVariable, UnaryOp};

const SBML_NS: &str = "http://www.sbml.org/sbml/level3/version1/core";
const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
const TIME_URL: &str = "http://www.sbml.org/sbml/symbols/time";
const COMPARTMENT: &str = "comp1";

#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// represent state variables as SBML species inside a compartment;
    /// otherwise they become non-constant parameters governed by rate rules
    pub use_species: bool,
    pub model_id: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            use_species: true,
            model_id: "model".to_owned(),
        }
    }
}

/// Serialise the model. With `reactions` present (and species enabled) the
/// kinetics go out as a reaction network; otherwise every variable gets a
/// rate rule carrying its full derivative.
pub fn write_sbml(
    model: &OdeModel,
    reactions: Option<&[InferredReaction]>,
    opts: &EmitOptions,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<sbml xmlns=\"{}\" level=\"3\" version=\"1\">",
        SBML_NS
    );
    let _ = writeln!(out, "  <model id=\"{}\">", opts.model_id);

    if opts.use_species {
        let _ = writeln!(out, "    <listOfCompartments>");
        let _ = writeln!(
            out,
            "      <compartment id=\"{}\" spatialDimensions=\"3\" \
             size=\"1\" constant=\"true\"/>",
            COMPARTMENT
        );
        let _ = writeln!(out, "    </listOfCompartments>");

        let _ = writeln!(out, "    <listOfSpecies>");
        for var in &model.variables {
            let initial = match &var.initial {
                Initial::Number(v) => format!(" initialConcentration=\"{}\"", v),
                Initial::Symbolic(_) => String::new(),
            };
            let _ = writeln!(
                out,
                "      <species id=\"{}\" compartment=\"{}\"{} \
                 hasOnlySubstanceUnits=\"false\" boundaryCondition=\"false\" \
                 constant=\"false\"/>",
                var.id, COMPARTMENT, initial
            );
        }
        let _ = writeln!(out, "    </listOfSpecies>");
    }

    let _ = writeln!(out, "    <listOfParameters>");
    if !opts.use_species {
        for var in &model.variables {
            let value = match &var.initial {
                Initial::Number(v) => format!(" value=\"{}\"", v),
                Initial::Symbolic(_) => String::new(),
            };
            let _ = writeln!(
                out,
                "      <parameter id=\"{}\"{} constant=\"false\"/>",
                var.id, value
            );
        }
    }
    for p in &model.parameters {
        // a symbolic parameter has no value attribute at all
        match p.value {
            Some(v) => {
                let _ = writeln!(
                    out,
                    "      <parameter id=\"{}\" value=\"{}\" constant=\"true\"/>",
                    p.id, v
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "      <parameter id=\"{}\" constant=\"true\"/>",
                    p.id
                );
            }
        }
    }
    let _ = writeln!(out, "    </listOfParameters>");

    let symbolic: Vec<&OdeVariable> = model
        .variables
        .iter()
        .filter(|v| matches!(v.initial, Initial::Symbolic(_)))
        .collect();
    if !symbolic.is_empty() {
        let _ = writeln!(out, "    <listOfInitialAssignments>");
        for var in symbolic {
            if let Initial::Symbolic(expr) = &var.initial {
                let _ = writeln!(
                    out,
                    "      <initialAssignment symbol=\"{}\">",
                    var.id
                );
                write_math(&mut out, expr, &model.variables, 8);
                let _ = writeln!(out, "      </initialAssignment>");
            }
        }
        let _ = writeln!(out, "    </listOfInitialAssignments>");
    }

    match reactions {
        Some(reactions) if opts.use_species => {
            write_reactions(&mut out, model, reactions);
        }
        _ => write_rate_rules(&mut out, model),
    }

    let _ = writeln!(out, "  </model>");
    out.push_str("</sbml>\n");
    out
}

fn write_reactions(out: &mut String, model: &OdeModel, reactions: &[InferredReaction]) {
    let _ = writeln!(out, "    <listOfReactions>");
    for r in reactions {
        let _ = writeln!(
            out,
            "      <reaction id=\"{}\" reversible=\"false\">",
            r.id
        );
        if !r.reactants.is_empty() {
            let _ = writeln!(out, "        <listOfReactants>");
            for (id, stoich) in &r.reactants {
                let _ = writeln!(
                    out,
                    "          <speciesReference species=\"{}\" \
                     stoichiometry=\"{}\" constant=\"true\"/>",
                    id, stoich
                );
            }
            let _ = writeln!(out, "        </listOfReactants>");
        }
        if !r.products.is_empty() {
            let _ = writeln!(out, "        <listOfProducts>");
            for (id, stoich) in &r.products {
                let _ = writeln!(
                    out,
                    "          <speciesReference species=\"{}\" \
                     stoichiometry=\"{}\" constant=\"true\"/>",
                    id, stoich
                );
            }
            let _ = writeln!(out, "        </listOfProducts>");
        }
        if !r.modifiers.is_empty() {
            let _ = writeln!(out, "        <listOfModifiers>");
            for id in &r.modifiers {
                let _ = writeln!(
                    out,
                    "          <modifierSpeciesReference species=\"{}\"/>",
                    id
                );
            }
            let _ = writeln!(out, "        </listOfModifiers>");
        }
        let _ = writeln!(out, "        <kineticLaw>");
        write_math(out, &r.rate, &model.variables, 10);
        let _ = writeln!(out, "        </kineticLaw>");
        let _ = writeln!(out, "      </reaction>");
    }
    let _ = writeln!(out, "    </listOfReactions>");
}

fn write_rate_rules(out: &mut String, model: &OdeModel) {
    let _ = writeln!(out, "    <listOfRules>");
    for (i, var) in model.variables.iter().enumerate() {
        let _ = writeln!(out, "      <rateRule variable=\"{}\">", var.id);
        write_math(out, &model.derivative_expr(i), &model.variables, 8);
        let _ = writeln!(out, "      </rateRule>");
    }
    let _ = writeln!(out, "    </listOfRules>");
}

fn write_math(out: &mut String, expr: &Expr, vars: &[OdeVariable], indent: usize) {
    let pad = " ".repeat(indent);
    let _ = writeln!(out, "{}<math xmlns=\"{}\">", pad, MATHML_NS);
    write_node(out, expr, vars, indent + 2);
    let _ = writeln!(out, "{}</math>", pad);
}

fn write_node(out: &mut String, expr: &Expr, vars: &[OdeVariable], indent: usize) {
    let pad = " ".repeat(indent);
    match expr {
        Expr::Number(v) => {
            let _ = writeln!(out, "{}<cn> {} </cn>", pad, v);
        }
        Expr::Var(n) => {
            let _ = writeln!(out, "{}<ci> {} </ci>", pad, n);
        }
        Expr::State(i) => {
            let _ = writeln!(out, "{}<ci> {} </ci>", pad, vars[i - 1].id);
        }
        Expr::Time => {
            let _ = writeln!(
                out,
                "{}<csymbol encoding=\"text\" definitionURL=\"{}\"> t </csymbol>",
                pad, TIME_URL
            );
        }
        Expr::Binary { op, left, right } => {
            let tag = match op {
                BinaryOp::Add => "plus",
                BinaryOp::Sub => "minus",
                BinaryOp::Mul => "times",
                BinaryOp::Div => "divide",
                BinaryOp::Pow => "power",
            };
            let _ = writeln!(out, "{}<apply>", pad);
            let _ = writeln!(out, "{}  <{}/>", pad, tag);
            write_node(out, left, vars, indent + 2);
            write_node(out, right, vars, indent + 2);
            let _ = writeln!(out, "{}</apply>", pad);
        }
        Expr::Unary { op: UnaryOp::Neg, child } => {
            let _ = writeln!(out, "{}<apply>", pad);
            let _ = writeln!(out, "{}  <minus/>", pad);
            write_node(out, child, vars, indent + 2);
            let _ = writeln!(out, "{}</apply>", pad);
        }
        Expr::Call { name, args } => {
            let tag = match name.as_str() {
                "exp" => "exp",
                "log" => "ln",
                "log10" => "log",
                "log2" => "log",
                "sqrt" => "root",
                "abs" => "abs",
                "sin" => "sin",
                "cos" => "cos",
                "tan" => "tan",
                "asin" => "arcsin",
                "acos" => "arccos",
                "atan" => "arctan",
                "sinh" => "sinh",
                "cosh" => "cosh",
                "tanh" => "tanh",
                "floor" => "floor",
                "ceil" => "ceiling",
                "power" => "power",
                "min" => "min",
                "max" => "max",
                other => other,
            };
            let _ = writeln!(out, "{}<apply>", pad);
            let _ = writeln!(out, "{}  <{}/>", pad, tag);
            if name == "log2" {
                let _ = writeln!(out, "{}  <logbase> <cn> 2 </cn> </logbase>", pad);
            }
            if name == "sqrt" {
                let _ = writeln!(out, "{}  <degree> <cn> 2 </cn> </degree>", pad);
            }
            for a in args {
                write_node(out, a, vars, indent + 2);
            }
            let _ = writeln!(out, "{}</apply>", pad);
        }
    }
}
