//! Convert MATLAB/Octave ODE scripts into SBML.
//!
//! The supported input is a script (or single-function file) that defines
//! numeric constants, a vector of initial conditions, an ODE function of the
//! form `function dx = f(t, x)`, and a call to one of the `ode*` solvers.
//! The pipeline parses the script, resolves every workspace symbol, expands
//! the derivatives into signed terms, and tries to reconstruct a reaction
//! network from them; systems that do not decompose into reactions come out
//! as SBML rate rules instead.
//!
//! ```
//! let script = "
//! a = 0.5;
//! [t, x] = ode45(@f, [0 10], [1]);
//! function dx = f(t, x)
//!   dx = -a * x(1);
//! end
//! ";
//! let sbml = matlab2sbml::convert_string(script, &Default::default()).unwrap();
//! assert!(sbml.contains("<species id=\"x_1\""));
//! ```

pub mod ast;
pub mod error;
pub mod inference;
pub mod interpret;
pub mod model;
pub mod parser;
pub mod sbml;

pub use error::ConvertError;
pub use sbml::EmitOptions;

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub emit: EmitOptions,
    /// skip reaction inference and always emit rate rules
    pub force_rate_rules: bool,
}

/// Run the whole pipeline on a script and return the SBML document.
pub fn convert_string(source: &str, options: &Options) -> Result<String, ConvertError> {
    let pre = parser::preprocess(source);
    let statements = parser::parse_string(&pre)?;
    let program = interpret::interpret(&pre, &statements)?;
    let model = model::OdeModel::build(program)?;

    let reactions = if options.force_rate_rules || !options.emit.use_species {
        None
    } else {
        match inference::infer_reactions(&model) {
            Ok(rs) => Some(rs),
            Err(e) => {
                log::warn!("cannot infer a reaction network ({}), emitting rate rules", e);
                None
            }
        }
    };

    Ok(sbml::write_sbml(&model, reactions.as_deref(), &options.emit))
}

/// Render a conversion error against the source it came from, with line and
/// column information where the stage that produced it tracked any.
pub fn render_error(err: &ConvertError, source: &str) -> String {
    match err {
        ConvertError::Parse(e) => e.as_error_message(&parser::preprocess(source)),
        other => other.to_string(),
    }
}
