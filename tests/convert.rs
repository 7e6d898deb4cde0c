use matlab2sbml::error::{BuildError, ConvertError, InterpretError, SolverMismatch};
use matlab2sbml::{convert_string, EmitOptions, Options};

const TWO_STATE: &str = "\
% exponential production and decay of two coupled variables
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
fn two_state_system_becomes_reactions() {
    let xml = convert_string(TWO_STATE, &Options::default()).unwrap();

    assert!(xml.contains("<species id=\"x_1\""));
    assert!(xml.contains("<species id=\"x_2\""));
    assert!(xml.contains("initialConcentration=\"0\""));

    for p in ["a", "b", "c", "d"] {
        assert!(
            xml.contains(&format!("<parameter id=\"{}\" value=", p)),
            "missing parameter {}",
            p
        );
    }
    assert!(xml.contains("<parameter id=\"a\" value=\"0.6\""));

    // four one-sided reactions, no rate rules
    assert!(xml.contains("<reaction id=\"r4\""));
    assert!(!xml.contains("<reaction id=\"r5\""));
    assert!(!xml.contains("<rateRule"));

    // c*x(1) produces x_2 with x_1 as a modifier
    assert!(xml.contains("<modifierSpeciesReference species=\"x_1\"/>"));
}

#[test]
fn dimension_mismatch_yields_no_document() {
    let src = "\
[t, x] = ode45(@f, [0 1], [0; 0; 0]);
function dx = f(t, x)
  dx = [x(2); -x(1)];
end
";
    let err = convert_string(src, &Options::default()).unwrap_err();
    match err {
        ConvertError::Interpret(InterpretError::SolverFunctionMismatch(
            SolverMismatch::Dimension {
                name,
                returned,
                expected,
            },
        )) => {
            assert_eq!(name, "f");
            assert_eq!(returned, 2);
            assert_eq!(expected, 3);
        }
        e => panic!("unexpected error {:?}", e),
    }
}

#[test]
fn unknown_ode_function_is_reported() {
    let src = "[t, x] = ode45(@nosuch, [0 1], [0]);\n";
    let err = convert_string(src, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Interpret(InterpretError::SolverFunctionMismatch(
            SolverMismatch::UndefinedFunction(n)
        )) if n == "nosuch"
    ));
}

#[test]
fn state_dependent_piecewise_is_an_error() {
    let src = "\
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = piecewise(1, x > 5, 0);
end
";
    let err = convert_string(src, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Interpret(InterpretError::UnsupportedConditional { .. })
    ));
}

#[test]
fn out_of_range_state_subscript_is_an_error() {
    let src = "\
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = -x(3);
end
";
    let err = convert_string(src, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Build(BuildError::StateOutOfRange { reference, states: 1 })
            if reference == "x(3)"
    ));
}

#[test]
fn whitespace_signed_initial_conditions_split_into_elements() {
    let src = "\
[t, x] = ode45(@f, [0 1], [1 -2]);
function dx = f(t, x)
  dx = [x(2); -x(1)];
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("<species id=\"x_2\""));
    assert!(xml.contains("initialConcentration=\"1\""));
    assert!(xml.contains("initialConcentration=\"-2\""));
}

#[test]
fn non_numeric_constants_become_valueless_parameters() {
    let src = "\
c = loadvalue('c');
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = -c * x(1);
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("<parameter id=\"c\" constant=\"true\"/>"));
    assert!(!xml.contains("<parameter id=\"c\" value="));
}

#[test]
fn bimolecular_reaction_from_opposite_signs() {
    let src = "\
k = 0.1;
[t, x] = ode45(@f, [0 1], [1; 1; 0]);
function dx = f(t, x)
  dx = [-k * x(1) * x(2); -k * x(1) * x(2); k * x(1) * x(2)];
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("<reaction id=\"r1\""));
    assert!(!xml.contains("<reaction id=\"r2\""));
    assert!(xml.contains("<speciesReference species=\"x_1\" stoichiometry=\"1\""));
    assert!(xml.contains("<speciesReference species=\"x_2\" stoichiometry=\"1\""));
    assert!(xml.contains("<speciesReference species=\"x_3\" stoichiometry=\"1\""));
}

#[test]
fn ambiguous_grouping_falls_back_to_rate_rules() {
    let src = "\
k = 1;
[t, x] = ode45(@f, [0 1], [1; 0]);
function dx = f(t, x)
  dx = [-1.5 * k * x(1); k * x(1)];
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(!xml.contains("<reaction"));
    assert!(xml.contains("<rateRule variable=\"x_1\">"));
    assert!(xml.contains("<rateRule variable=\"x_2\">"));
}

#[test]
fn forced_rate_rules() {
    let options = Options {
        force_rate_rules: true,
        ..Options::default()
    };
    let xml = convert_string(TWO_STATE, &options).unwrap();
    assert!(!xml.contains("<reaction"));
    assert!(xml.contains("<rateRule variable=\"x_1\">"));
}

#[test]
fn parameter_representation() {
    let options = Options {
        emit: EmitOptions {
            use_species: false,
            model_id: "model".to_owned(),
        },
        force_rate_rules: false,
    };
    let xml = convert_string(TWO_STATE, &options).unwrap();
    assert!(!xml.contains("<listOfSpecies>"));
    assert!(xml.contains("<parameter id=\"x_1\" value=\"0\" constant=\"false\"/>"));
    assert!(xml.contains("<rateRule variable=\"x_2\">"));
}

#[test]
fn vector_parameters_are_flattened_in_the_output() {
    let src = "\
k = [0.5 1.5];
[t, x] = ode45(@f, [0 1], [1]);
function dx = f(t, x)
  dx = k(1) * x(1) - k(2) * x(1);
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("<parameter id=\"k_1\" value=\"0.5\""));
    assert!(xml.contains("<parameter id=\"k_2\" value=\"1.5\""));
    assert!(xml.contains("<ci> k_1 </ci>") || xml.contains("<ci> k_2 </ci>"));
}

#[test]
fn numeric_initial_expressions_fold() {
    let src = "\
a = 2;
[t, x] = ode45(@f, [0 1], [a * 3; 1]);
function dx = f(t, x)
  dx = [-x(1); x(1)];
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("initialConcentration=\"6\""));
    assert!(!xml.contains("<initialAssignment"));
}

#[test]
fn symbolic_initial_condition_gets_an_assignment() {
    let src = "\
a = 2;
[t, x] = ode45(@f, [0 1], [piecewise(a, 1 > 0, 0); 1]);
function dx = f(t, x)
  dx = [-x(1); x(1)];
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("<initialAssignment symbol=\"x_1\">"));
    assert!(xml.contains("<ci> a </ci>"));
}

#[test]
fn comments_and_continuations_are_transparent() {
    let src = "\
a = 0.5; % decay rate
[t, x] = ode45(@f, ...
               [0 1], [1]);
function dx = f(t, x)
  dx = -a * x(1);
end
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("<parameter id=\"a\" value=\"0.5\""));
}

#[test]
fn anonymous_handle_in_the_solver_call() {
    let src = "\
a = 1;
[t, y] = ode45(@(t, y) [-a * y(1)], [0 1], [1]);
";
    let xml = convert_string(src, &Options::default()).unwrap();
    assert!(xml.contains("<species id=\"y_1\""));
    assert!(xml.contains("<reaction id=\"r1\""));
}

#[test]
fn missing_solver_call_is_reported() {
    let err = convert_string("a = 1;\n", &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Interpret(InterpretError::MissingSolverCall)
    ));
}
