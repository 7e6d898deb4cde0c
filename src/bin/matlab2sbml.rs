use std::fs;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use matlab2sbml::{convert_string, render_error, EmitOptions, Options};

/// converts a MATLAB/Octave ODE script to an SBML model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input filename
    input: String,

    /// Output filename (defaults to the input with an .xml extension)
    #[arg(short, long)]
    out: Option<String>,

    /// Represent state variables as parameters with rate rules instead of
    /// species in a compartment
    #[arg(short, long)]
    params: bool,

    /// Always emit rate rules, even when a reaction network can be inferred
    #[arg(long)]
    rate_rules: bool,

    /// Print the parsed statements and exit
    #[arg(short = 'x', long)]
    print_parse: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Args::parse();

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("cannot read '{}'", cli.input))?;

    if cli.print_parse {
        let pre = matlab2sbml::parser::preprocess(&source);
        let statements = matlab2sbml::parser::parse_string(&pre)
            .map_err(|e| anyhow!(e.as_error_message(&pre)))?;
        for stmt in &statements {
            println!("{}", stmt);
        }
        return Ok(());
    }

    let model_id = stem_of(&cli.input);
    let options = Options {
        emit: EmitOptions {
            use_species: !cli.params,
            model_id,
        },
        force_rate_rules: cli.rate_rules,
    };

    let sbml = convert_string(&source, &options)
        .map_err(|e| anyhow!(render_error(&e, &source)))?;

    let out = cli.out.unwrap_or_else(|| {
        let stem = cli.input.trim_end_matches(".m");
        format!("{}.xml", stem)
    });
    fs::write(&out, sbml).with_context(|| format!("cannot write '{}'", out))?;
    Ok(())
}

fn stem_of(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_owned())
}
