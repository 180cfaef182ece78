use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, Level};

use lodestone::{
    config::{self, SolverSettings, DEFAULT_CG_MAX_ITER, DEFAULT_CG_TOLERANCE},
    mesher, post_processor, solver, LodestoneError,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SolverChoice {
    Lu,
    Cg,
}

/// Solves the Poisson equation over a triangulated 2-D domain.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON file with materials, sources and boundary conditions
    input_json: PathBuf,

    /// Mesh file, Gmsh `.msh` (format 2) or GilgaMesh `.malha`
    mesh: PathBuf,

    #[arg(long, default_value = "nodes.csv")]
    nodes_output: PathBuf,

    #[arg(long, default_value = "elements.csv")]
    elements_output: PathBuf,

    /// Overrides the solver named in the input file
    #[arg(long, value_enum)]
    solver: Option<SolverChoice>,

    /// Fail when a configured tag matches nothing in the mesh
    #[arg(long)]
    strict: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn execute(cli: &Cli) -> Result<(), LodestoneError> {
    let mut model_config = config::load_input_file(&cli.input_json)?;
    if cli.strict {
        model_config.strict = true;
    }
    match cli.solver {
        Some(SolverChoice::Lu) => model_config.solver = SolverSettings::Lu,
        Some(SolverChoice::Cg) => {
            if !matches!(model_config.solver, SolverSettings::ConjugateGradient { .. }) {
                model_config.solver = SolverSettings::ConjugateGradient {
                    tolerance: DEFAULT_CG_TOLERANCE,
                    max_iterations: DEFAULT_CG_MAX_ITER,
                };
            }
        }
        None => {}
    }

    let mesher::ParsedMesh { mut mesh, boundary } = mesher::load_mesh(&cli.mesh)?;

    let linear_solver = solver::solver_for(&model_config.solver);
    let potentials = solver::run(&mut mesh, &model_config, &boundary, linear_solver.as_ref())?;

    post_processor::csv_output(&mesh, &potentials, &cli.nodes_output, &cli.elements_output)
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = execute(&cli) {
        error!("{err}");
        std::process::exit(1)
    }
}
