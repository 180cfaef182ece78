use indicatif::ProgressBar;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use tracing::{info, warn};

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient as ArgminConjugateGradient,
};

use crate::{
    assembler::build_global_system,
    boundary::apply_boundary_conditions,
    config::{ModelConfig, SolverSettings},
    datatypes::{BoundaryRule, Mesh},
    error::LodestoneError,
    region::apply_regions,
};

/// Solves `stiffness * x = load` for `x`.
pub trait LinearSolver {
    fn solve(
        &self,
        stiffness: &DMatrix<f64>,
        load: &DVector<f64>,
    ) -> Result<DVector<f64>, LodestoneError>;
}

/// Direct solve through an LU factorization with partial pivoting.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenseLu;

/// Iterative solve with argmin's conjugate gradient over a sparse operator.
#[derive(Debug, Clone, Copy)]
pub struct ConjugateGradient {
    /// Target residual norm, relative to the norm of the load vector.
    pub tolerance: f64,
    pub max_iterations: u64,
}

fn check_dimensions(stiffness: &DMatrix<f64>, load: &DVector<f64>) -> Result<(), LodestoneError> {
    if !stiffness.is_square() || stiffness.nrows() != load.len() {
        return Err(LodestoneError::Solve(format!(
            "Cannot solve a {}x{} system against a vector of length {}",
            stiffness.nrows(),
            stiffness.ncols(),
            load.len()
        )));
    }
    Ok(())
}

fn check_finite(solution: DVector<f64>) -> Result<DVector<f64>, LodestoneError> {
    if solution.iter().all(|v| v.is_finite()) {
        Ok(solution)
    } else {
        Err(LodestoneError::Solve(
            "Solution contains non-finite values; the system is singular or ill-conditioned"
                .to_owned(),
        ))
    }
}

impl LinearSolver for DenseLu {
    fn solve(
        &self,
        stiffness: &DMatrix<f64>,
        load: &DVector<f64>,
    ) -> Result<DVector<f64>, LodestoneError> {
        check_dimensions(stiffness, load)?;

        let solution = stiffness
            .clone()
            .lu()
            .solve(load)
            .ok_or_else(|| LodestoneError::Solve("Stiffness matrix is singular".to_owned()))?;

        check_finite(solution)
    }
}

/// Runs multiplication for Conjugate Gradient Solver
struct ConjugateGradientOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        let product = self.a * &DVector::from_column_slice(x);
        Ok(product.iter().copied().collect())
    }
}

/// Observer bar for argmin solver
struct ConjugateGradientObserverBar {
    bar: ProgressBar,
    initial_mag: Option<f64>,
    final_mag: f64,
}

impl ConjugateGradientObserverBar {
    fn new(target_cost: f64) -> ConjugateGradientObserverBar {
        ConjugateGradientObserverBar {
            bar: ProgressBar::new(1000),
            initial_mag: None,
            final_mag: target_cost.log10(),
        }
    }
}

impl<I> Observe<I> for ConjugateGradientObserverBar
where
    I: State<Float = f64>,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        let cost_mag = state.get_cost().log10();
        if !cost_mag.is_finite() {
            return Ok(());
        }

        let initial_mag = *self.initial_mag.get_or_insert(cost_mag);
        let span = initial_mag - self.final_mag;
        if span > 0.0 {
            let progress = ((initial_mag - cost_mag) / span).clamp(0.0, 1.0);
            self.bar.set_position((progress * 1000.0) as u64);
        }

        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> Result<(), Error> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

/// Moves the columns of fixed-value rows to the right-hand side
///
/// A row that is exactly one-hot on its diagonal states `x[k] = b[k]`, so
/// `a[(i, k)] * b[k]` can be subtracted from every other equation and the
/// column cleared without changing the solution. This restores the symmetry
/// that row-wise boundary enforcement breaks.
///
/// # Arguments
/// * `a` - A square matrix
/// * `b` - The right-hand side
///
/// # Returns
/// The reduced matrix and right-hand side, in that order
pub fn eliminate_fixed_columns(a: &DMatrix<f64>, b: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let mut a = a.clone();
    let mut b = b.clone();

    let fixed: Vec<usize> = (0..a.nrows())
        .filter(|&k| {
            a[(k, k)] == 1.0
                && a.row(k)
                    .iter()
                    .enumerate()
                    .all(|(col, &v)| col == k || v == 0.0)
        })
        .collect();

    for &k in &fixed {
        let value = b[k];
        for i in 0..a.nrows() {
            if i == k {
                continue;
            }
            b[i] -= a[(i, k)] * value;
            a[(i, k)] = 0.0;
        }
    }

    (a, b)
}

impl LinearSolver for ConjugateGradient {
    fn solve(
        &self,
        stiffness: &DMatrix<f64>,
        load: &DVector<f64>,
    ) -> Result<DVector<f64>, LodestoneError> {
        check_dimensions(stiffness, load)?;

        let (a, b) = eliminate_fixed_columns(stiffness, load);
        let load_norm = b.norm();
        if load_norm == 0.0 {
            return Ok(DVector::zeros(b.len()));
        }

        let a = CsrMatrix::from(&a);
        let target_cost = self.tolerance * load_norm;

        let b_flat: Vec<f64> = b.iter().copied().collect();
        let solver: ArgminConjugateGradient<_, f64> = ArgminConjugateGradient::new(b_flat);
        let initial_guess: Vec<f64> = vec![0.0; b.len()];

        let operator = ConjugateGradientOperator { a: &a };
        let observer = ConjugateGradientObserverBar::new(target_cost);

        // Run solver
        let res = Executor::new(operator, solver)
            .configure(|state| {
                state
                    .param(initial_guess)
                    .max_iters(self.max_iterations)
                    .target_cost(target_cost)
            })
            .add_observer(observer, ObserverMode::NewBest)
            .run()
            .map_err(|err| LodestoneError::Solve(format!("Conjugate Gradient error: {err}")))?;

        // The iteration limit is checked before the target cost, so a run
        // that converges on its last allowed iteration still ends at the limit.
        let best_cost = res.state().get_best_cost();
        if !(best_cost <= target_cost) {
            return Err(LodestoneError::Solve(format!(
                "Conjugate Gradient stopped after {} iterations at residual {best_cost:e}",
                res.state().get_iter()
            )));
        }

        let best_param = match &res.state().best_param {
            Some(vec) => DVector::from_vec(vec.clone()),
            None => {
                return Err(LodestoneError::Solve(
                    "Conjugate Gradient could not produce best parameter".to_owned(),
                ))
            }
        };

        check_finite(best_param)
    }
}

/// Builds the linear solver named by the settings.
pub fn solver_for(settings: &SolverSettings) -> Box<dyn LinearSolver> {
    match *settings {
        SolverSettings::Lu => Box::new(DenseLu),
        SolverSettings::ConjugateGradient {
            tolerance,
            max_iterations,
        } => Box::new(ConjugateGradient {
            tolerance,
            max_iterations,
        }),
    }
}

/// Runs the solver and returns one potential per node
///
/// Applies the region configuration to the mesh, assembles the global
/// system, fixes the configured boundary values followed by the values
/// embedded in the mesh file, and hands the result to `solver`.
///
/// # Arguments
/// * `mesh` - The mesh; its element coefficients are overwritten
/// * `config` - Region, boundary and strictness settings
/// * `embedded` - Boundary rules read from the mesh file
/// * `solver` - The linear solver
pub fn run(
    mesh: &mut Mesh,
    config: &ModelConfig,
    embedded: &[BoundaryRule],
    solver: &dyn LinearSolver,
) -> Result<Vec<f64>, LodestoneError> {
    apply_regions(mesh, &config.regions, config.strict)?;

    let mut system = build_global_system(mesh)?;

    let rules: Vec<BoundaryRule> = config.boundary.iter().chain(embedded).copied().collect();
    let fixed = apply_boundary_conditions(&mut system, mesh, &rules, config.strict)?;
    if fixed.is_empty() {
        warn!("no boundary values were fixed; the system is likely singular");
    }
    info!("fixed {} of {} nodes", fixed.len(), mesh.node_count());

    let start = std::time::Instant::now();

    info!("solving...");
    let solution = solver.solve(&system.stiffness, &system.load)?;

    let elapsed = (std::time::Instant::now() - start).as_secs_f32();
    info!("solved system in {:.3} seconds", elapsed);

    Ok(solution.iter().copied().collect())
}
