use linear_conjugate::{CgConfig, CgSolver};
use nalgebra::{dmatrix, dvector};
use tracing::info;
use tracing_subscriber::EnvFilter;

// The 2x2 system from https://en.wikipedia.org/wiki/Conjugate_gradient_method
pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_target(false)
        .init();

    let a = dmatrix![4.0, 1.0; 1.0, 3.0];
    let b = dvector![1.0, 2.0];
    let x0 = dvector![2.0, 1.0];

    let mut solver = CgSolver::with_config(a, b, x0, CgConfig::traced())
        .expect("the example system is well formed");
    let outcome = solver.run(2).expect("the example system is positive-definite");

    for (epoch, x) in solver.history().x().iter() {
        info!("x{} = {:?}", epoch, x.as_slice());
    }
    for (epoch, beta) in solver.history().beta().iter() {
        info!("beta{} = {:.6}", epoch, beta);
    }

    info!(
        "solution = {:?} after {} iterations ({:?}, |r| = {:.3e})",
        outcome.solution.as_slice(),
        outcome.iterations,
        outcome.termination,
        outcome.residual_norm
    );
}
