/*!
Rust implementation of the linear [Conjugate Gradient](https://en.wikipedia.org/wiki/Conjugate_gradient_method)
method for dense symmetric positive-definite systems `Ax = b`.

The solver keeps every iterate, residual, search direction, step size and Fletcher–Reeves
coefficient it computes (see [`CgConfig::traced`]), so the behavior of the method can be
inspected iteration by iteration.

```
use linear_conjugate::{CgSolver, CgConfig};
use nalgebra::{dmatrix, dvector};

let a = dmatrix![4.0, 1.0; 1.0, 3.0];
let b = dvector![1.0, 2.0];
let mut solver = CgSolver::with_config(a, b, dvector![2.0, 1.0], CgConfig::traced()).unwrap();
let outcome = solver.run(2).unwrap();

assert!((outcome.solution[0] - 1.0 / 11.0).abs() < 1.0e-10);
assert!((outcome.solution[1] - 7.0 / 11.0).abs() < 1.0e-10);
assert_eq!(solver.history().x().len(), 3);
```
*/

#![warn(missing_docs)]

/// Floating-point type used by this library.
pub type Real = f64;

extern crate nalgebra as na;

pub use self::config::{CgConfig, InitialGuess};
pub use self::conjugate_gradient::{CgOutcome, CgSolver, Step, Termination};
pub use self::error::CgError;
pub use self::history::{History, Track};

mod config;
mod conjugate_gradient;
mod error;
mod history;
