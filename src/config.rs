use crate::error::CgError;
use crate::Real;
use na::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Options of the conjugate gradient solver.
///
/// The default configuration reproduces the plain textbook loop: it runs exactly the
/// requested number of iterations and only keeps the trailing values needed by the
/// recurrence.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CgConfig {
    /// Stop as soon as a freshly computed residual has an L2 norm `<=` this value.
    ///
    /// `None` disables the check: the solver then runs for exactly the requested number of
    /// iterations (unless it breaks down).
    pub tolerance: Option<Real>,
    /// Hard cap on the total number of iterations, across all calls to
    /// [`CgSolver::run`](crate::CgSolver::run).
    pub max_iterations: Option<usize>,
    /// Relative threshold under which a residual, and with it the step-size denominator `rᵀAp`,
    /// is considered zero: the solver breaks down once
    /// `‖rₑ‖ <= breakdown_tolerance · max(‖r₀‖, ‖b‖)`.
    ///
    /// The test does not depend on the magnitude of `A` and `b`. Reaching it is reported as a
    /// [`Termination::Breakdown`](crate::Termination::Breakdown).
    pub breakdown_tolerance: Real,
    /// Keep the full history of every sequence instead of a sliding window.
    pub trace: bool,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            tolerance: None,
            max_iterations: None,
            breakdown_tolerance: Real::EPSILON,
            trace: false,
        }
    }
}

impl CgConfig {
    /// The default configuration, with full history retention enabled.
    pub fn traced() -> Self {
        Self::default().with_trace(true)
    }

    /// Sets [`Self::trace`].
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Sets [`Self::tolerance`].
    pub fn with_tolerance(mut self, tolerance: Real) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Sets [`Self::max_iterations`].
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Sets [`Self::breakdown_tolerance`].
    pub fn with_breakdown_tolerance(mut self, breakdown_tolerance: Real) -> Self {
        self.breakdown_tolerance = breakdown_tolerance;
        self
    }

    /// Checks that every numeric option is finite and non-negative.
    pub fn validate(&self) -> Result<(), CgError> {
        if let Some(tolerance) = self.tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(CgError::InvalidConfig {
                    name: "tolerance",
                    value: tolerance,
                    expected: "finite non-negative value",
                });
            }
        }

        if !self.breakdown_tolerance.is_finite() || self.breakdown_tolerance < 0.0 {
            return Err(CgError::InvalidConfig {
                name: "breakdown_tolerance",
                value: self.breakdown_tolerance,
                expected: "finite non-negative value",
            });
        }

        Ok(())
    }
}

/// Source of the initial iterate `x₀`.
#[derive(Clone, PartialEq, Debug)]
pub enum InitialGuess {
    /// An explicit initial iterate.
    Given(DVector<Real>),
    /// Uniform values in `[0, 1)` from a generator seeded with the given value.
    Seeded(u64),
    /// Uniform values in `[0, 1)` from a generator seeded by the OS. Runs are not reproducible.
    Entropy,
}

impl InitialGuess {
    /// Produces the initial iterate for a system with `ncols` unknowns.
    ///
    /// Explicit guesses are returned as-is; their dimension is checked by the solver.
    pub(crate) fn into_vector(self, ncols: usize) -> DVector<Real> {
        match self {
            InitialGuess::Given(x0) => x0,
            InitialGuess::Seeded(seed) => uniform(ncols, &mut StdRng::seed_from_u64(seed)),
            InitialGuess::Entropy => uniform(ncols, &mut StdRng::from_entropy()),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            InitialGuess::Given(_) => "given",
            InitialGuess::Seeded(_) => "seeded",
            InitialGuess::Entropy => "entropy",
        }
    }
}

impl From<DVector<Real>> for InitialGuess {
    fn from(x0: DVector<Real>) -> Self {
        InitialGuess::Given(x0)
    }
}

impl From<Option<DVector<Real>>> for InitialGuess {
    fn from(x0: Option<DVector<Real>>) -> Self {
        x0.map(InitialGuess::Given).unwrap_or(InitialGuess::Entropy)
    }
}

fn uniform(n: usize, rng: &mut impl Rng) -> DVector<Real> {
    DVector::from_fn(n, |_, _| rng.gen::<Real>())
}

#[cfg(test)]
mod test {
    use super::{CgConfig, InitialGuess};
    use crate::CgError;
    use na::{dvector, DVector};

    #[test]
    fn seeded_guess_is_reproducible() {
        let x1 = InitialGuess::Seeded(7).into_vector(5);
        let x2 = InitialGuess::Seeded(7).into_vector(5);
        let x3 = InitialGuess::Seeded(8).into_vector(5);
        assert_eq!(x1, x2);
        assert_ne!(x1, x3);
        assert_eq!(x1.len(), 5);
        assert!(x1.iter().all(|e| (0.0..1.0).contains(e)));
    }

    #[test]
    fn entropy_guess_is_in_unit_interval() {
        let x = InitialGuess::Entropy.into_vector(16);
        assert_eq!(x.len(), 16);
        assert!(x.iter().all(|e| (0.0..1.0).contains(e)));
    }

    #[test]
    fn optional_guess_conversion() {
        let given: InitialGuess = Some(dvector![1.0, 2.0]).into();
        assert_eq!(given, InitialGuess::Given(dvector![1.0, 2.0]));
        let missing: InitialGuess = Option::<DVector<f64>>::None.into();
        assert_eq!(missing, InitialGuess::Entropy);
    }

    #[test]
    fn validate_rejects_bad_tolerances() {
        assert!(CgConfig::default().validate().is_ok());
        assert!(CgConfig::traced().with_tolerance(0.0).validate().is_ok());

        assert!(matches!(
            CgConfig::default().with_tolerance(-1.0).validate(),
            Err(CgError::InvalidConfig {
                name: "tolerance",
                ..
            })
        ));
        assert!(matches!(
            CgConfig::default()
                .with_breakdown_tolerance(f64::NAN)
                .validate(),
            Err(CgError::InvalidConfig {
                name: "breakdown_tolerance",
                ..
            })
        ));
    }
}
