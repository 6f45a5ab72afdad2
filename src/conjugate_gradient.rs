use crate::config::{CgConfig, InitialGuess};
use crate::error::CgError;
use crate::history::History;
use crate::Real;
use na::{DMatrix, DVector};
use tracing::{debug, trace, warn};

/// Outcome of the step-size computation of one iteration.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Step {
    /// The exact minimizer of the quadratic form along the current search direction.
    Length(Real),
    /// The denominator `rᵀAp` vanished. The residual is zero and there is nothing left to
    /// minimize.
    Breakdown,
}

/// Why a call to [`CgSolver::run`] stopped.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Termination {
    /// The requested number of iterations (or [`CgConfig::max_iterations`]) was reached.
    IterationLimit,
    /// A residual fell under [`CgConfig::tolerance`].
    Converged,
    /// The step-size denominator fell under [`CgConfig::breakdown_tolerance`].
    Breakdown,
}

impl Termination {
    /// Did the solver stop because the system is solved, rather than because it ran out of
    /// iterations?
    pub fn is_converged(self) -> bool {
        !matches!(self, Termination::IterationLimit)
    }
}

/// The result of [`CgSolver::run`].
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CgOutcome {
    /// The last iterate `xₖ`.
    pub solution: DVector<Real>,
    /// Total number of completed iterations `k`.
    pub iterations: usize,
    /// L2 norm of the residual `rₖ` associated to `xₖ`.
    pub residual_norm: Real,
    /// Why the run stopped.
    pub termination: Termination,
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum Phase {
    /// No iteration ran yet: the residual has to be computed from `x₀` directly.
    Init,
    /// Steady state: residuals are updated incrementally.
    Step,
    Done(Termination),
}

/// Linear conjugate gradient solver for a dense symmetric positive-definite system `Ax = b`.
///
/// The solver owns the system and every value computed by the iterations. Positive
/// definiteness of `A` is assumed, not verified.
#[derive(Clone, Debug)]
pub struct CgSolver {
    a: DMatrix<Real>,
    b: DVector<Real>,
    config: CgConfig,
    history: History,
    phase: Phase,
    /// `max(‖r₀‖², ‖b‖²)`, the yardstick of the breakdown test. Set by the first iteration.
    residual_scale: Real,
    /// `A pₑ` of the last completed iteration, reused by the next residual update.
    last_ap: Option<(usize, DVector<Real>)>,
}

impl CgSolver {
    /// Initializes a solver with the default configuration.
    ///
    /// See [`Self::with_config`].
    pub fn new(
        a: DMatrix<Real>,
        b: DVector<Real>,
        guess: impl Into<InitialGuess>,
    ) -> Result<Self, CgError> {
        Self::with_config(a, b, guess, CgConfig::default())
    }

    /// Initializes a solver for the system `Ax = b`.
    ///
    /// # Parameters
    /// - `a`: the `n × n` symmetric positive-definite matrix.
    /// - `b`: the right-hand side, of length `n`.
    /// - `guess`: the initial iterate `x₀`. Either a vector of length `n`, an
    ///   [`InitialGuess`], or `None` for a random guess drawn from the OS entropy.
    /// - `config`: the solver options.
    ///
    /// Fails with [`CgError::DimensionMismatch`] if `a` is not square, or if `b` or `x₀` do not
    /// have `n` rows.
    pub fn with_config(
        a: DMatrix<Real>,
        b: DVector<Real>,
        guess: impl Into<InitialGuess>,
        config: CgConfig,
    ) -> Result<Self, CgError> {
        config.validate()?;

        let n = a.ncols();
        if a.nrows() != n {
            return Err(CgError::dimension_mismatch(
                "A",
                "a square matrix",
                format!("{}x{}", a.nrows(), n),
            ));
        }

        if b.len() != n {
            return Err(CgError::dimension_mismatch(
                "b",
                format!("{} rows", n),
                format!("{} rows", b.len()),
            ));
        }

        let guess = guess.into();
        let source = guess.label();
        let x0 = guess.into_vector(n);

        if x0.len() != n {
            return Err(CgError::dimension_mismatch(
                "x0",
                format!("{} rows", n),
                format!("{} rows", x0.len()),
            ));
        }

        debug!(n, guess = source, trace = config.trace, "CG: solver initialized");

        Ok(Self {
            a,
            b,
            config,
            history: History::new(x0),
            phase: Phase::Init,
            residual_scale: 0.0,
            last_ap: None,
        })
    }

    /// The system matrix `A`.
    pub fn a(&self) -> &DMatrix<Real> {
        &self.a
    }

    /// The right-hand side `b`.
    pub fn b(&self) -> &DVector<Real> {
        &self.b
    }

    /// The number of unknowns `n`.
    pub fn dimension(&self) -> usize {
        self.b.len()
    }

    /// The solver options.
    pub fn config(&self) -> &CgConfig {
        &self.config
    }

    /// Everything computed so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The number of completed iterations.
    pub fn iterations(&self) -> usize {
        self.history.iterations()
    }

    /// The current iterate.
    pub fn x(&self) -> &DVector<Real> {
        &self.history.x[self.iterations()]
    }

    /// Why the solver stopped for good, if it did.
    pub fn termination(&self) -> Option<Termination> {
        match self.phase {
            Phase::Done(termination) => Some(termination),
            Phase::Init | Phase::Step => None,
        }
    }

    /// The L2 norms of the retained residuals, oldest first.
    pub fn residual_norm_history(&self) -> Vec<Real> {
        self.history.r.retained().iter().map(|r| r.norm()).collect()
    }

    /// The residual of iteration `epoch`.
    ///
    /// The residual of the first iteration is `b - Ax₀`. The following ones are updated
    /// incrementally as `rₑ = rₑ₋₁ - aₑ₋₁ Apₑ₋₁`.
    ///
    /// # Panics
    /// If the step size and search direction of iteration `epoch - 1` are not stored.
    pub fn residual(&self, epoch: usize) -> DVector<Real> {
        if epoch == 0 {
            &self.b - &self.a * &self.history.x[0]
        } else {
            let computed;
            let ap = match &self.last_ap {
                Some((cached_epoch, ap)) if *cached_epoch == epoch - 1 => ap,
                _ => {
                    computed = &self.a * &self.history.p[epoch - 1];
                    &computed
                }
            };
            let mut r = self.history.r[epoch - 1].clone();
            r.axpy(-self.history.a[epoch - 1], ap, 1.0);
            r
        }
    }

    /// The step size of iteration `epoch`: `aₑ = rₑᵀrₑ / rₑᵀApₑ`.
    ///
    /// Returns [`Step::Breakdown`] when the residual vanished, i.e., when
    /// `‖rₑ‖ <= breakdown_tolerance · max(‖r₀‖, ‖b‖)` (see [`CgConfig::breakdown_tolerance`]).
    /// The denominator then vanishes with it. Returns [`CgError::NumericalInstability`] if the
    /// denominator is not positive while the residual is not negligible, i.e., if `A` is not
    /// positive-definite along `pₑ`.
    ///
    /// # Panics
    /// If the residual and search direction of iteration `epoch` are not stored.
    pub fn alpha(&self, epoch: usize) -> Result<Step, CgError> {
        let ap = &self.a * &self.history.p[epoch];
        self.step_size(epoch, &ap)
    }

    fn step_size(&self, epoch: usize, ap: &DVector<Real>) -> Result<Step, CgError> {
        let r = &self.history.r[epoch];
        let rr = r.norm_squared();
        let tolerance = self.config.breakdown_tolerance;

        if rr <= tolerance * tolerance * self.residual_scale {
            return Ok(Step::Breakdown);
        }

        let denominator = r.dot(ap);
        if denominator <= 0.0 {
            return Err(CgError::instability(
                epoch,
                format!("rᵀAp = {denominator:.6e} <= 0; the matrix is not positive-definite"),
            ));
        }

        Ok(Step::Length(rr / denominator))
    }

    /// The Fletcher–Reeves coefficient of iteration `epoch`: `βₑ = rₑᵀrₑ / rₑ₋₁ᵀrₑ₋₁`.
    ///
    /// # Panics
    /// If `epoch == 0`, or if the residuals of iterations `epoch` and `epoch - 1` are not
    /// stored.
    pub fn beta(&self, epoch: usize) -> Real {
        assert!(epoch >= 1, "the first iteration has no Fletcher–Reeves coefficient");
        self.history.r[epoch].norm_squared() / self.history.r[epoch - 1].norm_squared()
    }

    /// The search direction of iteration `epoch`: `pₑ = rₑ + βₑ pₑ₋₁`.
    ///
    /// The first search direction is the first residual itself, so `epoch` must be at
    /// least `1`.
    ///
    /// # Panics
    /// If `rₑ`, `βₑ` or `pₑ₋₁` are not stored.
    pub fn search_direction(&self, epoch: usize) -> DVector<Real> {
        let mut p = self.history.r[epoch].clone();
        p.axpy(self.history.beta[epoch], &self.history.p[epoch - 1], 1.0);
        p
    }

    /// The iterate following iteration `epoch`: `xₑ₊₁ = xₑ + aₑ pₑ`.
    ///
    /// # Panics
    /// If `xₑ`, `aₑ` or `pₑ` are not stored.
    pub fn update_iterate(&self, epoch: usize) -> DVector<Real> {
        let mut x = self.history.x[epoch].clone();
        x.axpy(self.history.a[epoch], &self.history.p[epoch], 1.0);
        x
    }

    /// Runs `num_iterations` conjugate gradient iterations and returns the last iterate.
    ///
    /// Without [`CgConfig::tolerance`], exactly `num_iterations` iterations are executed
    /// unless [`CgConfig::max_iterations`] is reached first, or the residual vanishes (see
    /// [`Termination::Breakdown`]). Calling `run` again resumes from the current iteration.
    /// Once the solver terminated early, further calls return immediately.
    ///
    /// On error, the values computed during the failing iteration are discarded and the
    /// history is left as it was before that iteration.
    pub fn run(&mut self, num_iterations: usize) -> Result<CgOutcome, CgError> {
        let start = self.iterations();
        let mut target = start.saturating_add(num_iterations);
        if let Some(max_iterations) = self.config.max_iterations {
            target = target.min(max_iterations).max(start);
        }

        debug!(start, target, n = self.dimension(), "CG: run");

        loop {
            let epoch = self.iterations();
            let phase = self.phase;
            let transition = match phase {
                Phase::Done(_) => break,
                _ if epoch >= target => break,
                Phase::Init => self.init_step(),
                Phase::Step => self.steady_step(epoch),
            };

            match transition {
                Ok(phase) => {
                    if let Phase::Done(_) = phase {
                        self.history.discard_from(epoch);
                    }
                    self.phase = phase;
                }
                Err(err) => {
                    warn!(epoch, %err, "CG: aborting run");
                    self.history.discard_from(epoch);
                    return Err(err);
                }
            }

            if !self.config.trace {
                self.history.trim();
            }
        }

        let termination = self.termination().unwrap_or(Termination::IterationLimit);
        let residual_norm = self.residual(self.iterations()).norm();

        debug!(
            iterations = self.iterations(),
            residual_norm,
            ?termination,
            "CG: run finished"
        );

        Ok(CgOutcome {
            solution: self.x().clone(),
            iterations: self.iterations(),
            residual_norm,
            termination,
        })
    }

    fn init_step(&mut self) -> Result<Phase, CgError> {
        let r0 = self.residual(0);
        ensure_finite(0, "residual", r0.iter())?;

        if self.within_tolerance(0, &r0) {
            return Ok(Phase::Done(Termination::Converged));
        }

        self.residual_scale = r0.norm_squared().max(self.b.norm_squared());
        self.history.r.push(r0.clone());
        self.history.p.push(r0);
        self.line_search(0)
    }

    fn steady_step(&mut self, epoch: usize) -> Result<Phase, CgError> {
        let r = self.residual(epoch);
        ensure_finite(epoch, "residual", r.iter())?;

        if self.within_tolerance(epoch, &r) {
            return Ok(Phase::Done(Termination::Converged));
        }

        self.history.r.push(r);

        let beta = self.beta(epoch);
        ensure_finite(epoch, "beta", std::iter::once(&beta))?;
        self.history.beta.push(beta);

        let p = self.search_direction(epoch);
        ensure_finite(epoch, "search direction", p.iter())?;
        self.history.p.push(p);

        self.line_search(epoch)
    }

    /// Shared tail of both phases: step size, then iterate update.
    fn line_search(&mut self, epoch: usize) -> Result<Phase, CgError> {
        let ap = &self.a * &self.history.p[epoch];
        let alpha = match self.step_size(epoch, &ap)? {
            Step::Length(alpha) => alpha,
            Step::Breakdown => {
                warn!(epoch, "CG: step size denominator vanished, stopping");
                return Ok(Phase::Done(Termination::Breakdown));
            }
        };
        ensure_finite(epoch, "alpha", std::iter::once(&alpha))?;
        self.history.a.push(alpha);

        let x = self.update_iterate(epoch);
        ensure_finite(epoch, "iterate", x.iter())?;
        self.history.x.push(x);
        self.last_ap = Some((epoch, ap));

        trace!(
            epoch,
            alpha,
            beta = ?self.history.beta.get(epoch),
            residual_norm = self.history.r[epoch].norm(),
            "CG: iteration"
        );

        Ok(Phase::Step)
    }

    fn within_tolerance(&self, epoch: usize, r: &DVector<Real>) -> bool {
        match self.config.tolerance {
            Some(tolerance) => {
                let norm = r.norm();
                if norm <= tolerance {
                    debug!(epoch, residual_norm = norm, tolerance, "CG: converged");
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }
}

fn ensure_finite<'a>(
    iteration: usize,
    what: &str,
    mut values: impl Iterator<Item = &'a Real>,
) -> Result<(), CgError> {
    match values.position(|e| !e.is_finite()) {
        Some(i) => Err(CgError::instability(
            iteration,
            format!("non-finite {what} component at index {i}"),
        )),
        None => Ok(()),
    }
}
