//! Constrained minimization capability used by both optimizers
//!
//! The market objectives are convex quadratics (unit price grows linearly with load, and the
//! amount bought multiplies it), so the capability is phrased as a quadratic program:
//!
//! ```text
//! minimize    (1/2) x'Px + q'x
//! subject to  a_k'x  = b_k        (equality rows)
//!             a_k'x <= b_k        (inequality rows)
//!             lower <= x <= upper
//! ```
//!
//! The engine code only talks to `ConstrainedMinimizer`; `ClarabelMinimizer` is the backend
//! used in production.

use clarabel::{
    algebra::CscMatrix,
    solver::{DefaultSettingsBuilder, IPSolver, SolverStatus, SupportedConeT},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::MinimizerError;

/// Bounds closer than this are solved as a fixed variable rather than a box
const FIXED_BOUND_WIDTH: f64 = 1.0e-12;

/// Kind of a linear constraint row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Equal,
    LessOrEqual,
}

/// Sparse linear constraint `sum(coefficient * x[index]) (= | <=) rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: Vec<(usize, f64)>,
    pub kind: ConstraintKind,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Sum of the given variables equals `rhs`
    pub fn sum_equals(indices: impl IntoIterator<Item = usize>, rhs: f64) -> Self {
        Self {
            coefficients: indices.into_iter().map(|i| (i, 1.0)).collect(),
            kind: ConstraintKind::Equal,
            rhs,
        }
    }

    /// Sum of the given variables is at most `rhs`
    pub fn sum_at_most(indices: impl IntoIterator<Item = usize>, rhs: f64) -> Self {
        Self {
            coefficients: indices.into_iter().map(|i| (i, 1.0)).collect(),
            kind: ConstraintKind::LessOrEqual,
            rhs,
        }
    }

    /// Signed violation: positive when the row is not satisfied
    pub fn violation(&self, x: &[f64]) -> f64 {
        let lhs: f64 = self.coefficients.iter().map(|&(i, c)| c * x[i]).sum();
        match self.kind {
            ConstraintKind::Equal => (lhs - self.rhs).abs(),
            ConstraintKind::LessOrEqual => lhs - self.rhs,
        }
    }
}

/// Convex quadratic program with box bounds
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticProgram {
    /// Upper-triangle entries `(row, col, value)` with `row <= col` of the symmetric matrix P
    pub quadratic: Vec<(usize, usize, f64)>,
    pub linear: Vec<f64>,
    pub constraints: Vec<LinearConstraint>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl QuadraticProgram {
    pub fn nr_variables(&self) -> usize {
        self.linear.len()
    }

    /// Objective value `(1/2) x'Px + q'x`
    pub fn objective(&self, x: &[f64]) -> f64 {
        let quadratic: f64 = self
            .quadratic
            .iter()
            .map(|&(i, j, v)| if i == j { 0.5 * v * x[i] * x[i] } else { v * x[i] * x[j] })
            .sum();
        let linear: f64 = self.linear.iter().zip(x).map(|(q, xi)| q * xi).sum();
        quadratic + linear
    }

    /// Largest violation over all constraint rows and bounds (0 when feasible)
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        let rows = self.constraints.iter().map(|c| c.violation(x));
        let bounds = x
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(xi, (lo, hi))| (lo - xi).max(xi - hi));
        rows.chain(bounds).fold(0.0, f64::max)
    }

    /// Project a point onto the box bounds
    pub fn clamp_to_bounds(&self, x: &mut [f64]) {
        for (xi, (lo, hi)) in x.iter_mut().zip(self.lower.iter().zip(&self.upper)) {
            if xi.is_finite() {
                *xi = xi.max(*lo).min(*hi);
            }
        }
    }

    /// Check that every vector and index agrees with the number of variables
    pub fn check_dimensions(&self) -> Result<(), MinimizerError> {
        let n = self.nr_variables();
        if self.lower.len() != n || self.upper.len() != n {
            return Err(MinimizerError::DimensionMismatch(format!(
                "{} variables but {} lower and {} upper bounds",
                n,
                self.lower.len(),
                self.upper.len()
            )));
        }
        if let Some(&(i, j, _)) = self.quadratic.iter().find(|&&(i, j, _)| i > j || j >= n) {
            return Err(MinimizerError::DimensionMismatch(format!(
                "quadratic entry ({}, {}) is not in the upper triangle of a {}x{} matrix",
                i, j, n, n
            )));
        }
        for (row, constraint) in self.constraints.iter().enumerate() {
            if let Some(&(i, _)) = constraint.coefficients.iter().find(|&&(i, _)| i >= n) {
                return Err(MinimizerError::DimensionMismatch(format!(
                    "constraint {} references variable {} of {}",
                    row, i, n
                )));
            }
        }
        Ok(())
    }
}

/// Budget handed to the numerical backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: u32,
    /// Feasibility and optimality-gap tolerance
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1.0e-6,
        }
    }
}

/// What the backend returned: the point is usable even when `success` is false
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerOutcome {
    pub point: Vec<f64>,
    pub success: bool,
    /// Objective value as reported by the backend
    pub objective: f64,
    pub iterations: u32,
    pub message: String,
}

impl MinimizerOutcome {
    /// Whether every coordinate is a real number
    pub fn is_finite(&self) -> bool {
        self.point.iter().all(|x| x.is_finite())
    }
}

/// Capability: minimize a quadratic program, return point + success flag + iteration count
pub trait ConstrainedMinimizer {
    /// Solve `problem` starting from `initial_guess`
    /// Backends that cannot warm start may ignore the guess
    fn minimize(&self, problem: &QuadraticProgram, initial_guess: &[f64], config: &SolverConfig) -> Result<MinimizerOutcome, MinimizerError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Interior-point backend built on Clarabel
#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelMinimizer;

/// Sparse matrix assembled column by column, sorted by row inside each column
fn csc_from_entries(nrows: usize, ncols: usize, entries: BTreeMap<(usize, usize), f64>) -> CscMatrix<f64> {
    // BTreeMap keyed by (col, row) iterates column-major with sorted rows
    let mut col_ptr = Vec::with_capacity(ncols + 1);
    let mut row_idx = Vec::with_capacity(entries.len());
    let mut values = Vec::with_capacity(entries.len());
    let mut iter = entries.into_iter().peekable();
    for col in 0..ncols {
        col_ptr.push(row_idx.len());
        while let Some(&((c, r), v)) = iter.peek() {
            if c != col {
                break;
            }
            row_idx.push(r);
            values.push(v);
            iter.next();
        }
    }
    col_ptr.push(row_idx.len());
    CscMatrix::new(nrows, ncols, col_ptr, row_idx, values)
}

impl ConstrainedMinimizer for ClarabelMinimizer {
    fn minimize(&self, problem: &QuadraticProgram, _initial_guess: &[f64], config: &SolverConfig) -> Result<MinimizerOutcome, MinimizerError> {
        problem.check_dimensions()?;
        let n = problem.nr_variables();

        // P: duplicates are summed
        let mut p_entries: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for &(i, j, v) in &problem.quadratic {
            *p_entries.entry((j, i)).or_insert(0.0) += v;
        }
        let p_mat = csc_from_entries(n, n, p_entries);

        // Clarabel wants Ax + s = b with the zero-cone rows first, then the nonnegative rows
        let mut equal_rows: Vec<(Vec<(usize, f64)>, f64)> = Vec::new();
        let mut less_rows: Vec<(Vec<(usize, f64)>, f64)> = Vec::new();
        for constraint in &problem.constraints {
            let row = (constraint.coefficients.clone(), constraint.rhs);
            match constraint.kind {
                ConstraintKind::Equal => equal_rows.push(row),
                ConstraintKind::LessOrEqual => less_rows.push(row),
            }
        }
        for (i, (&lo, &hi)) in problem.lower.iter().zip(&problem.upper).enumerate() {
            if hi - lo <= FIXED_BOUND_WIDTH {
                equal_rows.push((vec![(i, 1.0)], lo));
                continue;
            }
            if lo.is_finite() {
                less_rows.push((vec![(i, -1.0)], -lo));
            }
            if hi.is_finite() {
                less_rows.push((vec![(i, 1.0)], hi));
            }
        }

        let nr_equal = equal_rows.len();
        let nr_rows = nr_equal + less_rows.len();
        let mut a_entries: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut rhs = Vec::with_capacity(nr_rows);
        for (row, (coefficients, b)) in equal_rows.into_iter().chain(less_rows).enumerate() {
            for (col, coefficient) in coefficients {
                *a_entries.entry((col, row)).or_insert(0.0) += coefficient;
            }
            rhs.push(b);
        }
        let a_mat = csc_from_entries(nr_rows, n, a_entries);

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if nr_equal > 0 {
            cones.push(SupportedConeT::ZeroConeT(nr_equal));
        }
        if nr_rows > nr_equal {
            cones.push(SupportedConeT::NonnegativeConeT(nr_rows - nr_equal));
        }

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(config.max_iterations)
            .tol_feas(config.tolerance)
            .tol_gap_abs(config.tolerance)
            .tol_gap_rel(config.tolerance)
            .build()
            .map_err(|e| MinimizerError::Settings(format!("{:?}", e)))?;

        let mut solver = clarabel::solver::DefaultSolver::new(
            &p_mat, &problem.linear, &a_mat, &rhs, &cones, settings,
        )
        .map_err(|e| MinimizerError::Setup(format!("{:?}", e)))?;

        solver.solve();

        let sol = solver.solution;
        let mut point = sol.x.clone();
        problem.clamp_to_bounds(&mut point);

        Ok(MinimizerOutcome {
            point,
            success: matches!(sol.status, SolverStatus::Solved),
            objective: sol.obj_val,
            iterations: sol.iterations,
            message: format!("{:?}", sol.status),
        })
    }

    fn name(&self) -> &'static str {
        "clarabel"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;

    /// Wraps a real backend and reports every solve as unsuccessful
    pub(crate) struct NeverSucceeds<M: ConstrainedMinimizer>(pub M);

    impl<M: ConstrainedMinimizer> ConstrainedMinimizer for NeverSucceeds<M> {
        fn minimize(&self, problem: &QuadraticProgram, initial_guess: &[f64], config: &SolverConfig) -> Result<MinimizerOutcome, MinimizerError> {
            let mut outcome = self.0.minimize(problem, initial_guess, config)?;
            outcome.success = false;
            outcome.message = "MaxIterations".to_string();
            Ok(outcome)
        }

        fn name(&self) -> &'static str {
            "never-succeeds"
        }
    }

    /// Fails to set up on the listed call numbers, otherwise delegates
    pub(crate) struct FailsOnCalls<M: ConstrainedMinimizer> {
        pub inner: M,
        pub failing_calls: Vec<usize>,
        pub calls: Cell<usize>,
    }

    impl<M: ConstrainedMinimizer> ConstrainedMinimizer for FailsOnCalls<M> {
        fn minimize(&self, problem: &QuadraticProgram, initial_guess: &[f64], config: &SolverConfig) -> Result<MinimizerOutcome, MinimizerError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if self.failing_calls.contains(&call) {
                return Err(MinimizerError::Setup("scripted failure".to_string()));
            }
            self.inner.minimize(problem, initial_guess, config)
        }

        fn name(&self) -> &'static str {
            "fails-on-calls"
        }
    }

    fn simplex_problem() -> QuadraticProgram {
        // minimize x0^2 + x1^2 + x0 subject to x0 + x1 = 1, 0 <= x <= 1
        QuadraticProgram {
            quadratic: vec![(0, 0, 2.0), (1, 1, 2.0)],
            linear: vec![1.0, 0.0],
            constraints: vec![LinearConstraint::sum_equals([0, 1], 1.0)],
            lower: vec![0.0, 0.0],
            upper: vec![1.0, 1.0],
        }
    }

    #[test]
    fn test_objective_counts_off_diagonal_twice() {
        let problem = QuadraticProgram {
            quadratic: vec![(0, 0, 2.0), (0, 1, 2.0), (1, 1, 2.0)],
            linear: vec![0.0, 0.0],
            constraints: vec![],
            lower: vec![0.0, 0.0],
            upper: vec![f64::INFINITY, f64::INFINITY],
        };
        // (x0 + x1)^2 with x = (1, 2)
        assert_abs_diff_eq!(problem.objective(&[1.0, 2.0]), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_check_dimensions_rejects_lower_triangle() {
        let mut problem = simplex_problem();
        problem.quadratic.push((1, 0, 1.0));
        assert!(matches!(problem.check_dimensions(), Err(MinimizerError::DimensionMismatch(_))));
    }

    #[test]
    fn test_clarabel_solves_small_simplex_qp() {
        let problem = simplex_problem();
        let outcome = ClarabelMinimizer.minimize(&problem, &[0.0, 0.0], &SolverConfig::default()).unwrap();

        // Stationarity: 2 x0 + 1 = 2 x1, x0 + x1 = 1  =>  x0 = 0.25, x1 = 0.75
        assert!(outcome.success, "status {}", outcome.message);
        assert_abs_diff_eq!(outcome.point[0], 0.25, epsilon = 1e-4);
        assert_abs_diff_eq!(outcome.point[1], 0.75, epsilon = 1e-4);
        assert!(problem.max_violation(&outcome.point) < 1e-5);
        assert_abs_diff_eq!(outcome.objective, 0.875, epsilon = 1e-5);
        assert_abs_diff_eq!(outcome.objective, problem.objective(&outcome.point), epsilon = 1e-5);
    }

    #[test]
    fn test_clarabel_handles_fixed_variable() {
        let mut problem = simplex_problem();
        problem.upper[0] = 0.0;
        let outcome = ClarabelMinimizer.minimize(&problem, &[0.0, 0.0], &SolverConfig::default()).unwrap();

        assert!(outcome.success, "status {}", outcome.message);
        assert_eq!(outcome.point[0], 0.0);
        assert_abs_diff_eq!(outcome.point[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_clarabel_reports_infeasible_problem() {
        let mut problem = simplex_problem();
        problem.constraints = vec![LinearConstraint::sum_equals([0, 1], 5.0)];
        let outcome = ClarabelMinimizer.minimize(&problem, &[0.0, 0.0], &SolverConfig::default()).unwrap();
        assert!(!outcome.success);
    }
}
