use crate::allocation::AllocationMatrix;
use crate::cost::evaluate;
use crate::error::MarketError;
use crate::logger::{LogEvent, Logger};
use crate::market::MarketModel;
use crate::minimizer::{ConstrainedMinimizer, LinearConstraint, QuadraticProgram, SolverConfig};
use crate::results::CentralizedResult;
use crate::{logln, warnln};

/// Relative gap between solver objective and recomputed cost above which the run is flagged
const ROUND_TRIP_TOLERANCE: f64 = 1.0e-4;

/// Social optimum: one minimization over the whole allocation matrix
///
/// Variable `b * nr_columns + s` is what buyer `b` buys from seller `s`. Each seller's load is
/// the column sum over all buyers, so the objective couples every pair of buyers sharing a seller.
pub struct CentralizedOptimizer<'a> {
    market: &'a MarketModel,
    solver: SolverConfig,
    minimizer: &'a dyn ConstrainedMinimizer,
}

impl<'a> CentralizedOptimizer<'a> {
    pub fn new(market: &'a MarketModel, solver: SolverConfig, minimizer: &'a dyn ConstrainedMinimizer) -> Self {
        Self { market, solver, minimizer }
    }

    fn variable(&self, buyer: usize, seller: usize) -> usize {
        buyer * self.market.nr_columns() + seller
    }

    /// System cost as a quadratic program
    ///
    /// `p_s (1 + U_s / c_s) U_s` expands to `(p_s / c_s) U_s^2 + p_s U_s`, and `U_s^2` contributes
    /// `2 p_s / c_s` to every pair of cells in column `s`.
    pub fn to_program(&self) -> QuadraticProgram {
        let market = self.market;
        let columns = market.nr_columns();
        let nr_variables = market.nr_buyers * columns;

        let mut quadratic = Vec::with_capacity(columns * market.nr_buyers * (market.nr_buyers + 1) / 2);
        for seller in 0..columns {
            let curvature = 2.0 * market.seller_price[seller] / market.seller_capacity[seller];
            for b in 0..market.nr_buyers {
                for other in b..market.nr_buyers {
                    quadratic.push((self.variable(b, seller), self.variable(other, seller), curvature));
                }
            }
        }

        let mut linear = vec![0.0; nr_variables];
        let mut upper = vec![0.0; nr_variables];
        for buyer in 0..market.nr_buyers {
            for seller in 0..columns {
                let i = self.variable(buyer, seller);
                linear[i] = market.seller_price[seller] + market.transmission_cost_per_hop * market.hop_distance[buyer][seller];
                upper[i] = market.seller_capacity[seller];
            }
        }

        let mut constraints = Vec::with_capacity(market.nr_buyers + columns);
        for buyer in 0..market.nr_buyers {
            constraints.push(LinearConstraint::sum_equals(
                (0..columns).map(|seller| self.variable(buyer, seller)),
                market.buyer_demand[buyer],
            ));
        }
        for seller in 0..columns {
            constraints.push(LinearConstraint::sum_at_most(
                (0..market.nr_buyers).map(|buyer| self.variable(buyer, seller)),
                market.seller_capacity[seller],
            ));
        }

        QuadraticProgram {
            quadratic,
            linear,
            constraints,
            lower: vec![0.0; nr_variables],
            upper,
        }
    }

    /// Solve once; anything short of a clean solve is an error
    pub fn run(&self, logger: &mut Logger) -> Result<CentralizedResult, MarketError> {
        self.market.validate()?;
        let program = self.to_program();
        let initial_guess = vec![0.0; program.nr_variables()];

        let outcome = self.minimizer.minimize(&program, &initial_guess, &self.solver)?;
        logln!(
            logger,
            LogEvent::Solver,
            "centralized: {} finished with {} after {} iterations",
            self.minimizer.name(),
            outcome.message,
            outcome.iterations
        );
        if !outcome.success || !outcome.is_finite() {
            return Err(MarketError::OptimizationUnsuccessful {
                message: outcome.message,
                iterations: outcome.iterations,
            });
        }

        let solver_objective = outcome.objective;
        logln!(logger, LogEvent::Solver, "centralized: largest constraint violation {:.2e}", program.max_violation(&outcome.point));
        let allocation = AllocationMatrix::from_flat(self.market.nr_buyers, self.market.nr_columns(), outcome.point)
            .ok_or_else(|| MarketError::OptimizationUnsuccessful {
                message: format!("solver returned a point of the wrong size for {} variables", program.nr_variables()),
                iterations: outcome.iterations,
            })?;
        let costs = evaluate(self.market, &allocation);

        logln!(logger, LogEvent::Game, "centralized system cost from solver {:.6}, recomputed {:.6}", solver_objective, costs.system_cost);
        let gap = (solver_objective - costs.system_cost).abs();
        if gap > ROUND_TRIP_TOLERANCE * costs.system_cost.abs().max(1.0) {
            warnln!(logger, LogEvent::Game, "centralized objective and recomputed cost differ by {:.6}", gap);
        }

        Ok(CentralizedResult {
            system_cost: costs.system_cost,
            individual_costs: costs.individual_costs,
            allocation,
            solver_objective,
            solver_iterations: outcome.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::tests::four_buyer_market;
    use crate::game::DecentralizedGame;
    use crate::market::tests::small_market;
    use crate::minimizer::tests::NeverSucceeds;
    use crate::minimizer::ClarabelMinimizer;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_program_objective_is_system_cost() {
        let market = small_market();
        let optimizer = CentralizedOptimizer::new(&market, SolverConfig::default(), &ClarabelMinimizer);
        let cells = vec![10.0, 5.0, 10.0, 15.0, 10.0, 15.0];
        let allocation = AllocationMatrix::from_flat(2, 3, cells.clone()).unwrap();

        let program = optimizer.to_program();
        assert_abs_diff_eq!(
            program.objective(&cells),
            evaluate(&market, &allocation).system_cost,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_solver_objective_matches_recomputed_cost() {
        let market = four_buyer_market();
        let result = CentralizedOptimizer::new(&market, SolverConfig::default(), &ClarabelMinimizer)
            .run(&mut Logger::new())
            .unwrap();

        assert_abs_diff_eq!(result.solver_objective, result.system_cost, epsilon = 1e-4 * result.system_cost);
        assert_abs_diff_eq!(result.system_cost, result.individual_costs.iter().sum::<f64>(), epsilon = 1e-9);
        for buyer in 0..market.nr_buyers {
            assert_abs_diff_eq!(result.allocation.row_sum(buyer), market.buyer_demand[buyer], epsilon = 1e-4);
        }
        for (load, capacity) in result.allocation.loads().iter().zip(&market.seller_capacity) {
            assert!(*load <= capacity + 1e-4);
        }
    }

    #[test]
    fn test_single_buyer_matches_best_response() {
        let market = MarketModel::new(vec![100.0, 1000.0], vec![0.05, 0.14], vec![120.0], vec![vec![1.0, 1.0]]).unwrap();
        let result = CentralizedOptimizer::new(&market, SolverConfig::default(), &ClarabelMinimizer)
            .run(&mut Logger::new())
            .unwrap();
        assert_abs_diff_eq!(result.allocation.get(0, 0), 96.5625, epsilon = 1e-3);
    }

    #[test]
    fn test_decentralized_cost_is_not_below_optimum() {
        let market = four_buyer_market();
        let mut logger = Logger::new();
        let centralized = CentralizedOptimizer::new(&market, SolverConfig::default(), &ClarabelMinimizer)
            .run(&mut logger)
            .unwrap();
        let decentralized = DecentralizedGame::new(&market, GameConfig::default(), &ClarabelMinimizer)
            .run(&mut logger)
            .unwrap();

        assert!(decentralized.system_cost >= centralized.system_cost - 1e-3 * centralized.system_cost);
    }

    #[test]
    fn test_non_success_is_fatal() {
        let market = small_market();
        let minimizer = NeverSucceeds(ClarabelMinimizer);
        let result = CentralizedOptimizer::new(&market, SolverConfig::default(), &minimizer).run(&mut Logger::new());
        assert!(matches!(result, Err(MarketError::OptimizationUnsuccessful { .. })));
    }
}
