use crate::allocation::{all_close, AllocationMatrix};
use crate::best_response::BestResponseProblem;
use crate::config::{EarlyStop, GameConfig};
use crate::cost::{all_on_grid, evaluate, SellerPricing};
use crate::error::MarketError;
use crate::logger::{LogEvent, Logger};
use crate::market::MarketModel;
use crate::minimizer::ConstrainedMinimizer;
use crate::results::{DecentralizedResult, GameTermination, IterationRecord};
use crate::{logln, warnln};

/// What a single best-response round did
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub still_adjusting: Vec<bool>,
    /// Subproblems that reported non-success or failed outright in this round
    pub solver_warnings: usize,
}

/// Sequential best-response game over all buyers
///
/// Buyers are visited in index order and each one sees the rows already updated by the buyers
/// before it in the same round. The allocation starts with every buyer's full demand on the grid.
pub struct DecentralizedGame<'a> {
    market: &'a MarketModel,
    config: GameConfig,
    minimizer: &'a dyn ConstrainedMinimizer,
}

impl<'a> DecentralizedGame<'a> {
    pub fn new(market: &'a MarketModel, config: GameConfig, minimizer: &'a dyn ConstrainedMinimizer) -> Self {
        Self { market, config, minimizer }
    }

    /// Every buyer buys its whole demand from the grid
    pub fn initial_allocation(&self) -> AllocationMatrix {
        let mut allocation = AllocationMatrix::zeros(self.market.nr_buyers, self.market.nr_columns());
        for (buyer, &demand) in self.market.buyer_demand.iter().enumerate() {
            allocation.set(buyer, self.market.grid_index(), demand);
        }
        allocation
    }

    /// Play rounds until equilibrium, the iteration cap, or the early-stop heuristic
    ///
    /// Only a malformed market is an error; subproblem failures are logged and absorbed.
    pub fn run(&self, logger: &mut Logger) -> Result<DecentralizedResult, MarketError> {
        self.market.validate()?;

        let mut allocation = self.initial_allocation();
        let mut records = vec![IterationRecord::new(all_on_grid(self.market), vec![false; self.market.nr_buyers])];
        let mut solver_warnings = 0;
        logln!(logger, LogEvent::Iteration, "iteration 0: system cost {:.6} (all demand on grid)", records[0].system_cost);

        let termination = loop {
            let round = records.len();
            let outcome = self.play_round(&mut allocation, round, logger);
            solver_warnings += outcome.solver_warnings;

            let record = IterationRecord::new(evaluate(self.market, &allocation), outcome.still_adjusting);
            logln!(
                logger,
                LogEvent::Iteration,
                "iteration {}: system cost {:.6}, {} of {} buyers adjusting",
                round,
                record.system_cost,
                record.nr_adjusting(),
                self.market.nr_buyers
            );
            records.push(record);

            if let Some(termination) = check_termination(&self.config, round, &records[round - 1], &records[round]) {
                break termination;
            }
        };

        let result = DecentralizedResult::from_records(allocation, records, termination, solver_warnings);
        logln!(
            logger,
            LogEvent::Convergence,
            "decentralized game stopped after {} iterations: {}",
            result.iteration_count,
            result.termination
        );
        if solver_warnings > 0 {
            warnln!(logger, LogEvent::Convergence, "{} subproblems did not solve cleanly", solver_warnings);
        }
        logln!(logger, LogEvent::Game, "decentralized system cost {:.6}", result.system_cost);
        Ok(result)
    }

    /// One pass over all buyers in index order, updating `allocation` in place
    pub fn play_round(&self, allocation: &mut AllocationMatrix, round: usize, logger: &mut Logger) -> RoundOutcome {
        let pricing = SellerPricing::from_market(self.market);
        let mut still_adjusting = Vec::with_capacity(self.market.nr_buyers);
        let mut solver_warnings = 0;

        for buyer in 0..self.market.nr_buyers {
            let other_loads = allocation.loads_excluding(buyer);
            let problem = BestResponseProblem {
                demand: self.market.buyer_demand[buyer],
                pricing,
                other_loads: &other_loads,
                hops: &self.market.hop_distance[buyer],
            };

            let new_row = match problem.solve(self.minimizer, &self.config.solver) {
                Ok(outcome) if outcome.is_finite() => {
                    if !outcome.success {
                        solver_warnings += 1;
                        warnln!(
                            logger,
                            LogEvent::Solver,
                            "round {} buyer {}: {} stopped with {} after {} iterations, using its last point",
                            round,
                            buyer,
                            self.minimizer.name(),
                            outcome.message,
                            outcome.iterations
                        );
                    }
                    Some(outcome.point)
                }
                Ok(outcome) => {
                    solver_warnings += 1;
                    warnln!(
                        logger,
                        LogEvent::Solver,
                        "round {} buyer {}: {} returned a non-finite point ({}), keeping previous row",
                        round,
                        buyer,
                        self.minimizer.name(),
                        outcome.message
                    );
                    None
                }
                Err(e) => {
                    solver_warnings += 1;
                    warnln!(logger, LogEvent::Solver, "round {} buyer {}: {}, keeping previous row", round, buyer, e);
                    None
                }
            };

            let adjusting = match new_row {
                Some(row) if !all_close(&row, allocation.row(buyer), self.config.closeness_tolerance) => {
                    allocation.set_row(buyer, &row);
                    true
                }
                _ => false,
            };
            logln!(
                logger,
                LogEvent::Solver,
                "round {} buyer {}: {} {:?}, cost {:.6}",
                round,
                buyer,
                if adjusting { "adjusted to" } else { "kept" },
                allocation.row(buyer),
                problem.cost(allocation.row(buyer))
            );
            still_adjusting.push(adjusting);
        }

        RoundOutcome { still_adjusting, solver_warnings }
    }
}

/// Stopping rules, checked in order after round `round` (1-based)
///
/// The early-stop heuristic counts buyers flagged the same way in both `previous` and `current`.
/// Before round 2 there is no previous pass and every buyer counts as having adjusted in it.
pub fn check_termination(
    config: &GameConfig,
    round: usize,
    previous: &IterationRecord,
    current: &IterationRecord,
) -> Option<GameTermination> {
    if round >= config.max_iterations {
        return Some(GameTermination::IterationCap);
    }
    if current.nr_adjusting() == 0 {
        return Some(GameTermination::Equilibrium);
    }
    let adjusted_before = |buyer: usize| round < 2 || previous.still_adjusting[buyer];
    let buyers = 0..current.still_adjusting.len();
    let fires = match config.early_stop {
        EarlyStop::StablePair => {
            buyers.filter(|&b| !adjusted_before(b) && !current.still_adjusting[b]).count() == 2
        }
        EarlyStop::AdjustingPair => {
            buyers.filter(|&b| adjusted_before(b) && current.still_adjusting[b]).count() == 2
        }
        EarlyStop::Disabled => false,
    };
    if fires {
        Some(GameTermination::EarlyStop)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cost::CostBreakdown;
    use crate::logger::MemoryReceiver;
    use crate::market::tests::small_market;
    use crate::minimizer::tests::{FailsOnCalls, NeverSucceeds};
    use crate::minimizer::{ClarabelMinimizer, SolverConfig};
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;

    /// Three sellers plus grid, four buyers with mixed distances
    pub(crate) fn four_buyer_market() -> MarketModel {
        MarketModel::new(
            vec![40.0, 25.0, 60.0, 200.0],
            vec![0.05, 0.06, 0.08, 0.14],
            vec![30.0, 45.0, 20.0, 35.0],
            vec![
                vec![1.0, 3.0, 2.0, 1.0],
                vec![2.0, 1.0, 3.0, 1.0],
                vec![3.0, 2.0, 1.0, 1.0],
                vec![1.0, 1.0, 2.0, 1.0],
            ],
        )
        .unwrap()
    }

    fn record(still_adjusting: Vec<bool>) -> IterationRecord {
        let n = still_adjusting.len();
        IterationRecord::new(CostBreakdown { system_cost: 1.0, individual_costs: vec![0.0; n] }, still_adjusting)
    }

    fn assert_feasible(market: &MarketModel, allocation: &AllocationMatrix) {
        for buyer in 0..market.nr_buyers {
            assert_abs_diff_eq!(allocation.row_sum(buyer), market.buyer_demand[buyer], epsilon = 1e-2);
            assert!(allocation.row(buyer).iter().all(|&x| x >= 0.0));
        }
        for (load, capacity) in allocation.loads().iter().zip(&market.seller_capacity) {
            assert!(*load <= capacity + 1e-4, "load {} over capacity {}", load, capacity);
        }
    }

    #[test]
    fn test_single_buyer_reaches_analytic_split() {
        let market = MarketModel::new(vec![100.0, 1000.0], vec![0.05, 0.14], vec![120.0], vec![vec![1.0, 1.0]]).unwrap();
        let mut logger = Logger::new();
        let result = DecentralizedGame::new(&market, GameConfig::default(), &ClarabelMinimizer)
            .run(&mut logger)
            .unwrap();

        assert_eq!(result.termination, GameTermination::Equilibrium);
        assert_eq!(result.iteration_count, 2);
        assert_abs_diff_eq!(result.allocation.get(0, 0), 96.5625, epsilon = 1e-3);
        assert_abs_diff_eq!(result.allocation.get(0, 1), 23.4375, epsilon = 1e-3);
        assert_abs_diff_eq!(result.system_cost_trajectory[0], all_on_grid(&market).system_cost, epsilon = 1e-12);
        assert!(result.system_cost < result.system_cost_trajectory[0]);
    }

    #[test]
    fn test_every_round_keeps_rows_and_capacities() {
        let market = four_buyer_market();
        let game = DecentralizedGame::new(&market, GameConfig::default(), &ClarabelMinimizer);
        let mut logger = Logger::new();
        let mut allocation = game.initial_allocation();
        assert_feasible(&market, &allocation);

        for round in 1..=10 {
            let outcome = game.play_round(&mut allocation, round, &mut logger);
            assert_eq!(outcome.solver_warnings, 0);
            assert_feasible(&market, &allocation);
            if outcome.still_adjusting.iter().all(|&a| !a) {
                break;
            }
        }
    }

    #[test]
    fn test_run_terminates_within_cap() {
        let market = four_buyer_market();
        let mut logger = Logger::new();
        let result = DecentralizedGame::new(&market, GameConfig::default(), &ClarabelMinimizer)
            .run(&mut logger)
            .unwrap();

        assert!(result.iteration_count <= 50);
        assert_eq!(result.system_cost_trajectory.len(), result.iteration_count + 1);
        assert_eq!(result.iterations.len(), result.iteration_count + 1);
        assert!(result.individual_cost_trajectory.iter().all(|costs| costs.len() == market.nr_buyers));
        assert_abs_diff_eq!(result.system_cost, result.individual_costs.iter().sum::<f64>(), epsilon = 1e-9);
        assert_feasible(&market, &result.allocation);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let market = four_buyer_market();
        let config = GameConfig { max_iterations: 1, ..GameConfig::default() };
        let mut logger = Logger::new();
        let result = DecentralizedGame::new(&market, config, &ClarabelMinimizer).run(&mut logger).unwrap();

        assert_eq!(result.iteration_count, 1);
        assert_eq!(result.termination, GameTermination::IterationCap);
    }

    #[test]
    fn test_non_success_is_absorbed_and_logged() {
        let market = small_market();
        let minimizer = NeverSucceeds(ClarabelMinimizer);
        let mut logger = Logger::new();
        let (receiver, buffer) = MemoryReceiver::new(vec![LogEvent::Game]);
        logger.add_receiver(receiver);

        let result = DecentralizedGame::new(&market, GameConfig::default(), &minimizer).run(&mut logger).unwrap();

        assert!(result.solver_warnings >= market.nr_buyers);
        assert!(result.iteration_count >= 1);
        assert_feasible(&market, &result.allocation);
        assert!(buffer.borrow().contains("WARNING round 1 buyer 0"));
    }

    #[test]
    fn test_failed_subproblem_keeps_previous_row() {
        let market = small_market();
        let minimizer = FailsOnCalls { inner: ClarabelMinimizer, failing_calls: vec![0], calls: Cell::new(0) };
        let game = DecentralizedGame::new(&market, GameConfig::default(), &minimizer);
        let mut logger = Logger::new();
        let mut allocation = game.initial_allocation();

        let outcome = game.play_round(&mut allocation, 1, &mut logger);

        assert_eq!(outcome.solver_warnings, 1);
        assert!(!outcome.still_adjusting[0]);
        assert_eq!(allocation.row(0), &[0.0, 0.0, 25.0]);
        // Buyer 1 still moves off the expensive grid
        assert!(outcome.still_adjusting[1]);
        assert_feasible(&market, &allocation);
    }

    #[test]
    fn test_cap_is_checked_before_equilibrium() {
        let config = GameConfig { max_iterations: 3, ..GameConfig::default() };
        let quiet = record(vec![false, false, false]);
        assert_eq!(check_termination(&config, 3, &quiet, &quiet), Some(GameTermination::IterationCap));
        assert_eq!(check_termination(&config, 2, &quiet, &quiet), Some(GameTermination::Equilibrium));
    }

    #[test]
    fn test_stable_pair_counts_buyers_stable_in_both_rounds() {
        let config = GameConfig::default();

        // Two stable buyers each round, but never the same two
        let before = record(vec![false, false, true, true]);
        let after = record(vec![true, true, false, false]);
        assert_eq!(check_termination(&config, 5, &before, &after), None);

        // Three stable before, two of them stable again
        let before = record(vec![false, false, false, true, true]);
        let after = record(vec![false, false, true, true, true]);
        assert_eq!(check_termination(&config, 5, &before, &after), Some(GameTermination::EarlyStop));

        let two_stable = record(vec![false, true, false]);
        assert_eq!(check_termination(&config, 5, &two_stable, &two_stable), Some(GameTermination::EarlyStop));
        // Nothing was stable before the first round
        assert_eq!(check_termination(&config, 1, &two_stable, &two_stable), None);
    }

    #[test]
    fn test_adjusting_pair_counts_buyers_adjusting_in_both_rounds() {
        let config = GameConfig { early_stop: EarlyStop::AdjustingPair, ..GameConfig::default() };

        let before = record(vec![true, true, false, false]);
        let after = record(vec![false, false, true, true]);
        assert_eq!(check_termination(&config, 4, &before, &after), None);

        let before = record(vec![true, true, true, false]);
        let after = record(vec![false, true, true, true]);
        assert_eq!(check_termination(&config, 4, &before, &after), Some(GameTermination::EarlyStop));

        let two_stable = record(vec![false, true, false]);
        assert_eq!(check_termination(&config, 4, &two_stable, &two_stable), None);
    }

    #[test]
    fn test_adjusting_pair_can_stop_after_first_round() {
        let config = GameConfig { early_stop: EarlyStop::AdjustingPair, ..GameConfig::default() };
        let initial = record(vec![false, false, false]);
        let first = record(vec![true, false, true]);
        assert_eq!(check_termination(&config, 1, &initial, &first), Some(GameTermination::EarlyStop));
    }

    #[test]
    fn test_later_buyer_sees_rows_rewritten_earlier_in_the_round() {
        // Two buyers share one seller slightly cheaper than the grid
        let market = MarketModel::new(
            vec![100.0, 1000.0],
            vec![0.12, 0.14],
            vec![60.0, 60.0],
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let game = DecentralizedGame::new(&market, GameConfig::default(), &ClarabelMinimizer);
        let mut logger = Logger::new();
        let initial = game.initial_allocation();
        let mut allocation = initial.clone();

        let outcome = game.play_round(&mut allocation, 1, &mut logger);
        assert_eq!(outcome.still_adjusting, vec![true, true]);

        let pricing = SellerPricing::from_market(&market);
        let respond_to = |other_loads: &[f64]| {
            BestResponseProblem { demand: 60.0, pricing, other_loads, hops: &market.hop_distance[1] }
                .solve(&ClarabelMinimizer, &SolverConfig::default())
                .unwrap()
                .point
        };
        let against_updated = respond_to(&allocation.loads_excluding(1));
        let against_initial = respond_to(&initial.loads_excluding(1));

        assert_abs_diff_eq!(allocation.get(1, 0), against_updated[0], epsilon = 1e-6);
        assert!((against_initial[0] - against_updated[0]).abs() > 1.0);

        // Marginal costs equal: 0.12 + 0.0024 x = grid marginal given the other buyer's loads
        assert_abs_diff_eq!(allocation.get(0, 0), 16.866, epsilon = 1e-2);
        assert_abs_diff_eq!(allocation.get(1, 0), 8.433, epsilon = 1e-2);
        assert_feasible(&market, &allocation);
    }

    #[test]
    fn test_disabled_rule_only_stops_on_cap_or_equilibrium() {
        let config = GameConfig { early_stop: EarlyStop::Disabled, ..GameConfig::default() };
        let two_stable = record(vec![false, true, false]);
        let two_adjusting = record(vec![true, true, false]);

        assert_eq!(check_termination(&config, 10, &two_stable, &two_stable), None);
        assert_eq!(check_termination(&config, 10, &two_adjusting, &two_adjusting), None);
        assert_eq!(check_termination(&config, 50, &two_adjusting, &two_adjusting), Some(GameTermination::IterationCap));
    }

    #[test]
    fn test_run_is_deterministic() {
        let market = four_buyer_market();
        let game = DecentralizedGame::new(&market, GameConfig::default(), &ClarabelMinimizer);
        let first = game.run(&mut Logger::new()).unwrap();
        let second = game.run(&mut Logger::new()).unwrap();
        assert_eq!(first, second);
    }
}
