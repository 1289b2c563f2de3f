use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use crate::centralized::CentralizedOptimizer;
use crate::config::GameConfig;
use crate::error::MarketError;
use crate::game::DecentralizedGame;
use crate::logger::{sanitize_filename, LogEvent, Logger};
use crate::logln;
use crate::market::MarketModel;
use crate::minimizer::ConstrainedMinimizer;
use crate::results::{CentralizedResult, DecentralizedResult};
use crate::utils::TOTAL_SIMULATION_RUNS;

/// Both reference outcomes of one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub market: MarketModel,
    pub centralized: CentralizedResult,
    pub decentralized: DecentralizedResult,
    /// Decentralized over centralized system cost
    pub price_of_anarchy: f64,
}

/// Full game on one market: social optimum first, then the best-response game
pub struct Simulation<'a> {
    pub config: GameConfig,
    pub minimizer: &'a dyn ConstrainedMinimizer,
}

impl<'a> Simulation<'a> {
    pub fn new(config: GameConfig, minimizer: &'a dyn ConstrainedMinimizer) -> Self {
        Self { config, minimizer }
    }

    pub fn run(&self, market: &MarketModel, logger: &mut Logger) -> Result<SimulationOutcome, MarketError> {
        TOTAL_SIMULATION_RUNS.fetch_add(1, Ordering::Relaxed);
        logln!(
            logger,
            LogEvent::Game,
            "market: {} buyers, {} sellers + grid, total demand {:.1}",
            market.nr_buyers,
            market.nr_sellers,
            market.total_demand()
        );

        let centralized = CentralizedOptimizer::new(market, self.config.solver, self.minimizer).run(logger)?;
        let decentralized = DecentralizedGame::new(market, self.config, self.minimizer).run(logger)?;

        let price_of_anarchy = if centralized.system_cost > 0.0 {
            decentralized.system_cost / centralized.system_cost
        } else {
            1.0
        };
        logln!(
            logger,
            LogEvent::Game,
            "centralized {:.6} vs decentralized {:.6} after {} iterations ({}), price of anarchy {:.4}",
            centralized.system_cost,
            decentralized.system_cost,
            decentralized.iteration_count,
            decentralized.termination,
            price_of_anarchy
        );

        Ok(SimulationOutcome {
            market: market.clone(),
            centralized,
            decentralized,
            price_of_anarchy,
        })
    }

    /// Run one named variant of a scenario with its own log files under `log/<scenario>/`
    pub fn run_variant(
        &self,
        variant_description: &str,
        scenario_name: &str,
        variant_name: &str,
        market: &MarketModel,
        logger: &mut Logger,
    ) -> Result<SimulationOutcome, MarketError> {
        let dir = sanitize_filename(scenario_name);
        let variant = sanitize_filename(variant_name);
        let receiver_ids = [
            logger.add_file_receiver(
                &PathBuf::from(format!("log/{}/iterations-{}.log", dir, variant)),
                vec![LogEvent::Solver, LogEvent::Iteration, LogEvent::Convergence],
            ),
            logger.add_file_receiver(&PathBuf::from(format!("log/{}/game-{}.log", dir, variant)), vec![LogEvent::Game]),
        ];

        logln!(logger, LogEvent::Game, "\n=== {} ===", variant_description);
        market.printout(logger);
        let outcome = self.run(market, logger);

        for id in receiver_ids.into_iter().flatten() {
            logger.remove_receiver(id);
        }
        outcome
    }
}
