/// Random market from the default parameters (3 sellers, 7 buyers), seeded by the run seed.
///
/// Buyers acting selfishly cannot beat the social optimum, so the decentralized system cost
/// is compared against the centralized one. Both allocations must also be feasible and the
/// centralized solver objective must agree with the cost recomputed from its allocation.

use crate::config::{GameConfig, MarketParams};
use crate::generator::{MarketGenerator, RandomMarketGenerator};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::minimizer::ClarabelMinimizer;
use crate::scenarios::Validation;
use crate::simulation::Simulation;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "price_of_anarchy",
    run,
});

/// Relative slack for solver tolerances when comparing the two system costs
const COST_SLACK: f64 = 1e-3;

pub fn run(scenario_name: &str, seed: u64, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = GameConfig::default();
    let market = RandomMarketGenerator::new(MarketParams::default(), seed)?.generate()?;
    let outcome = Simulation::new(config, &ClarabelMinimizer).run_variant(
        &format!("Random market, seed {}", seed),
        scenario_name,
        &format!("seed{}", seed),
        &market,
        logger,
    )?;
    let centralized = &outcome.centralized;
    let decentralized = &outcome.decentralized;

    logln!(logger, LogEvent::Scenario, "");
    let mut validation = Validation::new();
    validation.check(
        logger,
        decentralized.system_cost >= centralized.system_cost * (1.0 - COST_SLACK),
        format!(
            "Decentralized system cost is not below the optimum: {:.4} >= {:.4} (price of anarchy {:.4})",
            decentralized.system_cost, centralized.system_cost, outcome.price_of_anarchy
        ),
    );
    let gap = (centralized.solver_objective - centralized.system_cost).abs();
    validation.check(
        logger,
        gap <= COST_SLACK * centralized.system_cost.max(1.0),
        format!(
            "Centralized objective matches recomputed cost: {:.6} vs {:.6}",
            centralized.solver_objective, centralized.system_cost
        ),
    );
    validation.check(
        logger,
        decentralized.iteration_count <= config.max_iterations,
        format!(
            "Game stops within {} iterations ({} after {})",
            config.max_iterations, decentralized.termination, decentralized.iteration_count
        ),
    );
    validation.check_feasible(logger, "Centralized", &market, &centralized.allocation);
    validation.check_feasible(logger, "Decentralized", &market, &decentralized.allocation);

    validation.finish(scenario_name)
}
