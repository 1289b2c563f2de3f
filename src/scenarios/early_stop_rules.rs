/// The same random market played under each oscillation heuristic.
///
/// Rounds are deterministic, so a game that stops early follows exactly the same path as the
/// game with the heuristic disabled, only shorter. Every variant must stop within the cap and
/// leave a feasible allocation.

use crate::config::{EarlyStop, GameConfig, MarketParams};
use crate::generator::{MarketGenerator, RandomMarketGenerator};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::minimizer::ClarabelMinimizer;
use crate::scenarios::Validation;
use crate::simulation::{Simulation, SimulationOutcome};

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "early_stop_rules",
    run,
});

pub fn run(scenario_name: &str, seed: u64, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let market = RandomMarketGenerator::new(MarketParams::default(), seed)?.generate()?;

    let mut outcomes: Vec<(EarlyStop, SimulationOutcome)> = Vec::new();
    for early_stop in [EarlyStop::Disabled, EarlyStop::StablePair, EarlyStop::AdjustingPair] {
        let config = GameConfig { early_stop, ..GameConfig::default() };
        let outcome = Simulation::new(config, &ClarabelMinimizer).run_variant(
            &format!("Early stop rule {}, seed {}", early_stop, seed),
            scenario_name,
            &format!("{}-seed{}", early_stop, seed),
            &market,
            logger,
        )?;
        outcomes.push((early_stop, outcome));
    }

    logln!(logger, LogEvent::Scenario, "");
    let mut validation = Validation::new();
    let (_, reference) = &outcomes[0];
    let full_path = &reference.decentralized.system_cost_trajectory;

    for (early_stop, outcome) in &outcomes {
        let game = &outcome.decentralized;
        logln!(
            logger,
            LogEvent::Scenario,
            "{}: {} after {} iterations, system cost {:.4}",
            early_stop,
            game.termination,
            game.iteration_count,
            game.system_cost
        );
        validation.check(
            logger,
            game.iteration_count <= GameConfig::default().max_iterations,
            format!("{}: stops within the iteration cap ({})", early_stop, game.iteration_count),
        );
        validation.check(
            logger,
            game.iteration_count <= reference.decentralized.iteration_count
                && full_path.starts_with(&game.system_cost_trajectory),
            format!(
                "{}: follows the path of the game without early stop ({} of {} iterations)",
                early_stop, game.iteration_count, reference.decentralized.iteration_count
            ),
        );
        validation.check_feasible(logger, &early_stop.to_string(), &market, &game.allocation);
    }

    validation.finish(scenario_name)
}
