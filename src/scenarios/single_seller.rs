/// One seller plus the grid and a single buyer one hop from both.
///
/// With one buyer the game and the social optimum coincide: the buyer fills up on the
/// cheap seller until its marginal cost reaches the grid's, which gives a closed-form split.
///
/// - Variant A: demand 50, the seller alone is cheaper all the way
///
/// - Variant B: demand 120, the seller's marginal cost crosses the grid's at 96.5625 units

use crate::config::GameConfig;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::market::MarketModel;
use crate::minimizer::ClarabelMinimizer;
use crate::results::GameTermination;
use crate::scenarios::Validation;
use crate::simulation::Simulation;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "single_seller",
    run,
});

const SELLER_PRICE: f64 = 0.05;
const SELLER_CAPACITY: f64 = 100.0;
const GRID_PRICE: f64 = 0.14;
const GRID_CAPACITY: f64 = 1000.0;

/// Amount bought from the seller where both marginal costs are equal, clipped to the feasible range
/// Marginal cost of buying `x` at price `p` and capacity `c` on an empty seller is `p (1 + 2 x / c)`
fn analytic_seller_share(demand: f64) -> f64 {
    let x = (GRID_PRICE - SELLER_PRICE + 2.0 * GRID_PRICE * demand / GRID_CAPACITY)
        / (2.0 * SELLER_PRICE / SELLER_CAPACITY + 2.0 * GRID_PRICE / GRID_CAPACITY);
    x.clamp(0.0, demand.min(SELLER_CAPACITY))
}

fn market(demand: f64) -> Result<MarketModel, Box<dyn std::error::Error>> {
    Ok(MarketModel::new(
        vec![SELLER_CAPACITY, GRID_CAPACITY],
        vec![SELLER_PRICE, GRID_PRICE],
        vec![demand],
        vec![vec![1.0, 1.0]],
    )?)
}

pub fn run(scenario_name: &str, _seed: u64, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let simulation = Simulation::new(GameConfig::default(), &ClarabelMinimizer);
    let mut validation = Validation::new();

    for (variant, demand) in [("small", 50.0), ("large", 120.0)] {
        let market = market(demand)?;
        let outcome = simulation.run_variant(
            &format!("One seller, demand {}", demand),
            scenario_name,
            variant,
            &market,
            logger,
        )?;
        let expected = analytic_seller_share(demand);

        logln!(logger, LogEvent::Scenario, "");
        let got = outcome.decentralized.allocation.get(0, 0);
        validation.check(
            logger,
            (got - expected).abs() <= 1e-3,
            format!("Demand {}: game buys {:.4} from the seller, analytic {:.4}", demand, got, expected),
        );
        let got = outcome.centralized.allocation.get(0, 0);
        validation.check(
            logger,
            (got - expected).abs() <= 1e-3,
            format!("Demand {}: optimum buys {:.4} from the seller, analytic {:.4}", demand, got, expected),
        );
        validation.check(
            logger,
            outcome.decentralized.termination == GameTermination::Equilibrium,
            format!(
                "Demand {}: game ends in equilibrium (got {} after {} iterations)",
                demand, outcome.decentralized.termination, outcome.decentralized.iteration_count
            ),
        );
        validation.check(
            logger,
            (outcome.price_of_anarchy - 1.0).abs() <= 1e-4,
            format!("Demand {}: a single buyer has no price of anarchy ({:.6})", demand, outcome.price_of_anarchy),
        );
        validation.check_feasible(logger, &format!("Demand {}", demand), &market, &outcome.decentralized.allocation);
    }

    validation.finish(scenario_name)
}
