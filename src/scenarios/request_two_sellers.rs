/// A buyer asks how to split 10 units between two sellers with nobody else on the market.
///
/// The closer seller is also cheaper, but its unit price rises with load, so part of the demand
/// goes to the farther seller. A second request where the sellers are nearly sold out must fail
/// with the fixed service error.

use crate::error::{ServiceError, OPTIMIZATION_UNSUCCESSFUL};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::minimizer::{ClarabelMinimizer, SolverConfig};
use crate::scenarios::Validation;
use crate::service::{optimal_energy_decomposition, OptimizationRequest};
use crate::utils::{round_to, SOLUTION_DECIMALS};

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "request_two_sellers",
    run,
});

const REQUEST: &str = r#"{
    "nr_sellers": 2,
    "buyer_demand": 10,
    "sellers_price": [0.05, 0.06],
    "sellers_capacity": [20, 20],
    "used_capacities": [0, 0],
    "hop_distances": [1, 2]
}"#;

pub fn run(scenario_name: &str, _seed: u64, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = SolverConfig::default();
    let mut validation = Validation::new();

    let request = OptimizationRequest::from_json(REQUEST)?;
    let response = optimal_energy_decomposition(&request, &config, &ClarabelMinimizer)?;
    logln!(logger, LogEvent::Scenario, "Response: {}", serde_json::to_string(&response)?);

    let solution = &response.solution;
    validation.check(
        logger,
        solution.len() == request.nr_sellers,
        format!("Solution has one entry per seller ({} entries)", solution.len()),
    );
    let total: f64 = solution.iter().sum();
    validation.check(
        logger,
        (total - request.buyer_demand).abs() <= 0.01,
        format!("Solution sums to demand: {:.4} vs {:.4}", total, request.buyer_demand),
    );
    validation.check(
        logger,
        solution
            .iter()
            .zip(&request.sellers_capacity)
            .all(|(&x, &capacity)| (0.0..=capacity).contains(&x)),
        format!("Every entry lies within its seller's capacity: {:?}", solution),
    );
    validation.check(
        logger,
        solution.iter().all(|&x| x == round_to(x, SOLUTION_DECIMALS)),
        format!("Every entry is rounded to {} decimals", SOLUTION_DECIMALS),
    );
    validation.check(
        logger,
        solution.len() == 2 && solution[0] > solution[1],
        "The cheaper, closer seller gets the larger share".to_string(),
    );

    let sold_out = OptimizationRequest {
        used_capacities: vec![19.0, 19.0],
        ..request.clone()
    };
    let failure = optimal_energy_decomposition(&sold_out, &config, &ClarabelMinimizer);
    logln!(logger, LogEvent::Scenario, "Sold-out request: {:?}", failure);
    validation.check(
        logger,
        matches!(&failure, Err(e) if *e == ServiceError::OptimizationUnsuccessful
            && e.status_code() == 500
            && e.body()["message"] == OPTIMIZATION_UNSUCCESSFUL),
        "Sold-out request fails with status 500 and the fixed message".to_string(),
    );

    validation.finish(scenario_name)
}
