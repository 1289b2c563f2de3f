use serde::{Deserialize, Serialize};
use crate::best_response::{solve_single_buyer, SingleBuyerInput};
use crate::error::ServiceError;
use crate::minimizer::{ConstrainedMinimizer, SolverConfig};

/// Body of a single-buyer decomposition request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub nr_sellers: usize,
    pub buyer_demand: f64,
    pub sellers_price: Vec<f64>,
    pub sellers_capacity: Vec<f64>,
    pub used_capacities: Vec<f64>,
    /// Older clients send this field misspelled
    #[serde(alias = "hop_distrances")]
    pub hop_distances: Vec<f64>,
}

impl OptimizationRequest {
    /// Parse a JSON body; malformed JSON is reported as invalid input
    pub fn from_json(body: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(body).map_err(|e| ServiceError::InvalidInput(format!("malformed request: {}", e)))
    }

    fn as_input(&self) -> SingleBuyerInput<'_> {
        SingleBuyerInput {
            nr_sellers: self.nr_sellers,
            buyer_demand: self.buyer_demand,
            sellers_price: &self.sellers_price,
            sellers_capacity: &self.sellers_capacity,
            used_capacities: &self.used_capacities,
            hop_distances: &self.hop_distances,
        }
    }
}

/// Successful response: amount to buy from each seller, rounded to 4 decimals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResponse {
    pub solution: Vec<f64>,
}

/// Answer a decomposition request: how much the buyer should take from each seller
pub fn optimal_energy_decomposition(
    request: &OptimizationRequest,
    config: &SolverConfig,
    minimizer: &dyn ConstrainedMinimizer,
) -> Result<OptimizationResponse, ServiceError> {
    let solution = solve_single_buyer(&request.as_input(), minimizer, config)?;
    Ok(OptimizationResponse { solution })
}
