use serde::{Deserialize, Serialize};
use std::fmt;
use crate::allocation::AllocationMatrix;
use crate::cost::CostBreakdown;

/// Costs after one round of the game (round 0 is the all-on-grid start)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub system_cost: f64,
    pub individual_costs: Vec<f64>,
    /// Per buyer: whether its row changed in this round (all false for round 0)
    pub still_adjusting: Vec<bool>,
}

impl IterationRecord {
    pub fn new(costs: CostBreakdown, still_adjusting: Vec<bool>) -> Self {
        Self {
            system_cost: costs.system_cost,
            individual_costs: costs.individual_costs,
            still_adjusting,
        }
    }

    pub fn nr_adjusting(&self) -> usize {
        self.still_adjusting.iter().filter(|&&adjusting| adjusting).count()
    }

    pub fn nr_not_adjusting(&self) -> usize {
        self.still_adjusting.len() - self.nr_adjusting()
    }
}

/// Why the decentralized game stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameTermination {
    /// A full round without any buyer changing its row
    Equilibrium,
    /// The round budget ran out
    IterationCap,
    /// The oscillation heuristic fired
    EarlyStop,
}

impl fmt::Display for GameTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameTermination::Equilibrium => "equilibrium",
            GameTermination::IterationCap => "iteration cap",
            GameTermination::EarlyStop => "early stop",
        };
        write!(f, "{}", name)
    }
}

/// Social optimum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralizedResult {
    pub system_cost: f64,
    pub individual_costs: Vec<f64>,
    pub allocation: AllocationMatrix,
    /// Objective value reported by the solver, before recomputing costs from the allocation
    pub solver_objective: f64,
    pub solver_iterations: u32,
}

/// Outcome of the best-response game with its full trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecentralizedResult {
    pub system_cost: f64,
    pub individual_costs: Vec<f64>,
    pub allocation: AllocationMatrix,
    /// Number of best-response rounds played
    pub iteration_count: usize,
    /// One entry per round, starting with round 0
    pub system_cost_trajectory: Vec<f64>,
    /// Per round, one cost per buyer
    pub individual_cost_trajectory: Vec<Vec<f64>>,
    pub iterations: Vec<IterationRecord>,
    pub termination: GameTermination,
    /// Subproblems that reported non-success or failed outright
    pub solver_warnings: usize,
}

impl DecentralizedResult {
    /// Assemble the result from the round records; the last record holds the final costs
    pub fn from_records(
        allocation: AllocationMatrix,
        iterations: Vec<IterationRecord>,
        termination: GameTermination,
        solver_warnings: usize,
    ) -> Self {
        let system_cost_trajectory: Vec<f64> = iterations.iter().map(|r| r.system_cost).collect();
        let individual_cost_trajectory: Vec<Vec<f64>> = iterations.iter().map(|r| r.individual_costs.clone()).collect();
        let (system_cost, individual_costs) = match iterations.last() {
            Some(last) => (last.system_cost, last.individual_costs.clone()),
            None => (0.0, Vec::new()),
        };
        Self {
            system_cost,
            individual_costs,
            allocation,
            iteration_count: iterations.len().saturating_sub(1),
            system_cost_trajectory,
            individual_cost_trajectory,
            iterations,
            termination,
            solver_warnings,
        }
    }
}
