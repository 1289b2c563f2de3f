use clap::{Parser, Subcommand};
use std::path::PathBuf;
use crate::config::{EarlyStop, GameConfig, MarketParams};
use crate::minimizer::SolverConfig;

/// Energy market simulator: social optimum vs. best-response game
#[derive(Parser, Debug)]
#[command(name = "energy-game")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run registered scenarios and validate their outcome
    Scenario(ScenarioArgs),
    /// Run one market through both optimizers
    Simulate(SimulateArgs),
    /// Answer a single-buyer decomposition request (JSON from a file or stdin)
    Decompose(DecomposeArgs),
    /// List registered scenarios
    List,
}

#[derive(Parser, Debug)]
pub struct ScenarioArgs {
    /// Scenario name, or "all"
    pub name: String,

    /// How many seeds to run each scenario with
    #[arg(short = 'n', long, default_value_t = 1)]
    pub iterations: u64,

    /// First seed
    #[arg(long, default_value_t = 0)]
    pub start: u64,

    /// Stop at the first failing run
    #[arg(long)]
    pub fastbreak: bool,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Market as JSON; a random market is generated when omitted
    #[arg(long)]
    pub market: Option<PathBuf>,

    /// Seed of the random market
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[arg(long, default_value_t = MarketParams::default().nr_users)]
    pub nr_users: usize,

    #[arg(long, default_value_t = MarketParams::default().sellers_percentage)]
    pub sellers_percentage: f64,

    #[arg(long, default_value_t = MarketParams::default().supply_low)]
    pub supply_low: u32,

    #[arg(long, default_value_t = MarketParams::default().supply_high)]
    pub supply_high: u32,

    #[arg(long, default_value_t = MarketParams::default().demand_low)]
    pub demand_low: u32,

    #[arg(long, default_value_t = MarketParams::default().demand_high)]
    pub demand_high: u32,

    #[arg(long, default_value_t = MarketParams::default().price_low)]
    pub price_low: f64,

    #[arg(long, default_value_t = MarketParams::default().price_high)]
    pub price_high: f64,

    #[arg(long, default_value_t = MarketParams::default().grid_price)]
    pub grid_price: f64,

    /// Cap on best-response rounds
    #[arg(long, default_value_t = GameConfig::default().max_iterations)]
    pub max_iterations: usize,

    /// Absolute tolerance under which a buyer keeps its previous row
    #[arg(long, default_value_t = GameConfig::default().closeness_tolerance)]
    pub closeness_tolerance: f64,

    #[arg(long, value_enum, default_value_t = EarlyStop::default())]
    pub early_stop: EarlyStop,

    /// Iteration budget of every subproblem solve
    #[arg(long, default_value_t = SolverConfig::default().max_iterations)]
    pub solver_iterations: u32,

    /// Write the full outcome as JSON
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Draw the cost trajectories to a PNG file
    #[arg(long)]
    pub chart: Option<PathBuf>,

    /// Also print every round and subproblem
    #[arg(short, long)]
    pub verbose: bool,
}

impl SimulateArgs {
    pub fn market_params(&self) -> MarketParams {
        MarketParams {
            nr_users: self.nr_users,
            sellers_percentage: self.sellers_percentage,
            supply_low: self.supply_low,
            supply_high: self.supply_high,
            demand_low: self.demand_low,
            demand_high: self.demand_high,
            price_low: self.price_low,
            price_high: self.price_high,
            grid_price: self.grid_price,
        }
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            max_iterations: self.max_iterations,
            closeness_tolerance: self.closeness_tolerance,
            early_stop: self.early_stop,
            solver: SolverConfig {
                max_iterations: self.solver_iterations,
                ..SolverConfig::default()
            },
        }
    }
}

#[derive(Parser, Debug)]
pub struct DecomposeArgs {
    /// Request file; stdin when omitted
    #[arg(long)]
    pub request: Option<PathBuf>,
}
