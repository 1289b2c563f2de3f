use std::sync::atomic::AtomicU64;

/// Number of decimals kept in allocations returned to external callers
pub const SOLUTION_DECIMALS: i32 = 4;

/// Total number of full game runs (centralized + decentralized) performed by this process
pub static TOTAL_SIMULATION_RUNS: AtomicU64 = AtomicU64::new(0);

/// Round half away from zero to the given number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Derive the seed of one random stream from the run seed
/// Keeps independent streams (capacities, prices, demands, hops) stable when one of them changes
pub fn stream_seed(run_seed: u64, stream: u64) -> u64 {
    run_seed.wrapping_mul(1_000_003).wrapping_add(stream)
}
