use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use crate::config::MarketParams;
use crate::error::MarketError;
use crate::market::MarketModel;
use crate::utils::stream_seed;

/// Source of market instances for simulations and scenarios
pub trait MarketGenerator {
    fn generate(&mut self) -> Result<MarketModel, MarketError>;
}

/// Random markets drawn from `MarketParams`
///
/// Capacities, prices, demands and hop distances each come from their own seeded stream,
/// so the same seed always produces the same sequence of markets.
pub struct RandomMarketGenerator {
    params: MarketParams,
    rng_capacity: StdRng,
    rng_price: StdRng,
    rng_demand: StdRng,
    rng_hops: StdRng,
}

impl RandomMarketGenerator {
    pub fn new(params: MarketParams, seed: u64) -> Result<Self, MarketError> {
        params.validate()?;
        Ok(Self {
            params,
            rng_capacity: StdRng::seed_from_u64(stream_seed(seed, 1991)),
            rng_price: StdRng::seed_from_u64(stream_seed(seed, 2992)),
            rng_demand: StdRng::seed_from_u64(stream_seed(seed, 3993)),
            rng_hops: StdRng::seed_from_u64(stream_seed(seed, 4994)),
        })
    }
}

impl MarketGenerator for RandomMarketGenerator {
    fn generate(&mut self) -> Result<MarketModel, MarketError> {
        let p = &self.params;
        let nr_sellers = p.nr_sellers();
        let nr_buyers = p.nr_buyers();

        let supply = Uniform::new(p.supply_low, p.supply_high);
        let mut seller_capacity: Vec<f64> = (0..nr_sellers)
            .map(|_| supply.sample(&mut self.rng_capacity) as f64)
            .collect();
        // The grid alone can serve every buyer at its largest possible demand
        seller_capacity.push((nr_buyers as u64 * p.demand_high as u64) as f64);

        let price = Uniform::new(p.price_low, p.price_high);
        let mut seller_price: Vec<f64> = (0..nr_sellers).map(|_| price.sample(&mut self.rng_price)).collect();
        seller_price.push(p.grid_price);

        let demand = Uniform::new(p.demand_low, p.demand_high);
        let buyer_demand: Vec<f64> = (0..nr_buyers)
            .map(|_| demand.sample(&mut self.rng_demand) as f64)
            .collect();

        let hop_distance: Vec<Vec<f64>> = (0..nr_buyers)
            .map(|_| {
                let mut row: Vec<f64> = if nr_sellers > 0 {
                    let hops = Uniform::new(1u32, nr_sellers as u32 + 1);
                    (0..nr_sellers).map(|_| hops.sample(&mut self.rng_hops) as f64).collect()
                } else {
                    Vec::new()
                };
                row.push(1.0);
                row
            })
            .collect();

        MarketModel::new(seller_capacity, seller_price, buyer_demand, hop_distance)
    }
}
