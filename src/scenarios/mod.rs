use std::error::Error;
use crate::allocation::AllocationMatrix;
use crate::errln;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::market::MarketModel;

/// Function type for scenario entry functions
/// `seed` drives every random market the scenario builds
pub type ScenarioFn = fn(scenario_name: &str, seed: u64, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

inventory::collect!(ScenarioEntry);

/// Get all registered scenarios from the catalog, sorted by name
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut entries: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>
        .into_iter()
        .cloned()
        .collect();
    entries.sort_by_key(|entry| entry.short_name);
    entries
}

/// Collects the outcome of the checks of one scenario
#[derive(Default)]
pub struct Validation {
    errors: Vec<String>,
}

impl Validation {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Log `msg` as passed, or record it as an error
    pub fn check(&mut self, logger: &mut Logger, passed: bool, msg: String) {
        if passed {
            logln!(logger, LogEvent::Scenario, "✓ {}", msg);
        } else {
            errln!(logger, LogEvent::Scenario, "{}", msg);
            self.errors.push(msg);
        }
    }

    /// Row sums match demand and no seller carries more than its capacity
    pub fn check_feasible(&mut self, logger: &mut Logger, label: &str, market: &MarketModel, allocation: &AllocationMatrix) {
        let worst_row = (0..market.nr_buyers)
            .map(|b| (allocation.row_sum(b) - market.buyer_demand[b]).abs())
            .fold(0.0, f64::max);
        self.check(
            logger,
            worst_row <= 1e-2,
            format!("{}: every row sums to its demand (worst gap {:.2e})", label, worst_row),
        );

        let worst_overload = allocation
            .loads()
            .iter()
            .zip(&market.seller_capacity)
            .map(|(load, capacity)| load - capacity)
            .fold(f64::NEG_INFINITY, f64::max);
        self.check(
            logger,
            worst_overload <= 1e-4,
            format!("{}: no seller over capacity (worst load minus capacity {:.2e})", label, worst_overload),
        );
    }

    pub fn finish(self, scenario_name: &str) -> Result<(), Box<dyn Error>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, self.errors.join("\n")).into())
        }
    }
}

// Scenario modules
pub mod single_seller;
pub mod request_two_sellers;
pub mod price_of_anarchy;
pub mod early_stop_rules;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryReceiver;

    #[test]
    fn test_catalog_lists_all_scenarios() {
        let names: Vec<&str> = get_scenario_catalog().iter().map(|e| e.short_name).collect();
        assert_eq!(names, vec!["early_stop_rules", "price_of_anarchy", "request_two_sellers", "single_seller"]);
    }

    #[test]
    fn test_validation_collects_failures() {
        let mut logger = Logger::new();
        let (receiver, buffer) = MemoryReceiver::new(vec![LogEvent::Scenario]);
        logger.add_receiver(receiver);

        let mut validation = Validation::new();
        validation.check(&mut logger, true, "fine".to_string());
        validation.check(&mut logger, false, "broken".to_string());

        assert_eq!(buffer.borrow().as_str(), "✓ fine\nERROR broken\n");
        let error = validation.finish("demo").unwrap_err();
        assert!(error.to_string().contains("broken"));
        assert!(!error.to_string().contains("fine"));
    }

    #[test]
    fn test_every_scenario_passes_with_seed_zero() {
        for entry in get_scenario_catalog() {
            let mut logger = Logger::new();
            let result = (entry.run)(entry.short_name, 0, &mut logger);
            assert!(result.is_ok(), "{}: {:?}", entry.short_name, result.err().map(|e| e.to_string()));
        }
    }
}
