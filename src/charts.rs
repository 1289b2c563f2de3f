use plotters::prelude::*;
use std::error::Error;
use std::ops::Range;
use std::path::Path;
use crate::simulation::SimulationOutcome;

/// Y-axis range covering all values with a little headroom; flat series get a unit-wide band
fn value_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    if max - min < 1e-9 {
        return min - 0.5..max + 0.5;
    }
    let pad = (max - min) * 0.05;
    min - pad..max + pad
}

/// Two panels: decentralized system cost against the social optimum, and each buyer's cost
pub fn generate_cost_trajectory_chart(outcome: &SimulationOutcome, filename: &Path) -> Result<(), Box<dyn Error>> {
    let decentralized = &outcome.decentralized;
    if decentralized.system_cost_trajectory.is_empty() {
        return Err("Cannot draw cost trajectory: no iterations recorded".into());
    }
    if let Some(parent) = filename.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let x_max = decentralized.system_cost_trajectory.len().saturating_sub(1).max(1) as f64;
    let optimum = outcome.centralized.system_cost;

    let root = BitMapBackend::new(filename, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(600);

    // System cost
    {
        let y_range = value_range(decentralized.system_cost_trajectory.iter().chain(std::iter::once(&optimum)));
        let mut chart = ChartBuilder::on(&left)
            .caption("System cost", ("sans-serif", 25))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..x_max, y_range)?;

        chart.configure_mesh()
            .x_desc("Iteration")
            .y_desc("Cost")
            .draw()?;

        chart.draw_series(LineSeries::new(
            decentralized.system_cost_trajectory.iter().enumerate().map(|(i, &c)| (i as f64, c)),
            &BLUE,
        ))?
        .label("Decentralized")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

        chart.draw_series(LineSeries::new(
            vec![(0.0, optimum), (x_max, optimum)],
            &BLACK.mix(0.5),
        ))?
        .label(format!("Centralized: {:.4}", optimum))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK.mix(0.5)));

        chart.configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    // Individual costs
    {
        let y_range = value_range(decentralized.individual_cost_trajectory.iter().flatten());
        let mut chart = ChartBuilder::on(&right)
            .caption("Individual cost per buyer", ("sans-serif", 25))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..x_max, y_range)?;

        chart.configure_mesh()
            .x_desc("Iteration")
            .y_desc("Cost")
            .draw()?;

        for buyer in 0..outcome.market.nr_buyers {
            let color = Palette99::pick(buyer).to_rgba();
            chart.draw_series(LineSeries::new(
                decentralized
                    .individual_cost_trajectory
                    .iter()
                    .enumerate()
                    .map(|(i, costs)| (i as f64, costs[buyer])),
                color,
            ))?
            .label(format!("Buyer {}", buyer))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        chart.configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_range_pads_and_handles_flat_series() {
        let range = value_range(&[10.0, 20.0]);
        assert!(range.start < 10.0 && range.end > 20.0);

        let flat = value_range(&[3.0, 3.0]);
        assert_eq!(flat, 2.5..3.5);

        let empty: [f64; 0] = [];
        assert_eq!(value_range(&empty), 0.0..1.0);
    }
}
