mod allocation;
mod best_response;
mod centralized;
mod charts;
mod cli;
mod config;
mod cost;
mod error;
mod game;
mod generator;
mod logger;
mod market;
mod minimizer;
mod results;
mod scenarios;
mod service;
mod simulation;
mod utils;

use clap::Parser;
use std::error::Error;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use cli::{Cli, Commands, DecomposeArgs, ScenarioArgs, SimulateArgs};
use generator::{MarketGenerator, RandomMarketGenerator};
use logger::{ConsoleReceiver, LogEvent, Logger, sanitize_filename};
use market::MarketModel;
use minimizer::ClarabelMinimizer;
use scenarios::get_scenario_catalog;
use service::{optimal_energy_decomposition, OptimizationRequest};
use simulation::Simulation;
use utils::TOTAL_SIMULATION_RUNS;

fn main() {
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::List => {
            for scenario in get_scenario_catalog() {
                println!("{}", scenario.short_name);
            }
            0
        }
        Commands::Scenario(args) => run_scenarios(&args),
        Commands::Simulate(args) => match simulate(&args) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Decompose(args) => decompose(&args),
    };
    std::process::exit(exit_code);
}

/// Run the named scenario (or all of them) once per seed; returns the process exit code
fn run_scenarios(args: &ScenarioArgs) -> i32 {
    let all_scenarios = get_scenario_catalog();
    let scenarios: Vec<_> = if args.name == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == args.name) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                eprintln!("Error: Scenario '{}' not found.", args.name);
                eprintln!("Available scenarios:");
                for s in &all_scenarios {
                    eprintln!("  - {}", s.short_name);
                }
                return 1;
            }
        }
    };

    // Individual checks are only shown for a single run of a single scenario
    let mut logger = Logger::new();
    if args.name != "all" && args.iterations == 1 {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    }
    let summary_receiver_id = logger.add_file_receiver(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation]);

    TOTAL_SIMULATION_RUNS.store(0, Ordering::Relaxed);
    if args.iterations > 1 {
        logln!(&mut logger, LogEvent::Validation, "Running '{}' with {} seeds starting at {}...\n", args.name, args.iterations, args.start);
    } else {
        logln!(&mut logger, LogEvent::Validation, "Running '{}' with seed {}...\n", args.name, args.start);
    }

    let mut failures = 0;
    'scenarios: for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);
        let scenario_receiver_id = logger.add_file_receiver(
            &PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name))),
            vec![LogEvent::Scenario],
        );

        for seed in args.start..(args.start + args.iterations) {
            if args.iterations > 1 {
                log!(&mut logger, LogEvent::Validation, "[{}/{}] ", seed - args.start + 1, args.iterations);
            }

            match (scenario.run)(scenario.short_name, seed, &mut logger) {
                Ok(()) => {
                    if args.iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✓");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                    }
                }
                Err(e) => {
                    failures += 1;
                    if args.iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✗");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                    }

                    if args.fastbreak {
                        if let Some(id) = scenario_receiver_id {
                            logger.remove_receiver(id);
                        }
                        logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                        logln!(&mut logger, LogEvent::Validation, "Error with seed {}: {}", seed, e);
                        break 'scenarios;
                    }
                }
            }
            let _ = logger.flush();
        }

        if let Some(id) = scenario_receiver_id {
            logger.remove_receiver(id);
        }
    }

    logln!(
        &mut logger,
        LogEvent::Validation,
        "\nTotal simulation runs completed: {}",
        TOTAL_SIMULATION_RUNS.load(Ordering::Relaxed)
    );
    if let Some(id) = summary_receiver_id {
        logger.remove_receiver(id);
    }

    if failures > 0 {
        1
    } else {
        0
    }
}

/// One market through both optimizers, printed to the console
fn simulate(args: &SimulateArgs) -> Result<(), Box<dyn Error>> {
    let market = match &args.market {
        Some(path) => MarketModel::from_json_file(path)?,
        None => RandomMarketGenerator::new(args.market_params(), args.seed)?.generate()?,
    };

    let mut logger = Logger::new();
    let events = if args.verbose {
        vec![LogEvent::Solver, LogEvent::Iteration, LogEvent::Convergence, LogEvent::Game]
    } else {
        vec![LogEvent::Convergence, LogEvent::Game]
    };
    logger.add_receiver(ConsoleReceiver::new(events));

    market.printout(&mut logger);
    let outcome = Simulation::new(args.game_config(), &ClarabelMinimizer).run(&market, &mut logger)?;

    logln!(&mut logger, LogEvent::Game, "\nCentralized allocation:");
    for row in outcome.centralized.allocation.rows() {
        logln!(&mut logger, LogEvent::Game, "  {:?}", row.iter().map(|x| utils::round_to(*x, 2)).collect::<Vec<_>>());
    }
    logln!(&mut logger, LogEvent::Game, "Decentralized allocation:");
    for row in outcome.decentralized.allocation.rows() {
        logln!(&mut logger, LogEvent::Game, "  {:?}", row.iter().map(|x| utils::round_to(*x, 2)).collect::<Vec<_>>());
    }

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&outcome)?)?;
        println!("Wrote {}", path.display());
    }
    if let Some(path) = &args.chart {
        charts::generate_cost_trajectory_chart(&outcome, path)?;
        println!("Generated: {}", path.display());
    }
    Ok(())
}

/// Single-buyer request/response; the error body goes to stdout like a service response would
fn decompose(args: &DecomposeArgs) -> i32 {
    let body = match &args.request {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body).map(|_| body)
        }
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            eprintln!("Error: cannot read request: {}", e);
            return 1;
        }
    };

    let response = OptimizationRequest::from_json(&body)
        .and_then(|request| optimal_energy_decomposition(&request, &minimizer::SolverConfig::default(), &ClarabelMinimizer));
    match response {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) => {
            println!("{}", e.body());
            eprintln!("status {}", e.status_code());
            1
        }
    }
}
