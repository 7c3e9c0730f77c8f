//! mlplan CLI Entry Point
//!
//! Loads a scenario, expands every wildcard and prints the resulting plan.
//!
//! # Usage
//!
//! ```bash
//! # Plan a scenario relative to the current directory
//! mlplan scenario.yaml
//!
//! # Resolve wildcards against another directory
//! mlplan scenario.yaml --working-dir /data/corpus
//!
//! # Print the plan as JSON
//! mlplan scenario.yaml --json
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use mlplan::plan::Plan;
use mlplan::{load_scenario, FileMatcher, IdGenerator, APP_NAME, VERSION};

/// Default scenario file used when none is specified.
const DEFAULT_SCENARIO: &str = "scenario.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    scenario_path: String,
    working_dir: Option<PathBuf>,
    json: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scenario_path: DEFAULT_SCENARIO.to_string(),
            working_dir: None,
            json: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: mlplan [OPTIONS] <SCENARIO_FILE>");
    println!();
    println!("Arguments:");
    println!("  <SCENARIO_FILE>     Path to scenario YAML file (default: {})", DEFAULT_SCENARIO);
    println!();
    println!("Options:");
    println!("  --working-dir PATH  Resolve relative wildcards against PATH");
    println!("  --json              Print the plan as JSON");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  mlplan pipeline.yaml");
    println!("  mlplan pipeline.yaml --working-dir /data/corpus --json");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--json" => {
                config.json = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--working-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--working-dir requires a path argument".to_string());
                }
                config.working_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.scenario_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Builds the matcher for the requested working directory.
fn setup_matcher(working_dir: Option<PathBuf>) -> Result<FileMatcher, Box<dyn std::error::Error>> {
    let Some(dir) = working_dir else {
        info!("Working directory: {}", env::current_dir()?.display());
        return Ok(FileMatcher::new());
    };

    if !dir.exists() {
        return Err(format!("Working directory does not exist: {}", dir.display()).into());
    }

    if !dir.is_dir() {
        return Err(format!("Path is not a directory: {}", dir.display()).into());
    }

    info!("Working directory: {}", dir.display());
    Ok(FileMatcher::with_root(dir))
}

/// Prints the plan one task per line, in topological order.
fn print_plan(plan: &Plan) {
    println!();
    for task in plan.tasks() {
        let order = task
            .topological_order()
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        println!("{:>4}  {}", order, task);

        if !task.depends_on().is_empty() {
            let prerequisites: Vec<&str> = task
                .depends_on()
                .iter()
                .filter_map(|id| plan.task(*id))
                .map(|t| t.id())
                .collect();
            println!("      after: {}", prerequisites.join(", "));
        }
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    info!("{} v{}", APP_NAME, VERSION);

    let matcher = setup_matcher(config.working_dir)?;
    let plan = Plan::new(Arc::new(IdGenerator::new())).with_matcher(matcher);

    let mut plan = load_scenario(&config.scenario_path, plan).map_err(|e| {
        error!("Failed to load scenario: {}", e);
        format!(
            "Could not load scenario from '{}': {}",
            config.scenario_path, e
        )
    })?;

    plan.expand_all()?;
    info!("Plan ready: {} tasks", plan.len());

    if config.json {
        println!("{}", serde_json::to_string_pretty(&plan.report())?);
    } else {
        print_plan(&plan);
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
