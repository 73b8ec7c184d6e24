//! localflow CLI Entry Point
//!
//! Runs the demo cube workflow locally, one instance per value, and drives
//! each instance through its control surface.
//!
//! # Usage
//!
//! ```bash
//! # Cube a few numbers concurrently
//! localflow 1 2 3 4
//!
//! # Self-pausing instance, resumed after half a second
//! localflow 42 --resume-after 500
//!
//! # Instance waiting for a weather event
//! localflow 43 --weather 143
//! localflow 43 --timeout-weather
//!
//! # Fail every step once to exercise replay
//! localflow 2 --flaky --config engine.yaml
//! ```

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use log::{error, info, warn};

use localflow::demo::{CubeParams, CubeWorkflow, MemoryNumberStore, NumberStore, WEATHER_EVENT};
use localflow::execution::{StepMiddleware, ThrowFirstTime};
use localflow::workflow::{load_settings, CreateOptions, EngineSettings, Instance, InstanceStatus, Registry};
use localflow::{APP_NAME, VERSION};

/// Interval at which running instances are checked for pauses and waits.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Command-line configuration parsed from arguments.
#[derive(Debug, Clone, Default)]
struct Config {
    values: Vec<i64>,
    settings_path: Option<String>,
    flaky: bool,
    resume_after: Option<u64>,
    weather: Option<i64>,
    timeout_weather: bool,
    verbose: bool,
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

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Local Workflow Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: localflow [OPTIONS] <VALUE>...");
    println!();
    println!("Arguments:");
    println!("  <VALUE>...          Numbers to cube, one workflow instance each");
    println!();
    println!("Options:");
    println!("  --config PATH       Engine settings YAML file");
    println!("  --flaky             Fail every step the first time it completes");
    println!("  --resume-after MS   Resume paused instances after MS milliseconds");
    println!("  --weather N         Send N to instances waiting for '{}'", WEATHER_EVENT);
    println!("  --timeout-weather   Time out the '{}' wait instead", WEATHER_EVENT);
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  localflow 1 2 3 4");
    println!("  localflow 42 --resume-after 500");
    println!("  localflow 43 --weather 143");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
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
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--flaky" => {
                config.flaky = true;
            }
            "--timeout-weather" => {
                config.timeout_weather = true;
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path argument".to_string());
                }
                config.settings_path = Some(args[i].clone());
            }
            "--resume-after" => {
                i += 1;
                if i >= args.len() {
                    return Err("--resume-after requires a number argument".to_string());
                }
                let millis = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid resume delay: {}", args[i]))?;
                config.resume_after = Some(millis);
            }
            "--weather" => {
                i += 1;
                if i >= args.len() {
                    return Err("--weather requires a number argument".to_string());
                }
                let weather = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid weather value: {}", args[i]))?;
                config.weather = Some(weather);
            }
            arg => match arg.parse::<i64>() {
                Ok(value) => config.values.push(value),
                Err(_) if arg.starts_with('-') => {
                    return Err(format!("Unknown option: {}", arg));
                }
                Err(_) => return Err(format!("Invalid value: {}", arg)),
            },
        }
        i += 1;
    }

    if config.values.is_empty() {
        return Err("At least one value is required".to_string());
    }
    if config.weather.is_some() && config.timeout_weather {
        return Err("--weather and --timeout-weather are mutually exclusive".to_string());
    }

    Ok(config)
}

/// Resumes, feeds or times out an instance until it finishes.
async fn supervise(instance: Arc<Instance>, config: Config, enforce_timeouts: bool) {
    loop {
        let status = instance.status();
        if status.is_terminal() {
            return;
        }

        if status == InstanceStatus::Paused {
            match config.resume_after {
                Some(millis) => {
                    info!("Instance '{}' paused; resuming in {} ms", instance.id(), millis);
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    instance.resume();
                }
                None => {
                    warn!(
                        "Instance '{}' paused and --resume-after not given; terminating",
                        instance.id()
                    );
                    instance.terminate();
                }
            }
        }

        if instance.pending_events().iter().any(|event| event == WEATHER_EVENT) {
            if config.timeout_weather {
                instance.trigger_timeout(WEATHER_EVENT);
            } else if let Some(weather) = config.weather {
                if let Err(e) = instance.send_event(WEATHER_EVENT, &weather) {
                    warn!("Could not deliver '{}': {}", WEATHER_EVENT, e);
                }
            } else if !enforce_timeouts {
                warn!(
                    "Instance '{}' waits for '{}' and no --weather was given; terminating",
                    instance.id(),
                    WEATHER_EVENT
                );
                instance.terminate();
            }
        }

        tokio::select! {
            _ = instance.done() => return,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

fn colored_status(status: &InstanceStatus) -> String {
    match status {
        InstanceStatus::Completed => status.to_string().green().bold().to_string(),
        InstanceStatus::Errored { .. } => status.to_string().red().bold().to_string(),
        InstanceStatus::Terminated { .. } => status.to_string().yellow().bold().to_string(),
        _ => status.to_string().cyan().to_string(),
    }
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let settings = match &config.settings_path {
        Some(path) => load_settings(path).map_err(|e| {
            error!("Failed to load settings: {}", e);
            format!("Could not load settings from '{}': {}", path, e)
        })?,
        None => EngineSettings::default(),
    };
    let registry = Arc::new(Registry::with_settings(settings));
    info!(
        "Retry strategy: {:?}, default retry limit: {}",
        registry.settings().retry_strategy,
        registry.settings().default_retry_limit
    );
    let enforce_timeouts = registry.settings().enforce_event_timeouts;
    let store = Arc::new(MemoryNumberStore::new());

    let mut instances = Vec::with_capacity(config.values.len());
    for &value in &config.values {
        let workflow = CubeWorkflow::new(store.clone(), Arc::clone(&registry));
        let options = CreateOptions::new(CubeParams { value });

        let instance = if config.flaky {
            let flaky: Arc<dyn StepMiddleware> = Arc::new(ThrowFirstTime::new());
            registry.create_with_middleware(options, workflow, vec![flaky])?
        } else {
            registry.create(options, workflow)?
        };

        info!("Started instance '{}' for value {}", instance.id(), value);
        let supervisor = tokio::spawn(supervise(
            Arc::clone(&instance),
            config.clone(),
            enforce_timeouts,
        ));
        instances.push((value, instance, supervisor));
    }

    let mut failures = 0;
    for (value, instance, supervisor) in instances {
        instance.done().await;
        if let Err(e) = supervisor.await {
            warn!("Supervisor for '{}' failed: {}", instance.id(), e);
        }

        let status = instance.status();
        if status != InstanceStatus::Completed {
            failures += 1;
        }

        println!();
        println!("Instance {} (value {}): {}", instance.id(), value, colored_status(&status));
        println!("  Status: {}", serde_json::to_string(&status)?);
        match store.get_number(instance.id()).await {
            Some(cube) => println!("  Stored result: {}", cube),
            None => println!("  Stored result: none"),
        }

        let timeline = instance.timeline();
        let mut durations: Vec<_> = timeline.get_durations().into_iter().collect();
        durations.sort();
        for (label, duration) in durations {
            println!("  {:20} {:.2?}", label, duration);
        }

        println!();
        println!("{}", timeline.gantt_chart());
    }

    if failures > 0 {
        return Err(format!("{} of {} instances did not complete", failures, registry.len()).into());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
