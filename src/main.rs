//! Schedule Runner - test schedule execution tool
//!
//! Runs the tasks of every schedule entry on the entry's guest through an
//! external test harness, serially or in parallel, and reports the overall
//! result.
//!
//! ## Usage
//!
//! ```bash
//! # Run a schedule, one entry at a time
//! schedule-runner run schedule.yaml
//!
//! # Run entries in parallel, at most 4 at once
//! schedule-runner run schedule.yaml --parallel --max-workers 4
//!
//! # Override the overall result with custom rules
//! schedule-runner run schedule.yaml --result-map result-map.yaml
//!
//! # Check a schedule file
//! schedule-runner validate schedule.yaml
//!
//! # Print an example configuration
//! schedule-runner config example
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use schedule_runner::cli::{self, Args, Command, ConfigAction};
use schedule_runner::config::{print_env_help, AppConfig, EnvConfig, ScheduleFile};
use schedule_runner::executor::{ScheduleRunner, TaskSetRunner};
use schedule_runner::harness::{CommandHarness, JsonResultParser, TracingEventSink, YamlJobBuilder};
use schedule_runner::output::{write_report, OutputFormat, ScheduleFormatter};
use schedule_runner::results::{overall_result, ResultMap, RuleEvaluator};
use schedule_runner::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        env.log_level
            .as_deref()
            .and_then(LogLevel::from_str)
            .unwrap_or(LogLevel::Info)
    };
    init_logger(level);

    match args.command {
        Command::Run(run_args) => {
            if !run_schedule(run_args, &env).await? {
                std::process::exit(1);
            }
        }
        Command::Validate(validate_args) => {
            validate_schedule(validate_args, &env)?;
        }
        Command::Config(config_args) => {
            manage_config(config_args, &env)?;
        }
    }

    Ok(())
}

/// File from the command line, the environment, or the default location
fn load_config(path: Option<&Path>, env: &EnvConfig) -> Result<AppConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| env.config_file.as_ref().map(PathBuf::from))
        .or_else(AppConfig::find);

    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            AppConfig::load(&path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?
        }
        None => AppConfig::default(),
    };

    config.apply_env(env);
    Ok(config)
}

fn build_runner(config: &AppConfig) -> ScheduleRunner {
    let events = Arc::new(TracingEventSink);

    let task_sets = TaskSetRunner::new(
        &config.harness.capability,
        Arc::new(CommandHarness::new(config.harness.clone())),
        Arc::new(YamlJobBuilder),
        Arc::new(JsonResultParser),
    )
    .with_config(config.task_set.clone())
    .with_events(events.clone());

    ScheduleRunner::new()
        .with_runner(Arc::new(task_sets))
        .parallelize(config.parallelize)
        .max_workers(config.max_workers)
        .with_events(events)
}

/// Returns whether the schedule passed
async fn run_schedule(args: cli::RunArgs, env: &EnvConfig) -> Result<bool> {
    let mut config = load_config(args.config.as_deref(), env)?;

    config.parallelize |= args.parallel;
    if args.max_workers.is_some() {
        config.max_workers = args.max_workers;
    }
    config.task_set.on_error_continue |= args.on_error_continue;
    config.task_set.on_error_snapshot |= args.on_error_snapshot;
    config.task_set.ignore_benign_failures |= args.ignore_benign_failures;
    config.result_maps.extend(args.result_maps);
    config.validate()?;

    let format = OutputFormat::from_str(&args.format)
        .with_context(|| format!("Unknown output format: {}", args.format))?;

    let mut schedule = ScheduleFile::load(&args.schedule)?.to_schedule()?;
    let evaluator = ResultMap::load(&config.result_maps)
        .context("Failed to load result maps")?
        .into_evaluator();

    info!(
        "Running {} schedule entries ({})",
        schedule.len(),
        if config.parallelize {
            "parallel"
        } else {
            "serial"
        }
    );

    let outcome = build_runner(&config).run(&mut schedule).await;

    if schedule.pending() == 0 {
        let rules = (!evaluator.is_empty()).then_some(&evaluator as &dyn RuleEvaluator);
        let result = overall_result(&mut schedule, rules)?;
        info!("Overall result: {}", result);

        let formatter = if args.no_color {
            ScheduleFormatter::new(format).no_color()
        } else {
            ScheduleFormatter::new(format)
        };
        println!("{}", formatter.format_schedule(&schedule));

        if let Some(ref output) = args.output {
            write_report(output, &schedule, format)?;
            println!("Report saved to {output}");
        }
    }

    outcome?;
    Ok(schedule.result().is_success())
}

fn validate_schedule(args: cli::ValidateArgs, env: &EnvConfig) -> Result<()> {
    let config = load_config(args.config.as_deref(), env)?;
    config.validate()?;

    let schedule = ScheduleFile::load(&args.schedule)?.to_schedule()?;
    build_runner(&config).check(&schedule)?;

    println!(
        "✓ Schedule is valid: {} ({} entries)",
        args.schedule.display(),
        schedule.len()
    );
    println!("\n{}", schedule_runner::output::schedule_table(&schedule));

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, env: &EnvConfig) -> Result<()> {
    let render = |config: &AppConfig, format: &str| -> Result<String> {
        Ok(if format == "json" {
            serde_json::to_string_pretty(config)?
        } else {
            serde_yaml::to_string(config)?
        })
    };

    match args.action {
        ConfigAction::Example { format } => {
            println!("{}", render(&AppConfig::example(), &format)?);
        }

        ConfigAction::Show { config } => {
            let config = load_config(config.as_deref(), env)?;
            println!("{}", render(&config, "yaml")?);
        }

        ConfigAction::Env => print_env_help(),
    }

    Ok(())
}
