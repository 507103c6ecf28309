use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use wod_core::strategy::RpeConstraints;
use wod_core::sweep::SweepReport;
use wod_core::*;

#[derive(Parser)]
#[command(name = "wodsim")]
#[command(about = "Workout simulation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override config file location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one scenario file (JSON or TOML)
    Run {
        scenario: PathBuf,

        /// Target RPE, replacing the scenario's day state and constraints
        #[arg(long)]
        rpe: Option<f64>,

        /// Swap in a benchmark workout (fran, helen, cindy), keeping the athlete
        #[arg(long)]
        preset: Option<String>,

        /// Write the event timeline to this CSV file
        #[arg(long)]
        timeline: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the pacing constraints derived from a target RPE
    Constraints {
        #[arg(long)]
        rpe: f64,
    },

    /// Run a scenario across a grid of variants in parallel
    Sweep {
        scenario: PathBuf,

        /// Comma-separated target RPEs
        #[arg(long, value_delimiter = ',', conflicts_with = "scales")]
        rpe_grid: Vec<f64>,

        /// Comma-separated capability scale factors
        #[arg(long, value_delimiter = ',')]
        scales: Vec<f64>,

        /// Print runs and summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or create the config file
    Config {
        /// Write the built-in defaults to the config path
        #[arg(long)]
        init: bool,
    },
}

const DEFAULT_SCALES: [f64; 5] = [0.8, 0.9, 1.0, 1.1, 1.2];

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose == 0 {
        wod_core::logging::init();
    } else {
        wod_core::logging::init_with_level(wod_core::logging::level_for_verbosity(cli.verbose));
    }

    match cli.command {
        Commands::Run {
            scenario,
            rpe,
            preset,
            timeline,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_command(
                &config,
                &scenario,
                rpe,
                preset.as_deref(),
                timeline.as_deref(),
                json,
            )?;
        }
        Commands::Constraints { rpe } => {
            let config = load_config(cli.config.as_deref())?;
            let constraints = RpeConstraints::from_rpe(rpe, &config.calibration.rpe)?;
            print_constraints(&constraints);
        }
        Commands::Sweep {
            scenario,
            rpe_grid,
            scales,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            sweep_command(&config, &scenario, &rpe_grid, &scales, json)?;
        }
        Commands::Config { init } => {
            let path = cli.config.unwrap_or_else(Config::default_config_path);
            config_command(&path, init)?;
        }
    }

    Ok(())
}

/// An explicit --config path must exist; the default path may be absent
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn run_command(
    config: &Config,
    scenario_path: &Path,
    rpe: Option<f64>,
    preset: Option<&str>,
    timeline: Option<&Path>,
    json: bool,
) -> Result<()> {
    let mut scenario = load_scenario(scenario_path)?;
    if let Some(name) = preset {
        scenario.workout = Wod::benchmark(name).ok_or_else(|| {
            Error::InvalidWorkout(format!(
                "unknown benchmark '{}' (expected one of: {})",
                name,
                BENCHMARKS.join(", ")
            ))
        })?;
    }
    let catalog = scenario.catalog()?;

    let mut inputs = scenario.inputs();
    if let Some(rpe) = rpe {
        inputs = inputs.with_rpe(rpe);
        inputs.constraints = None;
    }

    let result = simulate(&inputs, &catalog, &config.simulation, &config.calibration)?;

    if let Some(path) = timeline {
        write_timeline_csv(&result, path)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&scenario.workout, &result);
        if let Some(path) = timeline {
            println!("  Timeline: {}", path.display());
            println!();
        }
    }

    Ok(())
}

fn sweep_command(
    config: &Config,
    scenario_path: &Path,
    rpe_grid: &[f64],
    scales: &[f64],
    json: bool,
) -> Result<()> {
    let scenario = load_scenario(scenario_path)?;
    let catalog = scenario.catalog()?;
    let base = scenario.inputs();

    let plan = if !rpe_grid.is_empty() {
        SweepPlan::rpe_grid(&base, rpe_grid)
    } else if !scales.is_empty() {
        SweepPlan::capability_scales(&base, scales)
    } else {
        SweepPlan::capability_scales(&base, &DEFAULT_SCALES)
    };

    let report = run_sweep(&plan, &catalog, &config.simulation, &config.calibration);

    if json {
        println!("{}", serde_json::to_string_pretty(&sweep_json(&report))?);
    } else {
        print_sweep(&scenario.workout, &report);
    }

    Ok(())
}

fn config_command(path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            println!("Config already exists: {}", path.display());
            return Ok(());
        }
        Config::default().save_to(path)?;
        println!("✓ Wrote default config to {}", path.display());
    } else if path.exists() {
        // Parse it so a broken file is reported here rather than on the next run
        Config::load_from(path)?;
        println!("Config: {} (valid)", path.display());
    } else {
        println!("Config: {} (not found, using defaults)", path.display());
    }
    Ok(())
}

fn sweep_json(report: &SweepReport) -> serde_json::Value {
    let runs: Vec<serde_json::Value> = report
        .runs
        .iter()
        .map(|run| match &run.outcome {
            Ok(result) => serde_json::json!({
                "label": run.label,
                "total_time": result.total_time,
                "completed": result.completed,
                "rounds_completed": result.rounds_completed,
                "total_reps": result.total_reps,
            }),
            Err(e) => serde_json::json!({
                "label": run.label,
                "error": e.to_string(),
            }),
        })
        .collect();

    serde_json::json!({
        "runs": runs,
        "summary": report.summary,
    })
}

/// Format seconds as m:ss.s
fn clock(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, seconds - minutes * 60.0)
}

fn kind_label(kind: WorkoutKind) -> &'static str {
    match kind {
        WorkoutKind::ForTime => "FOR TIME",
        WorkoutKind::Amrap => "AMRAP",
    }
}

fn print_result(wod: &Wod, result: &SimulationResult) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {} ({})", wod.name, kind_label(wod.kind));
    println!("╰─────────────────────────────────────────╯");
    println!();

    match wod.kind {
        WorkoutKind::ForTime if result.completed => {
            println!("  Time:      {}", clock(result.total_time));
        }
        WorkoutKind::ForTime => {
            println!("  Time:      {} (capped)", clock(result.total_time));
        }
        WorkoutKind::Amrap => {
            println!(
                "  Score:     {} rounds + {} reps",
                result.rounds_completed, result.partial_reps
            );
        }
    }
    println!(
        "  Completed: {}",
        if result.completed { "yes" } else { "no" }
    );
    println!("  Rounds:    {}", result.rounds_completed);
    println!("  Reps:      {}", result.total_reps);
    println!();

    if !result.round_splits.is_empty() {
        println!("  Splits:");
        for split in &result.round_splits {
            println!(
                "    Round {:<3} {:>8}  ({} reps, ends {})",
                split.round,
                clock(split.duration()),
                split.reps,
                clock(split.end)
            );
        }
        println!();
    }

    if !result.diagnostics.is_empty() {
        println!("  ⚠ {} numeric diagnostics:", result.diagnostics.len());
        for diagnostic in &result.diagnostics {
            println!(
                "    {:>8}  {} ({} -> {})",
                clock(diagnostic.at_seconds),
                diagnostic.context,
                diagnostic.value,
                diagnostic.clamped_to
            );
        }
        println!();
    }
}

fn print_constraints(constraints: &RpeConstraints) {
    println!("Constraints at RPE {:.1}:", constraints.target_rpe);
    println!(
        "  Max load:            {:.0}% 1RM",
        constraints.max_load_pct * 100.0
    );
    println!(
        "  Preferred load:      {:.0}% 1RM",
        constraints.preferred_load_pct * 100.0
    );
    println!(
        "  Set fraction:        {:.0}% of unbroken",
        constraints.preferred_set_fraction * 100.0
    );
    println!(
        "  Min rest:            {:.1}s",
        constraints.min_rest_between_sets
    );
    println!(
        "  Cardio reserve:      {:.0}% W′",
        constraints.cardio_reserve * 100.0
    );
    println!(
        "  Cardio intensity:    {:.2}× CP",
        constraints.cardio_intensity_cap
    );
}

fn print_sweep(wod: &Wod, report: &SweepReport) {
    println!("Sweep: {} ({} variants)", wod.name, report.runs.len());
    println!("─────────────────────────────────────────");
    for run in &report.runs {
        match &run.outcome {
            Ok(result) => println!(
                "  {:<10} {:>8}  {:>4} reps  {}",
                run.label,
                clock(result.total_time),
                result.total_reps,
                if result.completed { "✓" } else { "capped" }
            ),
            Err(e) => println!("  {:<10} error: {}", run.label, e),
        }
    }
    println!("─────────────────────────────────────────");

    let summary = &report.summary;
    println!(
        "  {} runs, {} completed, {} failed",
        summary.runs, summary.completed, summary.failed
    );
    if let Some(time) = &summary.time {
        println!(
            "  Time: mean {}  median {}  p10 {}  p90 {}",
            clock(time.mean),
            clock(time.median),
            clock(time.p10),
            clock(time.p90)
        );
        println!("  Range: {} to {}", clock(time.min), clock(time.max));
    }
    if let Some(reps) = summary.mean_total_reps {
        println!("  Mean reps: {:.1}", reps);
    }
}
