use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use jrsim::config::load_robot_config;
use jrsim::export::summary::{RunSummary, write_summary};
use jrsim::export::{table, writer_for_path};
use jrsim::model::{Controls, JumpingRobot};
use jrsim::simulator::{CollocationScheme, JRSimulator, Trajectory};
use tracing_subscriber::EnvFilter;

/// Simulate a pneumatic jumping robot from a YAML or TOML description.
#[derive(Parser, Debug)]
#[command(author, version, about = "Pneumatic jumping-robot simulator")]
struct Cli {
    /// Robot description (.yaml, .yml or .toml)
    #[arg(long, default_value = "configs/jumping_robot.yaml")]
    config: PathBuf,

    /// Number of steps (defaults to the configured count)
    #[arg(long)]
    steps: Option<usize>,

    /// Step length in seconds (defaults to the configured step)
    #[arg(long)]
    dt: Option<f64>,

    /// Valve open times in seconds, one per actuator, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    open: Vec<f64>,

    /// Valve close times in seconds, one per actuator, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    close: Vec<f64>,

    /// Collocation scheme (defaults to the configured scheme)
    #[arg(long, value_enum)]
    collocation: Option<SchemeArg>,

    /// Stop at the apex of the jump
    #[arg(long, default_value_t = false)]
    apex: bool,

    /// Write the per-step table to this CSV file (`-` for stdout)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the run summary to this JSON file (`-` for stdout)
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Copy, Clone, ValueEnum, Debug)]
enum SchemeArg {
    Euler,
    Trapezoidal,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_robot_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let mut simulator = JRSimulator::from_config(&config)?;
    if let Some(scheme) = cli.collocation {
        simulator = simulator.with_scheme(match scheme {
            SchemeArg::Euler => CollocationScheme::Euler,
            SchemeArg::Trapezoidal => CollocationScheme::Trapezoidal,
        });
    }
    let jr = simulator.robot();

    let controls = if cli.open.is_empty() && cli.close.is_empty() {
        jr.controls_from_schedule(&config.simulation.valve_schedule)?
    } else {
        Controls::new(&cli.open, &cli.close)?
    };
    let steps = cli.steps.unwrap_or(config.simulation.num_steps);
    let dt = cli.dt.unwrap_or(config.simulation.dt_s);
    anyhow::ensure!(dt > 0.0, "--dt must be positive, got {dt}");

    let outcome = if cli.apex {
        simulator.simulate_to_apex(steps, dt, &controls)
    } else {
        simulator.simulate(steps, dt, &controls)
    };

    match outcome {
        Ok(trajectory) => {
            write_outputs(&cli, jr, &trajectory, true)?;
            Ok(())
        }
        Err(failure) => {
            // Whatever was solved before the failure is still worth inspecting.
            write_outputs(&cli, jr, &failure.partial, false)?;
            Err(anyhow::Error::new(failure))
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn write_outputs(cli: &Cli, jr: &JumpingRobot, trajectory: &Trajectory, report: bool) -> anyhow::Result<()> {
    let summary = RunSummary::from_trajectory(jr, trajectory)?;
    if let Some(path) = &cli.csv {
        let writer = writer_for_path(path).with_context(|| format!("failed to open {}", path.display()))?;
        table::write_trajectory(writer, jr, trajectory)?;
    }
    if let Some(path) = &cli.summary {
        let writer = writer_for_path(path).with_context(|| format!("failed to open {}", path.display()))?;
        write_summary(writer, &summary)?;
    }

    let to_stdout = |path: &Option<PathBuf>| path.as_deref().is_some_and(|p| p.as_os_str() == "-");
    if !report || to_stdout(&cli.csv) || to_stdout(&cli.summary) {
        return Ok(());
    }

    println!("=== Jump Summary ===");
    println!("Collocation    : {}", summary.collocation);
    println!(
        "Steps          : {} ({:.4} s)",
        summary.num_steps, summary.final_time_s
    );
    for phase in &summary.phases {
        println!(
            "Phase          : {:<6} from step {:>4} for {:>4} steps ({:.4} s)",
            phase.regime, phase.start_step, phase.num_steps, phase.duration_s
        );
    }
    println!(
        "Torso height   : max {:.4} m at step {}",
        summary.apex_height_m, summary.apex_height_step
    );
    if let Some(step) = summary.apex_step {
        println!("Apex           : step {step}");
    }
    for (name, pressure) in &summary.peak_pressures_pa {
        println!("Peak pressure  : {name:<8} {:.1} kPa", pressure / 1000.0);
    }
    if !summary.violations.is_empty() {
        println!("Violations     : {}", summary.violations.len());
    }
    Ok(())
}
