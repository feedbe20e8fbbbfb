//! simcal CLI - calibrate simulator parameters against observed time series.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use sc_data::{CsvLoader, ParameterTable};
use sc_engine::ProcessSimulator;
use sc_optimizer::{CalibrationConfig, Optimizer, ParamResults};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simcal")]
#[command(version)]
#[command(about = "Multi-objective parameter calibration for an external simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the parameter space and write the best parameters per metric
    Optimize {
        /// Calibration config (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory containing the simulator's `run` executable
        #[arg(short, long)]
        model: PathBuf,

        /// Ground-truth CSV with a day-of-year column
        #[arg(short, long)]
        ground: PathBuf,

        /// Directory holding parameters.csv and configuration.csv
        #[arg(long, default_value = "../DBG")]
        param_dir: PathBuf,

        /// Root directory for run outputs
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// JSON file whose "parameters" object overrides base parameter columns
        #[arg(long)]
        base_params: Option<PathBuf>,

        /// Show simulator stdout/stderr
        #[arg(long)]
        capture_output: bool,
    },

    /// Copy one metric's best parameters into a config file's "parameters"
    Apply {
        /// Config file to update in place
        #[arg(short, long)]
        config: PathBuf,

        /// results.json from an optimize run
        #[arg(short, long)]
        results: PathBuf,

        /// Optimization name whose parameters are copied
        #[arg(short, long)]
        key: String,
    },
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Copy `src` to `dst`, refusing to overwrite.
fn copy_new(src: &Path, dst: &Path) -> Result<()> {
    let content = std::fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .with_context(|| format!("Failed to create {}", dst.display()))?;
    file.write_all(&content)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn optimize(
    input: &Path,
    model: &Path,
    ground: &Path,
    param_dir: &Path,
    output: &Path,
    base_params: Option<&Path>,
    capture_output: bool,
) -> Result<()> {
    let config = CalibrationConfig::from_json_file(input)
        .with_context(|| format!("Failed to load config from {}", input.display()))?;

    let run_name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .context("Input path has no file name")?
        .to_string();
    let run_dir = output
        .join(&run_name)
        .join(Local::now().format("%Y%m%d_%H%M%S").to_string());
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create {}", run_dir.display()))?;
    copy_new(input, &run_dir.join("config.json"))?;

    let mut params = ParameterTable::load_csv(param_dir.join("parameters.csv"))
        .context("Failed to load base parameters")?;
    let model_config = std::fs::canonicalize(param_dir.join("configuration.csv"))
        .with_context(|| format!("No configuration.csv in {}", param_dir.display()))?;

    if let Some(path) = base_params {
        let value = read_json(path)?;
        let Some(overrides) = value.get("parameters").and_then(|v| v.as_object()) else {
            bail!("{} has no \"parameters\" object", path.display());
        };
        let count = params.apply_overrides(overrides)?;
        info!("Applied {} base parameter overrides from {}", count, path.display());
    }

    let ground = CsvLoader::new()
        .load_table(ground)
        .context("Failed to load ground truth")?;

    let model_dir = std::fs::canonicalize(model)
        .with_context(|| format!("Model directory {} not found", model.display()))?;
    let simulator = ProcessSimulator::new(model_dir, model_config, params, config.population)?
        .with_capture_output(capture_output);

    let optimizer = Optimizer::from_config(run_name, &config, &ground)?;
    let outcome = optimizer.run(&simulator)?;

    let results_file = run_dir.join("results.json");
    outcome.results.to_json_file(&results_file)?;

    println!("\n=== Calibration Complete ===");
    println!("Trials:      {}", outcome.status.total_trials());
    println!("Completed:   {}", outcome.status.trials_completed);
    println!("Failed:      {}", outcome.status.trials_failed);
    for (name, result) in outcome.results.iter() {
        println!("{}: {:?}", name, result.scores.get(name));
    }
    println!("Results:     {}", results_file.display());
    Ok(())
}

fn apply(config_path: &Path, results_path: &Path, key: &str) -> Result<()> {
    let results = ParamResults::load(results_path)
        .with_context(|| format!("Failed to load results from {}", results_path.display()))?;
    let parameters = results.parameters_for(key)?;

    let mut config = read_json(config_path)?;
    let Some(object) = config.as_object_mut() else {
        bail!("{} is not a JSON object", config_path.display());
    };
    object.insert("parameters".to_string(), serde_json::to_value(parameters)?);

    std::fs::write(config_path, serde_json::to_string_pretty(&config)? + "\n")
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    info!(
        "Copied {} parameters for {} into {}",
        parameters.len(),
        key,
        config_path.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Optimize {
            input,
            model,
            ground,
            param_dir,
            output,
            base_params,
            capture_output,
        } => optimize(
            &input,
            &model,
            &ground,
            &param_dir,
            &output,
            base_params.as_deref(),
            capture_output,
        ),
        Commands::Apply {
            config,
            results,
            key,
        } => apply(&config, &results, &key),
    }
}
