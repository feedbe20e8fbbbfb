//! The simulator as an external process.
//!
//! Each trial gets its own scratch directory holding the parameter file and
//! whatever the simulator writes; the directory is removed when the trial
//! finishes.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sc_data::{CsvLoader, ParameterTable};
use sc_optimizer::{Model, ParameterSet, TrialContext};
use sc_types::{config_error, DataError, ScResult, SimulationError, Table};
use tracing::debug;

/// Parameter table columns that name the simulator's output file.
const SPECIES_COLUMN: &str = "i_sp";
const REGION_COLUMN: &str = "i_region";
const SITE_COLUMN: &str = "i_site";

const PARAM_FILE_NAME: &str = "params.csv";

/// Simulator entry point inside the model directory.
const RUN_EXECUTABLE: &str = "run";

/// Launches `./run <param_file> <config_file> <population> <output_dir>`
/// inside the model directory and loads the time-step output it produces.
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    /// Absolute, so the launch path does not depend on the child's cwd.
    model_dir: PathBuf,
    config_file: PathBuf,
    base_params: ParameterTable,
    population: usize,
    capture_output: bool,
    loader: CsvLoader,
}

impl ProcessSimulator {
    /// `population` is the 1-based parameter table row each trial overwrites.
    pub fn new(
        model_dir: impl AsRef<Path>,
        config_file: impl Into<PathBuf>,
        base_params: ParameterTable,
        population: usize,
    ) -> ScResult<Self> {
        if population == 0 || population > base_params.num_rows() {
            return Err(config_error!(
                "population {} is outside the parameter table (1..={})",
                population,
                base_params.num_rows()
            )
            .into());
        }
        // The output file name depends on these; fail before any trial runs.
        for column in [SPECIES_COLUMN, REGION_COLUMN, SITE_COLUMN] {
            base_params.get(population - 1, column)?;
        }

        let model_dir = model_dir.as_ref();
        let model_dir = std::fs::canonicalize(model_dir).map_err(|_| DataError::NotFound {
            path: model_dir.display().to_string(),
        })?;

        Ok(Self {
            model_dir,
            config_file: config_file.into(),
            base_params,
            population,
            capture_output: false,
            loader: CsvLoader::new(),
        })
    }

    /// Let the simulator write to this process's stdout and stderr.
    pub fn with_capture_output(mut self, capture_output: bool) -> Self {
        self.capture_output = capture_output;
        self
    }

    /// The base table with `parameters` written into the population row.
    pub fn trial_parameters(&self, parameters: &ParameterSet) -> ScResult<ParameterTable> {
        let mut table = self.base_params.clone();
        for (name, value) in parameters {
            table.set_f64(self.population - 1, name, *value)?;
        }
        Ok(table)
    }

    /// `timesteps_output_{i_sp}_{i_region}_{i_site}.csv` for the population row.
    pub fn output_file_name(&self, params: &ParameterTable) -> ScResult<String> {
        let row = self.population - 1;
        Ok(format!(
            "timesteps_output_{}_{}_{}.csv",
            params.get(row, SPECIES_COLUMN)?,
            params.get(row, REGION_COLUMN)?,
            params.get(row, SITE_COLUMN)?
        ))
    }

    /// Run one simulation with `scratch` as parameter and output directory.
    pub fn run_in(&self, scratch: &Path, parameters: &ParameterSet) -> ScResult<Table> {
        let params = self.trial_parameters(parameters)?;
        let param_file = scratch.join(PARAM_FILE_NAME);
        params.write_csv(&param_file)?;

        let program = self.model_dir.join(RUN_EXECUTABLE);

        let mut command = Command::new(&program);
        command
            .arg(&param_file)
            .arg(&self.config_file)
            .arg(self.population.to_string())
            .arg(scratch)
            .current_dir(&self.model_dir);
        if !self.capture_output {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        debug!("Launching {:?}", command);
        let status = command.status().map_err(|e| SimulationError::Launch {
            message: format!("{}: {}", program.display(), e),
        })?;
        if !status.success() {
            return Err(SimulationError::NonZeroExit {
                status: status.to_string(),
            }
            .into());
        }

        let output_file = scratch.join(self.output_file_name(&params)?);
        if !output_file.exists() {
            return Err(SimulationError::MissingOutput {
                path: output_file.display().to_string(),
            }
            .into());
        }
        self.loader.load_table(&output_file)
    }
}

impl Model for ProcessSimulator {
    fn run(&self, context: &TrialContext, parameters: &ParameterSet) -> ScResult<Table> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("simcal-{}-", context.trial_number))
            .tempdir()?;
        debug!(
            "Trial {} ({}) scratch directory {}",
            context.trial_number,
            context.id,
            scratch.path().display()
        );
        self.run_in(scratch.path(), parameters)
    }
}
