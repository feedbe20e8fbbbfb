//! End-to-end calibration against a shell-script simulator.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use sc_data::{CsvLoader, ParameterTable};
use sc_engine::ProcessSimulator;
use sc_optimizer::{CalibrationConfig, Optimizer, ParamResults, SENTINEL_SCORE};
use serde_json::json;
use tempfile::TempDir;

/// Writes the population row's p50 as every PD value. Fails when p50 > -1.
const SIMULATOR: &str = r#"#!/bin/sh
p50=$(awk -F, -v row="$3" 'NR==1{for(i=1;i<=NF;i++) if($i=="p50") c=i} NR==row+1{print $c}' "$1")
if awk -v v="$p50" 'BEGIN{exit !(v > -1)}'; then
    exit 1
fi
out="$4/timesteps_output_1_2_3.csv"
echo "julian-day,PD" > "$out"
for day in 200 201 202 203 204; do
    echo "$day,$p50" >> "$out"
done
"#;

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let base = root.path();

        std::fs::create_dir(base.join("model")).unwrap();
        let run = base.join("model").join("run");
        std::fs::write(&run, SIMULATOR).unwrap();
        std::fs::set_permissions(&run, std::fs::Permissions::from_mode(0o755)).unwrap();

        std::fs::create_dir(base.join("DBG")).unwrap();
        std::fs::write(
            base.join("DBG").join("parameters.csv"),
            "i_sp,i_region,i_site,p50\n1,2,3,-2.5\n",
        )
        .unwrap();
        std::fs::write(base.join("DBG").join("configuration.csv"), "setting,value\n").unwrap();

        // Day 200 is outside the window and would dominate the error.
        std::fs::write(
            base.join("ground.csv"),
            "julian-day,PD\n200,-100\n201,-2.0\n202,-2.0\n203,NA\n204,-2.0\n",
        )
        .unwrap();

        let config = json!({
            "space": {"p50": ["uniform", [-4.0, 0.0]]},
            "metric": {
                "metrics": ["mse", "mae"],
                "params": ["PD-A", "PD-B"],
                "modes": ["min", "max"]
            },
            "num_worker": 3,
            "num_samples": 16,
            "start_day": 201,
            "end_day": 236,
            "strategy": "random",
            "seed": 11
        });
        std::fs::write(base.join("calib.json"), config.to_string()).unwrap();

        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

fn find_results(run_root: &Path) -> PathBuf {
    let run_dir = std::fs::read_dir(run_root)
        .unwrap()
        .next()
        .expect("no run directory created")
        .unwrap()
        .path();
    run_dir.join("results.json")
}

#[test]
fn calibration_picks_best_trial_per_metric() {
    let fixture = Fixture::new();

    let config = CalibrationConfig::from_json_file(fixture.path("calib.json")).unwrap();
    let ground = CsvLoader::new().load_table(fixture.path("ground.csv")).unwrap();
    let params = ParameterTable::load_csv(fixture.path("DBG/parameters.csv")).unwrap();
    let simulator = ProcessSimulator::new(
        fixture.path("model"),
        fixture.path("DBG/configuration.csv"),
        params,
        config.population,
    )
    .unwrap();

    let optimizer = Optimizer::from_config("calib", &config, &ground).unwrap();
    assert_eq!(optimizer.evaluator().slice_len("PD-A"), Some(3));

    let outcome = optimizer.run(&simulator).unwrap();
    assert_eq!(outcome.trials.len(), 16);
    assert_eq!(
        outcome.status.trials_completed + outcome.status.trials_failed,
        16
    );

    for trial in &outcome.trials {
        let p50 = trial.parameters["p50"];
        if p50 > -1.0 {
            assert!(trial.is_failed());
            assert_eq!(trial.metrics.get("PD-A"), Some(SENTINEL_SCORE));
            assert_eq!(trial.metrics.get("PD-B"), Some(-SENTINEL_SCORE));
        } else {
            assert!(!trial.is_failed());
            let expected = (p50 + 2.0).powi(2);
            assert!((trial.metrics.get("PD-A").unwrap() - expected).abs() < 1e-9);
        }
    }

    let best_p50 = outcome.results.parameters_for("PD-A").unwrap()["p50"];
    for trial in outcome.trials.iter().filter(|t| !t.is_failed()) {
        assert!((best_p50 + 2.0).abs() <= (trial.parameters["p50"] + 2.0).abs());
    }
}

#[test]
fn cli_optimize_then_apply() {
    let fixture = Fixture::new();
    let bin = env!("CARGO_BIN_EXE_simcal");

    let status = Command::new(bin)
        .arg("optimize")
        .arg("--input")
        .arg(fixture.path("calib.json"))
        .arg("--model")
        .arg(fixture.path("model"))
        .arg("--ground")
        .arg(fixture.path("ground.csv"))
        .arg("--param-dir")
        .arg(fixture.path("DBG"))
        .arg("--output")
        .arg(fixture.path("out"))
        .status()
        .unwrap();
    assert!(status.success());

    let results_file = find_results(&fixture.path("out").join("calib"));
    let results = ParamResults::load(&results_file).unwrap();
    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["PD-A", "PD-B"]);

    let copied = results_file.with_file_name("config.json");
    let original: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fixture.path("calib.json")).unwrap())
            .unwrap();
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&copied).unwrap()).unwrap();
    assert_eq!(saved, original);

    let target = fixture.path("apply.json");
    std::fs::write(&target, r#"{"population": 1, "parameters": {"p50": 0.0}}"#).unwrap();
    let status = Command::new(bin)
        .arg("apply")
        .arg("--config")
        .arg(&target)
        .arg("--results")
        .arg(&results_file)
        .arg("--key")
        .arg("PD-A")
        .status()
        .unwrap();
    assert!(status.success());

    let applied: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(applied["population"], 1);
    assert_eq!(
        applied["parameters"]["p50"].as_f64().unwrap(),
        results.parameters_for("PD-A").unwrap()["p50"]
    );

    let status = Command::new(bin)
        .arg("apply")
        .arg("--config")
        .arg(&target)
        .arg("--results")
        .arg(&results_file)
        .arg("--key")
        .arg("missing")
        .status()
        .unwrap();
    assert!(!status.success());
}
