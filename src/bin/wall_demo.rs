use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use wall_detector::{AlgorithmConfig, DirectorySink, PipelineExecutor, PipelineInput};

#[derive(Clone, Deserialize)]
pub struct RuntimeConfig {
    pub input_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub job_id: String,
    pub selected_layers: BTreeSet<String>,
    #[serde(default)]
    pub algorithm: Option<AlgorithmConfig>,
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let config: RuntimeConfig = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
    Ok(config)
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = load_config(Path::new(&config_path))?;

    let document = fs::read_to_string(&config.input_path)
        .map_err(|e| format!("Failed to read input {}: {e}", config.input_path.display()))?;

    let sink = DirectorySink::new(&config.artifact_dir);
    let executor = PipelineExecutor::new(
        config.job_id.clone(),
        config.algorithm.unwrap_or_default(),
    );
    let report = executor.run(
        PipelineInput {
            document,
            selected_layers: config.selected_layers,
        },
        &sink,
    );

    for stage in &report.stages {
        println!(
            "{:28} {:?} ({:.1} ms)",
            stage.stage, stage.status, stage.metrics.duration_ms
        );
    }
    if report.completed {
        println!(
            "Artifacts written to {}",
            config.artifact_dir.join(&report.job_id).display()
        );
        Ok(())
    } else {
        Err("pipeline halted before completion".to_string())
    }
}

fn usage() -> String {
    "Usage: wall_demo <config.json>".to_string()
}
