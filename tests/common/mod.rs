#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use house_price_pipeline::registry::{ModelUri, Registry, RegistryError, RunInfo, RunStatus};
use house_price_pipeline::schema::{RAW_FEATURES, TARGET};

/// Write a synthetic raw extract with `rows` houses to `<data_dir>/raw/train.csv`.
///
/// Prices are a noisy linear function of living area and quality. A few
/// `NA` cells exercise imputation.
pub fn write_raw_extract(data_dir: &Path, rows: usize) {
    let mut csv = String::from("Id,MSZoning,");
    csv.push_str(&RAW_FEATURES.join(","));
    writeln!(csv, ",{TARGET}").unwrap();

    for i in 0..rows {
        let living = 800.0 + (i * 37 % 1700) as f64;
        let quality = (1 + i % 10) as f64;
        let year_built = 1950 + (i * 7 % 60);
        let mut values = Vec::with_capacity(RAW_FEATURES.len());
        for name in RAW_FEATURES {
            let value = match name {
                "LotArea" => format!("{}", 7000 + i * 13 % 5000),
                "OverallQual" => format!("{quality}"),
                "OverallCond" => format!("{}", 1 + i % 9),
                "YearBuilt" => format!("{year_built}"),
                "YearRemodAdd" => format!("{}", year_built + i % 20),
                "TotalBsmtSF" if i % 11 == 0 => "NA".to_string(),
                "TotalBsmtSF" => format!("{}", 400 + i * 3 % 900),
                "1stFlrSF" => format!("{}", living * 0.6),
                "2ndFlrSF" => format!("{}", living * 0.4),
                "GrLivArea" => format!("{living}"),
                "FullBath" => format!("{}", 1 + i % 3),
                "HalfBath" => format!("{}", i % 2),
                "BedroomAbvGr" => format!("{}", 2 + i % 3),
                "TotRmsAbvGrd" => format!("{}", 5 + i % 5),
                "Fireplaces" => format!("{}", i % 2),
                "GarageCars" if i % 17 == 3 => "NA".to_string(),
                "GarageCars" => format!("{}", i % 4),
                "GarageArea" => format!("{}", (i % 4) * 250),
                "WoodDeckSF" => format!("{}", i * 5 % 300),
                "OpenPorchSF" => format!("{}", i * 3 % 120),
                "PoolArea" => "0".to_string(),
                "YrSold" => format!("{}", 2006 + i % 5),
                "MoSold" => format!("{}", 1 + i % 12),
                other => panic!("unhandled column {other}"),
            };
            values.push(value);
        }
        let price = 20_000.0 + 90.0 * living + 12_000.0 * quality + (i % 7) as f64 * 1_500.0;
        writeln!(csv, "{},RL,{},{price}", i + 1, values.join(",")).unwrap();
    }

    let raw_dir = data_dir.join("raw");
    std::fs::create_dir_all(&raw_dir).unwrap();
    std::fs::write(raw_dir.join("train.csv"), csv).unwrap();
}

#[derive(Debug, Clone)]
pub struct FakeRun {
    pub info: RunInfo,
    pub name: String,
    pub params: Vec<(String, String)>,
    pub metrics: Vec<(String, f64)>,
    pub artifacts: HashMap<String, Vec<u8>>,
    pub status: Option<RunStatus>,
}

/// In-memory registry. Every run gets `artifact_root` followed by its id.
pub struct FakeRegistry {
    pub artifact_root: String,
    pub experiments: RefCell<Vec<String>>,
    pub runs: RefCell<Vec<FakeRun>>,
    /// alias uri -> (run index, artifact path)
    pub aliases: RefCell<HashMap<String, (usize, String)>>,
}

impl FakeRegistry {
    pub fn new(artifact_root: &str) -> Self {
        Self {
            artifact_root: artifact_root.to_string(),
            experiments: RefCell::new(Vec::new()),
            runs: RefCell::new(Vec::new()),
            aliases: RefCell::new(HashMap::new()),
        }
    }

    pub fn run_named(&self, name: &str) -> FakeRun {
        self.runs
            .borrow()
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .unwrap_or_else(|| panic!("no run named {name}"))
    }

    pub fn set_alias(&self, uri: &str, run_name: &str, path: &str) {
        let idx = self.runs.borrow().iter().position(|r| r.name == run_name).unwrap();
        self.aliases.borrow_mut().insert(uri.to_string(), (idx, path.to_string()));
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&mut FakeRun) -> T) -> Result<T, RegistryError> {
        let mut runs = self.runs.borrow_mut();
        let run = runs
            .iter_mut()
            .find(|r| r.info.run_id == run_id)
            .ok_or_else(|| RegistryError::Decode(format!("unknown run {run_id}")))?;
        Ok(f(run))
    }
}

impl Registry for FakeRegistry {
    fn create_experiment(&self, name: &str) -> Result<String, RegistryError> {
        let mut experiments = self.experiments.borrow_mut();
        if experiments.iter().any(|e| e == name) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        experiments.push(name.to_string());
        Ok(experiments.len().to_string())
    }

    fn experiment_id_by_name(&self, name: &str) -> Result<String, RegistryError> {
        self.experiments
            .borrow()
            .iter()
            .position(|e| e == name)
            .map(|i| (i + 1).to_string())
            .ok_or_else(|| RegistryError::Decode(format!("no experiment {name}")))
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo, RegistryError> {
        let mut runs = self.runs.borrow_mut();
        let run_id = format!("run-{}", runs.len() + 1);
        let info = RunInfo {
            artifact_uri: format!("{}{}/artifacts", self.artifact_root, run_id),
            run_id,
            experiment_id: experiment_id.to_string(),
        };
        runs.push(FakeRun {
            info: info.clone(),
            name: run_name.to_string(),
            params: Vec::new(),
            metrics: Vec::new(),
            artifacts: HashMap::new(),
            status: None,
        });
        Ok(info)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), RegistryError> {
        self.with_run(run_id, |r| r.params.push((key.to_string(), value.to_string())))
    }

    fn log_metrics(&self, run_id: &str, metrics: &[(String, f64)]) -> Result<(), RegistryError> {
        self.with_run(run_id, |r| r.metrics.extend_from_slice(metrics))
    }

    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: Vec<u8>) -> Result<(), RegistryError> {
        self.with_run(&run.run_id, |r| {
            r.artifacts.insert(path.to_string(), bytes);
        })
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<(), RegistryError> {
        self.with_run(run_id, |r| r.status = Some(status))
    }

    fn download_model(&self, uri: &ModelUri) -> Result<Vec<u8>, RegistryError> {
        let (idx, path) = self
            .aliases
            .borrow()
            .get(&uri.to_string())
            .cloned()
            .ok_or_else(|| RegistryError::Api {
                status: 404,
                code: "RESOURCE_DOES_NOT_EXIST".into(),
                message: format!("no alias {uri}"),
            })?;
        self.runs.borrow()[idx]
            .artifacts
            .get(&path)
            .cloned()
            .ok_or_else(|| RegistryError::Decode(format!("no artifact {path}")))
    }
}
