//! `ghost health`: configuration, storage, server and model checks.

use crate::api::{HealthReport, OllamaClient};
use crate::config::Config;
use crate::error::{exit_code, GhostError, Result};
use crate::store::ThreadStore;
use std::io::Write;
use tempfile::NamedTempFile;

#[derive(Debug)]
pub struct Check {
    pub name: &'static str,
    pub result: Result<String>,
}

impl Check {
    fn new(name: &'static str, result: Result<String>) -> Self {
        Self { name, result }
    }

    pub fn line(&self) -> String {
        match &self.result {
            Ok(detail) => format!("ok    {:<8} {detail}", self.name),
            Err(error) => format!("FAIL  {:<8} {error}", self.name),
        }
    }
}

pub fn check_config(config: Result<Config>) -> (Check, Option<Config>) {
    match config.and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => {
            let detail = format!("host {} model {}", config.host, config.model);
            (Check::new("config", Ok(detail)), Some(config))
        }
        Err(error) => (Check::new("config", Err(error)), None),
    }
}

/// The store opens and a temp file can be created next to the documents.
pub fn check_data_dir(config: &Config) -> Check {
    let result = ThreadStore::open(&config.data_dir).and_then(|store| {
        let dir = store.threads_dir();
        NamedTempFile::new_in(dir)
            .map(|_| format!("{} is writable", dir.display()))
            .map_err(|e| GhostError::storage(dir, e))
    });
    Check::new("data", result)
}

pub fn check_models(report: &HealthReport, config: &Config) -> Check {
    let mut wanted = vec![config.model.as_str()];
    if config.vision_model != config.model {
        wanted.push(config.vision_model.as_str());
    }
    let result = match wanted.iter().find(|model| !report.has_model(model)) {
        Some(missing) => Err(GhostError::ModelUnavailable((*missing).to_string())),
        None => Ok(format!("{} installed", wanted.join(", "))),
    };
    Check::new("model", result)
}

/// Print one line per check; the exit code is the first failure's.
pub async fn run_health<W: Write>(config: Result<Config>, out: &mut W) -> Result<i32> {
    let mut checks = Vec::new();
    let (config_check, config) = check_config(config);
    checks.push(config_check);

    if let Some(config) = config {
        checks.push(check_data_dir(&config));
        let server = match OllamaClient::new(&config) {
            Ok(client) => client.health().await,
            Err(error) => Err(error),
        };
        match server {
            Ok(report) => {
                checks.push(Check::new(
                    "server",
                    Ok(format!("{} (version {})", config.host, report.version)),
                ));
                checks.push(check_models(&report, &config));
            }
            Err(error) => checks.push(Check::new("server", Err(error))),
        }
    }

    for check in &checks {
        writeln!(out, "{}", check.line()).map_err(|e| GhostError::io("writing health report", e))?;
    }
    Ok(first_failure_code(&checks))
}

pub fn first_failure_code(checks: &[Check]) -> i32 {
    checks
        .iter()
        .find_map(|check| check.result.as_ref().err().map(GhostError::exit_code))
        .unwrap_or(exit_code::OK)
}
