//! Settings loaded from YAML, with a default for every field

use crate::node::models::Protocol;
use crate::node::output::OutputFormat;
use crate::node::pipeline::PipelineConfig;
use crate::node::prober::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_MS};
use crate::node::source::FetcherConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Probing
    pub concurrency: usize,
    pub timeout: u64,
    pub protocols: Vec<Protocol>,

    // Sources
    pub sources: Vec<String>,
    pub fetch_timeout: u64,

    // Output
    pub output: String,
    pub output_format: OutputFormat,
    pub report: Option<String>,

    // Logging
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT_MS,
            protocols: Protocol::ALL.to_vec(),
            sources: vec![],
            fetch_timeout: 30,
            output: "valid_nodes.txt".to_string(),
            output_format: OutputFormat::Base64,
            report: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid settings in {:?}", path))?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;
        Ok(())
    }

    pub fn get_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_allowed_protocols(self.protocols.clone())
            .with_concurrency(self.concurrency)
            .with_timeout(self.get_timeout_duration())
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::new().with_timeout(Duration::from_secs(self.fetch_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.concurrency, 200);
        assert_eq!(config.get_timeout_duration(), Duration::from_secs(3));
        assert_eq!(config.protocols.len(), 4);
        assert_eq!(config.output_format, OutputFormat::Base64);
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "concurrency: 50").unwrap();
        writeln!(file, "protocols: [ss, trojan]").unwrap();
        writeln!(file, "output_format: plain").unwrap();
        writeln!(file, "sources:").unwrap();
        writeln!(file, "  - https://example.com/sub").unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.concurrency, 50);
        assert_eq!(config.protocols, vec![Protocol::ShadowSocks, Protocol::Trojan]);
        assert_eq!(config.output_format, OutputFormat::Plain);
        assert_eq!(config.sources, vec!["https://example.com/sub"]);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.output, "valid_nodes.txt");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = Config {
            concurrency: 64,
            timeout: 1500,
            ..Config::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.concurrency, 64);
        assert_eq!(loaded.timeout, 1500);
        assert_eq!(loaded.protocols, Protocol::ALL.to_vec());
    }

    #[test]
    fn test_pipeline_config() {
        let config = Config {
            concurrency: 10,
            timeout: 250,
            protocols: vec![Protocol::VLess],
            ..Config::default()
        };
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.concurrency, 10);
        assert_eq!(pipeline.timeout, Duration::from_millis(250));
        assert_eq!(pipeline.allowed_protocols, vec![Protocol::VLess]);
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.yaml"));
    }
}
