// Pipeline configuration loaded once from YAML and never mutated afterwards.

use crate::error::PipelineError;
use crate::timestamp::Timestamp;
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration consumed by the pipeline and the trainer
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub outlier_caps: OutlierCaps,
    #[serde(default)]
    pub rfm: RfmConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Upper clip values applied by the cleaner
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutlierCaps {
    #[serde(rename = "Amount", alias = "amount")]
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RfmConfig {
    /// Reference instant for Recency, ISO date or date-time
    #[serde(default = "default_snapshot_date")]
    pub snapshot_date: String,
}

/// Clustering stage settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RiskConfig {
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,
    /// Cluster id whose members are labeled high risk
    #[serde(default)]
    pub risk_cluster: usize,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrainingConfig {
    /// Fraction of customers held out for testing
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

fn default_snapshot_date() -> String {
    "2019-12-31".to_string()
}

fn default_n_clusters() -> usize {
    3
}

fn default_random_state() -> u64 {
    42
}

fn default_test_size() -> f64 {
    0.2
}

impl Default for RfmConfig {
    fn default() -> Self {
        Self {
            snapshot_date: default_snapshot_date(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            n_clusters: default_n_clusters(),
            risk_cluster: 0,
            random_state: default_random_state(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            random_state: default_random_state(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outlier_caps: OutlierCaps { amount: 1_000_000.0 },
            rfm: RfmConfig::default(),
            risk: RiskConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a YAML file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from an in-memory YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PipelineError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.outlier_caps.amount.is_finite() {
            return Err(PipelineError::InvalidConfig(
                "outlier_caps.Amount must be a finite number".to_string(),
            ));
        }
        if Timestamp::parse(&self.rfm.snapshot_date).is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "rfm.snapshot_date `{}` is not an ISO date",
                self.rfm.snapshot_date
            )));
        }
        if self.risk.n_clusters == 0 {
            return Err(PipelineError::InvalidConfig(
                "risk.n_clusters must be at least 1".to_string(),
            ));
        }
        if self.risk.risk_cluster >= self.risk.n_clusters {
            return Err(PipelineError::InvalidConfig(format!(
                "risk.risk_cluster {} is out of range for {} clusters",
                self.risk.risk_cluster, self.risk.n_clusters
            )));
        }
        if !(self.training.test_size > 0.0 && self.training.test_size < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "training.test_size {} must lie strictly between 0 and 1",
                self.training.test_size
            )));
        }
        Ok(())
    }
}
