use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub confidence_floor: f64,
    pub detection_timeout_ms: u64,
    /// 0 means one worker per available core
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub target_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlobConfig {
    pub blur_sigma: f32,
    pub min_area_fraction: f32,
    pub max_area_fraction: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.5,
            detection_timeout_ms: 10_000,
            workers: 0,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            min_dimension: 100,
            max_dimension: 4000,
            target_size: 640,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            min_area_fraction: 0.0005,
            max_area_fraction: 0.25,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pillcount.db"),
        }
    }
}

impl PipelineConfig {
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Config {
    /// Read a TOML file when a path is given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let floor = self.pipeline.confidence_floor;
        if !(0.0..=1.0).contains(&floor) {
            anyhow::bail!("confidence_floor must lie in [0, 1], got {}", floor);
        }
        if self.pipeline.detection_timeout_ms == 0 {
            anyhow::bail!("detection_timeout_ms must be greater than zero");
        }
        if self.image.min_dimension > self.image.max_dimension {
            anyhow::bail!(
                "min_dimension ({}) exceeds max_dimension ({})",
                self.image.min_dimension,
                self.image.max_dimension
            );
        }
        if self.image.target_size == 0 {
            anyhow::bail!("target_size must be greater than zero");
        }
        if self.blob.min_area_fraction > self.blob.max_area_fraction {
            anyhow::bail!("min_area_fraction exceeds max_area_fraction");
        }
        Ok(())
    }
}
