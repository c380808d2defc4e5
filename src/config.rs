use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Environment variable that points at an alternate config file
pub const CONFIG_PATH_ENV: &str = "PERFDATA_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub google: GoogleConfig,
    pub tiktok: TikTokConfig,
    pub validator: ValidatorConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Count substituted for a privacy-censored `< 10` conversion value
    pub censored_imputation: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            censored_imputation: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TikTokConfig {
    /// TikTok exports no revenue column; revenue = conversions * this
    pub revenue_per_conversion: f64,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            revenue_per_conversion: 80.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Range findings are warnings; when set they still fail the overall verdict
    pub range_violations_block_exit: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            range_violations_block_exit: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub year: i32,
    pub meta_duplicate_rows: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            year: 2024,
            meta_duplicate_rows: 30,
        }
    }
}

impl Config {
    /// Load `config.toml` (or `$PERFDATA_CONFIG`); defaults apply when the file is absent.
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path.trim()),
            _ => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_path(default_path)
                } else {
                    debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.tiktok.revenue_per_conversion.is_finite() || self.tiktok.revenue_per_conversion < 0.0 {
            return Err(PipelineError::Config(format!(
                "tiktok.revenue_per_conversion must be a non-negative number, got {}",
                self.tiktok.revenue_per_conversion
            )));
        }
        Ok(())
    }

    pub fn raw_path(&self, file: &str) -> PathBuf {
        self.paths.raw_dir.join(file)
    }

    pub fn processed_path(&self, file: &str) -> PathBuf {
        self.paths.processed_dir.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[google]\ncensored_imputation = 3\n").unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.google.censored_imputation, 3);
        assert_eq!(config.tiktok.revenue_per_conversion, 80.0);
        assert_eq!(config.paths.processed_dir, PathBuf::from("data/processed"));
        assert!(config.validator.range_violations_block_exit);
    }

    #[test]
    fn test_negative_revenue_per_conversion_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[tiktok]\nrevenue_per_conversion = -1.0\n").unwrap();

        let err = Config::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("revenue_per_conversion"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let err = Config::from_path("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
