//! Synthetic raw exports for one calendar year.
//!
//! Each platform module knows its export layout and the data-quality issues
//! real exports carry (untracked conversions, privacy censoring, re-exported
//! duplicates, learning-phase ad groups). Output is deterministic for a seed.

pub mod google;
pub mod meta;
pub mod seasonality;
pub mod tiktok;

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{Config, GeneratorConfig};
use crate::error::{PipelineError, Result};
use crate::types::Platform;

pub use seasonality::{Multipliers, PeakEvent, SeasonalityConfig};

/// Multiply `base` by uniform noise with relative standard deviation `rel_sd`
pub(crate) fn jitter<R: Rng + ?Sized>(rng: &mut R, base: f64, rel_sd: f64) -> f64 {
    // A uniform on [1 - w, 1 + w] has standard deviation w / sqrt(3)
    let width = (rel_sd * 3f64.sqrt()).min(1.0);
    base * rng.gen_range((1.0 - width)..=(1.0 + width))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Every day of `year`
pub fn year_dates(year: i32) -> Result<Vec<NaiveDate>> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| PipelineError::Config(format!("generator year {} is out of range", year)))?;
    Ok(start.iter_days().take_while(|d| d.year() == year).collect())
}

/// Inputs shared by the per-platform generators
pub struct GeneratorContext {
    pub dates: Vec<NaiveDate>,
    pub seasonality: SeasonalityConfig,
    pub rng: StdRng,
}

impl GeneratorContext {
    pub fn new(config: &GeneratorConfig, seasonality: SeasonalityConfig) -> Result<Self> {
        Ok(Self {
            dates: year_dates(config.year)?,
            seasonality,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    pub fn date(&self, month: u32, day: u32) -> Option<NaiveDate> {
        let year = self.dates.first()?.year();
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedFile {
    pub platform: Platform,
    pub path: PathBuf,
    pub rows: usize,
}

fn write_export(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Write all three raw exports into `config.paths.raw_dir`
pub fn generate(config: &Config) -> Result<Vec<GeneratedFile>> {
    generate_with(config, SeasonalityConfig::retail(config.generator.year))
}

pub fn generate_with(config: &Config, seasonality: SeasonalityConfig) -> Result<Vec<GeneratedFile>> {
    let mut ctx = GeneratorContext::new(&config.generator, seasonality)?;
    let mut files = Vec::with_capacity(Platform::ALL.len());

    for platform in Platform::ALL {
        let (bytes, rows) = match platform {
            Platform::Meta => meta::export(&mut ctx, config.generator.meta_duplicate_rows)?,
            Platform::Google => google::export(&mut ctx, config.generator.year)?,
            Platform::TikTok => tiktok::export(&mut ctx)?,
        };

        let path = config.raw_path(platform.raw_file());
        write_export(&path, &bytes)?;
        info!("Generated {} {} rows at {}", rows, platform, path.display());
        files.push(GeneratedFile { platform, path, rows });
    }

    Ok(files)
}

/// CSV-encode a header and rows
pub(crate) fn encode<I>(header: &[&str], rows: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

/// `--` for an absent value
pub(crate) fn or_missing<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| crate::constants::MISSING_SENTINEL.to_string())
}

pub(crate) fn money(value: f64) -> String {
    format!("{:.2}", value)
}
