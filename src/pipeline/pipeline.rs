use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::processing::derive::derive_metrics;
use crate::pipeline::processing::normalize::{canonicalize, ParserRegistry};
use crate::pipeline::storage::write_canonical;
use crate::types::{IntermediateTable, Platform};

/// Result of one platform's parse -> derive -> canonicalize -> write run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub platform: Platform,
    pub source_file: String,
    pub rows: usize,
    /// Rows whose conversions were not reported (absent, not zero)
    pub absent_conversions: usize,
    /// Rows repeating an earlier (date, campaign[, ad group]) key; kept, not removed
    pub duplicate_keys: usize,
    pub output_file: String,
    /// SHA-256 of the canonical file; equal across reruns on the same input
    pub sha256: String,
}

/// Count rows whose row key was already seen
pub fn duplicate_key_count(table: &IntermediateTable) -> usize {
    let mut seen = HashSet::new();
    table
        .rows
        .iter()
        .filter(|row| {
            let ad_group = row.field("ad_group_name").and_then(|c| c.as_text()).unwrap_or("");
            !seen.insert((row.date, row.campaign_name.as_str(), ad_group))
        })
        .count()
}

pub struct Pipeline;

impl Pipeline {
    /// Run the full chain for one platform. Input and output locations come
    /// from `config.paths`.
    #[instrument(skip(config, registry), fields(platform = %platform))]
    pub fn run_platform(config: &Config, registry: &ParserRegistry, platform: Platform) -> Result<PipelineResult> {
        let source = config.raw_path(platform.raw_file());
        let output = config.processed_path(platform.canonical_file());
        Self::run(registry, platform, &source, &output)
    }

    pub fn run(registry: &ParserRegistry, platform: Platform, source: &Path, output: &Path) -> Result<PipelineResult> {
        info!("🚀 Cleaning {} export {}", platform, source.display());

        // Step 1: Parse
        let mut table = registry.parse(platform, source)?;
        let absent_conversions = table.rows.iter().filter(|r| r.conversions.is_none()).count();

        let duplicate_keys = duplicate_key_count(&table);
        if duplicate_keys > 0 {
            warn!(
                "{} {} rows repeat an earlier date/campaign key; they are kept as exported",
                duplicate_keys, platform
            );
            metrics::parser::duplicate_keys(platform.slug(), duplicate_keys);
        }

        // Step 2: Derive ratios, then project onto the canonical schema
        derive_metrics(&mut table);
        let records = canonicalize(&table)?;

        // Step 3: Persist
        let sha256 = write_canonical(output, platform, &records)?;
        metrics::derive::canonical_rows_written(platform.slug(), records.len());
        info!("💾 Saved {} {} rows to {}", records.len(), platform, output.display());

        Ok(PipelineResult {
            platform,
            source_file: source.display().to_string(),
            rows: records.len(),
            absent_conversions,
            duplicate_keys,
            output_file: output.display().to_string(),
            sha256,
        })
    }

    /// Run each platform independently; one failing source does not stop the others
    pub fn run_all(config: &Config, platforms: &[Platform]) -> Vec<(Platform, Result<PipelineResult>)> {
        let registry = ParserRegistry::new(config);
        platforms
            .iter()
            .map(|platform| {
                let result = Self::run_platform(config, &registry, *platform);
                if let Err(e) = &result {
                    error!("{} pipeline failed: {}", platform, e);
                }
                (*platform, result)
            })
            .collect()
    }
}
