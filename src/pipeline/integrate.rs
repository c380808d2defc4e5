//! Concatenate the three canonical files into one table, in source order
//! (Meta, Google, TikTok). No deduplication, no re-derivation: values are
//! copied as persisted.

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::constants::{CANONICAL_BASE_FIELDS, EXTENSION_FIELD_ORDER};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::storage::{write_table, CanonicalTable};
use crate::types::Platform;

#[derive(Debug, Clone)]
pub struct IntegrationResult {
    pub output_file: PathBuf,
    pub rows_per_platform: Vec<(Platform, usize)>,
    pub sha256: String,
}

impl IntegrationResult {
    pub fn total_rows(&self) -> usize {
        self.rows_per_platform.iter().map(|(_, n)| n).sum()
    }
}

/// Base fields followed by every extension field in a fixed order
pub fn integrated_header() -> Vec<String> {
    CANONICAL_BASE_FIELDS
        .iter()
        .chain(EXTENSION_FIELD_ORDER.iter())
        .map(|f| f.to_string())
        .collect()
}

/// Read all three canonical files from `processed_dir` and write `output`.
/// Every canonical file must exist.
#[instrument(skip_all, fields(dir = %processed_dir.display()))]
pub fn integrate(processed_dir: &Path, output: &Path) -> Result<IntegrationResult> {
    let tables = Platform::ALL
        .iter()
        .map(|p| -> Result<(Platform, CanonicalTable)> {
            Ok((*p, CanonicalTable::load(&processed_dir.join(p.canonical_file()))?))
        })
        .collect::<Result<Vec<_>>>()?;

    let header = integrated_header();
    let mut rows = Vec::new();
    let mut rows_per_platform = Vec::with_capacity(tables.len());

    for (platform, table) in &tables {
        let positions = header
            .iter()
            .map(|field| table.column(field))
            .collect::<Vec<_>>();

        let missing: Vec<&str> = CANONICAL_BASE_FIELDS
            .iter()
            .filter(|f| table.column(f).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::schema(
                *platform,
                format!("{} lacks base fields: {}", table.path.display(), missing.join(", ")),
            ));
        }

        for record in &table.rows {
            rows.push(
                positions
                    .iter()
                    .map(|pos| pos.and_then(|i| record.get(i)).unwrap_or("").to_string())
                    .collect::<Vec<_>>(),
            );
        }
        rows_per_platform.push((*platform, table.rows.len()));
    }

    let sha256 = write_table(output, &header, &rows)?;
    metrics::integrator::rows_written(rows.len());
    info!("Integrated {} rows into {}", rows.len(), output.display());

    Ok(IntegrationResult {
        output_file: output.to_path_buf(),
        rows_per_platform,
        sha256,
    })
}
