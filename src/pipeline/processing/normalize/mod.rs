//! Canonicalization: select, order and tag the fields of a derived
//! intermediate table to produce [`CanonicalRecord`]s. Intermediate-only
//! columns (reported ratios, learning status text, ...) are dropped here.

pub mod registry;

pub use registry::ParserRegistry;

use tracing::{debug, instrument};

use crate::constants::{EXT_HAS_CONVERSION_TRACKING, EXT_IS_LEARNING, EXT_REACH};
use crate::error::{PipelineError, Result};
use crate::types::{CanonicalRecord, Cell, Extensions, IntermediateRow, IntermediateTable, Platform};

/// Intermediate columns every source must provide
const REQUIRED_INTERMEDIATE: &[&str] = &[
    "date",
    "campaign_name",
    "spend",
    "impressions",
    "clicks",
    "conversions",
    "revenue",
];

#[instrument(skip(table), fields(platform = %table.platform, rows = table.rows.len()))]
pub fn canonicalize(table: &IntermediateTable) -> Result<Vec<CanonicalRecord>> {
    let platform = table.platform;

    let missing: Vec<&str> = REQUIRED_INTERMEDIATE
        .iter()
        .chain(platform.extension_fields().iter())
        .filter(|c| !table.has_column(c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema(
            platform,
            format!("intermediate table lacks canonical fields: {}", missing.join(", ")),
        ));
    }

    let records = table
        .rows
        .iter()
        .map(|row| canonical_record(platform, row))
        .collect::<Result<Vec<_>>>()?;

    debug!("Canonicalized {} {} rows", records.len(), platform);
    Ok(records)
}

fn canonical_record(platform: Platform, row: &IntermediateRow) -> Result<CanonicalRecord> {
    let derived = row.derived.ok_or_else(|| {
        PipelineError::schema(platform, format!("line {}: derived metrics were not computed", row.line))
    })?;

    Ok(CanonicalRecord {
        date: row.date,
        platform,
        campaign_name: row.campaign_name.clone(),
        spend: row.spend,
        impressions: row.impressions,
        clicks: row.clicks,
        conversions: row.conversions,
        revenue: row.revenue,
        ctr: derived.ctr,
        cvr: derived.cvr,
        cpa: derived.cpa,
        roas: derived.roas,
        extensions: extensions(platform, row)?,
    })
}

fn extensions(platform: Platform, row: &IntermediateRow) -> Result<Extensions> {
    match platform {
        Platform::Meta => Ok(Extensions::Meta {
            has_conversion_tracking: flag(platform, row, EXT_HAS_CONVERSION_TRACKING)?,
            reach: match row.field(EXT_REACH) {
                Some(Cell::Count(reach)) => Some(*reach),
                Some(Cell::Absent) => None,
                _ => return Err(malformed(platform, row, EXT_REACH)),
            },
        }),
        Platform::Google => Ok(Extensions::Google),
        Platform::TikTok => Ok(Extensions::TikTok {
            is_learning: flag(platform, row, EXT_IS_LEARNING)?,
        }),
    }
}

fn flag(platform: Platform, row: &IntermediateRow, field: &str) -> Result<bool> {
    row.field(field)
        .and_then(Cell::as_flag)
        .ok_or_else(|| malformed(platform, row, field))
}

fn malformed(platform: Platform, row: &IntermediateRow, field: &str) -> PipelineError {
    PipelineError::schema(
        platform,
        format!("line {}: extension field '{}' is missing or mistyped", row.line, field),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::derive::derive_metrics;
    use crate::pipeline::processing::parser::meta::META_COLUMNS;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn meta_table() -> IntermediateTable {
        IntermediateTable {
            platform: Platform::Meta,
            source_path: PathBuf::from("meta_ads_raw.csv"),
            columns: META_COLUMNS.to_vec(),
            rows: vec![IntermediateRow {
                line: 2,
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                campaign_name: "Always_On_Prospecting".to_string(),
                spend: 50.0,
                impressions: 1000,
                clicks: 30,
                conversions: Some(0),
                revenue: Some(0.0),
                extra: vec![
                    ("cpa_reported", Cell::Absent),
                    ("reach", Cell::Count(800)),
                    ("has_conversion_tracking", Cell::Flag(true)),
                ],
                derived: None,
            }],
        }
    }

    #[test]
    fn test_meta_row_becomes_canonical_with_extensions() {
        let mut table = meta_table();
        derive_metrics(&mut table);

        let records = canonicalize(&table).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.ctr, Some(0.03));
        assert_eq!(record.cvr, None);
        assert_eq!(record.cpa, None);
        assert_eq!(record.roas, None);
        assert_eq!(
            record.extensions,
            Extensions::Meta {
                has_conversion_tracking: true,
                reach: Some(800)
            }
        );
        // Intermediate-only columns never reach the canonical field list
        assert_eq!(record.to_fields().len(), Platform::Meta.canonical_header().len());
    }

    #[test]
    fn test_underived_table_is_rejected() {
        let err = canonicalize(&meta_table()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { .. }));
    }

    #[test]
    fn test_missing_extension_column_is_rejected() {
        let mut table = meta_table();
        table.columns.retain(|c| *c != "reach");
        derive_metrics(&mut table);

        let err = canonicalize(&table).unwrap_err();
        match err {
            PipelineError::SchemaViolation { detail, .. } => assert!(detail.contains("reach")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
