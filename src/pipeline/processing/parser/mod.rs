//! Source parsers: one per platform, each turning a raw export into an
//! [`IntermediateTable`] with that platform's documented column set.

pub mod decode;
pub mod google;
pub mod meta;
pub mod tiktok;

use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::time::Instant;

use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::types::{IntermediateTable, Platform};

pub use google::GoogleParser;
pub use meta::MetaParser;
pub use tiktok::TikTokParser;

pub trait SourceParser: Send + Sync {
    /// Platform this parser reads exports for
    fn platform(&self) -> Platform;

    /// Intermediate column set the parser emits, in order
    fn columns(&self) -> &'static [&'static str];

    fn parse(&self, path: &Path) -> Result<IntermediateTable>;
}

/// A wrapper that adds metrics to any parser implementation
pub struct MetricsParser<P: SourceParser> {
    inner: P,
}

impl<P: SourceParser> MetricsParser<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: SourceParser> SourceParser for MetricsParser<P> {
    fn platform(&self) -> Platform {
        self.inner.platform()
    }

    fn columns(&self) -> &'static [&'static str] {
        self.inner.columns()
    }

    fn parse(&self, path: &Path) -> Result<IntermediateTable> {
        let platform = self.inner.platform().slug();
        let start_time = Instant::now();

        let result = self.inner.parse(path);
        metrics::parser::duration(platform, start_time.elapsed().as_secs_f64());

        match &result {
            Ok(table) => {
                metrics::parser::rows_parsed(platform, table.rows.len());
                let absent = table.rows.iter().filter(|r| r.conversions.is_none()).count();
                metrics::parser::absent_conversions(platform, absent);
            }
            Err(e) => metrics::parser::parse_error(platform, error_kind(e)),
        }
        result
    }
}

fn error_kind(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::SourceUnavailable { .. } => "source_unavailable",
        PipelineError::SchemaViolation { .. } => "schema_violation",
        PipelineError::DecodeError { .. } => "decode_error",
        _ => "io",
    }
}

/// Open a raw export, reporting a missing file by path
pub(crate) fn open_source(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| PipelineError::unavailable(path, e))
}

pub(crate) fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| PipelineError::unavailable(path, e))
}

/// Column lookup for exports with a labeled header row
pub(crate) struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Fails with a schema violation naming every required label that is missing
    pub fn new(platform: Platform, headers: &StringRecord, required: &[&str]) -> Result<Self> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), i))
            .collect();

        let missing: Vec<&str> = required
            .iter()
            .filter(|label| !positions.contains_key(**label))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::schema(
                platform,
                format!("missing required columns: {}", missing.join(", ")),
            ));
        }

        Ok(Self { positions })
    }

    pub fn get<'r>(&self, record: &'r StringRecord, label: &str) -> &'r str {
        self.positions
            .get(label)
            .and_then(|i| record.get(*i))
            .unwrap_or("")
    }
}

/// 1-based source line of a record, falling back to its ordinal
pub(crate) fn record_line(record: &StringRecord, fallback: u64) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(fallback)
}

/// A labeled-export row whose field count differs from the header is a
/// schema violation at that line; other CSV failures pass through.
pub(crate) fn labeled_record(
    platform: Platform,
    result: csv::Result<StringRecord>,
    fallback_line: u64,
) -> Result<StringRecord> {
    result.map_err(|e| {
        let detail = match e.kind() {
            csv::ErrorKind::UnequalLengths { pos, expected_len, len } => Some(format!(
                "line {}: expected {} fields, found {}",
                pos.as_ref().map(|p| p.line()).unwrap_or(fallback_line),
                expected_len,
                len
            )),
            _ => None,
        };
        match detail {
            Some(detail) => PipelineError::schema(platform, detail),
            None => PipelineError::Csv(e),
        }
    })
}
