//! Pipeline metrics
//!
//! Every metric the pipeline records goes through the helpers below, so the
//! names live in one enum instead of being scattered as strings. Without an
//! installed recorder the `metrics` facade turns them into no-ops.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{PipelineError, Result};

/// Enum representing all metric names used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Parser metrics
    ParserRowsParsed,
    ParserErrors,
    ParserDuration,
    ParserAbsentConversions,
    ParserDuplicateKeys,

    // Derive metrics
    DeriveAbsentRatios,

    // Canonical output metrics
    CanonicalRowsWritten,

    // Validator metrics
    ValidatorChecksPassed,
    ValidatorChecksFailed,
    ValidatorFindings,

    // Integrator metrics
    IntegratorRowsWritten,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ParserRowsParsed => "perfdata_parser_rows_parsed_total",
            MetricName::ParserErrors => "perfdata_parser_errors_total",
            MetricName::ParserDuration => "perfdata_parser_duration_seconds",
            MetricName::ParserAbsentConversions => "perfdata_parser_absent_conversions_total",
            MetricName::ParserDuplicateKeys => "perfdata_parser_duplicate_keys_total",
            MetricName::DeriveAbsentRatios => "perfdata_derive_absent_ratios_total",
            MetricName::CanonicalRowsWritten => "perfdata_canonical_rows_written_total",
            MetricName::ValidatorChecksPassed => "perfdata_validator_checks_passed_total",
            MetricName::ValidatorChecksFailed => "perfdata_validator_checks_failed_total",
            MetricName::ValidatorFindings => "perfdata_validator_findings_total",
            MetricName::IntegratorRowsWritten => "perfdata_integrator_rows_written_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init() -> Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| PipelineError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    let _ = METRICS_HANDLE.set(handle);
    info!("Metrics recorder installed");
    Ok(())
}

/// Prometheus text snapshot, if a recorder was installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Parser Metrics
// ============================================================================

pub mod parser {
    use super::MetricName;

    pub fn rows_parsed(platform: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::ParserRowsParsed.as_str(), "platform" => platform)
            .increment(rows as u64);
    }

    pub fn parse_error(platform: &'static str, error_type: &'static str) {
        ::metrics::counter!(MetricName::ParserErrors.as_str(),
            "platform" => platform,
            "error_type" => error_type
        )
        .increment(1);
    }

    pub fn duration(platform: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::ParserDuration.as_str(), "platform" => platform).record(secs);
    }

    pub fn absent_conversions(platform: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::ParserAbsentConversions.as_str(), "platform" => platform)
            .increment(rows as u64);
    }

    pub fn duplicate_keys(platform: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::ParserDuplicateKeys.as_str(), "platform" => platform)
            .increment(rows as u64);
    }
}

// ============================================================================
// Derive / Canonical Metrics
// ============================================================================

pub mod derive {
    use super::MetricName;

    /// Ratios left absent because of a zero or missing operand
    pub fn absent_ratios(platform: &'static str, field: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::DeriveAbsentRatios.as_str(),
            "platform" => platform,
            "field" => field
        )
        .increment(rows as u64);
    }

    pub fn canonical_rows_written(platform: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::CanonicalRowsWritten.as_str(), "platform" => platform)
            .increment(rows as u64);
    }
}

// ============================================================================
// Validator Metrics
// ============================================================================

pub mod validator {
    use super::MetricName;

    pub fn check_completed(check: &'static str, passed: bool) {
        if passed {
            ::metrics::counter!(MetricName::ValidatorChecksPassed.as_str(), "check" => check).increment(1);
        } else {
            ::metrics::counter!(MetricName::ValidatorChecksFailed.as_str(), "check" => check).increment(1);
        }
    }

    pub fn finding(check: &'static str, platform: &'static str, count: usize) {
        ::metrics::counter!(MetricName::ValidatorFindings.as_str(),
            "check" => check,
            "platform" => platform
        )
        .increment(count as u64);
    }
}

// ============================================================================
// Integrator Metrics
// ============================================================================

pub mod integrator {
    use super::MetricName;

    pub fn rows_written(rows: usize) {
        ::metrics::counter!(MetricName::IntegratorRowsWritten.as_str()).increment(rows as u64);
    }
}
