//! Consistency validator over the persisted canonical files.
//!
//! Five independent checks run against all three sources. None of them
//! short-circuits: every check runs even when an earlier one failed, and all
//! findings are reported together. Findings are aggregated per source and
//! field with a row count rather than listed per row.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::config::ValidatorConfig;
use crate::constants::{CANONICAL_BASE_FIELDS, DERIVED_FIELDS, NUMERIC_FIELDS, RATE_FIELDS};
use crate::observability::metrics;
use crate::pipeline::storage::CanonicalTable;
use crate::types::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    Existence,
    Schema,
    Range,
    Finiteness,
    Typing,
}

impl CheckName {
    pub const ALL: [CheckName; 5] = [
        CheckName::Existence,
        CheckName::Schema,
        CheckName::Range,
        CheckName::Finiteness,
        CheckName::Typing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::Existence => "existence",
            CheckName::Schema => "schema",
            CheckName::Range => "range",
            CheckName::Finiteness => "finiteness",
            CheckName::Typing => "typing",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Unreadable,
    MissingField,
    RangeViolation,
    FinitenessViolation,
    NonNumeric,
}

/// Severity levels for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected upstream noise; surfaced, blocks only if configured to
    Warning,
    /// A defect in a canonical output
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub check: CheckName,
    pub platform: Platform,
    pub field: Option<String>,
    pub kind: FindingKind,
    pub severity: Severity,
    /// Number of rows affected (1 for file-level findings)
    pub count: usize,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    /// Only non-blocking warnings were found
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: CheckName,
    pub status: CheckStatus,
    pub findings: Vec<Finding>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.status != CheckStatus::Fail
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub processed_dir: PathBuf,
    pub checks: Vec<CheckResult>,
}

impl ConsistencyReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(CheckResult::passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.checks.iter().flat_map(|c| c.findings.iter())
    }

    /// Human-readable pass/fail transcript, one line per check
    pub fn transcript(&self) -> String {
        let total = self.checks.len();
        let mut out = format!("🔍 Consistency check of {}\n", self.processed_dir.display());

        for (i, result) in self.checks.iter().enumerate() {
            let status = match result.status {
                CheckStatus::Pass => "PASS",
                CheckStatus::Warn => "PASS (warnings)",
                CheckStatus::Fail => "FAIL",
            };
            out.push_str(&format!("[{}/{}] {:<11} {}\n", i + 1, total, result.check.as_str(), status));

            for finding in &result.findings {
                let field = finding.field.as_deref().map(|f| format!(".{}", f)).unwrap_or_default();
                out.push_str(&format!(
                    "      - {}{}: {} ({:?}, {} row(s))\n",
                    finding.platform, field, finding.detail, finding.severity, finding.count
                ));
            }
        }

        let passed = self.checks.iter().filter(|c| c.passed()).count();
        if self.passed() {
            out.push_str(&format!("✅ Overall: PASS ({}/{} checks passed)\n", passed, total));
        } else {
            out.push_str(&format!("❌ Overall: FAIL ({}/{} checks passed)\n", passed, total));
        }
        out
    }
}

/// One source as seen by the checks: its table, or why it could not be read
pub struct LoadedSource {
    pub platform: Platform,
    pub path: PathBuf,
    pub table: std::result::Result<CanonicalTable, String>,
}

impl LoadedSource {
    pub fn load(platform: Platform, path: PathBuf) -> Self {
        let table = CanonicalTable::load(&path).map_err(|e| e.to_string());
        Self { platform, path, table }
    }
}

/// A single consistency check over all sources
pub trait ConsistencyCheck {
    fn name(&self) -> CheckName;

    fn run(&self, sources: &[LoadedSource]) -> Vec<Finding>;
}

/// Shared finding for checks that cannot inspect an unreadable source
fn unreadable(check: CheckName, source: &LoadedSource, reason: &str) -> Finding {
    Finding {
        check,
        platform: source.platform,
        field: None,
        kind: FindingKind::Unreadable,
        severity: Severity::Error,
        count: 1,
        detail: format!("{} is not readable: {}", source.path.display(), reason),
    }
}

/// Run `per_table` on each readable source; unreadable sources become findings
fn for_each_table<F>(check: CheckName, sources: &[LoadedSource], mut per_table: F) -> Vec<Finding>
where
    F: FnMut(Platform, &CanonicalTable) -> Vec<Finding>,
{
    let mut findings = Vec::new();
    for source in sources {
        match &source.table {
            Ok(table) => findings.extend(per_table(source.platform, table)),
            Err(reason) => findings.push(unreadable(check, source, reason)),
        }
    }
    findings
}

/// Count the values of `field` matching `predicate` once parsed as f64.
/// Empty fields (absent) and unparseable text are skipped.
fn count_parsed(table: &CanonicalTable, field: &str, predicate: impl Fn(f64) -> bool) -> usize {
    table
        .values(field)
        .filter(|v| !v.trim().is_empty())
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .filter(|v| predicate(*v))
        .count()
}

pub struct ExistenceCheck;

impl ConsistencyCheck for ExistenceCheck {
    fn name(&self) -> CheckName {
        CheckName::Existence
    }

    fn run(&self, sources: &[LoadedSource]) -> Vec<Finding> {
        for_each_table(self.name(), sources, |_, _| Vec::new())
    }
}

/// Every base field is present; extension fields are not required
pub struct SchemaCheck;

impl ConsistencyCheck for SchemaCheck {
    fn name(&self) -> CheckName {
        CheckName::Schema
    }

    fn run(&self, sources: &[LoadedSource]) -> Vec<Finding> {
        for_each_table(self.name(), sources, |platform, table| {
            CANONICAL_BASE_FIELDS
                .iter()
                .filter(|field| table.column(field).is_none())
                .map(|field| Finding {
                    check: CheckName::Schema,
                    platform,
                    field: Some(field.to_string()),
                    kind: FindingKind::MissingField,
                    severity: Severity::Error,
                    count: 1,
                    detail: "required field is missing".to_string(),
                })
                .collect()
        })
    }
}

/// ctr and cvr, when present, lie in [0, 1]
pub struct RangeCheck;

impl ConsistencyCheck for RangeCheck {
    fn name(&self) -> CheckName {
        CheckName::Range
    }

    fn run(&self, sources: &[LoadedSource]) -> Vec<Finding> {
        for_each_table(self.name(), sources, |platform, table| {
            RATE_FIELDS
                .iter()
                .filter_map(|field| {
                    // NaN is left to the finiteness check
                    let count = count_parsed(table, field, |v| !v.is_nan() && !(0.0..=1.0).contains(&v));
                    (count > 0).then(|| Finding {
                        check: CheckName::Range,
                        platform,
                        field: Some(field.to_string()),
                        kind: FindingKind::RangeViolation,
                        severity: Severity::Warning,
                        count,
                        detail: "value outside [0, 1]".to_string(),
                    })
                })
                .collect()
        })
    }
}

/// No derived ratio is infinite or NaN
pub struct FinitenessCheck;

impl ConsistencyCheck for FinitenessCheck {
    fn name(&self) -> CheckName {
        CheckName::Finiteness
    }

    fn run(&self, sources: &[LoadedSource]) -> Vec<Finding> {
        for_each_table(self.name(), sources, |platform, table| {
            DERIVED_FIELDS
                .iter()
                .filter_map(|field| {
                    let count = count_parsed(table, field, |v| !v.is_finite());
                    (count > 0).then(|| Finding {
                        check: CheckName::Finiteness,
                        platform,
                        field: Some(field.to_string()),
                        kind: FindingKind::FinitenessViolation,
                        severity: Severity::Error,
                        count,
                        detail: "non-finite derived value".to_string(),
                    })
                })
                .collect()
        })
    }
}

/// Every non-empty value of a numeric field parses as a number
pub struct TypingCheck;

impl ConsistencyCheck for TypingCheck {
    fn name(&self) -> CheckName {
        CheckName::Typing
    }

    fn run(&self, sources: &[LoadedSource]) -> Vec<Finding> {
        for_each_table(self.name(), sources, |platform, table| {
            NUMERIC_FIELDS
                .iter()
                .filter_map(|field| {
                    let bad: Vec<&str> = table
                        .values(field)
                        .filter(|v| !v.trim().is_empty() && v.trim().parse::<f64>().is_err())
                        .collect();
                    let sample = bad.first()?.to_string();
                    Some(Finding {
                        check: CheckName::Typing,
                        platform,
                        field: Some(field.to_string()),
                        kind: FindingKind::NonNumeric,
                        severity: Severity::Error,
                        count: bad.len(),
                        detail: format!("non-numeric value such as {:?}", sample),
                    })
                })
                .collect()
        })
    }
}

pub struct ConsistencyValidator {
    checks: Vec<Box<dyn ConsistencyCheck>>,
    range_violations_block_exit: bool,
}

impl ConsistencyValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            checks: vec![
                Box::new(ExistenceCheck),
                Box::new(SchemaCheck),
                Box::new(RangeCheck),
                Box::new(FinitenessCheck),
                Box::new(TypingCheck),
            ],
            range_violations_block_exit: config.range_violations_block_exit,
        }
    }

    fn status(&self, findings: &[Finding]) -> CheckStatus {
        match findings.iter().map(|f| f.severity).max() {
            None => CheckStatus::Pass,
            Some(Severity::Error) => CheckStatus::Fail,
            Some(Severity::Warning) if self.range_violations_block_exit => CheckStatus::Fail,
            Some(Severity::Warning) => CheckStatus::Warn,
        }
    }

    /// Validate the three canonical files under `processed_dir`
    #[instrument(skip(self))]
    pub fn validate_dir(&self, processed_dir: &Path) -> ConsistencyReport {
        let sources: Vec<LoadedSource> = Platform::ALL
            .iter()
            .map(|p| LoadedSource::load(*p, processed_dir.join(p.canonical_file())))
            .collect();
        self.validate(processed_dir, &sources)
    }

    pub fn validate(&self, processed_dir: &Path, sources: &[LoadedSource]) -> ConsistencyReport {
        let checks = self
            .checks
            .iter()
            .map(|check| {
                let findings = check.run(sources);
                let status = self.status(&findings);

                metrics::validator::check_completed(check.name().as_str(), status != CheckStatus::Fail);
                for finding in &findings {
                    metrics::validator::finding(check.name().as_str(), finding.platform.slug(), finding.count);
                    warn!(
                        check = check.name().as_str(),
                        platform = finding.platform.as_str(),
                        field = finding.field.as_deref().unwrap_or("-"),
                        count = finding.count,
                        "{}",
                        finding.detail
                    );
                }

                CheckResult {
                    check: check.name(),
                    status,
                    findings,
                }
            })
            .collect();

        let report = ConsistencyReport {
            processed_dir: processed_dir.to_path_buf(),
            checks,
        };
        info!(passed = report.passed(), "Consistency check finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const GOOD_META: &str = "date,platform,campaign_name,spend,impressions,clicks,conversions,revenue,ctr,cvr,cpa,roas,has_conversion_tracking,reach\n\
        2024-01-01,Meta,Retargeting_Core,50,1000,30,3,150,0.03,0.1,16.666666666666668,3,true,800\n\
        2024-01-01,Meta,Brand_Awareness_Q1,40,2000,20,,,0.01,,,,false,1500\n";
    const GOOD_GOOGLE: &str = "date,platform,campaign_name,spend,impressions,clicks,conversions,revenue,ctr,cvr,cpa,roas\n\
        2024-01-01,Google,Search_Brand_Exact,50,1000,30,5,400,0.03,0.16666666666666666,10,8\n";
    const GOOD_TIKTOK: &str = "date,platform,campaign_name,spend,impressions,clicks,conversions,revenue,ctr,cvr,cpa,roas,is_learning\n\
        2024-01-01,TikTok,Spark_Ads_UGC,120.5,25000,1200,6,480,0.048,0.005,20.083333333333332,3.983402489626556,true\n";

    fn write_fixture(dir: &Path, meta: &str, google: &str, tiktok: &str) {
        fs::write(dir.join(Platform::Meta.canonical_file()), meta).unwrap();
        fs::write(dir.join(Platform::Google.canonical_file()), google).unwrap();
        fs::write(dir.join(Platform::TikTok.canonical_file()), tiktok).unwrap();
    }

    fn check<'a>(report: &'a ConsistencyReport, name: CheckName) -> &'a CheckResult {
        report.checks.iter().find(|c| c.check == name).unwrap()
    }

    #[test]
    fn test_known_good_fixture_passes_every_check() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path(), GOOD_META, GOOD_GOOGLE, GOOD_TIKTOK);

        let report = ConsistencyValidator::new(&ValidatorConfig::default()).validate_dir(dir.path());
        assert!(report.passed(), "{}", report.transcript());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.checks.len(), 5);
        assert_eq!(report.findings().count(), 0);
    }

    #[test]
    fn test_synthesized_clicks_above_impressions_are_flagged() {
        let dir = tempdir().unwrap();
        let google = "date,platform,campaign_name,spend,impressions,clicks,conversions,revenue,ctr,cvr,cpa,roas\n\
            2024-01-01,Google,Search_Brand_Exact,50,100,150,5,400,1.5,0.03333333333333333,10,8\n\
            2024-01-02,Google,Search_Brand_Exact,50,100,120,5,400,1.2,0.041666666666666664,10,8\n";
        write_fixture(dir.path(), GOOD_META, google, GOOD_TIKTOK);

        let report = ConsistencyValidator::new(&ValidatorConfig::default()).validate_dir(dir.path());
        let range = check(&report, CheckName::Range);
        assert_eq!(range.status, CheckStatus::Fail);
        assert_eq!(range.findings.len(), 1);
        assert_eq!(range.findings[0].platform, Platform::Google);
        assert_eq!(range.findings[0].field.as_deref(), Some("ctr"));
        assert_eq!(range.findings[0].count, 2);
        assert_eq!(range.findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_range_warnings_can_be_non_blocking() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path(), GOOD_META, &GOOD_GOOGLE.replace(",0.03,", ",1.5,"), GOOD_TIKTOK);

        let config = ValidatorConfig {
            range_violations_block_exit: false,
        };
        let report = ConsistencyValidator::new(&config).validate_dir(dir.path());
        assert_eq!(check(&report, CheckName::Range).status, CheckStatus::Warn);
        assert!(report.passed());
    }

    #[test]
    fn test_infinite_ratio_fails_finiteness() {
        let dir = tempdir().unwrap();
        let tiktok = GOOD_TIKTOK.replace(",20.083333333333332,", ",inf,");
        write_fixture(dir.path(), GOOD_META, GOOD_GOOGLE, &tiktok);

        let report = ConsistencyValidator::new(&ValidatorConfig::default()).validate_dir(dir.path());
        let finiteness = check(&report, CheckName::Finiteness);
        assert_eq!(finiteness.status, CheckStatus::Fail);
        assert_eq!(finiteness.findings[0].field.as_deref(), Some("cpa"));
        assert!(check(&report, CheckName::Typing).passed());
    }

    #[test]
    fn test_undecoded_percentage_fails_typing() {
        let dir = tempdir().unwrap();
        let tiktok = GOOD_TIKTOK.replace(",0.048,", ",4.80%,");
        write_fixture(dir.path(), GOOD_META, GOOD_GOOGLE, &tiktok);

        let report = ConsistencyValidator::new(&ValidatorConfig::default()).validate_dir(dir.path());
        let typing = check(&report, CheckName::Typing);
        assert_eq!(typing.status, CheckStatus::Fail);
        assert_eq!(typing.findings[0].kind, FindingKind::NonNumeric);
        assert_eq!(typing.findings[0].field.as_deref(), Some("ctr"));
        assert!(!report.passed());
    }

    #[test]
    fn test_missing_source_fails_every_check_without_short_circuit() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(Platform::Meta.canonical_file()), GOOD_META).unwrap();
        fs::write(dir.path().join(Platform::TikTok.canonical_file()), GOOD_TIKTOK).unwrap();

        let report = ConsistencyValidator::new(&ValidatorConfig::default()).validate_dir(dir.path());
        assert_eq!(report.checks.len(), 5);
        for result in &report.checks {
            assert_eq!(result.status, CheckStatus::Fail, "{}", result.check);
            assert!(result
                .findings
                .iter()
                .all(|f| f.platform == Platform::Google && f.kind == FindingKind::Unreadable));
        }
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_missing_base_field_fails_schema() {
        let dir = tempdir().unwrap();
        let google = "date,platform,campaign_name,spend,impressions,clicks,conversions,revenue,ctr,cvr,cpa\n\
            2024-01-01,Google,Search_Brand_Exact,50,1000,30,5,400,0.03,0.16666666666666666,10\n";
        write_fixture(dir.path(), GOOD_META, google, GOOD_TIKTOK);

        let report = ConsistencyValidator::new(&ValidatorConfig::default()).validate_dir(dir.path());
        let schema = check(&report, CheckName::Schema);
        assert_eq!(schema.findings.len(), 1);
        assert_eq!(schema.findings[0].field.as_deref(), Some("roas"));
    }

    #[test]
    fn test_transcript_has_one_line_per_check_and_verdict() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path(), GOOD_META, GOOD_GOOGLE, GOOD_TIKTOK);

        let transcript = ConsistencyValidator::new(&ValidatorConfig::default())
            .validate_dir(dir.path())
            .transcript();
        for name in CheckName::ALL {
            assert!(transcript.contains(name.as_str()));
        }
        assert!(transcript.contains("Overall: PASS (5/5 checks passed)"));
    }
}
