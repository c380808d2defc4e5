//! Google Ads exports carry no header row. Three preamble lines (report
//! title, download timestamp, blank) precede unlabeled rows whose meaning is
//! fixed by position. The layout lives in [`GOOGLE_FIELDS`] and nowhere else.

use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::{debug, info, instrument};

use super::decode::{optional_cell_number, round_money, CensoredPolicy, DecodePolicy};
use super::{read_source, record_line, SourceParser};
use crate::config::GoogleConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Cell, IntermediateRow, IntermediateTable, Platform};

/// Positional layout of a Google data row
pub const GOOGLE_FIELDS: [&str; 10] = [
    "Day",
    "Campaign",
    "Campaign ID",
    "Impr.",
    "Clicks",
    "Cost",
    "Conversions",
    "Conv. rate",
    "Cost / conv.",
    "Conv. value",
];

const PREAMBLE_LINES: usize = 3;

/// Intermediate columns emitted for Google
pub const GOOGLE_COLUMNS: &[&str] = &[
    "date",
    "campaign_name",
    "campaign_id",
    "impressions",
    "clicks",
    "spend",
    "conversions",
    "cvr_reported",
    "cpa_reported",
    "revenue",
];

/// A data row addressed by field label through [`GOOGLE_FIELDS`]
struct PositionalRow<'a> {
    record: &'a StringRecord,
}

impl<'a> PositionalRow<'a> {
    fn decode(record: &'a StringRecord, line: u64) -> Result<Self> {
        if record.len() != GOOGLE_FIELDS.len() {
            return Err(PipelineError::schema(
                Platform::Google,
                format!(
                    "line {}: expected {} positional fields, found {}",
                    line,
                    GOOGLE_FIELDS.len(),
                    record.len()
                ),
            ));
        }
        Ok(Self { record })
    }

    fn get(&self, label: &str) -> &'a str {
        GOOGLE_FIELDS
            .iter()
            .position(|l| *l == label)
            .and_then(|i| self.record.get(i))
            .unwrap_or("")
    }
}

pub struct GoogleParser {
    policy: DecodePolicy,
}

impl GoogleParser {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            policy: DecodePolicy::new(Platform::Google).with_censored(CensoredPolicy {
                imputed: config.censored_imputation,
            }),
        }
    }

    fn decode_row(&self, row: &PositionalRow<'_>, line: u64) -> Result<IntermediateRow> {
        let p = &self.policy;

        let date = p.date(line, "Day", row.get("Day"))?;
        let campaign_name = p.required_text(line, "Campaign", row.get("Campaign"))?;
        let campaign_id = p.optional_text(row.get("Campaign ID"));
        let impressions = p.required_count(line, "Impr.", row.get("Impr."))?;
        let clicks = p.required_count(line, "Clicks", row.get("Clicks"))?;
        let spend = round_money(p.required_money(line, "Cost", row.get("Cost"))?);
        let conversions = p.optional_censored_count(line, "Conversions", row.get("Conversions"))?;
        let cvr_reported = p.optional_percent(line, "Conv. rate", row.get("Conv. rate"))?;
        let cpa_reported = p
            .optional_money(line, "Cost / conv.", row.get("Cost / conv."))?
            .map(round_money);
        let revenue = p
            .optional_money(line, "Conv. value", row.get("Conv. value"))?
            .map(round_money);

        Ok(IntermediateRow {
            line,
            date,
            campaign_name,
            spend,
            impressions,
            clicks,
            conversions,
            revenue,
            extra: vec![
                ("campaign_id", campaign_id),
                ("cvr_reported", optional_cell_number(cvr_reported)),
                ("cpa_reported", optional_cell_number(cpa_reported)),
            ],
            derived: None,
        })
    }
}

impl Default for GoogleParser {
    fn default() -> Self {
        Self::new(&GoogleConfig::default())
    }
}

/// Split off the preamble, checking it has the expected shape
fn split_preamble(text: &str) -> Result<&str> {
    let text = text.trim_start_matches('\u{feff}');
    let mut rest = text;
    let mut lines = Vec::with_capacity(PREAMBLE_LINES);

    for _ in 0..PREAMBLE_LINES {
        let Some(end) = rest.find('\n') else {
            return Err(PipelineError::schema(
                Platform::Google,
                format!("export ends before the {} preamble lines", PREAMBLE_LINES),
            ));
        };
        lines.push(rest[..end].trim_end_matches('\r'));
        rest = &rest[end + 1..];
    }

    if lines[0].trim().is_empty() || lines[1].trim().is_empty() {
        return Err(PipelineError::schema(
            Platform::Google,
            "missing report title or download timestamp line",
        ));
    }
    if !lines[2].trim().is_empty() {
        return Err(PipelineError::schema(
            Platform::Google,
            format!("expected a blank line after the preamble, found {:?}", lines[2]),
        ));
    }

    Ok(rest)
}

fn is_label_row(record: &StringRecord) -> bool {
    record.len() == GOOGLE_FIELDS.len()
        && record
            .iter()
            .zip(GOOGLE_FIELDS.iter())
            .all(|(value, label)| value.trim() == *label)
}

impl SourceParser for GoogleParser {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn columns(&self) -> &'static [&'static str] {
        GOOGLE_COLUMNS
    }

    #[instrument(skip(self), fields(platform = "google"))]
    fn parse(&self, path: &Path) -> Result<IntermediateTable> {
        let text = read_source(path)?;
        let body = split_preamble(&text)?;

        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body.as_bytes());

        let mut rows = Vec::new();
        let mut censored = 0usize;
        for (i, result) in rdr.records().enumerate() {
            let record = result?;
            let line = record_line(&record, i as u64 + 1) + PREAMBLE_LINES as u64;

            // Some exports repeat the labels once; they carry no data
            if i == 0 && is_label_row(&record) {
                debug!("Skipping label row at line {}", line);
                continue;
            }

            let positional = PositionalRow::decode(&record, line)?;
            if positional.get("Conversions").trim_start().starts_with('<') {
                censored += 1;
            }
            rows.push(self.decode_row(&positional, line)?);
        }

        if censored > 0 {
            debug!("{} censored Google conversion counts imputed", censored);
        }
        info!("Parsed {} Google rows from {}", rows.len(), path.display());

        Ok(IntermediateTable {
            platform: Platform::Google,
            source_path: path.to_path_buf(),
            columns: GOOGLE_COLUMNS.to_vec(),
            rows,
        })
    }
}
