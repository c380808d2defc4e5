use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, info, instrument};

use super::decode::{optional_cell_count, optional_cell_number, round_money, DecodePolicy};
use super::{labeled_record, open_source, record_line, HeaderIndex, SourceParser};
use crate::config::TikTokConfig;
use crate::error::Result;
use crate::types::{Cell, IntermediateRow, IntermediateTable, Platform};

pub const DATE: &str = "Date";
pub const CAMPAIGN_NAME: &str = "Campaign Name";
pub const AD_GROUP_NAME: &str = "Ad Group Name";
pub const COST: &str = "Cost";
pub const IMPRESSIONS: &str = "Impressions";
pub const CLICKS: &str = "Clicks";
pub const CONVERSIONS: &str = "Conversions";
pub const CPA: &str = "CPA";
pub const CTR: &str = "CTR";
pub const CVR: &str = "CVR";
pub const VIDEO_VIEWS: &str = "Video Views";
pub const VIDEO_PLAY_ACTIONS: &str = "Video Play Actions";
pub const LEARNING_STATUS: &str = "Learning Status";

const REQUIRED_COLUMNS: &[&str] = &[
    DATE,
    CAMPAIGN_NAME,
    AD_GROUP_NAME,
    COST,
    IMPRESSIONS,
    CLICKS,
    CONVERSIONS,
    CPA,
    CTR,
    CVR,
    VIDEO_VIEWS,
    VIDEO_PLAY_ACTIONS,
    LEARNING_STATUS,
];

/// Intermediate columns emitted for TikTok
pub const TIKTOK_COLUMNS: &[&str] = &[
    "date",
    "campaign_name",
    "ad_group_name",
    "spend",
    "impressions",
    "clicks",
    "conversions",
    "cpa_reported",
    "ctr_reported",
    "cvr_reported",
    "video_views",
    "video_play_actions",
    "learning_status",
    "revenue",
    "is_learning",
];

/// Learning-phase statuses ("Learning", "Learning Limited", "Limited Delivery")
pub fn is_learning_status(status: &str) -> bool {
    let status = status.to_lowercase();
    status.contains("learning") || status.contains("limited")
}

/// Parser for TikTok Ads exports (one row per day per ad group).
///
/// TikTok reports no revenue; it is estimated from conversions with a
/// configured value per conversion.
pub struct TikTokParser {
    policy: DecodePolicy,
    revenue_per_conversion: f64,
}

impl TikTokParser {
    pub fn new(config: &TikTokConfig) -> Self {
        Self {
            policy: DecodePolicy::new(Platform::TikTok),
            revenue_per_conversion: config.revenue_per_conversion,
        }
    }
}

impl Default for TikTokParser {
    fn default() -> Self {
        Self::new(&TikTokConfig::default())
    }
}

impl SourceParser for TikTokParser {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn columns(&self) -> &'static [&'static str] {
        TIKTOK_COLUMNS
    }

    #[instrument(skip(self), fields(platform = "tiktok"))]
    fn parse(&self, path: &Path) -> Result<IntermediateTable> {
        let file = open_source(path)?;
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = rdr.headers()?.clone();
        let index = HeaderIndex::new(Platform::TikTok, &headers, REQUIRED_COLUMNS)?;
        let p = &self.policy;

        let mut rows = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let record = labeled_record(Platform::TikTok, result, i as u64 + 2)?;
            let line = record_line(&record, i as u64 + 2);

            let date = p.date(line, DATE, index.get(&record, DATE))?;
            let campaign_name = p.required_text(line, CAMPAIGN_NAME, index.get(&record, CAMPAIGN_NAME))?;
            let ad_group_name = p.optional_text(index.get(&record, AD_GROUP_NAME));
            let spend = round_money(p.required_money(line, COST, index.get(&record, COST))?);
            let impressions = p.required_count(line, IMPRESSIONS, index.get(&record, IMPRESSIONS))?;
            let clicks = p.required_count(line, CLICKS, index.get(&record, CLICKS))?;
            let conversions = p.optional_count(line, CONVERSIONS, index.get(&record, CONVERSIONS))?;
            let cpa_reported = p.optional_money(line, CPA, index.get(&record, CPA))?.map(round_money);
            let ctr_reported = p.optional_percent(line, CTR, index.get(&record, CTR))?;
            let cvr_reported = p.optional_percent(line, CVR, index.get(&record, CVR))?;
            let video_views = p.optional_count(line, VIDEO_VIEWS, index.get(&record, VIDEO_VIEWS))?;
            let video_play_actions =
                p.optional_count(line, VIDEO_PLAY_ACTIONS, index.get(&record, VIDEO_PLAY_ACTIONS))?;
            let learning_status = p.optional_text(index.get(&record, LEARNING_STATUS));

            let is_learning = learning_status.as_text().map(is_learning_status).unwrap_or(false);
            let revenue = conversions.map(|c| round_money(c as f64 * self.revenue_per_conversion));

            rows.push(IntermediateRow {
                line,
                date,
                campaign_name,
                spend,
                impressions,
                clicks,
                conversions,
                revenue,
                extra: vec![
                    ("ad_group_name", ad_group_name),
                    ("cpa_reported", optional_cell_number(cpa_reported)),
                    ("ctr_reported", optional_cell_number(ctr_reported)),
                    ("cvr_reported", optional_cell_number(cvr_reported)),
                    ("video_views", optional_cell_count(video_views)),
                    ("video_play_actions", optional_cell_count(video_play_actions)),
                    ("learning_status", learning_status),
                    ("is_learning", Cell::Flag(is_learning)),
                ],
                derived: None,
            });
        }

        let learning = rows
            .iter()
            .filter(|r| r.field("is_learning") == Some(&Cell::Flag(true)))
            .count();
        debug!("{} of {} TikTok rows in learning phase", learning, rows.len());
        info!("Parsed {} TikTok rows from {}", rows.len(), path.display());

        Ok(IntermediateTable {
            platform: Platform::TikTok,
            source_path: path.to_path_buf(),
            columns: TIKTOK_COLUMNS.to_vec(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "Date,Campaign Name,Ad Group Name,Cost,Impressions,Clicks,Conversions,CPA,CTR,CVR,Video Views,Video Play Actions,Learning Status";

    fn write_export(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        write!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_percentages_learning_flag_and_estimated_revenue() {
        let file = write_export(
            "2024-05-01,Spark_Ads_UGC,Broad_18_34,120.50,25000,1200,6,20.08,4.80%,0.50%,18000,21000,Learning\n\
             2024-05-01,Spark_Ads_UGC,Lookalike_1pct,95.00,20000,900,--,--,4.50%,--,15000,17000,Active\n",
        );

        let table = TikTokParser::default().parse(file.path()).unwrap();
        assert_eq!(table.rows.len(), 2);

        let learning = &table.rows[0];
        let ctr = learning.field("ctr_reported").and_then(Cell::as_number).unwrap();
        assert!((ctr - 0.048).abs() < 1e-12);
        assert_eq!(learning.field("is_learning"), Some(&Cell::Flag(true)));
        assert_eq!(learning.revenue, Some(480.0));

        let gap = &table.rows[1];
        assert_eq!(gap.conversions, None);
        assert_eq!(gap.revenue, None);
        assert_eq!(gap.field("cvr_reported"), Some(&Cell::Absent));
        assert_eq!(gap.field("is_learning"), Some(&Cell::Flag(false)));
    }

    #[test]
    fn test_learning_status_reduction() {
        assert!(is_learning_status("Learning"));
        assert!(is_learning_status("Learning Limited"));
        assert!(is_learning_status("limited delivery"));
        assert!(!is_learning_status("Active"));
        assert!(!is_learning_status("Not Delivering"));
    }

    #[test]
    fn test_revenue_per_conversion_follows_config() {
        let file = write_export("2024-05-01,Spark_Ads_UGC,Broad_18_34,10,1000,10,2,5,1%,20%,1,1,Active\n");
        let parser = TikTokParser::new(&TikTokConfig {
            revenue_per_conversion: 50.0,
        });
        let table = parser.parse(file.path()).unwrap();
        assert_eq!(table.rows[0].revenue, Some(100.0));
    }

    #[test]
    fn test_extra_field_is_schema_violation_with_line() {
        let file = write_export("2024-05-01,Spark_Ads_UGC,Broad_18_34,10,1000,10,2,5,1%,20%,1,1,Active,extra\n");
        let err = TikTokParser::default().parse(file.path()).unwrap_err();
        match err {
            PipelineError::SchemaViolation { platform, detail } => {
                assert_eq!(platform, Platform::TikTok);
                assert!(detail.starts_with("line 2:"), "{}", detail);
                assert!(detail.contains("expected 13 fields, found 14"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_percentage_is_decode_error() {
        let file = write_export("2024-05-01,Spark_Ads_UGC,Broad_18_34,10,1000,10,2,5,high,20%,1,1,Active\n");
        let err = TikTokParser::default().parse(file.path()).unwrap_err();
        match err {
            PipelineError::DecodeError { column, line, .. } => {
                assert_eq!(column, CTR);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
