use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, info, instrument};

use super::decode::{optional_cell_count, optional_cell_number, round_money, DecodePolicy};
use super::{labeled_record, open_source, record_line, HeaderIndex, SourceParser};
use crate::error::Result;
use crate::types::{Cell, IntermediateRow, IntermediateTable, Platform};

pub const REPORTING_STARTS: &str = "Reporting starts";
pub const REPORTING_ENDS: &str = "Reporting ends";
pub const CAMPAIGN_NAME: &str = "Campaign name";
pub const AMOUNT_SPENT: &str = "Amount spent (USD)";
pub const IMPRESSIONS: &str = "Impressions";
pub const LINK_CLICKS: &str = "Link clicks";
pub const PURCHASES: &str = "Purchases";
pub const COST_PER_PURCHASE: &str = "Cost per purchase (USD)";
pub const PURCHASE_VALUE: &str = "Purchase conversion value (USD)";
pub const REACH: &str = "Reach";

const REQUIRED_COLUMNS: &[&str] = &[
    REPORTING_STARTS,
    REPORTING_ENDS,
    CAMPAIGN_NAME,
    AMOUNT_SPENT,
    IMPRESSIONS,
    LINK_CLICKS,
    PURCHASES,
    COST_PER_PURCHASE,
    PURCHASE_VALUE,
    REACH,
];

/// Intermediate columns emitted for Meta
pub const META_COLUMNS: &[&str] = &[
    "date",
    "campaign_name",
    "spend",
    "impressions",
    "clicks",
    "conversions",
    "cpa_reported",
    "revenue",
    "reach",
    "has_conversion_tracking",
];

/// Parser for Meta Ads Manager exports (one row per day per campaign)
pub struct MetaParser {
    policy: DecodePolicy,
}

impl MetaParser {
    pub fn new() -> Self {
        Self {
            policy: DecodePolicy::new(Platform::Meta),
        }
    }
}

impl Default for MetaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for MetaParser {
    fn platform(&self) -> Platform {
        Platform::Meta
    }

    fn columns(&self) -> &'static [&'static str] {
        META_COLUMNS
    }

    #[instrument(skip(self), fields(platform = "meta"))]
    fn parse(&self, path: &Path) -> Result<IntermediateTable> {
        let file = open_source(path)?;
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = rdr.headers()?.clone();
        let index = HeaderIndex::new(Platform::Meta, &headers, REQUIRED_COLUMNS)?;
        let p = &self.policy;

        let mut rows = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let record = labeled_record(Platform::Meta, result, i as u64 + 2)?;
            let line = record_line(&record, i as u64 + 2);

            // "Reporting ends" duplicates "Reporting starts"; the first one wins unchecked
            let date = p.date(line, REPORTING_STARTS, index.get(&record, REPORTING_STARTS))?;
            let campaign_name = p.required_text(line, CAMPAIGN_NAME, index.get(&record, CAMPAIGN_NAME))?;
            let spend = round_money(p.required_money(line, AMOUNT_SPENT, index.get(&record, AMOUNT_SPENT))?);
            let impressions = p.required_count(line, IMPRESSIONS, index.get(&record, IMPRESSIONS))?;
            let clicks = p.required_count(line, LINK_CLICKS, index.get(&record, LINK_CLICKS))?;
            let conversions = p.optional_count(line, PURCHASES, index.get(&record, PURCHASES))?;
            let cpa_reported = p
                .optional_money(line, COST_PER_PURCHASE, index.get(&record, COST_PER_PURCHASE))?
                .map(round_money);
            let revenue = p
                .optional_money(line, PURCHASE_VALUE, index.get(&record, PURCHASE_VALUE))?
                .map(round_money);
            let reach = p.optional_count(line, REACH, index.get(&record, REACH))?;

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
                    ("cpa_reported", optional_cell_number(cpa_reported)),
                    ("reach", optional_cell_count(reach)),
                    ("has_conversion_tracking", Cell::Flag(conversions.is_some())),
                ],
                derived: None,
            });
        }

        // Stable, so re-exported duplicates keep their file order
        rows.sort_by(|a, b| a.campaign_name.cmp(&b.campaign_name).then(a.date.cmp(&b.date)));

        let untracked = rows.iter().filter(|r| r.conversions.is_none()).count();
        if untracked > 0 {
            debug!("{} Meta rows without conversion tracking", untracked);
        }
        info!("Parsed {} Meta rows from {}", rows.len(), path.display());

        Ok(IntermediateTable {
            platform: Platform::Meta,
            source_path: path.to_path_buf(),
            columns: META_COLUMNS.to_vec(),
            rows,
        })
    }
}

/// Coarse campaign type, inferred from the campaign name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CampaignCategory {
    BrandAwareness,
    Retargeting,
    Test,
    Prospecting,
}

impl CampaignCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignCategory::BrandAwareness => "brand_awareness",
            CampaignCategory::Retargeting => "retargeting",
            CampaignCategory::Test => "test",
            CampaignCategory::Prospecting => "prospecting",
        }
    }
}

pub fn categorize_campaign(campaign_name: &str) -> CampaignCategory {
    let name = campaign_name.to_lowercase();
    if name.contains("brand") || name.contains("awareness") {
        CampaignCategory::BrandAwareness
    } else if name.contains("retarget") {
        CampaignCategory::Retargeting
    } else if name.contains("test") {
        CampaignCategory::Test
    } else {
        CampaignCategory::Prospecting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "Reporting starts,Reporting ends,Campaign name,Amount spent (USD),Impressions,Link clicks,Purchases,Cost per purchase (USD),Purchase conversion value (USD),Reach";

    fn write_export(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        write!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_parses_sentinels_as_absent_and_rounds_money() {
        let file = write_export(
            "2024-01-02,2024-01-02,Retargeting_Core,320.456,17000,800,44,7.28,3740,13000\n\
             2024-01-01,2024-01-01,Brand_Awareness_Q1,250,13000,150,--,--,--,9800\n",
        );

        let table = MetaParser::new().parse(file.path()).unwrap();
        assert_eq!(table.rows.len(), 2);

        // Sorted by campaign then date
        let brand = &table.rows[0];
        assert_eq!(brand.campaign_name, "Brand_Awareness_Q1");
        assert_eq!(brand.conversions, None);
        assert_eq!(brand.revenue, None);
        assert_eq!(brand.field("has_conversion_tracking"), Some(&Cell::Flag(false)));
        assert_eq!(brand.field("cpa_reported"), Some(&Cell::Absent));

        let retargeting = &table.rows[1];
        assert_eq!(retargeting.spend, 320.46);
        assert_eq!(retargeting.conversions, Some(44));
        assert_eq!(retargeting.field("reach"), Some(&Cell::Count(13000)));
        assert_eq!(retargeting.field("has_conversion_tracking"), Some(&Cell::Flag(true)));
    }

    #[test]
    fn test_divergent_end_date_is_ignored() {
        let file = write_export("2024-01-02,2024-01-09,Always_On_Prospecting,100,1000,30,0,--,0,700\n");
        let table = MetaParser::new().parse(file.path()).unwrap();
        assert_eq!(table.rows[0].date.to_string(), "2024-01-02");
    }

    #[test]
    fn test_missing_column_is_schema_violation() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Reporting starts,Campaign name,Amount spent (USD)").unwrap();
        writeln!(file, "2024-01-01,x,1").unwrap();

        let err = MetaParser::new().parse(file.path()).unwrap_err();
        match err {
            PipelineError::SchemaViolation { platform, detail } => {
                assert_eq!(platform, Platform::Meta);
                assert!(detail.contains("Reporting ends"));
                assert!(detail.contains("Reach"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_uncoercible_required_value_reports_row_context() {
        let file = write_export("2024-01-01,2024-01-01,Retargeting_Core,abc,1000,30,1,--,85,700\n");
        let err = MetaParser::new().parse(file.path()).unwrap_err();
        match err {
            PipelineError::DecodeError { line, column, value, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, AMOUNT_SPENT);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_row_is_schema_violation_with_line() {
        let file = write_export(
            "2024-01-01,2024-01-01,Retargeting_Core,50,1000,30,1,50,85,700\n\
             2024-01-02,2024-01-02,Retargeting_Core,50,1000\n",
        );
        let err = MetaParser::new().parse(file.path()).unwrap_err();
        match err {
            PipelineError::SchemaViolation { platform, detail } => {
                assert_eq!(platform, Platform::Meta);
                assert!(detail.starts_with("line 3:"), "{}", detail);
                assert!(detail.contains("expected 10 fields, found 5"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let err = MetaParser::new().parse(Path::new("/no/such/meta.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_categorize_campaign() {
        assert_eq!(categorize_campaign("Brand_Awareness_Q1"), CampaignCategory::BrandAwareness);
        assert_eq!(categorize_campaign("Email_List_Retargeting"), CampaignCategory::Retargeting);
        assert_eq!(categorize_campaign("Creative_Test_Variant_A"), CampaignCategory::Test);
        assert_eq!(categorize_campaign("Always_On_Prospecting"), CampaignCategory::Prospecting);
    }
}
