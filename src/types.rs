use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::constants::{
    CANONICAL_BASE_FIELDS, CANONICAL_DATE_FORMAT, EXT_HAS_CONVERSION_TRACKING, EXT_IS_LEARNING,
    EXT_REACH, GOOGLE_CANONICAL_FILE, GOOGLE_RAW_FILE, META_CANONICAL_FILE, META_RAW_FILE,
    TIKTOK_CANONICAL_FILE, TIKTOK_RAW_FILE,
};

/// Advertising platforms whose exports are normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Meta,
    Google,
    TikTok,
}

impl Platform {
    /// Source order used by the integrator and the validator transcript
    pub const ALL: [Platform; 3] = [Platform::Meta, Platform::Google, Platform::TikTok];

    /// Value written to the canonical `platform` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Meta => "Meta",
            Platform::Google => "Google",
            Platform::TikTok => "TikTok",
        }
    }

    /// Lower-case identifier used in CLI arguments and metric labels
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
            Platform::TikTok => "tiktok",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Platform> {
        match slug.trim().to_ascii_lowercase().as_str() {
            "meta" => Some(Platform::Meta),
            "google" => Some(Platform::Google),
            "tiktok" => Some(Platform::TikTok),
            _ => None,
        }
    }

    pub fn raw_file(&self) -> &'static str {
        match self {
            Platform::Meta => META_RAW_FILE,
            Platform::Google => GOOGLE_RAW_FILE,
            Platform::TikTok => TIKTOK_RAW_FILE,
        }
    }

    pub fn canonical_file(&self) -> &'static str {
        match self {
            Platform::Meta => META_CANONICAL_FILE,
            Platform::Google => GOOGLE_CANONICAL_FILE,
            Platform::TikTok => TIKTOK_CANONICAL_FILE,
        }
    }

    /// Platform-specific columns appended after the base fields
    pub fn extension_fields(&self) -> &'static [&'static str] {
        match self {
            Platform::Meta => &[EXT_HAS_CONVERSION_TRACKING, EXT_REACH],
            Platform::Google => &[],
            Platform::TikTok => &[EXT_IS_LEARNING],
        }
    }

    /// Full canonical header for this platform
    pub fn canonical_header(&self) -> Vec<&'static str> {
        CANONICAL_BASE_FIELDS
            .iter()
            .chain(self.extension_fields().iter())
            .copied()
            .collect()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded intermediate value. `Absent` is the one representation of
/// "not reported" every source decodes its own missing-value text into.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Absent,
    Count(u64),
    Number(f64),
    Text(String),
    Flag(bool),
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Count(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Cell::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

/// The four ratios every source gets from the same formulas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub ctr: Option<f64>,
    pub cvr: Option<f64>,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
}

/// One parsed row in its source's own column set.
///
/// The measures every source reports are typed fields; anything the source
/// carries beyond them (its own CPA, reach, learning status, ...) lives in
/// `extra` under the documented intermediate column name.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateRow {
    /// 1-based line in the raw export, for error context
    pub line: u64,
    pub date: NaiveDate,
    pub campaign_name: String,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: Option<u64>,
    pub revenue: Option<f64>,
    pub extra: Vec<(&'static str, Cell)>,
    /// Filled by the metric deriver
    pub derived: Option<DerivedMetrics>,
}

impl IntermediateRow {
    pub fn field(&self, name: &str) -> Option<&Cell> {
        self.extra
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, cell)| cell)
    }

    /// Insert or replace a source-specific column
    pub fn set_field(&mut self, name: &'static str, cell: Cell) {
        match self.extra.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = cell,
            None => self.extra.push((name, cell)),
        }
    }
}

/// Output of one source parser
#[derive(Debug, Clone)]
pub struct IntermediateTable {
    pub platform: Platform,
    pub source_path: PathBuf,
    /// Documented intermediate column set, in order
    pub columns: Vec<&'static str>,
    pub rows: Vec<IntermediateRow>,
}

impl IntermediateTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| *c == name)
    }
}

/// Platform-specific canonical fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Extensions {
    Meta {
        has_conversion_tracking: bool,
        reach: Option<u64>,
    },
    Google,
    TikTok {
        is_learning: bool,
    },
}

/// A row of the shared schema. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub date: NaiveDate,
    pub platform: Platform,
    pub campaign_name: String,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: Option<u64>,
    pub revenue: Option<f64>,
    pub ctr: Option<f64>,
    pub cvr: Option<f64>,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
    pub extensions: Extensions,
}

impl CanonicalRecord {
    /// Serialized fields in canonical header order; absent values are empty.
    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.date.format(CANONICAL_DATE_FORMAT).to_string(),
            self.platform.as_str().to_string(),
            self.campaign_name.clone(),
            format_number(self.spend),
            self.impressions.to_string(),
            self.clicks.to_string(),
            format_optional_count(self.conversions),
            format_optional_number(self.revenue),
            format_optional_number(self.ctr),
            format_optional_number(self.cvr),
            format_optional_number(self.cpa),
            format_optional_number(self.roas),
        ];

        match &self.extensions {
            Extensions::Meta {
                has_conversion_tracking,
                reach,
            } => {
                fields.push(has_conversion_tracking.to_string());
                fields.push(format_optional_count(*reach));
            }
            Extensions::Google => {}
            Extensions::TikTok { is_learning } => fields.push(is_learning.to_string()),
        }

        fields
    }
}

pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

pub fn format_optional_number(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

pub fn format_optional_count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_headers_share_base_prefix() {
        let meta = Platform::Meta.canonical_header();
        let google = Platform::Google.canonical_header();
        let tiktok = Platform::TikTok.canonical_header();

        assert_eq!(&meta[..12], CANONICAL_BASE_FIELDS);
        assert_eq!(google, CANONICAL_BASE_FIELDS);
        assert_eq!(&tiktok[..12], CANONICAL_BASE_FIELDS);
        assert_eq!(&meta[12..], &["has_conversion_tracking", "reach"]);
        assert_eq!(&tiktok[12..], &["is_learning"]);
    }

    #[test]
    fn test_absent_serializes_as_empty_field() {
        let record = CanonicalRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            platform: Platform::Google,
            campaign_name: "Search_Brand_Exact".to_string(),
            spend: 50.0,
            impressions: 1000,
            clicks: 30,
            conversions: None,
            revenue: None,
            ctr: Some(0.03),
            cvr: None,
            cpa: None,
            roas: None,
            extensions: Extensions::Google,
        };

        assert_eq!(
            record.to_fields(),
            vec!["2024-03-01", "Google", "Search_Brand_Exact", "50", "1000", "30", "", "", "0.03", "", "", ""]
        );
    }

    #[test]
    fn test_set_field_replaces_existing_value() {
        let mut row = IntermediateRow {
            line: 2,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            campaign_name: "c".to_string(),
            spend: 1.0,
            impressions: 1,
            clicks: 1,
            conversions: None,
            revenue: None,
            extra: Vec::new(),
            derived: None,
        };
        row.set_field("reach", Cell::Count(10));
        row.set_field("reach", Cell::Count(12));

        assert_eq!(row.extra.len(), 1);
        assert_eq!(row.field("reach"), Some(&Cell::Count(12)));
        assert_eq!(Platform::from_slug("TikTok"), Some(Platform::TikTok));
    }
}
