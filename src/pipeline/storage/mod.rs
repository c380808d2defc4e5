//! Canonical file I/O.
//!
//! Writers serialize into memory first so the SHA-256 of exactly the bytes
//! on disk is known without a second read. The loader keeps every field as
//! text: the validator and the integrator judge the persisted form, not a
//! re-parsed one.

use csv::{ReaderBuilder, StringRecord, Writer};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{CanonicalRecord, Platform};

/// Lower-case hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Serialize a header and rows as CSV into a buffer
fn encode_csv<H, R, I>(header: H, rows: R) -> Result<Vec<u8>>
where
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: IntoIterator<Item = I>,
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)?;
    Ok(sha256_hex(bytes))
}

/// Write one platform's canonical file, returning its SHA-256
pub fn write_canonical(path: &Path, platform: Platform, records: &[CanonicalRecord]) -> Result<String> {
    if let Some(other) = records.iter().find(|r| r.platform != platform) {
        return Err(PipelineError::schema(
            platform,
            format!("record tagged {} in the {} output", other.platform, platform),
        ));
    }

    let bytes = encode_csv(
        platform.canonical_header(),
        records.iter().map(CanonicalRecord::to_fields),
    )?;
    let digest = write_bytes(path, &bytes)?;
    debug!("Wrote {} {} rows to {} (sha256 {})", records.len(), platform, path.display(), digest);
    Ok(digest)
}

/// Write an arbitrary table of text fields, returning its SHA-256
pub fn write_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<String> {
    let bytes = encode_csv(header, rows)?;
    write_bytes(path, &bytes)
}

/// A canonical file loaded as text
#[derive(Debug, Clone)]
pub struct CanonicalTable {
    pub path: PathBuf,
    pub header: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl CanonicalTable {
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| PipelineError::unavailable(path, e))?;
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
        let header = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            header,
            rows,
        })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Every value of a column, empty strings included; nothing when the column is missing
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let index = self.column(name);
        self.rows
            .iter()
            .filter_map(move |row| index.map(|i| row.get(i).unwrap_or("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Extensions;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn tiktok_record(campaign: &str) -> CanonicalRecord {
        CanonicalRecord {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            platform: Platform::TikTok,
            campaign_name: campaign.to_string(),
            spend: 120.5,
            impressions: 25000,
            clicks: 1200,
            conversions: None,
            revenue: None,
            ctr: Some(0.048),
            cvr: None,
            cpa: None,
            roas: None,
            extensions: Extensions::TikTok { is_learning: true },
        }
    }

    #[test]
    fn test_write_then_load_keeps_header_and_empty_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tiktok_cleaned.csv");

        let digest = write_canonical(&path, Platform::TikTok, &[tiktok_record("Spark_Ads_UGC")]).unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, sha256_hex(&fs::read(&path).unwrap()));

        let table = CanonicalTable::load(&path).unwrap();
        assert_eq!(table.header, Platform::TikTok.canonical_header());
        assert_eq!(table.values("conversions").collect::<Vec<_>>(), vec![""]);
        assert_eq!(table.values("ctr").collect::<Vec<_>>(), vec!["0.048"]);
        assert_eq!(table.values("is_learning").collect::<Vec<_>>(), vec!["true"]);
        assert_eq!(table.values("reach").count(), 0);
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiktok_cleaned.csv");
        let records = vec![tiktok_record("B"), tiktok_record("A")];

        let first = write_canonical(&path, Platform::TikTok, &records).unwrap();
        let second = write_canonical(&path, Platform::TikTok, &records).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mixed_platform_records_are_rejected() {
        let dir = tempdir().unwrap();
        let err = write_canonical(&dir.path().join("meta_cleaned.csv"), Platform::Meta, &[tiktok_record("A")])
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { .. }));
    }

    #[test]
    fn test_load_missing_file_is_source_unavailable() {
        let err = CanonicalTable::load(Path::new("/no/such/google_cleaned.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }
}
