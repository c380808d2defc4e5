//! Per-source text decoding.
//!
//! Each parser owns a [`DecodePolicy`] describing how its platform spells
//! "missing" and "censored". Every decode routine maps those spellings onto
//! the single absent representation (`None` / [`Cell::Absent`]) so nothing
//! downstream ever sees source sentinel text.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::MISSING_SENTINEL;
use crate::error::{PipelineError, Result};
use crate::types::{Cell, Platform};

static CENSORED_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<\s*(\d+)$").expect("censored-count pattern is valid"));

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// How a platform encodes privacy-censored counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CensoredPolicy {
    /// Count used internally in place of the censored marker
    pub imputed: u64,
}

#[derive(Debug, Clone)]
pub struct DecodePolicy {
    pub platform: Platform,
    missing: Vec<&'static str>,
    censored: Option<CensoredPolicy>,
}

impl DecodePolicy {
    /// `--` and empty fields mean "not reported"
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            missing: vec![MISSING_SENTINEL, ""],
            censored: None,
        }
    }

    pub fn with_censored(mut self, censored: CensoredPolicy) -> Self {
        self.censored = Some(censored);
        self
    }

    pub fn is_missing(&self, raw: &str) -> bool {
        let raw = raw.trim();
        self.missing.iter().any(|m| *m == raw)
    }

    fn error(&self, line: u64, column: &str, raw: &str, reason: impl Into<String>) -> PipelineError {
        PipelineError::DecodeError {
            platform: self.platform,
            line,
            column: column.to_string(),
            value: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub fn date(&self, line: u64, column: &str, raw: &str) -> Result<NaiveDate> {
        let value = raw.trim();
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
            .ok_or_else(|| self.error(line, column, raw, "expected a YYYY-MM-DD date"))
    }

    pub fn required_text(&self, line: u64, column: &str, raw: &str) -> Result<String> {
        if self.is_missing(raw) {
            return Err(self.error(line, column, raw, "required value is missing"));
        }
        Ok(raw.trim().to_string())
    }

    pub fn optional_text(&self, raw: &str) -> Cell {
        if self.is_missing(raw) {
            Cell::Absent
        } else {
            Cell::Text(raw.trim().to_string())
        }
    }

    pub fn required_money(&self, line: u64, column: &str, raw: &str) -> Result<f64> {
        self.optional_money(line, column, raw)?
            .ok_or_else(|| self.error(line, column, raw, "required value is missing"))
    }

    pub fn optional_money(&self, line: u64, column: &str, raw: &str) -> Result<Option<f64>> {
        if self.is_missing(raw) {
            return Ok(None);
        }
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| self.error(line, column, raw, "expected a number"))?;
        if !value.is_finite() || value < 0.0 {
            return Err(self.error(line, column, raw, "expected a finite non-negative number"));
        }
        Ok(Some(value))
    }

    pub fn required_count(&self, line: u64, column: &str, raw: &str) -> Result<u64> {
        self.optional_count(line, column, raw)?
            .ok_or_else(|| self.error(line, column, raw, "required value is missing"))
    }

    pub fn optional_count(&self, line: u64, column: &str, raw: &str) -> Result<Option<u64>> {
        if self.is_missing(raw) {
            return Ok(None);
        }
        let value = raw.trim();
        if let Ok(count) = value.parse::<u64>() {
            return Ok(Some(count));
        }
        // Some exports write whole counts as floats ("12.0")
        match value.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                Ok(Some(f as u64))
            }
            _ => Err(self.error(line, column, raw, "expected a non-negative whole count")),
        }
    }

    /// Count that may be privacy-censored (`< 10`). A censored marker is a
    /// present value and decodes to the imputed count, never to absent.
    pub fn optional_censored_count(&self, line: u64, column: &str, raw: &str) -> Result<Option<u64>> {
        if let Some(policy) = self.censored {
            if CENSORED_COUNT.is_match(raw.trim()) {
                return Ok(Some(policy.imputed));
            }
        }
        self.optional_count(line, column, raw)
    }

    /// `4.80%` -> 0.048
    pub fn optional_percent(&self, line: u64, column: &str, raw: &str) -> Result<Option<f64>> {
        if self.is_missing(raw) {
            return Ok(None);
        }
        let stripped = raw.trim().trim_end_matches('%').trim();
        let value: f64 = stripped
            .parse()
            .map_err(|_| self.error(line, column, raw, "expected a percentage such as 4.80%"))?;
        if !value.is_finite() {
            return Err(self.error(line, column, raw, "percentage is not finite"));
        }
        Ok(Some(value / 100.0))
    }
}

/// Round a money amount to cents
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn optional_cell_number(value: Option<f64>) -> Cell {
    value.map(Cell::Number).unwrap_or(Cell::Absent)
}

pub fn optional_cell_count(value: Option<u64>) -> Cell {
    value.map(Cell::Count).unwrap_or(Cell::Absent)
}
