/// File and field name constants shared by the parsers, the storage layer and the validator.
/// Keeping them here means a renamed export or output file is a one-line change.

// Raw exports, as dropped by the platform UIs
pub const META_RAW_FILE: &str = "meta_ads_raw.csv";
pub const GOOGLE_RAW_FILE: &str = "google_ads_raw.csv";
pub const TIKTOK_RAW_FILE: &str = "tiktok_ads_raw.csv";

// Canonical outputs
pub const META_CANONICAL_FILE: &str = "meta_cleaned.csv";
pub const GOOGLE_CANONICAL_FILE: &str = "google_cleaned.csv";
pub const TIKTOK_CANONICAL_FILE: &str = "tiktok_cleaned.csv";
pub const INTEGRATED_FILE: &str = "integrated_data.csv";

/// Text every platform uses for "no value reported"
pub const MISSING_SENTINEL: &str = "--";

/// Canonical base fields, in output order
pub const CANONICAL_BASE_FIELDS: &[&str] = &[
    "date",
    "platform",
    "campaign_name",
    "spend",
    "impressions",
    "clicks",
    "conversions",
    "revenue",
    "ctr",
    "cvr",
    "cpa",
    "roas",
];

/// Fields the validator expects to hold numbers
pub const NUMERIC_FIELDS: &[&str] = &[
    "spend",
    "impressions",
    "clicks",
    "conversions",
    "revenue",
    "ctr",
    "cvr",
    "cpa",
    "roas",
];

/// Derived ratios; never infinite
pub const DERIVED_FIELDS: &[&str] = &["ctr", "cvr", "cpa", "roas"];

/// Ratios bounded to [0, 1]
pub const RATE_FIELDS: &[&str] = &["ctr", "cvr"];

// Extension fields, append-only
pub const EXT_HAS_CONVERSION_TRACKING: &str = "has_conversion_tracking";
pub const EXT_REACH: &str = "reach";
pub const EXT_IS_LEARNING: &str = "is_learning";

/// Order extension fields take in the integrated file
pub const EXTENSION_FIELD_ORDER: &[&str] =
    &[EXT_HAS_CONVERSION_TRACKING, EXT_REACH, EXT_IS_LEARNING];

/// Date format of every canonical file
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";
