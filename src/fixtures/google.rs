use chrono::NaiveDate;
use rand::Rng;

use super::{encode, jitter, money, round2, GeneratorContext};
use crate::constants::MISSING_SENTINEL;
use crate::error::Result;
use crate::pipeline::processing::parser::google::GOOGLE_FIELDS;

const ORDER_VALUE: u64 = 85;
const CENSORED: &str = "< 10";

// (name, id, daily budget, ctr, cvr, start month/day)
const CAMPAIGNS: [(&str, &str, f64, f64, f64, (u32, u32)); 11] = [
    ("Search_Brand_Exact", "1234567890", 370.0, 0.155, 0.090, (1, 1)),
    ("Search_Generic_Broad", "1234567891", 420.0, 0.032, 0.019, (1, 1)),
    ("Display_Retargeting", "1234567892", 260.0, 0.009, 0.034, (1, 1)),
    ("Shopping_Product_Feed", "1234567893", 480.0, 0.047, 0.030, (1, 1)),
    ("Video_YouTube_Awareness", "1234567894", 320.0, 0.016, 0.008, (1, 1)),
    ("Search_Competitor_Keywords", "1234567895", 340.0, 0.029, 0.016, (1, 1)),
    ("Display_Lookalike", "1234567896", 290.0, 0.013, 0.023, (1, 15)),
    ("Search_Long_Tail", "1234567897", 240.0, 0.039, 0.026, (1, 1)),
    ("RLSA_Past_Visitors", "1234567898", 280.0, 0.053, 0.044, (1, 1)),
    ("Smart_Shopping", "1234567899", 400.0, 0.042, 0.032, (1, 25)),
    ("Holiday_Gift_Search", "1234567800", 520.0, 0.050, 0.040, (10, 1)),
];

fn day_row(
    ctx: &mut GeneratorContext,
    (name, id, budget, base_ctr, base_cvr, _): &(&str, &str, f64, f64, f64, (u32, u32)),
    date: NaiveDate,
) -> Vec<String> {
    let m = ctx.seasonality.multipliers(date);
    let rng = &mut ctx.rng;

    let mut impressions = jitter(rng, budget * 48.0 * m.spend, 0.19).max(120.0) as u64;
    let ctr = jitter(rng, base_ctr * m.ctr, 0.20).max(0.001);
    let mut clicks = (impressions as f64 * ctr) as u64;
    let cost = round2(jitter(rng, budget * m.spend, 0.18).max(12.0));
    let cvr = jitter(rng, base_cvr * m.cvr, 0.24).max(0.001);
    let raw_conversions = clicks as f64 * cvr;

    let missing = || MISSING_SENTINEL.to_string();
    let (mut conversions, mut conv_rate, mut cost_per_conv, mut conv_value) =
        if raw_conversions < 10.0 && rng.gen_bool(0.35) {
            // Privacy threshold: small counts are only reported as "< 10"
            (CENSORED.to_string(), missing(), missing(), missing())
        } else {
            let count = raw_conversions as u64;
            let rate = if clicks > 0 {
                count as f64 / clicks as f64 * 100.0
            } else {
                0.0
            };
            if count > 0 {
                (
                    count.to_string(),
                    format!("{:.2}%", rate),
                    money(round2(cost / count as f64)),
                    (count * ORDER_VALUE).to_string(),
                )
            } else {
                (count.to_string(), format!("{:.2}%", rate), missing(), missing())
            }
        };

    // Budget exhausted mid-day
    if rng.gen_bool(0.06) {
        impressions = (impressions as f64 * 0.6) as u64;
        clicks = (clicks as f64 * 0.6) as u64;
    }

    // Conversions not yet attributed at export time
    if rng.gen_bool(0.02) {
        conversions = missing();
        conv_rate = missing();
        cost_per_conv = missing();
        conv_value = missing();
    }

    vec![
        date.to_string(),
        name.to_string(),
        id.to_string(),
        impressions.to_string(),
        clicks.to_string(),
        money(cost),
        conversions,
        conv_rate,
        cost_per_conv,
        conv_value,
    ]
}

/// Google Ads report: preamble, label row, data rows
pub fn export(ctx: &mut GeneratorContext, year: i32) -> Result<(Vec<u8>, usize)> {
    let dates = ctx.dates.clone();
    let mut rows = Vec::new();

    for campaign in &CAMPAIGNS {
        let (month, day) = campaign.5;
        let Some(start) = ctx.date(month, day) else {
            continue;
        };
        for date in dates.iter().copied().filter(|d| *d >= start) {
            rows.push(day_row(ctx, campaign, date));
        }
    }

    let count = rows.len();
    let mut bytes = format!(
        "Campaign performance report\nDownloaded: {}-12-31 23:59:59 PST\n\n",
        year
    )
    .into_bytes();
    bytes.extend(encode(&GOOGLE_FIELDS, rows)?);
    Ok((bytes, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::fixtures::SeasonalityConfig;

    #[test]
    fn test_export_has_preamble_and_censored_counts() {
        let config = GeneratorConfig::default();
        let mut ctx = GeneratorContext::new(&config, SeasonalityConfig::retail(2024)).unwrap();
        let (bytes, rows) = export(&mut ctx, 2024).unwrap();

        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Campaign performance report");
        assert!(lines[1].starts_with("Downloaded: 2024-12-31"));
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], GOOGLE_FIELDS.join(","));
        assert_eq!(lines.len(), rows + 4);
        assert!(text.contains(",< 10,"));
    }
}
