use chrono::NaiveDate;
use rand::Rng;

use super::{encode, jitter, money, or_missing, round2, GeneratorContext};
use crate::error::Result;
use crate::pipeline::processing::parser::tiktok::{
    AD_GROUP_NAME, CAMPAIGN_NAME, CLICKS, CONVERSIONS, COST, CPA, CTR, CVR, DATE, IMPRESSIONS,
    LEARNING_STATUS, VIDEO_PLAY_ACTIONS, VIDEO_VIEWS,
};

struct AdGroup {
    campaign: &'static str,
    ad_group: &'static str,
    budget: f64,
    ctr: f64,
    cvr: f64,
    start: (u32, u32),
}

const AD_GROUPS: [AdGroup; 8] = [
    AdGroup { campaign: "New_Year_Sale", ad_group: "Lookalike_Audience_1", budget: 320.0, ctr: 0.032, cvr: 0.028, start: (1, 1) },
    AdGroup { campaign: "New_Year_Sale", ad_group: "Interest_Fashion", budget: 300.0, ctr: 0.030, cvr: 0.027, start: (1, 1) },
    AdGroup { campaign: "Spring_Collections", ad_group: "Broad_Interest_Apparel", budget: 280.0, ctr: 0.029, cvr: 0.024, start: (3, 1) },
    AdGroup { campaign: "Summer_Vibes", ad_group: "Spark_Addicts", budget: 260.0, ctr: 0.027, cvr: 0.022, start: (6, 1) },
    AdGroup { campaign: "Back_to_School", ad_group: "Student_Device", budget: 310.0, ctr: 0.031, cvr: 0.026, start: (8, 1) },
    AdGroup { campaign: "Holiday_Mega_Sale", ad_group: "Gift_Shoppers", budget: 380.0, ctr: 0.037, cvr: 0.032, start: (11, 1) },
    AdGroup { campaign: "Creative_Test_Video", ad_group: "UGC_Creator_A", budget: 200.0, ctr: 0.028, cvr: 0.021, start: (2, 15) },
    AdGroup { campaign: "Creative_Test_Video", ad_group: "UGC_Creator_B", budget: 200.0, ctr: 0.030, cvr: 0.022, start: (2, 15) },
];

/// Days a new ad group always spends in the learning phase
const LEARNING_DAYS: i64 = 5;

fn percent(numerator: u64, denominator: u64) -> String {
    if denominator == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", numerator as f64 / denominator as f64 * 100.0)
}

fn day_row(ctx: &mut GeneratorContext, group: &AdGroup, start: NaiveDate, date: NaiveDate) -> Vec<String> {
    let m = ctx.seasonality.multipliers(date);
    let rng = &mut ctx.rng;

    let mut cost = round2(jitter(rng, group.budget * m.spend, 0.22).max(6.0));
    let impressions = jitter(rng, group.budget * 62.0 * m.spend, 0.23).max(90.0) as u64;
    let ctr = jitter(rng, group.ctr * m.ctr, 0.22).max(0.001);
    let clicks = (impressions as f64 * ctr) as u64;
    let cvr = jitter(rng, group.cvr * m.cvr, 0.26).max(0.001);
    let conversions = (clicks as f64 * cvr) as u64;

    let learning_status = if (date - start).num_days() < LEARNING_DAYS || rng.gen_bool(0.07) {
        "Learning"
    } else if rng.gen_bool(0.05) {
        "Limited"
    } else {
        "Active"
    };

    // Delivery paused for the day
    if rng.gen_bool(0.05) {
        cost = 0.0;
    }

    let video_views = (impressions as f64 * rng.gen_range(0.45..0.72)) as u64;
    let video_actions = (video_views as f64 * rng.gen_range(0.65..0.9)) as u64;

    // Some zero-conversion days are reported as missing instead of 0
    let reported = if conversions == 0 && rng.gen_bool(0.05) {
        None
    } else {
        Some(conversions)
    };
    let cpa = reported
        .filter(|c| *c > 0)
        .map(|c| money(round2(cost / c as f64)));

    vec![
        date.to_string(),
        group.campaign.to_string(),
        group.ad_group.to_string(),
        money(cost),
        impressions.to_string(),
        clicks.to_string(),
        or_missing(reported),
        or_missing(cpa),
        percent(clicks, impressions),
        percent(conversions, clicks),
        video_views.to_string(),
        video_actions.to_string(),
        learning_status.to_string(),
    ]
}

/// TikTok Ads export, one row per ad group per day
pub fn export(ctx: &mut GeneratorContext) -> Result<(Vec<u8>, usize)> {
    let dates = ctx.dates.clone();
    let mut rows = Vec::new();

    for group in &AD_GROUPS {
        let Some(start) = ctx.date(group.start.0, group.start.1) else {
            continue;
        };
        for date in dates.iter().copied().filter(|d| *d >= start) {
            rows.push(day_row(ctx, group, start, date));
        }
    }

    let header = [
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
    let count = rows.len();
    Ok((encode(&header, rows)?, count))
}
