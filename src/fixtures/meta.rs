use chrono::NaiveDate;
use rand::seq::index::sample;
use rand::Rng;

use super::{encode, is_weekend, jitter, money, or_missing, round2, GeneratorContext};
use crate::error::Result;
use crate::pipeline::processing::parser::meta::{
    AMOUNT_SPENT, CAMPAIGN_NAME, COST_PER_PURCHASE, IMPRESSIONS, LINK_CLICKS, PURCHASES,
    PURCHASE_VALUE, REACH, REPORTING_ENDS, REPORTING_STARTS,
};

const ORDER_VALUE: u64 = 85;

struct Campaign {
    name: &'static str,
    budget: f64,
    ctr: f64,
    cvr: f64,
    tracks_conversions: bool,
    start: (u32, u32),
    pause_weekend: bool,
}

const fn campaign(name: &'static str, budget: f64, ctr: f64, cvr: f64, start: (u32, u32)) -> Campaign {
    Campaign {
        name,
        budget,
        ctr,
        cvr,
        tracks_conversions: true,
        start,
        pause_weekend: false,
    }
}

const CAMPAIGNS: [Campaign; 12] = [
    campaign("Always_On_Prospecting", 360.0, 0.026, 0.020, (1, 1)),
    campaign("Prospecting_Lookalike_A", 410.0, 0.030, 0.023, (1, 1)),
    campaign("Retargeting_Core", 320.0, 0.048, 0.055, (1, 1)),
    Campaign {
        tracks_conversions: false,
        ..campaign("Brand_Awareness_Q1", 250.0, 0.012, 0.004, (1, 1))
    },
    campaign("Spring_Promo_Video", 380.0, 0.034, 0.026, (3, 1)),
    campaign("Summer_Collections", 300.0, 0.029, 0.020, (6, 1)),
    campaign("Back_to_School_Push", 420.0, 0.036, 0.027, (8, 1)),
    campaign("Holiday_Peak_Sales", 620.0, 0.045, 0.038, (11, 1)),
    campaign("Creative_Test_Variant_A", 160.0, 0.028, 0.021, (2, 20)),
    campaign("Creative_Test_Variant_B", 160.0, 0.032, 0.024, (2, 20)),
    Campaign {
        pause_weekend: true,
        ..campaign("Weekend_Flash_Sale", 200.0, 0.040, 0.030, (1, 1))
    },
    campaign("Email_List_Retargeting", 290.0, 0.050, 0.058, (1, 1)),
];

#[derive(Debug, Clone)]
struct MetaRow {
    date: NaiveDate,
    campaign: &'static str,
    spend: f64,
    impressions: u64,
    clicks: u64,
    purchases: Option<u64>,
    cost_per_purchase: Option<f64>,
    purchase_value: Option<u64>,
    reach: u64,
}

impl MetaRow {
    fn set_purchases(&mut self, purchases: u64) {
        self.purchases = Some(purchases);
        self.purchase_value = Some(purchases * ORDER_VALUE);
        self.cost_per_purchase = (purchases > 0).then(|| round2(self.spend / purchases as f64));
    }

    fn fields(&self) -> Vec<String> {
        let day = self.date.to_string();
        vec![
            day.clone(),
            day,
            self.campaign.to_string(),
            money(self.spend),
            self.impressions.to_string(),
            self.clicks.to_string(),
            or_missing(self.purchases),
            or_missing(self.cost_per_purchase.map(money)),
            or_missing(self.purchase_value),
            self.reach.to_string(),
        ]
    }
}

fn day_row(ctx: &mut GeneratorContext, campaign: &Campaign, date: NaiveDate) -> MetaRow {
    let m = ctx.seasonality.multipliers(date);
    let rng = &mut ctx.rng;

    let base_impressions = campaign.budget * 55.0;
    let impressions = jitter(rng, base_impressions * m.spend, 0.18).max(150.0) as u64;
    let ctr = jitter(rng, campaign.ctr * m.ctr, 0.22).max(0.001);
    let clicks = (impressions as f64 * ctr) as u64;
    let spend = round2(jitter(rng, campaign.budget * m.spend, 0.18).max(15.0));

    let mut row = MetaRow {
        date,
        campaign: campaign.name,
        spend,
        impressions,
        clicks,
        purchases: None,
        cost_per_purchase: None,
        purchase_value: None,
        reach: 0,
    };

    if campaign.tracks_conversions {
        let cvr = jitter(rng, campaign.cvr * m.cvr, 0.28).max(0.001);
        row.set_purchases((clicks as f64 * cvr) as u64);
    }

    // Weekends run about 15% cooler
    if is_weekend(date) {
        row.impressions = (row.impressions as f64 * 0.85) as u64;
        row.clicks = (row.clicks as f64 * 0.85) as u64;
        row.spend = round2(row.spend * 0.88);
        if let Some(p) = row.purchases.filter(|p| *p > 0) {
            row.set_purchases((p as f64 * 0.88) as u64);
        }
    }

    row.reach = (row.impressions as f64 * rng.gen_range(0.68..0.82)) as u64;
    row
}

/// Meta Ads Manager export, including re-exported duplicate rows
pub fn export(ctx: &mut GeneratorContext, duplicate_rows: usize) -> Result<(Vec<u8>, usize)> {
    let dates = ctx.dates.clone();
    let mut rows = Vec::new();

    for campaign in &CAMPAIGNS {
        let Some(start) = ctx.date(campaign.start.0, campaign.start.1) else {
            continue;
        };
        for date in dates.iter().copied().filter(|d| *d >= start) {
            if campaign.pause_weekend && is_weekend(date) {
                continue;
            }
            rows.push(day_row(ctx, campaign, date));
        }
    }

    // Re-exports repeat rows with slightly revised purchase counts
    let amount = duplicate_rows.min(rows.len());
    let picked = sample(&mut ctx.rng, rows.len(), amount).into_vec();
    for index in picked {
        let mut duplicate = rows[index].clone();
        if let Some(p) = duplicate.purchases.filter(|p| *p > 0) {
            let adjustment: i64 = ctx.rng.gen_range(-2..=3);
            duplicate.set_purchases((p as i64 + adjustment).max(0) as u64);
        }
        rows.push(duplicate);
    }

    let header = [
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
    let count = rows.len();
    Ok((encode(&header, rows.iter().map(MetaRow::fields))?, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::fixtures::SeasonalityConfig;

    #[test]
    fn test_export_appends_requested_duplicates() {
        let config = GeneratorConfig::default();
        let mut ctx = GeneratorContext::new(&config, SeasonalityConfig::flat()).unwrap();
        let (bytes, rows) = export(&mut ctx, 30).unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), rows + 1);
        assert!(text.starts_with("Reporting starts,Reporting ends,Campaign name"));
        // Brand awareness has no pixel, so its purchases are never reported
        assert!(text
            .lines()
            .filter(|l| l.contains("Brand_Awareness_Q1"))
            .all(|l| l.contains(",--,--,--,")));
    }
}
