use chrono::{Datelike, NaiveDate};

/// Spend, CTR and CVR scaling applied to a campaign's baseline on one day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multipliers {
    pub spend: f64,
    pub ctr: f64,
    pub cvr: f64,
}

impl Multipliers {
    pub const NEUTRAL: Multipliers = Multipliers {
        spend: 1.0,
        ctr: 1.0,
        cvr: 1.0,
    };

    const fn new(spend: f64, ctr: f64, cvr: f64) -> Self {
        Self { spend, ctr, cvr }
    }

    fn compose(self, other: Multipliers) -> Multipliers {
        Multipliers {
            spend: self.spend * other.spend,
            ctr: self.ctr * other.ctr,
            cvr: self.cvr * other.cvr,
        }
    }
}

/// A date range whose multipliers stack on top of the month's
#[derive(Debug, Clone, PartialEq)]
pub struct PeakEvent {
    pub name: &'static str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub multipliers: Multipliers,
}

impl PeakEvent {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Calendar-keyed seasonality: one entry per month plus date-range overrides
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalityConfig {
    /// Indexed by month, January first
    pub months: [Multipliers; 12],
    pub events: Vec<PeakEvent>,
}

const MONTHS: [Multipliers; 12] = [
    Multipliers::new(0.95, 0.98, 0.96),
    Multipliers::new(1.05, 1.05, 1.10),
    Multipliers::new(1.00, 1.00, 1.00),
    Multipliers::new(0.95, 0.97, 0.97),
    Multipliers::new(1.00, 1.01, 1.02),
    Multipliers::new(0.93, 0.95, 0.93),
    Multipliers::new(0.92, 0.94, 0.92),
    Multipliers::new(1.05, 1.04, 1.03),
    Multipliers::new(1.08, 1.06, 1.05),
    Multipliers::new(1.15, 1.08, 1.08),
    Multipliers::new(1.35, 1.12, 1.20),
    Multipliers::new(1.40, 1.15, 1.22),
];

// (name, start month/day, end month/day, multipliers)
const EVENTS: [(&str, (u32, u32), (u32, u32), Multipliers); 5] = [
    ("valentines_day", (2, 10), (2, 18), Multipliers::new(1.10, 1.12, 1.25)),
    ("mothers_day", (5, 1), (5, 12), Multipliers::new(1.05, 1.05, 1.10)),
    ("back_to_school", (8, 1), (8, 25), Multipliers::new(1.08, 1.06, 1.08)),
    ("black_friday", (11, 20), (11, 30), Multipliers::new(1.30, 1.20, 1.40)),
    ("holiday_season", (12, 10), (12, 31), Multipliers::new(1.25, 1.18, 1.32)),
];

impl SeasonalityConfig {
    /// Retail calendar for `year`
    pub fn retail(year: i32) -> Self {
        let events = EVENTS
            .iter()
            .filter_map(|(name, (sm, sd), (em, ed), multipliers)| {
                Some(PeakEvent {
                    name: *name,
                    start: NaiveDate::from_ymd_opt(year, *sm, *sd)?,
                    end: NaiveDate::from_ymd_opt(year, *em, *ed)?,
                    multipliers: *multipliers,
                })
            })
            .collect();

        Self {
            months: MONTHS,
            events,
        }
    }

    pub fn flat() -> Self {
        Self {
            months: [Multipliers::NEUTRAL; 12],
            events: Vec::new(),
        }
    }

    pub fn multipliers(&self, date: NaiveDate) -> Multipliers {
        let month = self.months[date.month0() as usize];
        self.events
            .iter()
            .filter(|event| event.contains(date))
            .fold(month, |acc, event| acc.compose(event.multipliers))
    }
}
