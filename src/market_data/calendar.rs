// src/market_data/calendar.rs
use chrono::{DateTime, Duration, Utc};

use crate::domain::models::{EconomicEvent, EventImpact};

/// Events further than this from "now" do not move prices
pub const EVENT_WINDOW_MINUTES: i64 = 30;

/// Read-only list of scheduled releases that perturb prices around their time
#[derive(Debug, Clone, Default)]
pub struct EconomicCalendar {
    events: Vec<EconomicEvent>,
}

impl EconomicCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<EconomicEvent>) -> Self {
        let mut calendar = Self { events };
        calendar.events.sort_by_key(|e| e.scheduled_at);
        calendar
    }

    /// A handful of releases clustered around `now`, for demos
    pub fn demo(now: DateTime<Utc>) -> Self {
        let event = |offset_minutes: i64, impact, currency: &str, description: &str| EconomicEvent {
            scheduled_at: now + Duration::minutes(offset_minutes),
            impact,
            currency_code: currency.to_string(),
            description: description.to_string(),
        };

        Self::with_events(vec![
            event(5, EventImpact::High, "USD", "Non-Farm Payrolls"),
            event(20, EventImpact::Medium, "EUR", "ECB Press Conference"),
            event(45, EventImpact::Low, "GBP", "BoE Housing Equity Withdrawal"),
            event(90, EventImpact::High, "JPY", "BoJ Policy Rate"),
            event(180, EventImpact::Medium, "USD", "Initial Jobless Claims"),
        ])
    }

    pub fn add(&mut self, event: EconomicEvent) {
        let at = self
            .events
            .partition_point(|e| e.scheduled_at <= event.scheduled_at);
        self.events.insert(at, event);
    }

    pub fn events(&self) -> &[EconomicEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Shock weight of every event touching `symbol` within the window of `now`.
    ///
    /// The weight is the impact weight decayed linearly to zero at the window edge.
    pub fn influences(&self, symbol: &str, now: DateTime<Utc>) -> Vec<f64> {
        let window = Duration::minutes(EVENT_WINDOW_MINUTES).num_seconds() as f64;

        self.events
            .iter()
            .filter(|e| symbol.contains(e.currency_code.as_str()))
            .filter_map(|e| {
                let distance = (e.scheduled_at - now).num_seconds().abs() as f64;
                (distance <= window).then(|| e.impact.weight() * (1.0 - distance / window))
            })
            .filter(|w| *w > 0.0)
            .collect()
    }
}
