// src/market_data/session.rs

/// A trading session window in UTC hours, `[start_hour, end_hour)`.
/// Windows with `start_hour > end_hour` wrap across midnight.
#[derive(Debug, Clone, Copy)]
pub struct TradingSession {
    pub name: &'static str,
    pub start_hour: u32,
    pub end_hour: u32,
    pub symbols: &'static [&'static str],
}

impl TradingSession {
    pub fn is_open_at(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn lists(&self, symbol: &str) -> bool {
        self.symbols.contains(&symbol)
    }
}

pub const SESSIONS: &[TradingSession] = &[
    TradingSession {
        name: "Sydney",
        start_hour: 21,
        end_hour: 6,
        symbols: &["AUD/USD", "NZD/USD", "USD/JPY"],
    },
    TradingSession {
        name: "Tokyo",
        start_hour: 0,
        end_hour: 9,
        symbols: &["USD/JPY", "EUR/JPY", "GBP/JPY", "AUD/USD", "NZD/USD"],
    },
    TradingSession {
        name: "London",
        start_hour: 8,
        end_hour: 17,
        symbols: &["EUR/USD", "GBP/USD", "USD/CHF", "EUR/GBP", "EUR/JPY", "GBP/JPY"],
    },
    TradingSession {
        name: "New York",
        start_hour: 13,
        end_hour: 22,
        symbols: &["EUR/USD", "GBP/USD", "USD/CAD", "USD/JPY", "USD/CHF"],
    },
];

/// Number of sessions open at `hour` that list `symbol`
pub fn active_session_count(symbol: &str, hour: u32) -> usize {
    SESSIONS
        .iter()
        .filter(|s| s.is_open_at(hour) && s.lists(symbol))
        .count()
}

/// `1 + 0.5 * overlapping active sessions`
pub fn session_multiplier(symbol: &str, hour: u32) -> f64 {
    1.0 + 0.5 * active_session_count(symbol, hour) as f64
}

/// Thin liquidity before 06:00 and from 20:00 UTC
pub fn is_off_peak(hour: u32) -> bool {
    hour < 6 || hour >= 20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sydney_wraps_midnight() {
        let sydney = &SESSIONS[0];
        assert!(sydney.is_open_at(23));
        assert!(sydney.is_open_at(0));
        assert!(sydney.is_open_at(5));
        assert!(!sydney.is_open_at(6));
        assert!(!sydney.is_open_at(12));
    }

    #[test]
    fn london_new_york_overlap_boosts_eur_usd() {
        assert_eq!(active_session_count("EUR/USD", 14), 2);
        assert_eq!(session_multiplier("EUR/USD", 14), 2.0);
        // Only Tokyo-listed pairs benefit overnight
        assert_eq!(session_multiplier("EUR/USD", 3), 1.0);
        assert_eq!(session_multiplier("USD/JPY", 3), 2.0);
    }
}
