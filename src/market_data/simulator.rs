// src/market_data/simulator.rs
use crate::config::SimulationConfig;
use crate::domain::errors::{MarketDataError, MarketDataResult};
use crate::domain::models::{
    to_decimal, Candle, EconomicEvent, LiveTick, MarketRegime, Quote, RegimeKind, Sentiment,
    SentimentLabel, TrendDirection, TrendState,
};
use crate::market_data::calendar::EconomicCalendar;
use crate::market_data::session::{is_off_peak, session_multiplier};
use crate::market_data::timeframe::Timeframe;
use crate::market_data::PriceFeed;
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Daily volatility assumed for symbols outside the universe
pub const DEFAULT_DAILY_VOLATILITY: f64 = 0.01;

/// Spread in pips for a major pair in a normal market
const BASE_SPREAD_PIPS: f64 = 1.2;

/// Relative distance from a support/resistance level that counts as touching it
const LEVEL_PROXIMITY: f64 = 0.001;

/// Baseline volume of one bar before body and session scaling
const BASE_VOLUME: f64 = 1_000.0;

/// Static description of a simulated currency pair
#[derive(Debug, Clone)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Price the process mean-reverts towards
    pub anchor_price: f64,
    /// Standard deviation of a one-second return
    pub tick_volatility: f64,
    /// Standard deviation of a one-day return, used for VaR
    pub daily_volatility: f64,
    /// Decimal places of a quote
    pub precision: u32,
}

impl SymbolSpec {
    fn new(symbol: &str, anchor_price: f64, tick_volatility: f64, daily_volatility: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            anchor_price,
            tick_volatility,
            daily_volatility,
            precision: if symbol.ends_with("JPY") { 3 } else { 5 },
        }
    }

    /// Smallest conventional price increment
    pub fn pip(&self) -> f64 {
        10f64.powi(-(self.precision as i32 - 1))
    }
}

/// The pairs the simulator knows how to price
pub fn default_universe() -> Vec<SymbolSpec> {
    vec![
        SymbolSpec::new("EUR/USD", 1.0950, 0.000_030, 0.0065),
        SymbolSpec::new("GBP/USD", 1.2650, 0.000_036, 0.0080),
        SymbolSpec::new("USD/JPY", 149.50, 0.000_034, 0.0075),
        SymbolSpec::new("USD/CHF", 0.8850, 0.000_031, 0.0068),
        SymbolSpec::new("AUD/USD", 0.6550, 0.000_040, 0.0085),
        SymbolSpec::new("USD/CAD", 1.3550, 0.000_028, 0.0060),
        SymbolSpec::new("NZD/USD", 0.6050, 0.000_042, 0.0090),
        SymbolSpec::new("EUR/GBP", 0.8650, 0.000_024, 0.0050),
        SymbolSpec::new("EUR/JPY", 163.50, 0.000_040, 0.0085),
        SymbolSpec::new("GBP/JPY", 189.00, 0.000_048, 0.0100),
    ]
}

struct SymbolState {
    spec: SymbolSpec,
    price: f64,
    trend: TrendState,
    recent: VecDeque<Candle>,
}

/// Synthetic price process for a set of currency pairs.
///
/// Each symbol carries its own mid price and trend; the market regime and the
/// economic calendar are shared by every symbol. One instance is built at
/// start-up and handed to its consumers behind an `Arc`.
pub struct MarketSimulator {
    config: SimulationConfig,
    symbols: RwLock<HashMap<String, SymbolState>>,
    regime: RwLock<MarketRegime>,
    calendar: RwLock<EconomicCalendar>,
    rng: Mutex<StdRng>,
    tick_tx: broadcast::Sender<LiveTick>,
}

impl MarketSimulator {
    /// Create a simulator over the configured symbols of the default universe
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_universe(config, default_universe())
    }

    pub fn with_universe(config: SimulationConfig, universe: Vec<SymbolSpec>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let symbols = universe
            .into_iter()
            .filter(|spec| config.symbols.is_empty() || config.symbols.contains(&spec.symbol))
            .map(|spec| {
                let trend = roll_trend(spec.anchor_price, &mut rng);
                let state = SymbolState {
                    price: spec.anchor_price,
                    trend,
                    recent: VecDeque::with_capacity(config.history_capacity.min(1_024)),
                    spec,
                };
                (state.spec.symbol.clone(), state)
            })
            .collect::<HashMap<_, _>>();

        for wanted in &config.symbols {
            if !symbols.contains_key(wanted) {
                log::warn!("Symbol {} is not part of the simulated universe", wanted);
            }
        }

        let regime = roll_regime(&mut rng);
        let calendar = if config.demo_calendar {
            EconomicCalendar::demo(Utc::now())
        } else {
            EconomicCalendar::new()
        };

        // Create broadcast channel with buffer size of 1024
        let (tick_tx, _) = broadcast::channel(1_024);

        log::info!(
            "Market simulator ready: {} symbols, regime {}",
            symbols.len(),
            regime.kind
        );

        Self {
            config,
            symbols: RwLock::new(symbols),
            regime: RwLock::new(regime),
            calendar: RwLock::new(calendar),
            rng: Mutex::new(rng),
            tick_tx,
        }
    }

    /// Subscribe to live ticks of every symbol
    pub fn subscribe(&self) -> broadcast::Receiver<LiveTick> {
        self.tick_tx.subscribe()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.symbols.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn current_price(&self, symbol: &str) -> MarketDataResult<Decimal> {
        self.with_symbol(symbol, |s| to_decimal(s.price, s.spec.precision))
    }

    /// Force the mid price, e.g. to drive scenarios in tests
    pub fn set_price(&self, symbol: &str, price: f64) -> MarketDataResult<()> {
        if !price.is_finite() || price <= 0.0 {
            return Err(MarketDataError::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }
        let mut symbols = self.symbols.write();
        let state = symbols
            .get_mut(symbol)
            .ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))?;
        state.price = price;
        Ok(())
    }

    pub fn trend(&self, symbol: &str) -> MarketDataResult<TrendState> {
        self.with_symbol(symbol, |s| s.trend.clone())
    }

    pub fn set_trend(&self, symbol: &str, trend: TrendState) -> MarketDataResult<()> {
        let mut symbols = self.symbols.write();
        let state = symbols
            .get_mut(symbol)
            .ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))?;
        state.trend = trend;
        Ok(())
    }

    pub fn regime(&self) -> MarketRegime {
        self.regime.read().clone()
    }

    pub fn set_regime(&self, regime: MarketRegime) {
        *self.regime.write() = regime;
    }

    /// Replace the shared regime with a freshly rolled one
    pub fn reroll_regime(&self) -> MarketRegime {
        let regime = {
            let mut rng = self.rng.lock();
            roll_regime(&mut rng)
        };
        let previous = std::mem::replace(&mut *self.regime.write(), regime.clone());
        log::info!(
            "Market regime {} -> {} (strength {:.2}, {} min)",
            previous.kind,
            regime.kind,
            regime.strength,
            regime.duration_minutes
        );
        regime
    }

    pub fn add_economic_event(&self, event: EconomicEvent) {
        self.calendar.write().add(event);
    }

    pub fn economic_events(&self) -> Vec<EconomicEvent> {
        self.calendar.read().events().to_vec()
    }

    pub fn clear_economic_events(&self) {
        self.calendar.write().clear();
    }

    /// Daily return volatility of `symbol`
    pub fn daily_volatility(&self, symbol: &str) -> f64 {
        self.with_symbol(symbol, |s| s.spec.daily_volatility)
            .unwrap_or(DEFAULT_DAILY_VOLATILITY)
    }

    /// Most recent live bars, oldest first
    pub fn recent_ticks(&self, symbol: &str) -> MarketDataResult<Vec<Candle>> {
        self.with_symbol(symbol, |s| s.recent.iter().cloned().collect())
    }

    /// Fractional price change the next tick of `symbol` would apply
    pub fn next_movement(&self, symbol: &str) -> MarketDataResult<f64> {
        let now = Utc::now();
        let regime = self.regime();
        let shocks = self.calendar.read().influences(symbol, now);

        let symbols = self.symbols.read();
        let state = symbols
            .get(symbol)
            .ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))?;
        let mut rng = self.rng.lock();

        Ok(self.movement(state, &regime, &shocks, now.hour(), &mut rng))
    }

    /// Advance `symbol` by one live bar and publish it
    pub fn tick(&self, symbol: &str) -> MarketDataResult<Candle> {
        let now = Utc::now();
        let regime = self.regime();
        let shocks = self.calendar.read().influences(symbol, now);
        let hour = now.hour();

        let candle = {
            let mut symbols = self.symbols.write();
            let state = symbols
                .get_mut(symbol)
                .ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))?;
            let mut rng = self.rng.lock();

            self.evolve_trend(state, &mut rng);
            let change = self.movement(state, &regime, &shocks, hour, &mut rng);

            let liquidity = session_multiplier(symbol, hour);
            let volatility =
                state.spec.tick_volatility * liquidity * regime.kind.volatility_multiplier();
            let open = state.price;
            let close = (open * (1.0 + change)).max(open * 0.5);
            let bar = shape_bar(open, close, volatility, liquidity, &mut rng);

            state.price = close;
            let candle = bar.to_candle(now, state.spec.precision);

            if state.recent.len() >= self.config.history_capacity.max(1) {
                state.recent.pop_front();
            }
            state.recent.push_back(candle.clone());
            candle
        };

        log::trace!("Tick {} close {}", symbol, candle.close);

        // Nobody listening is not an error
        let _ = self.tick_tx.send(LiveTick {
            symbol: symbol.to_string(),
            candle: candle.clone(),
        });

        Ok(candle)
    }

    /// `count` bars of `timeframe` ending at the bar containing "now".
    ///
    /// Unknown timeframes fall back to hourly bars. The series is scaled so its
    /// last close equals the symbol's current price.
    pub fn generate_historical_series(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> MarketDataResult<Vec<Candle>> {
        let timeframe = Timeframe::parse_lenient(timeframe);
        let (spec, price, trend) = self.with_symbol(symbol, |s| {
            (s.spec.clone(), s.price, s.trend.clone())
        })?;

        if count == 0 {
            return Ok(Vec::new());
        }

        let regime = self.regime();
        let end = timeframe.align(Utc::now());
        let step = timeframe.duration();
        let bar_volatility = spec.tick_volatility * ((timeframe.minutes() * 60) as f64).sqrt();

        let mut rng = self.rng.lock();
        let mut bars = Vec::with_capacity(count);
        let mut open = price;

        for i in 0..count {
            let timestamp = end - step * (count - 1 - i) as i32;
            let liquidity = session_multiplier(symbol, timestamp.hour());
            let volatility = bar_volatility * liquidity * regime.kind.volatility_multiplier();

            let noise: f64 = rng.sample(StandardNormal);
            let drift = trend.direction.sign() * trend.strength * trend.momentum * volatility * 0.3;
            let reversion =
                -(open - spec.anchor_price) / spec.anchor_price * self.config.mean_reversion;
            let change = (noise * volatility + drift + reversion).clamp(-0.2, 0.2);

            let close = open * (1.0 + change);
            bars.push((timestamp, shape_bar(open, close, volatility, liquidity, &mut rng)));
            open = close;
        }

        let scale = bars
            .last()
            .map(|(_, bar)| price / bar.close)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(1.0);

        Ok(bars
            .into_iter()
            .map(|(timestamp, bar)| bar.scaled(scale).to_candle(timestamp, spec.precision))
            .collect())
    }

    /// Quote for `symbol` at the current wall-clock hour
    pub fn bid_ask(&self, symbol: &str) -> MarketDataResult<Quote> {
        self.bid_ask_at(symbol, Utc::now())
    }

    /// Quote for `symbol` with the spread that applies at `at`
    pub fn bid_ask_at(&self, symbol: &str, at: DateTime<Utc>) -> MarketDataResult<Quote> {
        let regime = self.regime();
        let (mid, spec) = self.with_symbol(symbol, |s| (s.price, s.spec.clone()))?;

        let mut pips = BASE_SPREAD_PIPS;
        match regime.kind {
            RegimeKind::Volatile => pips *= 2.0,
            RegimeKind::Calm => pips *= 0.7,
            RegimeKind::Trending | RegimeKind::Ranging => {}
        }
        if is_off_peak(at.hour()) {
            pips *= 1.5;
        }

        let spread = to_decimal(pips * spec.pip(), spec.precision);
        let half_spread = (spread / Decimal::TWO).round_dp(spec.precision);
        let bid = to_decimal(mid, spec.precision) - half_spread;

        Ok(Quote {
            symbol: symbol.to_string(),
            bid,
            ask: bid + spread,
            spread,
            timestamp: at,
        })
    }

    /// Market mood derived from the symbol's trend
    pub fn sentiment(&self, symbol: &str) -> MarketDataResult<Sentiment> {
        self.with_symbol(symbol, |s| sentiment_of(&s.trend))
    }

    /// Tick `symbol` every `period` until the task is aborted
    pub fn spawn_symbol_ticker(self: &Arc<Self>, symbol: &str, period: Duration) -> JoinHandle<()> {
        let simulator = Arc::clone(self);
        let symbol = symbol.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                if let Err(e) = simulator.tick(&symbol) {
                    log::error!("Live ticks for {} stopped: {}", symbol, e);
                    break;
                }
            }
        })
    }

    /// One ticker task per simulated symbol at the configured period
    pub fn spawn_live_ticks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let period = self.config.tick_interval();
        self.symbols()
            .iter()
            .map(|symbol| self.spawn_symbol_ticker(symbol, period))
            .collect()
    }

    /// Re-roll the shared regime at the configured period
    pub fn spawn_regime_rotation(self: &Arc<Self>) -> JoinHandle<()> {
        let simulator = Arc::clone(self);
        let period = self.config.regime_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the current regime is still fresh
            interval.tick().await;

            loop {
                interval.tick().await;
                simulator.reroll_regime();
            }
        })
    }

    fn with_symbol<T>(
        &self,
        symbol: &str,
        f: impl FnOnce(&SymbolState) -> T,
    ) -> MarketDataResult<T> {
        self.symbols
            .read()
            .get(symbol)
            .map(f)
            .ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))
    }

    /// Sum of the random, trend, event-shock and mean-reversion components
    fn movement(
        &self,
        state: &SymbolState,
        regime: &MarketRegime,
        shocks: &[f64],
        hour: u32,
        rng: &mut StdRng,
    ) -> f64 {
        let volatility = state.spec.tick_volatility
            * session_multiplier(&state.spec.symbol, hour)
            * regime.kind.volatility_multiplier();

        let noise: f64 = rng.sample(StandardNormal);
        let random = noise * volatility;

        let mut trend = trend_push(&state.trend, state.price, volatility);
        if regime.kind == RegimeKind::Trending {
            trend *= 1.0 + regime.strength;
        }

        let shock: f64 = shocks
            .iter()
            .map(|weight| {
                let draw: f64 = rng.sample(StandardNormal);
                weight * draw * volatility
            })
            .sum();

        let reversion = -(state.price - state.spec.anchor_price) / state.spec.anchor_price
            * self.config.mean_reversion;

        random + trend + shock + reversion
    }

    fn evolve_trend(&self, state: &mut SymbolState, rng: &mut StdRng) {
        if rng.gen_bool(self.config.trend_change_probability.clamp(0.0, 1.0)) {
            state.trend = roll_trend(state.price, rng);
            log::debug!(
                "{} trend now {:?} (strength {:.2})",
                state.spec.symbol,
                state.trend.direction,
                state.trend.strength
            );
        } else {
            let drift: f64 = rng.sample(StandardNormal);
            state.trend.momentum = (state.trend.momentum + drift * 0.02).clamp(0.0, 1.0);
        }
    }
}

#[async_trait]
impl PriceFeed for MarketSimulator {
    async fn latest_price(&self, symbol: &str) -> MarketDataResult<Decimal> {
        self.current_price(symbol)
    }

    fn current_regime(&self) -> MarketRegime {
        self.regime()
    }

    fn asset_volatility(&self, symbol: &str) -> f64 {
        self.daily_volatility(symbol)
    }

    fn live_ticks(&self) -> broadcast::Receiver<LiveTick> {
        self.subscribe()
    }
}

/// Trend-following push, with a bounce at support and a rejection at resistance
fn trend_push(trend: &TrendState, price: f64, volatility: f64) -> f64 {
    let mut push = trend.direction.sign() * trend.strength * trend.momentum * volatility;

    if price <= trend.support_level * (1.0 + LEVEL_PROXIMITY) {
        push += trend.strength * volatility;
    } else if price >= trend.resistance_level * (1.0 - LEVEL_PROXIMITY) {
        push -= trend.strength * volatility;
    }

    push
}

fn sentiment_of(trend: &TrendState) -> Sentiment {
    let label = match trend.direction {
        TrendDirection::Up if trend.strength >= 0.3 => SentimentLabel::Bullish,
        TrendDirection::Down if trend.strength >= 0.3 => SentimentLabel::Bearish,
        _ => SentimentLabel::Neutral,
    };

    Sentiment {
        label,
        strength: trend.strength,
    }
}

fn roll_trend(price: f64, rng: &mut StdRng) -> TrendState {
    let direction = match rng.gen_range(0..3) {
        0 => TrendDirection::Up,
        1 => TrendDirection::Down,
        _ => TrendDirection::Sideways,
    };

    TrendState {
        direction,
        strength: rng.gen_range(0.2..0.8),
        momentum: rng.gen_range(0.3..0.7),
        support_level: price * (1.0 - rng.gen_range(0.003..0.008)),
        resistance_level: price * (1.0 + rng.gen_range(0.003..0.008)),
    }
}

fn roll_regime(rng: &mut StdRng) -> MarketRegime {
    let kind = RegimeKind::ALL[rng.gen_range(0..RegimeKind::ALL.len())];
    MarketRegime::new(kind, rng.gen_range(0.3..1.0), 10)
}

/// OHLCV in simulation space, before quoting
#[derive(Debug, Clone, Copy)]
struct RawBar {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl RawBar {
    fn scaled(self, factor: f64) -> Self {
        Self {
            open: self.open * factor,
            high: self.high * factor,
            low: self.low * factor,
            close: self.close * factor,
            volume: self.volume,
        }
    }

    /// Rounding is monotonic, so `low <= min(open, close)` and
    /// `high >= max(open, close)` survive quoting.
    fn to_candle(self, timestamp: DateTime<Utc>, precision: u32) -> Candle {
        Candle {
            timestamp,
            open: to_decimal(self.open, precision),
            high: to_decimal(self.high, precision),
            low: to_decimal(self.low, precision),
            close: to_decimal(self.close, precision),
            volume: to_decimal(self.volume, 0),
        }
    }
}

/// Add wicks around the body and a volume that grows with the body and liquidity
fn shape_bar(open: f64, close: f64, volatility: f64, liquidity: f64, rng: &mut StdRng) -> RawBar {
    let upper: f64 = rng.sample::<f64, _>(StandardNormal).abs() * volatility * 0.5;
    let lower: f64 = rng.sample::<f64, _>(StandardNormal).abs() * volatility * 0.5;

    let top = open.max(close);
    let bottom = open.min(close);
    let body = if open > 0.0 { (close - open).abs() / open } else { 0.0 };

    RawBar {
        open,
        high: top * (1.0 + upper),
        low: (bottom * (1.0 - lower)).max(bottom * 0.5),
        close,
        volume: BASE_VOLUME * (1.0 + body * 2_000.0) * liquidity * rng.gen_range(0.8..1.2),
    }
}
