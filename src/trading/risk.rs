// src/trading/risk.rs
use crate::config::RiskConfig;
use crate::domain::models::{
    to_decimal, AlertPriority, AlertSeverity, Position, PositionRisk, RiskAlert, RiskMetrics,
    RiskSnapshot,
};
use crate::market_data::PriceFeed;
use crate::trading::execution::ExecutionEngine;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// One-tailed 95% quantile of the normal distribution
const VAR_CONFIDENCE: f64 = 1.65;
/// Flat discount standing in for cross-position correlation
const VAR_CORRELATION_DISCOUNT: f64 = 0.8;

type Listener = Arc<dyn Fn(&RiskSnapshot) + Send + Sync>;
type Listeners = Mutex<HashMap<u64, Listener>>;

/// Handle returned by [`RiskAggregator::subscribe`]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
    active: AtomicBool,
}

impl Subscription {
    /// Stop receiving snapshots. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().remove(&self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Inputs of the composite risk score
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskFactors {
    pub margin_usage_percent: f64,
    pub position_count: usize,
    pub average_risk_percent: f64,
    pub average_leverage: f64,
    /// Most positions sharing a single currency
    pub max_shared_currency: usize,
}

impl RiskFactors {
    /// Weighted score in `[0, 100]`
    pub fn score(&self) -> f64 {
        let concentration = self.max_shared_currency.saturating_sub(1) as f64;

        let total = capped(self.margin_usage_percent, 100.0, 30.0)
            + capped(self.position_count as f64, 10.0, 20.0)
            + capped(self.average_risk_percent, 10.0, 25.0)
            + capped(self.average_leverage, 100.0, 15.0)
            + capped(concentration, 4.0, 10.0);

        total.clamp(0.0, 100.0)
    }
}

/// `value / scale * cap`, kept inside `[0, cap]`
fn capped(value: f64, scale: f64, cap: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    (value / scale * cap).clamp(0.0, cap)
}

fn ratio(numerator: Decimal, denominator: Decimal) -> f64 {
    if denominator <= Decimal::ZERO {
        return 0.0;
    }
    numerator
        .checked_div(denominator)
        .and_then(|r| r.to_f64())
        .unwrap_or(0.0)
}

/// Bounded most-recent-first alert log
struct AlertLog {
    next_id: u64,
    alerts: VecDeque<RiskAlert>,
    capacity: usize,
}

impl AlertLog {
    fn new(capacity: usize) -> Self {
        Self {
            next_id: 0,
            alerts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push_alert(
        &mut self,
        severity: AlertSeverity,
        priority: AlertPriority,
        title: &str,
        message: String,
        action_required: bool,
    ) -> RiskAlert {
        self.next_id += 1;
        let alert = RiskAlert {
            id: self.next_id,
            severity,
            title: title.to_string(),
            message,
            created_at: Utc::now(),
            priority,
            action_required,
        };

        self.alerts.push_front(alert.clone());
        self.alerts.truncate(self.capacity);
        alert
    }
}

#[derive(Default)]
struct RiskState {
    peak_equity: Option<Decimal>,
    max_drawdown: f64,
    daily_returns: Option<Vec<f64>>,
    last: Option<RiskSnapshot>,
}

/// Derives risk metrics and alerts from the execution engine's state.
///
/// Never mutates positions or prices; every computation starts from a
/// snapshot of the account.
pub struct RiskAggregator<F: PriceFeed> {
    engine: ExecutionEngine<F>,
    feed: Arc<F>,
    config: Arc<RiskConfig>,
    state: Arc<Mutex<RiskState>>,
    alerts: Arc<Mutex<AlertLog>>,
    listeners: Arc<Listeners>,
    listener_seq: Arc<AtomicU64>,
}

impl<F: PriceFeed> Clone for RiskAggregator<F> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            feed: Arc::clone(&self.feed),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            alerts: Arc::clone(&self.alerts),
            listeners: Arc::clone(&self.listeners),
            listener_seq: Arc::clone(&self.listener_seq),
        }
    }
}

impl<F: PriceFeed + 'static> RiskAggregator<F> {
    pub fn new(engine: ExecutionEngine<F>, feed: Arc<F>, config: RiskConfig) -> Self {
        let capacity = config.alert_capacity;
        Self {
            engine,
            feed,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(RiskState::default())),
            alerts: Arc::new(Mutex::new(AlertLog::new(capacity))),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            listener_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Compute metrics and per-position risk from a fresh account snapshot,
    /// then notify every subscriber.
    pub fn compute_risk_metrics(&self) -> RiskSnapshot {
        let (account, positions) = self.engine.account_snapshot();
        let balance = account.balance;

        let risks: Vec<PositionRisk> = positions
            .iter()
            .map(|p| position_risk(p, balance))
            .collect();

        let (current_drawdown, max_drawdown, samples) = {
            let mut state = self.state.lock();
            let peak = state
                .peak_equity
                .map_or(account.equity, |peak| peak.max(account.equity));
            state.peak_equity = Some(peak);

            let current = ratio(peak.saturating_sub(account.equity), peak) * 100.0;
            state.max_drawdown = state.max_drawdown.max(current);

            (current, state.max_drawdown, state.daily_returns.clone())
        };
        let samples = samples.unwrap_or_else(|| {
            self.engine
                .daily_realized_pnl()
                .into_iter()
                .map(|(_, pnl)| pnl.to_f64().unwrap_or(0.0))
                .collect()
        });

        let margin_usage = if account.margin.is_zero() {
            0.0
        } else if account.equity <= Decimal::ZERO {
            100.0
        } else {
            ratio(account.margin, account.equity) * 100.0
        };

        let count = risks.len().max(1) as f64;
        let factors = RiskFactors {
            margin_usage_percent: margin_usage,
            position_count: risks.len(),
            average_risk_percent: risks.iter().map(|r| r.risk_percent).sum::<f64>() / count,
            average_leverage: risks.iter().map(|r| r.leverage as f64).sum::<f64>() / count,
            max_shared_currency: max_shared_currency(&positions),
        };

        let total_risk = risks
            .iter()
            .fold(Decimal::ZERO, |total, r| total.saturating_add(r.risk_amount.abs()));
        let margin_level = account.margin_level.to_f64().unwrap_or(0.0);

        let metrics = RiskMetrics {
            balance,
            equity: account.equity,
            used_margin: account.margin,
            free_margin: account.free_margin,
            margin_level,
            current_drawdown,
            max_drawdown,
            risk_score: factors.score(),
            exposure_percent: ratio(total_risk, balance) * 100.0,
            daily_var: self.daily_var(&risks),
            sharpe_ratio: sharpe_ratio(&samples),
            // Nothing at risk without margin in use; the margin-level sentinel would cap at 10
            max_allowed_leverage: if account.margin.is_zero() {
                100
            } else {
                max_allowed_leverage(margin_level)
            },
            recommended_position_size: recommended_position_size(
                balance,
                self.config.default_risk_percent,
            ),
            open_positions: positions.len(),
            computed_at: Utc::now(),
        };

        let snapshot = RiskSnapshot {
            metrics,
            positions: risks,
        };
        self.state.lock().last = Some(snapshot.clone());

        log::debug!(
            "Risk score {:.1}, margin level {:.1}%, exposure {:.1}%",
            snapshot.metrics.risk_score,
            snapshot.metrics.margin_level,
            snapshot.metrics.exposure_percent
        );
        self.notify(&snapshot);

        snapshot
    }

    /// Append alerts for every threshold `snapshot` crosses; returns the new ones
    pub fn check_alerts(&self, snapshot: &RiskSnapshot) -> Vec<RiskAlert> {
        let metrics = &snapshot.metrics;
        let mut raised = Vec::new();
        let mut alert_log = self.alerts.lock();

        if metrics.risk_score > self.config.risk_score_alert {
            raised.push(alert_log.push_alert(
                AlertSeverity::Danger,
                AlertPriority::High,
                "High Risk Score",
                format!(
                    "Portfolio risk score is {:.1}; consider reducing exposure",
                    metrics.risk_score
                ),
                true,
            ));
        }

        if !metrics.used_margin.is_zero() && metrics.margin_level < self.config.margin_call_level {
            raised.push(alert_log.push_alert(
                AlertSeverity::Danger,
                AlertPriority::Critical,
                "Margin Call",
                format!(
                    "Margin level {:.1}% is below {:.1}%",
                    metrics.margin_level, self.config.margin_call_level
                ),
                true,
            ));
        }

        if metrics.exposure_percent > self.config.exposure_alert {
            raised.push(alert_log.push_alert(
                AlertSeverity::Warning,
                AlertPriority::Medium,
                "High Exposure",
                format!("{:.1}% of the balance is at risk", metrics.exposure_percent),
                false,
            ));
        }

        for risk in &snapshot.positions {
            if risk.risk_percent > self.config.max_risk_per_trade {
                raised.push(alert_log.push_alert(
                    AlertSeverity::Warning,
                    AlertPriority::Medium,
                    "Position Risk",
                    format!(
                        "{} on {} risks {:.2}% of the balance (limit {:.2}%)",
                        risk.position_id,
                        risk.symbol,
                        risk.risk_percent,
                        self.config.max_risk_per_trade
                    ),
                    false,
                ));
            }
        }
        drop(alert_log);

        for alert in &raised {
            log::warn!("Risk alert [{:?}] {}: {}", alert.priority, alert.title, alert.message);
        }
        raised
    }

    /// Register `callback` for every completed computation
    pub fn subscribe<C>(&self, callback: C) -> Subscription
    where
        C: Fn(&RiskSnapshot) + Send + Sync + 'static,
    {
        let id = self.listener_seq.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, Arc::new(callback));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
            active: AtomicBool::new(true),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Most recent first
    pub fn recent_alerts(&self) -> Vec<RiskAlert> {
        self.alerts.lock().alerts.iter().cloned().collect()
    }

    pub fn clear_alerts(&self) {
        self.alerts.lock().alerts.clear();
    }

    pub fn last_snapshot(&self) -> Option<RiskSnapshot> {
        self.state.lock().last.clone()
    }

    /// Use `returns` as the Sharpe sample instead of realised daily P&L
    pub fn set_daily_returns(&self, returns: Vec<f64>) {
        self.state.lock().daily_returns = Some(returns);
    }

    /// Forget drawdown history, the return sample and all alerts
    pub fn reset(&self) {
        *self.state.lock() = RiskState::default();
        self.clear_alerts();
        log::info!("Risk state reset");
    }

    /// Compute metrics and check alerts at the configured period
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let aggregator = self.clone();
        let period = self.config.monitor_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                let snapshot = aggregator.compute_risk_metrics();
                aggregator.check_alerts(&snapshot);
            }
        })
    }

    fn daily_var(&self, risks: &[PositionRisk]) -> Decimal {
        let sum_of_squares: f64 = risks
            .iter()
            .map(|r| {
                let vol = r.risk_amount.to_f64().unwrap_or(0.0)
                    * self.feed.asset_volatility(&r.symbol)
                    * VAR_CONFIDENCE;
                vol * vol
            })
            .sum();

        to_decimal(sum_of_squares.sqrt() * VAR_CORRELATION_DISCOUNT, 2)
    }

    fn notify(&self, snapshot: &RiskSnapshot) {
        let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

/// Risk carried by one position relative to `balance`.
///
/// Without a stop-loss the whole margin counts as at risk.
pub fn position_risk(position: &Position, balance: Decimal) -> PositionRisk {
    let stop_distance = position
        .stop_loss
        .map(|stop| (position.entry_price - stop).abs());

    let risk_amount = match stop_distance {
        Some(distance) => distance.saturating_mul(position.size),
        None => position.margin,
    };

    let risk_reward_ratio = match (position.take_profit, stop_distance) {
        (Some(target), Some(distance)) if !distance.is_zero() => {
            (target - position.entry_price)
                .abs()
                .checked_div(distance)
                .and_then(|r| r.to_f64())
                .unwrap_or(0.0)
        }
        _ => 0.0,
    };

    PositionRisk {
        position_id: position.id.clone(),
        symbol: position.symbol.clone(),
        risk_amount,
        risk_percent: ratio(risk_amount, balance) * 100.0,
        risk_reward_ratio,
        leverage: position.leverage,
        margin: position.margin,
    }
}

/// Amount to risk on one trade
pub fn recommended_position_size(balance: Decimal, risk_percent: Decimal) -> Decimal {
    balance * risk_percent / Decimal::ONE_HUNDRED
}

/// Leverage ceiling stepped by margin level
pub fn max_allowed_leverage(margin_level: f64) -> u32 {
    if margin_level > 200.0 {
        100
    } else if margin_level > 150.0 {
        50
    } else if margin_level > 100.0 {
        30
    } else {
        10
    }
}

/// Mean over sample standard deviation; 0 without enough spread to measure
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    if std_dev > 0.0 && std_dev.is_finite() {
        mean / std_dev
    } else {
        0.0
    }
}

fn max_shared_currency(positions: &[Position]) -> usize {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for position in positions {
        for currency in position.symbol.split('/') {
            *counts.entry(currency).or_default() += 1;
        }
    }
    counts.values().copied().max().unwrap_or(0)
}
