// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use dotenv::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Longest accepted limit order lifetime: one year
pub const MAX_ORDER_LIFETIME_HOURS: i64 = 24 * 366;

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Price process configuration
    pub simulation: SimulationConfig,

    /// Order execution configuration
    pub execution: ExecutionConfig,

    /// Risk aggregation configuration
    pub risk: RiskConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Price process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Symbols to simulate (e.g., ["EUR/USD", "USD/JPY"]); empty means the whole universe
    pub symbols: Vec<String>,

    /// Live tick period in milliseconds
    pub tick_interval_ms: u64,

    /// Market regime re-roll period in seconds
    pub regime_interval_secs: u64,

    /// Pull towards the anchor price per unit of relative deviation
    pub mean_reversion: f64,

    /// Chance per tick that a symbol rolls a fresh trend
    pub trend_change_probability: f64,

    /// Live bars retained per symbol
    pub history_capacity: usize,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,

    /// Preload a demo economic calendar
    pub demo_calendar: bool,
}

/// Signed daily swap rates applied to `size * entry_price` per full day held.
///
/// Negative rates are charged to the account, positive rates credited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapPolicy {
    pub long_rate_per_day: Decimal,
    pub short_rate_per_day: Decimal,
}

/// Order execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Demo balance on start and after a reset
    pub initial_balance: Decimal,

    /// Commission as a fraction of trade value
    pub commission_rate: Decimal,
    pub min_commission: Decimal,
    pub max_commission: Decimal,

    /// Slippage as a fraction of the quoted price for a small order in a quiet market
    pub base_slippage: Decimal,

    /// Order size at which slippage doubles
    pub slippage_reference_size: Decimal,

    /// Cap on the size amplification of slippage
    pub max_slippage_multiplier: Decimal,

    /// Overnight financing
    pub swap: SwapPolicy,

    /// Simulated execution latency bounds in milliseconds
    pub execution_delay_min_ms: u64,
    pub execution_delay_max_ms: u64,

    /// Limit order fill-check period in seconds
    pub limit_poll_interval_secs: u64,

    /// Pending limit orders are cancelled after this many hours
    pub order_lifetime_hours: i64,

    /// Spawn a fill-check task for every limit order placed
    pub auto_fill_limit_orders: bool,

    /// Closed positions and terminal orders retained, oldest dropped first
    pub history_capacity: usize,
}

/// Risk aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Percent of balance risked per trade when sizing recommendations
    pub default_risk_percent: Decimal,

    /// Per-position risk percent above which a warning is raised
    pub max_risk_per_trade: f64,

    /// Margin level percent below which a margin call alert is raised
    pub margin_call_level: f64,

    /// Risk score above which a danger alert is raised
    pub risk_score_alert: f64,

    /// Exposure percent above which a warning is raised
    pub exposure_alert: f64,

    /// Number of alerts retained, most recent first
    pub alert_capacity: usize,

    /// Background risk recomputation period in seconds
    pub monitor_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

/// Read `key` from the environment, keeping `default` when absent or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn regime_interval(&self) -> Duration {
        Duration::from_secs(self.regime_interval_secs)
    }
}

impl ExecutionConfig {
    pub fn limit_poll_interval(&self) -> Duration {
        Duration::from_secs(self.limit_poll_interval_secs)
    }

    pub fn order_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.order_lifetime_hours)
    }

    /// Frictionless settings: no latency, no slippage
    pub fn instant() -> Self {
        Self {
            base_slippage: Decimal::ZERO,
            execution_delay_min_ms: 0,
            execution_delay_max_ms: 0,
            ..Self::default()
        }
    }
}

impl RiskConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let symbols = env::var("FX_SYMBOLS")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.simulation.symbols);

        let simulation_config = SimulationConfig {
            symbols,
            tick_interval_ms: env_or("FX_TICK_INTERVAL_MS", defaults.simulation.tick_interval_ms),
            regime_interval_secs: env_or(
                "FX_REGIME_INTERVAL_SECS",
                defaults.simulation.regime_interval_secs,
            ),
            mean_reversion: env_or("FX_MEAN_REVERSION", defaults.simulation.mean_reversion),
            trend_change_probability: env_or(
                "FX_TREND_CHANGE_PROBABILITY",
                defaults.simulation.trend_change_probability,
            ),
            history_capacity: env_or("FX_HISTORY_CAPACITY", defaults.simulation.history_capacity),
            seed: env::var("FX_SEED").ok().and_then(|s| s.trim().parse().ok()),
            demo_calendar: env_or("FX_DEMO_CALENDAR", defaults.simulation.demo_calendar),
        };

        let execution_config = ExecutionConfig {
            initial_balance: env_or("FX_INITIAL_BALANCE", defaults.execution.initial_balance),
            execution_delay_min_ms: env_or(
                "FX_EXECUTION_DELAY_MIN_MS",
                defaults.execution.execution_delay_min_ms,
            ),
            execution_delay_max_ms: env_or(
                "FX_EXECUTION_DELAY_MAX_MS",
                defaults.execution.execution_delay_max_ms,
            ),
            limit_poll_interval_secs: env_or(
                "FX_LIMIT_POLL_INTERVAL_SECS",
                defaults.execution.limit_poll_interval_secs,
            ),
            order_lifetime_hours: env_or(
                "FX_ORDER_LIFETIME_HOURS",
                defaults.execution.order_lifetime_hours,
            ),
            ..defaults.execution
        };

        let risk_config = RiskConfig {
            default_risk_percent: env_or(
                "FX_DEFAULT_RISK_PERCENT",
                defaults.risk.default_risk_percent,
            ),
            max_risk_per_trade: env_or("FX_MAX_RISK_PER_TRADE", defaults.risk.max_risk_per_trade),
            margin_call_level: env_or("FX_MARGIN_CALL_LEVEL", defaults.risk.margin_call_level),
            ..defaults.risk
        };

        let logging_config = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_or("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        let config = Config {
            simulation: simulation_config,
            execution: execution_config,
            risk: risk_config,
            logging: logging_config,
        };
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Reject settings the engines cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.execution.initial_balance <= Decimal::ZERO {
            return Err(AppError::Config(
                "Initial balance must be positive".to_string(),
            ));
        }
        if self.execution.execution_delay_min_ms > self.execution.execution_delay_max_ms {
            return Err(AppError::Config(format!(
                "Execution delay bounds inverted: {}ms > {}ms",
                self.execution.execution_delay_min_ms, self.execution.execution_delay_max_ms
            )));
        }
        if self.execution.min_commission > self.execution.max_commission {
            return Err(AppError::Config(
                "Minimum commission exceeds maximum commission".to_string(),
            ));
        }
        if self.simulation.tick_interval_ms == 0
            || self.simulation.regime_interval_secs == 0
            || self.execution.limit_poll_interval_secs == 0
            || self.risk.monitor_interval_secs == 0
        {
            return Err(AppError::Config(
                "Tick, regime, poll and monitor intervals must be non-zero".to_string(),
            ));
        }
        if !(1..=MAX_ORDER_LIFETIME_HOURS).contains(&self.execution.order_lifetime_hours) {
            return Err(AppError::Config(format!(
                "Order lifetime must be within 1..={} hours, got {}",
                MAX_ORDER_LIFETIME_HOURS, self.execution.order_lifetime_hours
            )));
        }
        if !(0.0..=1.0).contains(&self.simulation.trend_change_probability) {
            return Err(AppError::Config(
                "Trend change probability must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        // Initialize the logger
        builder.init();

        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            tick_interval_ms: 1_000,
            regime_interval_secs: 600,
            mean_reversion: 0.02,
            trend_change_probability: 0.02,
            history_capacity: 1_000,
            seed: None,
            demo_calendar: true,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            commission_rate: dec!(0.00008),
            min_commission: dec!(2.50),
            max_commission: dec!(25.00),
            base_slippage: dec!(0.00002),
            slippage_reference_size: dec!(100000),
            max_slippage_multiplier: dec!(5),
            swap: SwapPolicy {
                long_rate_per_day: dec!(-0.0001),
                short_rate_per_day: dec!(0.00005),
            },
            execution_delay_min_ms: 200,
            execution_delay_max_ms: 500,
            limit_poll_interval_secs: 5,
            order_lifetime_hours: 24,
            auto_fill_limit_orders: true,
            history_capacity: 1_000,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_risk_percent: dec!(2),
            max_risk_per_trade: 5.0,
            margin_call_level: 100.0,
            risk_score_alert: 80.0,
            exposure_alert: 80.0,
            alert_capacity: 50,
            monitor_interval_secs: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            execution: ExecutionConfig::default(),
            risk: RiskConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}
