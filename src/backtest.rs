//! Backtest result containers.
//!
//! Plain data consumed by reporting tools. Monetary and ratio fields use the
//! same fixed-point scale as record prices ([`PRICE_SCALE`](crate::PRICE_SCALE)).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestData {
    pub backtest_id: Option<u16>,
    pub backtest_name: String,
    pub parameters: Parameters,
    pub static_stats: StaticStats,
    pub period_timeseries_stats: Vec<TimeseriesStats>,
    pub daily_timeseries_stats: Vec<TimeseriesStats>,
    pub trades: Vec<Trades>,
    pub signals: Vec<Signals>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub strategy_name: String,
    pub capital: i64,
    pub schema: String,
    pub data_type: String,
    pub train_start: i64,
    pub train_end: i64,
    pub test_start: i64,
    pub test_end: i64,
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticStats {
    pub total_trades: i32,
    pub total_winning_trades: i32,
    pub total_losing_trades: i32,
    pub avg_profit: i64,
    pub avg_profit_percent: i64,
    pub avg_gain: i64,
    pub avg_gain_percent: i64,
    pub avg_loss: i64,
    pub avg_loss_percent: i64,
    pub profitability_ratio: i64,
    pub profit_factor: i64,
    pub profit_and_loss_ratio: i64,
    pub total_fees: i64,
    pub net_profit: i64,
    pub beginning_equity: i64,
    pub ending_equity: i64,
    pub total_return: i64,
    pub daily_standard_deviation_percentage: i64,
    pub annual_standard_deviation_percentage: i64,
    pub max_drawdown_percentage_period: i64,
    pub max_drawdown_percentage_daily: i64,
    pub sharpe_ratio: i64,
    pub sortino_ratio: i64,
}

/// One point of an equity curve, either per bar period or per day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeseriesStats {
    pub timestamp: i64,
    pub equity_value: i64,
    pub percent_drawdown: i64,
    pub cumulative_return: i64,
    pub period_return: i64,
}

/// Executed trade leg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trades {
    pub trade_id: i32,
    pub leg_id: i32,
    pub timestamp: i64,
    pub ticker: String,
    pub quantity: i64,
    pub avg_price: i64,
    pub trade_value: i64,
    pub action: String,
    pub fees: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub timestamp: i64,
    pub trade_instructions: Vec<SignalInstructions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInstructions {
    pub ticker: String,
    pub order_type: String,
    pub action: String,
    pub trade_id: i32,
    pub leg_id: i32,
    pub weight: i64,
    pub quantity: i32,
    pub limit_price: String,
    pub aux_price: String,
}
