// 导出共享模块
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

// 重新导出常用类型，方便使用
pub use api::ExchangeApi;
pub use config::{SymbolConfig, SymbolsConfig, SyncConfig};
pub use db::Database;
pub use error::{AppError, Result};
pub use models::{
    AggKline, AlertSignal, Indicators, Kline1m, KlineData, RealtimePrice, SaveResult, SyncStatus,
    SyncTimeRange,
};
