//! 币种与同步配置
//!
//! 配置从 `config/symbols.json` 加载（可用 `SYMBOLS_CONFIG_PATH` 覆盖路径），
//! 进程启动时读取一次，之后视为不可变。

use serde::{Deserialize, Serialize};

use crate::klcommon::{AppError, Result};

/// 币种配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 优先同步最近N天的数据
    #[serde(default = "default_priority_recent_days")]
    pub priority_recent_days: i64,
    /// 历史数据起始年份
    #[serde(default = "default_historical_start_year")]
    pub historical_start_year: i32,
    /// 每批拉取数量
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 请求间隔（毫秒）
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// 是否启用空闲同步
    #[serde(default)]
    pub idle_sync_enabled: bool,
    /// 空闲检查间隔（秒）
    #[serde(default = "default_idle_check_interval_seconds")]
    pub idle_check_interval_seconds: u64,
}

fn default_priority_recent_days() -> i64 {
    1
}

fn default_historical_start_year() -> i32 {
    2020
}

fn default_batch_size() -> usize {
    1000
}

fn default_request_interval_ms() -> u64 {
    200
}

fn default_idle_check_interval_seconds() -> u64 {
    60
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            priority_recent_days: default_priority_recent_days(),
            historical_start_year: default_historical_start_year(),
            batch_size: default_batch_size(),
            request_interval_ms: default_request_interval_ms(),
            idle_sync_enabled: false,
            idle_check_interval_seconds: default_idle_check_interval_seconds(),
        }
    }
}

/// 币种配置文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolsConfig {
    #[serde(default)]
    pub hot_symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub minor_symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub sync_config: SyncConfig,
}

impl SymbolsConfig {
    /// 从默认路径（或 SYMBOLS_CONFIG_PATH）加载配置。
    /// 配置文件缺失或格式错误在启动期即为致命错误。
    pub fn load() -> Result<Self> {
        let path = std::env::var("SYMBOLS_CONFIG_PATH")
            .unwrap_or_else(|_| "config/symbols.json".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AppError::ConfigError(format!("读取配置文件 {} 失败: {}", path, e)))?;
        let config: SymbolsConfig = serde_json::from_str(&data)
            .map_err(|e| AppError::ConfigError(format!("解析配置文件 {} 失败: {}", path, e)))?;
        Ok(config)
    }

    /// 所有启用的币种（热门+小币种，按优先级排序）
    pub fn all_enabled_symbols(&self) -> Vec<SymbolConfig> {
        let mut enabled: Vec<SymbolConfig> = self
            .hot_symbols
            .iter()
            .chain(self.minor_symbols.iter())
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        enabled.sort_by_key(|s| s.priority);
        enabled
    }

    /// 启用的热门币种（按优先级排序）
    pub fn hot_enabled_symbols(&self) -> Vec<SymbolConfig> {
        let mut enabled: Vec<SymbolConfig> = self
            .hot_symbols
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        enabled.sort_by_key(|s| s.priority);
        enabled
    }

    /// 启用的小币种（按优先级排序）
    pub fn minor_enabled_symbols(&self) -> Vec<SymbolConfig> {
        let mut enabled: Vec<SymbolConfig> = self
            .minor_symbols
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        enabled.sort_by_key(|s| s.priority);
        enabled
    }
}

/// 数据库路径：DB_DSN 环境变量，缺省为本地文件
pub fn db_dsn() -> String {
    std::env::var("DB_DSN").unwrap_or_else(|_| "data/kline_warn.db".to_string())
}
