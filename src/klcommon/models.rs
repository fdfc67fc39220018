use serde::{Deserialize, Serialize};

/// 1分钟K线 - 数据库存储格式
///
/// 每根K线覆盖一个对齐到分钟边界的区间：
/// `open_time % 60_000 == 0`，`close_time == open_time + 59_999`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline1m {
    /// 交易对，如 BTC_USDT
    pub symbol: String,
    /// K线开盘时间（毫秒时间戳）
    pub open_time: i64,
    /// 开盘价
    pub open: f64,
    /// 最高价
    pub high: f64,
    /// 最低价
    pub low: f64,
    /// 收盘价
    pub close: f64,
    /// 成交量
    pub volume: f64,
    /// K线收盘时间（毫秒时间戳）
    pub close_time: i64,
}

/// 聚合后的K线（任意周期）
#[derive(Debug, Clone, PartialEq)]
pub struct AggKline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

/// 前端K线数据格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KlineData {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl AggKline {
    pub fn to_kline_data(&self) -> KlineData {
        KlineData {
            time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// 技术指标序列，与同一批K线按下标对齐
#[derive(Debug, Clone, Default, Serialize)]
pub struct Indicators {
    pub ma5: Vec<f64>,
    pub ma10: Vec<f64>,
    pub ma20: Vec<f64>,
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
    #[serde(rename = "bbUpper")]
    pub bb_upper: Vec<f64>,
    #[serde(rename = "bbMiddle")]
    pub bb_middle: Vec<f64>,
    #[serde(rename = "bbLower")]
    pub bb_lower: Vec<f64>,
}

/// 预警信号
#[derive(Debug, Clone, Serialize)]
pub struct AlertSignal {
    pub index: usize,
    pub time: i64,
    pub price: f64,
    pub close: f64,
    #[serde(rename = "lowerBand", skip_serializing_if = "Option::is_none")]
    pub lower_band: Option<f64>,
    #[serde(rename = "upperBand", skip_serializing_if = "Option::is_none")]
    pub upper_band: Option<f64>,
    /// 信号类型
    #[serde(rename = "type")]
    pub signal_type: String,
    /// 信号强度 0-1
    pub strength: f64,
}

/// 批量写入结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveResult {
    /// 实际插入的行数
    pub inserted: usize,
    /// 因 open_time 已存在而被忽略的行数
    pub skipped: usize,
    /// 单行写入失败的行数（不会中断整批）
    pub failed: usize,
}

/// 已同步时间段（闭区间，毫秒时间戳）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimeRange {
    pub start_time: i64,
    pub end_time: i64,
}

/// 每币种同步状态（仅供展示，计划逻辑不依赖它）
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncStatus {
    pub last_sync_time: i64,
    pub last_kline_time: i64,
    pub sync_count: i64,
}

/// 实时价格推送事件
#[derive(Debug, Clone, Serialize)]
pub struct RealtimePrice {
    pub symbol: String,
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: i64,
}
