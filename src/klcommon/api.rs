//! Gate.io 现货K线接口客户端
//!
//! 上游返回的是按位置编码的7元组：
//! `[timestamp, volume, close, high, low, open, base_volume]`，
//! 成交量在常规OHLCV里放开盘价的位置上，解析必须按位置取值。
//! 数值可能是数字也可能是数字字符串；秒级时间戳（< 1e12）换算为毫秒。

use crate::klcommon::error::{AppError, Result};
use crate::klcommon::models::Kline1m;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 上游回看上限：最多只能获取最近 10000 个数据点
pub const HORIZON_POINTS: i64 = 10_000;

/// 单次请求最多返回的K线条数
pub const MAX_LIMIT: usize = 1000;

/// 未指定 limit 时上游的默认条数
pub const DEFAULT_LIMIT: usize = 300;

const MAX_RETRIES: u32 = 3;

/// 当前毫秒时间戳
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// 将周期字符串转换为秒数，例如 "1m" -> 60, "1h" -> 3600
pub fn interval_to_seconds(interval: &str) -> i64 {
    let last_char = interval.chars().last().unwrap_or('m');
    let value: i64 = interval[..interval.len().saturating_sub(1)]
        .parse()
        .unwrap_or(1);

    match last_char {
        'm' => value * 60,
        'h' => value * 60 * 60,
        'd' => value * 24 * 60 * 60,
        'w' => value * 7 * 24 * 60 * 60,
        _ => value * 60,
    }
}

/// 把起始时间钳制到上游回看上限以内
pub fn clamp_to_horizon(from_ms: i64, now_ms: i64, interval_secs: i64) -> i64 {
    let min_allowed = now_ms - HORIZON_POINTS * interval_secs * 1000;
    from_ms.max(min_allowed)
}

/// 交易所API客户端
#[derive(Debug, Clone)]
pub struct ExchangeApi {
    base_url: String,
    client: Client,
}

impl ExchangeApi {
    pub fn new() -> Result<Self> {
        Self::with_base_url("https://api.gateio.ws/api/v4".to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { base_url, client })
    }

    /// 拉取K线数据（升序）。
    ///
    /// `from_ms`/`to_ms` 为毫秒时间戳，0 表示不传；上游以秒为单位接收。
    /// 早于回看上限的 from 不下发（上游会拒绝），改由 limit 决定返回窗口。
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        from_ms: i64,
        to_ms: i64,
        limit: usize,
    ) -> Result<Vec<Kline1m>> {
        let mut params: Vec<(&str, String)> = vec![
            ("currency_pair", symbol.to_string()),
            ("interval", interval.to_string()),
        ];

        if from_ms > 0 {
            let min_allowed = now_ms() - HORIZON_POINTS * interval_to_seconds(interval) * 1000;
            if from_ms >= min_allowed {
                params.push(("from", (from_ms / 1000).to_string()));
            }
            // from 太早时不传该参数，让上游返回最近的数据
        }

        if to_ms > 0 {
            params.push(("to", (to_ms / 1000).to_string()));
        }

        let effective_limit = if limit == 0 {
            DEFAULT_LIMIT
        } else {
            limit.min(MAX_LIMIT)
        };
        params.push(("limit", effective_limit.to_string()));

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/spot/candlesticks?{}", self.base_url, query);

        debug!("[Gate.io API] 请求URL: {}", url);

        let body = self.get_with_retry(&url).await?;
        parse_candlesticks(symbol, &body)
    }

    /// 带重试的GET：网络错误、5xx、429 重试，指数退避 1s/2s/4s，
    /// 429 额外加倍等待；其余 4xx 直接返回（响应体保留在错误信息里）。
    async fn get_with_retry(&self, url: &str) -> Result<String> {
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                let wait = Duration::from_secs(1 << (attempt - 1));
                warn!("[Gate.io API] 第 {} 次重试，等待 {:?} 后重试...", attempt, wait);
                tokio::time::sleep(wait).await;
            }

            let response = match self.client.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        "[Gate.io API] 请求失败 (尝试 {}/{}): {}",
                        attempt + 1,
                        MAX_RETRIES + 1,
                        e
                    );
                    if attempt < MAX_RETRIES {
                        attempt += 1;
                        continue;
                    }
                    return Err(AppError::from(e));
                }
            };

            let status = response.status();
            // 每次尝试都读完响应体再决定下一步
            let body = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "[Gate.io API] 读取响应失败 (尝试 {}/{}): {}",
                        attempt + 1,
                        MAX_RETRIES + 1,
                        e
                    );
                    if attempt < MAX_RETRIES {
                        attempt += 1;
                        continue;
                    }
                    return Err(AppError::from(e));
                }
            };

            if status.is_success() {
                if attempt > 0 {
                    info!("[Gate.io API] 重试成功（第 {} 次尝试）", attempt + 1);
                }
                return Ok(body);
            }

            if status.is_server_error() {
                warn!(
                    "[Gate.io API] 服务器错误 {} (尝试 {}/{}): {}",
                    status,
                    attempt + 1,
                    MAX_RETRIES + 1,
                    body
                );
                if attempt < MAX_RETRIES {
                    attempt += 1;
                    continue;
                }
                return Err(AppError::ApiError(format!(
                    "API返回错误: {}, 响应: {}",
                    status, body
                )));
            }

            if status.as_u16() == 429 {
                warn!(
                    "[Gate.io API] 请求频率限制 (尝试 {}/{}): {}",
                    attempt + 1,
                    MAX_RETRIES + 1,
                    body
                );
                if attempt < MAX_RETRIES {
                    let wait = Duration::from_secs(2 << attempt);
                    info!("[Gate.io API] 频率限制，等待 {:?} 后重试...", wait);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                    continue;
                }
                return Err(AppError::ApiError(format!(
                    "API返回错误: {}, 响应: {}",
                    status, body
                )));
            }

            // 其余 4xx 不重试
            return Err(AppError::ApiError(format!(
                "API返回错误: {}, 响应: {}",
                status, body
            )));
        }
    }

}

/// 解析7元组数组为K线。单行解析失败只丢弃该行并计数。
pub fn parse_candlesticks(symbol: &str, body: &str) -> Result<Vec<Kline1m>> {
    let raw: Vec<Vec<Value>> = serde_json::from_str(body).map_err(|e| {
        warn!("[Gate.io API] JSON解析失败: {}, 原始响应: {}", e, body);
        AppError::JsonError(e)
    })?;

    let mut klines = Vec::with_capacity(raw.len());
    let mut parse_errors = 0usize;

    for (i, row) in raw.iter().enumerate() {
        if row.len() < 7 {
            warn!("[Gate.io API] 数据项 #{} 长度不足: {} (需要7)", i, row.len());
            parse_errors += 1;
            continue;
        }

        let timestamp = match value_to_timestamp_ms(&row[0]) {
            Some(ts) => ts,
            None => {
                warn!("[Gate.io API] 无法解析时间戳: {:?}", row[0]);
                parse_errors += 1;
                continue;
            }
        };

        // 位置语义: [timestamp, volume, close, high, low, open, base_volume]
        let (volume, close, high, low, open) = match (
            value_to_f64(&row[1]),
            value_to_f64(&row[2]),
            value_to_f64(&row[3]),
            value_to_f64(&row[4]),
            value_to_f64(&row[5]),
        ) {
            (Some(v), Some(c), Some(h), Some(l), Some(o)) => (v, c, h, l, o),
            _ => {
                warn!("[Gate.io API] 数据项 #{} 数值解析失败: {:?}", i, row);
                parse_errors += 1;
                continue;
            }
        };

        klines.push(Kline1m {
            symbol: symbol.to_string(),
            open_time: timestamp,
            open,
            high,
            low,
            close,
            volume,
            close_time: timestamp + 60 * 1000 - 1,
        });
    }

    if parse_errors > 0 {
        warn!("[Gate.io API] 解析过程中有 {} 条数据解析失败", parse_errors);
    }
    debug!("[Gate.io API] 解析成功 {} 条K线数据", klines.len());

    Ok(klines)
}

/// 数字或数字字符串 -> f64
pub fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// 数字或数字字符串 -> 毫秒时间戳（小于 1e12 视为秒）
pub fn value_to_timestamp_ms(v: &Value) -> Option<i64> {
    let ts = match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.parse::<i64>().ok()?,
        _ => return None,
    };
    Some(if ts < 1_000_000_000_000 { ts * 1000 } else { ts })
}
