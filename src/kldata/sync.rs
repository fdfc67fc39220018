//! 同步引擎
//!
//! 三种模式共用一套"查台账找缺口 -> 分窗拉取 -> 入库 -> 记台账"的流程：
//! - `sync`：近期数据正向分页（优先模式），窗口上限1000分钟；
//! - `sync_historical`：历史数据从近到远按块倒推，受10000点回看上限约束；
//! - `sync_initial`：首次拉取，正向流程套在 `[今天00:00Z - N天, now - 10min]` 上。
//!
//! 块/窗口只有在"拉取并提交完成"之后才记入台账；失败的块不记录，
//! 下一轮计划会重新把它当作缺口。

use crate::klcommon::api::{clamp_to_horizon, now_ms, ExchangeApi, HORIZON_POINTS, MAX_LIMIT};
use crate::klcommon::config::SyncConfig;
use crate::klcommon::error::{AppError, Result};
use crate::klcommon::models::SyncTimeRange;
use crate::klcommon::Database;
use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const MINUTE_MS: i64 = 60 * 1000;

/// 正向同步单个拉取窗口的上限（分钟）
const WINDOW_MINUTES: i64 = 1000;

// 全局统计，累计入库的K线数量
// 格式: (入库总数, 最后日志时间)
static SYNC_STATS: Lazy<(AtomicUsize, Mutex<Instant>)> =
    Lazy::new(|| (AtomicUsize::new(0), Mutex::new(Instant::now())));

// 日志间隔，每30秒输出一次摘要
const STATS_LOG_INTERVAL: u64 = 30;

/// 更新入库统计并按间隔输出摘要日志
fn update_sync_stats(count: usize) {
    SYNC_STATS.0.fetch_add(count, Ordering::Relaxed);

    let mut last_log_time = match SYNC_STATS.1.lock() {
        Ok(guard) => guard,
        Err(_) => return,
    };
    let now = Instant::now();
    if now.duration_since(*last_log_time).as_secs() >= STATS_LOG_INTERVAL {
        let total = SYNC_STATS.0.swap(0, Ordering::Relaxed);
        if total > 0 {
            info!("同步摘要 ({}秒): 共入库 {} 条K线", STATS_LOG_INTERVAL, total);
        }
        *last_log_time = now;
    }
}

/// UTC 当天 00:00 的毫秒时间戳
pub fn today_utc_start_ms(now: i64) -> i64 {
    now - now.rem_euclid(DAY_MS)
}

/// 指定年份1月1日 00:00 UTC 的毫秒时间戳
pub fn year_start_ms(year: i32) -> i64 {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// 进程级同步窗口记录器
///
/// 以 (symbol, start, end) 为键去重，避免同一进程内对同一窗口重复计划。
/// 只是内存加速层，不替代持久化台账。
#[derive(Debug, Default)]
pub struct SyncRecorder {
    inner: RwLock<HashMap<String, Vec<(i64, i64, i64)>>>,
}

impl SyncRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recorded(&self, symbol: &str, start: i64, end: i64) -> bool {
        let map = match self.inner.read() {
            Ok(map) => map,
            Err(_) => return false,
        };
        map.get(symbol)
            .map(|windows| windows.iter().any(|(s, e, _)| *s == start && *e == end))
            .unwrap_or(false)
    }

    pub fn record(&self, symbol: &str, start: i64, end: i64) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(symbol.to_string())
                .or_default()
                .push((start, end, now_ms()));
        }
    }
}

/// 同步引擎：对单个币种执行增量同步
pub struct SyncEngine {
    db: Arc<Database>,
    api: ExchangeApi,
    recorder: Arc<SyncRecorder>,
    shutdown: Arc<AtomicBool>,
    request_interval: Duration,
    historical_start_year: i32,
}

impl SyncEngine {
    pub fn new(
        db: Arc<Database>,
        api: ExchangeApi,
        recorder: Arc<SyncRecorder>,
        sync_config: &SyncConfig,
    ) -> Self {
        Self {
            db,
            api,
            recorder,
            shutdown: Arc::new(AtomicBool::new(false)),
            request_interval: Duration::from_millis(sync_config.request_interval_ms),
            historical_start_year: sync_config.historical_start_year,
        }
    }

    /// 请求停止：各同步循环在块/窗口之间观察该标志后干净退出
    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// 同步指定币种。
    ///
    /// `priority` 为真时目标窗口为 `[今天00:00Z - 7天, now - 10秒]`
    /// （10秒尾部裁剪避免拉到尚未走完的分钟）；为假时从历史起始年份开始。
    pub async fn sync(&self, symbol: &str, priority: bool) -> Result<()> {
        let now = now_ms();
        let (target_start, mode) = if priority {
            (today_utc_start_ms(now) - 7 * DAY_MS, "近期数据")
        } else {
            (year_start_ms(self.historical_start_year), "历史数据")
        };
        let target_end = now - 10_000;

        self.sync_target(symbol, target_start, target_end, mode).await
    }

    /// 首次同步：拉取最近 `days` 天，尾部裁剪10分钟只收完整K线
    pub async fn sync_initial(&self, symbol: &str, days: i64) -> Result<()> {
        let now = now_ms();
        let target_start = today_utc_start_ms(now) - days * DAY_MS;
        let target_end = now - 10 * MINUTE_MS;

        self.sync_target(symbol, target_start, target_end, "初始同步").await
    }

    /// 正向同步：计划缺口，按窗口分页拉取
    async fn sync_target(
        &self,
        symbol: &str,
        target_start: i64,
        target_end: i64,
        mode: &str,
    ) -> Result<()> {
        if target_start >= target_end {
            return Ok(());
        }

        let missing = self.db.find_missing_ranges(symbol, target_start, target_end)?;
        if missing.is_empty() {
            debug!("[{}] 所有时间段已同步，无需同步 [{}]", symbol, mode);
            return Ok(());
        }

        info!(
            "开始同步 {} [{}] 目标范围: {} ~ {}, 缺失 {} 段",
            symbol,
            mode,
            target_start,
            target_end,
            missing.len()
        );

        for range in &missing {
            if self.is_stopped() {
                info!("[{}] 收到停止信号，中断同步", symbol);
                break;
            }

            if self.recorder.is_recorded(symbol, range.start_time, range.end_time) {
                debug!(
                    "[{}] 窗口 {}~{} 本进程内已拉取过，跳过",
                    symbol, range.start_time, range.end_time
                );
                continue;
            }

            if let Err(e) = self.sync_forward_range(symbol, range).await {
                // 单个时间段失败不影响其余时间段
                error!(
                    "[{}] 时间段 {}~{} 同步失败: {}",
                    symbol, range.start_time, range.end_time, e
                );
            }
        }

        Ok(())
    }

    /// 正向处理一个缺失时间段：按最多1000分钟一个窗口推进
    async fn sync_forward_range(&self, symbol: &str, range: &SyncTimeRange) -> Result<()> {
        let window_ms = WINDOW_MINUTES * MINUTE_MS;
        let mut window_start = range.start_time;

        while window_start <= range.end_time {
            if self.is_stopped() {
                break;
            }

            let window_end = (window_start + window_ms - 1).min(range.end_time);

            match self.fetch_window_forward(symbol, window_start, window_end).await {
                Ok(true) => {
                    // 整窗提交完成后才记台账
                    self.db.add_sync_time_range(symbol, window_start, window_end)?;
                    self.recorder.record(symbol, window_start, window_end);
                }
                Ok(false) => break, // 取消，不记录
                Err(e) if e.is_horizon_exceeded() => {
                    warn!("[{}] 超过10000点回看上限，停止该时间段", symbol);
                    break;
                }
                Err(e @ AppError::DatabaseError(_)) | Err(e @ AppError::SqliteError(_)) => {
                    // 入库失败对当前时间段是致命的
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "[{}] 窗口 {}~{} 拉取失败，跳过: {}",
                        symbol, window_start, window_end, e
                    );
                }
            }

            window_start = window_end + 1;
        }

        Ok(())
    }

    /// 在窗口内正向分页。页满则 from 推进到最后一根的下一分钟，
    /// 页未满说明窗口已拉完。返回 false 表示被取消。
    async fn fetch_window_forward(
        &self,
        symbol: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<bool> {
        let mut from = window_start;

        loop {
            if self.is_stopped() {
                return Ok(false);
            }

            let klines = match self
                .api
                .fetch_klines(symbol, "1m", from, window_end, MAX_LIMIT)
                .await
            {
                Ok(klines) => klines,
                Err(e) if e.is_range_too_broad() => {
                    info!("[{}] 时间范围错误，降级为不带from的请求", symbol);
                    self.api.fetch_klines(symbol, "1m", 0, 0, MAX_LIMIT).await?
                }
                Err(e) => return Err(e),
            };

            if klines.is_empty() {
                // 上游没有这段数据（停牌/上市前），窗口视为已问全
                return Ok(true);
            }

            let result = self.db.save_klines(&klines)?;
            debug!(
                "[{}] 窗口分页保存: 插入={}, 跳过={}, 失败={}",
                symbol, result.inserted, result.skipped, result.failed
            );
            update_sync_stats(result.inserted);

            let last = &klines[klines.len() - 1];
            self.db.update_sync_status(symbol, now_ms(), last.close_time)?;

            if klines.len() < MAX_LIMIT {
                return Ok(true);
            }

            from = last.open_time + MINUTE_MS;
            if from > window_end {
                return Ok(true);
            }

            sleep(self.request_interval).await;
        }
    }

    /// 历史数据倒推同步。
    ///
    /// 目标窗口 `[max(起始年份, 今天00:00Z - max_days天), now - 10分钟]`，
    /// 缺失段从近到远处理；段内按 `batch_size` 分钟一块向过去走，
    /// 一块一次拉取、提交、记台账。碰到回看上限就停止该段。
    pub async fn sync_historical(
        &self,
        symbol: &str,
        start_year: i32,
        batch_size: usize,
        max_days: i64,
    ) -> Result<()> {
        let now = now_ms();
        let target_start = year_start_ms(start_year).max(today_utc_start_ms(now) - max_days * DAY_MS);
        let target_end = now - 10 * MINUTE_MS;

        if target_start >= target_end {
            return Ok(());
        }

        let mut missing = self.db.find_missing_ranges(symbol, target_start, target_end)?;
        if missing.is_empty() {
            debug!("[{}] 所有历史数据已同步，无需同步", symbol);
            return Ok(());
        }

        // 从近到远，优先补最新的缺口
        missing.reverse();

        info!(
            "开始同步 {} [历史数据倒推] 目标范围: {} ~ {}, 缺失 {} 段",
            symbol,
            target_start,
            target_end,
            missing.len()
        );

        for range in &missing {
            if self.is_stopped() {
                info!("[{}] 收到停止信号，中断历史同步", symbol);
                break;
            }

            if self.recorder.is_recorded(symbol, range.start_time, range.end_time) {
                continue;
            }

            if let Err(e) = self.sync_backward_range(symbol, range, now, batch_size).await {
                error!(
                    "[{}] 历史时间段 {}~{} 同步失败: {}",
                    symbol, range.start_time, range.end_time, e
                );
            }
        }

        Ok(())
    }

    /// 倒推处理一个缺失时间段
    async fn sync_backward_range(
        &self,
        symbol: &str,
        range: &SyncTimeRange,
        now: i64,
        batch_size: usize,
    ) -> Result<()> {
        let chunk_ms = batch_size as i64 * MINUTE_MS;
        let horizon_floor = now - HORIZON_POINTS * MINUTE_MS;
        let mut chunk_end = range.end_time;

        while chunk_end >= range.start_time {
            if self.is_stopped() {
                break;
            }

            let mut chunk_start = (chunk_end - chunk_ms + 1).max(range.start_time);

            // 回看上限：起点钳到上限，本块拉完后停止继续倒推
            let mut stop_after_chunk = false;
            if chunk_start < horizon_floor {
                chunk_start = clamp_to_horizon(chunk_start, now, 60);
                stop_after_chunk = true;
                if chunk_start > chunk_end {
                    warn!("[{}] 剩余缺口全部早于回看上限，停止倒推", symbol);
                    break;
                }
            }

            match self.fetch_chunk(symbol, chunk_start, chunk_end, batch_size).await {
                Ok(true) => {
                    self.db.add_sync_time_range(symbol, chunk_start, chunk_end)?;
                    self.recorder.record(symbol, chunk_start, chunk_end);
                }
                Ok(false) => break,
                Err(e) if e.is_horizon_exceeded() => {
                    warn!("[{}] 无法获取更早的数据（超过10000点限制），停止倒推", symbol);
                    break;
                }
                Err(e @ AppError::DatabaseError(_)) | Err(e @ AppError::SqliteError(_)) => {
                    return Err(e);
                }
                Err(e) => {
                    // 失败的块不记台账，下一轮计划会重新发现它
                    error!(
                        "[{}] 块 {}~{} 拉取失败，跳过: {}",
                        symbol, chunk_start, chunk_end, e
                    );
                }
            }

            if stop_after_chunk {
                warn!("[{}] 已到回看上限，停止该时间段的继续倒推", symbol);
                break;
            }

            chunk_end = chunk_start - 1;
            sleep(self.request_interval).await;
        }

        Ok(())
    }

    /// 单块拉取并提交。返回 false 表示被取消。
    async fn fetch_chunk(
        &self,
        symbol: &str,
        chunk_start: i64,
        chunk_end: i64,
        batch_size: usize,
    ) -> Result<bool> {
        if self.is_stopped() {
            return Ok(false);
        }

        let klines = match self
            .api
            .fetch_klines(symbol, "1m", chunk_start, chunk_end, batch_size)
            .await
        {
            Ok(klines) => klines,
            Err(e) if e.is_range_too_broad() => {
                info!("[{}] 时间范围错误，降级为不带from的请求", symbol);
                self.api.fetch_klines(symbol, "1m", 0, 0, batch_size).await?
            }
            Err(e) => return Err(e),
        };

        if klines.is_empty() {
            // 上游对这一块没有数据，同样算"已经问过"
            return Ok(true);
        }

        let result = self.db.save_klines(&klines)?;
        debug!(
            "[{}] 块 {}~{} 保存: 插入={}, 跳过={}, 失败={}",
            symbol, chunk_start, chunk_end, result.inserted, result.skipped, result.failed
        );
        update_sync_stats(result.inserted);

        let last = &klines[klines.len() - 1];
        self.db.update_sync_status(symbol, now_ms(), last.close_time)?;

        Ok(true)
    }
}
