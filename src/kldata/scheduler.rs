//! 周期性同步调度
//!
//! 每个命名worker是一个长驻任务，在 (停止信号, 定时tick) 上select；
//! worker之间只共享数据库与同步引擎，币种内处理始终是顺序的。
//!
//! worker一览：
//! - 优先同步：每60秒对所有启用币种做一轮近期数据同步；
//! - 空闲回补：错峰10秒启动，轮询地给一个币种补历史、给一个小币种补近期；
//! - 历史同步：轮询地按天上限倒推补历史；
//! - 缺口回补：每5分钟对当天窗口做缺口检查，有缺口才触发历史同步；
//! - 实时价格：每10秒同步并把最新一根K线广播给前端。

use crate::klcommon::api::now_ms;
use crate::klcommon::config::SymbolsConfig;
use crate::klcommon::models::RealtimePrice;
use crate::klcommon::Database;
use crate::kldata::sync::{today_utc_start_ms, SyncEngine};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 币种之间的请求间隔
const SYMBOL_SPACING: Duration = Duration::from_millis(200);

/// 缺口检查时币种之间的间隔
const GAP_FILL_SPACING: Duration = Duration::from_millis(500);

/// 历史同步每轮的回看天数上限
const HISTORICAL_MAX_DAYS: i64 = 7;

/// 周期性同步调度器
pub struct Scheduler {
    db: Arc<Database>,
    engine: Arc<SyncEngine>,
    config: Arc<SymbolsConfig>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    price_tx: broadcast::Sender<RealtimePrice>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(db: Arc<Database>, engine: Arc<SyncEngine>, config: Arc<SymbolsConfig>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (price_tx, _) = broadcast::channel(64);
        Self {
            db,
            engine,
            config,
            stop_tx,
            stop_rx,
            price_tx,
            running: AtomicBool::new(false),
        }
    }

    /// 订阅实时价格事件流
    pub fn subscribe_prices(&self) -> broadcast::Receiver<RealtimePrice> {
        self.price_tx.subscribe()
    }

    /// 启动所有worker
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("调度器已在运行");
            return;
        }

        let sync_cfg = &self.config.sync_config;
        info!(
            "启动调度器: 优先同步间隔=60s, 空闲检查间隔={}s, 空闲同步启用={}",
            sync_cfg.idle_check_interval_seconds, sync_cfg.idle_sync_enabled
        );

        tokio::spawn(priority_sync_loop(
            self.engine.clone(),
            self.config.clone(),
            self.stop_rx.clone(),
        ));
        tokio::spawn(idle_backfill_loop(
            self.engine.clone(),
            self.config.clone(),
            self.stop_rx.clone(),
        ));
        tokio::spawn(historical_sync_loop(
            self.engine.clone(),
            self.config.clone(),
            self.stop_rx.clone(),
        ));
        tokio::spawn(gap_fill_loop(
            self.db.clone(),
            self.engine.clone(),
            self.config.clone(),
            self.stop_rx.clone(),
        ));
        tokio::spawn(realtime_price_loop(
            self.db.clone(),
            self.engine.clone(),
            self.config.clone(),
            self.price_tx.clone(),
            self.stop_rx.clone(),
        ));
    }

    /// 停止所有worker（协作式，块间生效）
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
        self.engine.request_stop();
        info!("调度器已停止");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// 优先同步：所有启用币种的近期数据，每60秒一轮
async fn priority_sync_loop(
    engine: Arc<SyncEngine>,
    config: Arc<SymbolsConfig>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_secs(60));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // select分支持有stop_rx的可变借用，循环体内的检查用单独的克隆
    let inner_stop = stop_rx.clone();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                sync_all_recent(&engine, &config, &inner_stop).await;
            }
        }
    }
    info!("优先同步worker已退出");
}

async fn sync_all_recent(
    engine: &SyncEngine,
    config: &SymbolsConfig,
    stop_rx: &watch::Receiver<bool>,
) {
    let symbols = config.all_enabled_symbols();
    if symbols.is_empty() {
        debug!("没有配置币种，跳过优先同步");
        return;
    }

    debug!("开始优先同步 {} 个币种的近期数据", symbols.len());

    for symbol_config in &symbols {
        if *stop_rx.borrow() {
            break;
        }

        match engine.sync(&symbol_config.symbol, true).await {
            Ok(()) => debug!("优先同步成功: {}", symbol_config.symbol),
            Err(e) if e.is_invalid_currency_pair() => {
                warn!("币种可能不存在，跳过: symbol={}", symbol_config.symbol);
            }
            Err(e) => {
                error!("优先同步失败: symbol={}, error={}", symbol_config.symbol, e);
            }
        }

        sleep(SYMBOL_SPACING).await;
    }
}

/// 空闲回补：轮询补一个币种的历史，再补一个小币种的近期
async fn idle_backfill_loop(
    engine: Arc<SyncEngine>,
    config: Arc<SymbolsConfig>,
    mut stop_rx: watch::Receiver<bool>,
) {
    // 错峰启动，让优先同步先跑一轮
    tokio::select! {
        _ = stop_rx.changed() => return,
        _ = sleep(Duration::from_secs(10)) => {}
    }

    let sync_cfg = config.sync_config.clone();
    let mut ticker = interval(Duration::from_secs(sync_cfg.idle_check_interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idx: usize = 0;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                if !sync_cfg.idle_sync_enabled {
                    debug!("空闲同步已禁用");
                    continue;
                }

                let symbols = config.all_enabled_symbols();
                if symbols.is_empty() {
                    continue;
                }

                let symbol_config = &symbols[idx % symbols.len()];
                info!(
                    "空闲同步: 补币种 {} 的历史数据（起始年份 {}）",
                    symbol_config.symbol, sync_cfg.historical_start_year
                );
                if let Err(e) = engine
                    .sync_historical(
                        &symbol_config.symbol,
                        sync_cfg.historical_start_year,
                        sync_cfg.batch_size,
                        HISTORICAL_MAX_DAYS,
                    )
                    .await
                {
                    error!("空闲同步历史数据失败: symbol={}, error={}", symbol_config.symbol, e);
                }

                let minors = config.minor_enabled_symbols();
                if !minors.is_empty() {
                    let minor = &minors[idx % minors.len()];
                    debug!("空闲同步: 补小币种 {} 的近期数据", minor.symbol);
                    if let Err(e) = engine.sync(&minor.symbol, true).await {
                        error!("空闲同步小币种失败: symbol={}, error={}", minor.symbol, e);
                    }
                }

                idx = idx.wrapping_add(1);
            }
        }
    }
    info!("空闲回补worker已退出");
}

/// 历史同步：轮询每次处理一个币种
async fn historical_sync_loop(
    engine: Arc<SyncEngine>,
    config: Arc<SymbolsConfig>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let sync_cfg = config.sync_config.clone();
    let mut ticker = interval(Duration::from_secs(sync_cfg.idle_check_interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idx: usize = 0;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                let symbols = config.all_enabled_symbols();
                if symbols.is_empty() {
                    continue;
                }

                let symbol_config = &symbols[idx % symbols.len()];
                idx = idx.wrapping_add(1);

                debug!(
                    "历史数据同步: 币种 {} (倒推至 {} 年, 最多{}天)",
                    symbol_config.symbol, sync_cfg.historical_start_year, HISTORICAL_MAX_DAYS
                );
                if let Err(e) = engine
                    .sync_historical(
                        &symbol_config.symbol,
                        sync_cfg.historical_start_year,
                        sync_cfg.batch_size,
                        HISTORICAL_MAX_DAYS,
                    )
                    .await
                {
                    error!("历史数据同步失败: symbol={}, error={}", symbol_config.symbol, e);
                }
            }
        }
    }
    info!("历史同步worker已退出");
}

/// 缺口回补：检查当天窗口，有缺口才触发同步
async fn gap_fill_loop(
    db: Arc<Database>,
    engine: Arc<SyncEngine>,
    config: Arc<SymbolsConfig>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let sync_cfg = config.sync_config.clone();
    let mut ticker = interval(Duration::from_secs(5 * 60));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let inner_stop = stop_rx.clone();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                let symbols = config.all_enabled_symbols();
                if symbols.is_empty() {
                    continue;
                }

                debug!("开始检查当天缺口: {} 个币种", symbols.len());
                let now = now_ms();
                let today_start = today_utc_start_ms(now);

                for symbol_config in &symbols {
                    if *inner_stop.borrow() {
                        break;
                    }
                    let symbol = &symbol_config.symbol;

                    let missing = match db.find_missing_ranges(symbol, today_start, now) {
                        Ok(ranges) => ranges,
                        Err(e) => {
                            error!("查找缺失时间段失败: symbol={}, error={}", symbol, e);
                            continue;
                        }
                    };

                    if missing.is_empty() {
                        debug!("[{}] 当天数据完整，无缺口", symbol);
                        continue;
                    }

                    info!("[{}] 发现 {} 个当天缺口，开始补充", symbol, missing.len());
                    if let Err(e) = engine
                        .sync_historical(
                            symbol,
                            sync_cfg.historical_start_year,
                            sync_cfg.batch_size,
                            HISTORICAL_MAX_DAYS,
                        )
                        .await
                    {
                        error!("补充缺口失败: symbol={}, error={}", symbol, e);
                    }

                    sleep(GAP_FILL_SPACING).await;
                }
            }
        }
    }
    info!("缺口回补worker已退出");
}

/// 实时价格：同步后把最新一根K线广播出去
async fn realtime_price_loop(
    db: Arc<Database>,
    engine: Arc<SyncEngine>,
    config: Arc<SymbolsConfig>,
    price_tx: broadcast::Sender<RealtimePrice>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_secs(10));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let inner_stop = stop_rx.clone();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                let symbols = config.all_enabled_symbols();
                for symbol_config in &symbols {
                    if *inner_stop.borrow() {
                        break;
                    }
                    let symbol = &symbol_config.symbol;

                    if let Err(e) = engine.sync(symbol, true).await {
                        error!("实时价格同步失败: symbol={}, error={}", symbol, e);
                        continue;
                    }

                    match db.latest_kline(symbol) {
                        Ok(Some(kline)) => {
                            let price = RealtimePrice {
                                symbol: symbol.clone(),
                                time: kline.close_time,
                                open: kline.open,
                                high: kline.high,
                                low: kline.low,
                                close: kline.close,
                                volume: kline.volume,
                                timestamp: now_ms(),
                            };
                            // 没有订阅者时发送失败是正常情况
                            let _ = price_tx.send(price);
                            debug!("推送实时价格: symbol={}, price={}", symbol, kline.close);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("获取最新K线失败: symbol={}, error={}", symbol, e);
                        }
                    }

                    sleep(SYMBOL_SPACING).await;
                }
            }
        }
    }
    info!("实时价格worker已退出");
}

/// 按需自动同步服务
///
/// 由前端 start/stop 控制的独立同步循环，维护自己的币种集合。
#[derive(Clone)]
pub struct AutoSyncService {
    engine: Arc<SyncEngine>,
    inner: Arc<AutoSyncInner>,
}

struct AutoSyncInner {
    symbols: RwLock<HashSet<String>>,
    running: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl AutoSyncService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            inner: Arc::new(AutoSyncInner {
                symbols: RwLock::new(HashSet::new()),
                running: AtomicBool::new(false),
                stop_tx: Mutex::new(None),
            }),
        }
    }

    pub fn add_symbol(&self, symbol: &str) {
        if let Ok(mut set) = self.inner.symbols.write() {
            set.insert(symbol.to_string());
            info!("添加自动同步币种: {}", symbol);
        }
    }

    pub fn remove_symbol(&self, symbol: &str) {
        if let Ok(mut set) = self.inner.symbols.write() {
            set.remove(symbol);
            info!("移除自动同步币种: {}", symbol);
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// 启动自动同步循环（已运行则忽略）
    pub fn start(&self, interval_secs: u64) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("自动同步服务已在运行");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        if let Ok(mut slot) = self.inner.stop_tx.lock() {
            *slot = Some(stop_tx);
        }

        let engine = self.engine.clone();
        let inner = self.inner.clone();
        info!("启动自动同步服务，间隔 {} 秒", interval_secs);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let inner_stop = stop_rx.clone();

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let symbols: Vec<String> = match inner.symbols.read() {
                            Ok(set) => set.iter().cloned().collect(),
                            Err(_) => Vec::new(),
                        };

                        for symbol in &symbols {
                            if *inner_stop.borrow() {
                                break;
                            }
                            if let Err(e) = engine.sync(symbol, true).await {
                                error!("自动同步失败: symbol={}, error={}", symbol, e);
                            }
                            sleep(SYMBOL_SPACING).await;
                        }
                    }
                }
            }
            inner.running.store(false, Ordering::SeqCst);
            info!("自动同步服务已退出");
        });
    }

    /// 停止自动同步循环
    pub fn stop(&self) {
        if let Ok(slot) = self.inner.stop_tx.lock() {
            if let Some(tx) = slot.as_ref() {
                let _ = tx.send(true);
            }
        }
    }
}
