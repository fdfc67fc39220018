use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error};

use super::server::AppState;
use crate::klcommon::models::{AlertSignal, Indicators, KlineData};
use crate::kldata::aggregator::{aggregate_klines, needed_1m_count, parse_interval_to_minutes};
use crate::kldata::indicator::calculate_indicators;
use crate::kldata::signal::detect_all_signals;

/// 默认返回的目标周期K线数量
const TARGET_COUNT: usize = 1000;

/// Sync trigger response
#[derive(Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
}

/// 从库里取足够的1分钟K线并聚合到目标周期
fn load_aggregated(state: &AppState, symbol: &str, period: &str) -> Vec<KlineData> {
    let target_interval_min = parse_interval_to_minutes(period);
    let needed = needed_1m_count(TARGET_COUNT, target_interval_min);

    let klines_1m = match state.db.klines_by_count(symbol, needed) {
        Ok(klines) => klines,
        Err(e) => {
            error!("从数据库获取K线失败: symbol={}, error={}", symbol, e);
            return Vec::new();
        }
    };

    aggregate_klines(&klines_1m, target_interval_min)
        .iter()
        .map(|k| k.to_kline_data())
        .collect()
}

/// Market data: most recent aggregated bars for the period
pub async fn market_data_handler(
    Path((symbol, period)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Json<Vec<KlineData>> {
    debug!("获取市场数据: symbol={}, period={}", symbol, period);
    Json(load_aggregated(&state, &symbol, &period))
}

/// Indicator series aligned with the same bars
pub async fn indicators_handler(
    Path((symbol, period)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Json<Indicators> {
    let data = load_aggregated(&state, &symbol, &period);
    Json(calculate_indicators(&data))
}

/// Alert signals recomputed for the requested period
pub async fn signals_handler(
    Path((symbol, period)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Json<Vec<AlertSignal>> {
    let data = load_aggregated(&state, &symbol, &period);
    Json(detect_all_signals(&data))
}

/// On-demand incremental sync
pub async fn sync_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Json<SyncResponse> {
    match state.engine.sync(&symbol, true).await {
        Ok(()) => Json(SyncResponse {
            success: true,
            message: "同步成功".to_string(),
        }),
        Err(e) => {
            error!("同步K线数据失败: symbol={}, error={}", symbol, e);
            Json(SyncResponse {
                success: false,
                message: format!("同步失败: {}", e),
            })
        }
    }
}

/// On-demand initial sync pulling the last N days
pub async fn sync_initial_handler(
    Path((symbol, days)): Path<(String, i64)>,
    State(state): State<AppState>,
) -> Json<SyncResponse> {
    match state.engine.sync_initial(&symbol, days).await {
        Ok(()) => Json(SyncResponse {
            success: true,
            message: "初始同步成功".to_string(),
        }),
        Err(e) => {
            error!("初始同步失败: symbol={}, days={}, error={}", symbol, days, e);
            Json(SyncResponse {
                success: false,
                message: format!("初始同步失败: {}", e),
            })
        }
    }
}

/// Register a symbol with the auto-sync loop (starting it if needed)
pub async fn auto_sync_start_handler(
    Path((symbol, interval_secs)): Path<(String, u64)>,
    State(state): State<AppState>,
) -> Json<SyncResponse> {
    state.auto_sync.add_symbol(&symbol);
    if !state.auto_sync.is_running() {
        state.auto_sync.start(interval_secs);
    }
    Json(SyncResponse {
        success: true,
        message: "自动同步已启动".to_string(),
    })
}

/// Remove a symbol from the auto-sync loop
pub async fn auto_sync_stop_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Json<SyncResponse> {
    state.auto_sync.remove_symbol(&symbol);
    Json(SyncResponse {
        success: true,
        message: "已停止同步该交易对".to_string(),
    })
}

/// SSE stream of realtime-price events
pub async fn prices_sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.scheduler.subscribe_prices();

    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(price) => Event::default()
            .event("realtime-price")
            .json_data(&price)
            .ok()
            .map(Ok),
        // 消费端落后导致的丢帧直接跳过
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
