// Web服务器实现
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use super::handlers;
use crate::klcommon::{AppError, Database, Result};
use crate::kldata::{AutoSyncService, Scheduler, SyncEngine};

/// 各handler共享的应用状态
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub engine: Arc<SyncEngine>,
    pub scheduler: Arc<Scheduler>,
    pub auto_sync: AutoSyncService,
}

/// 启动Web服务器
pub async fn start_web_server(state: AppState, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/api/market/:symbol/:period", get(handlers::market_data_handler))
        .route("/api/indicators/:symbol/:period", get(handlers::indicators_handler))
        .route("/api/signals/:symbol/:period", get(handlers::signals_handler))
        .route("/api/sync/:symbol", post(handlers::sync_handler))
        .route("/api/sync/:symbol/initial/:days", post(handlers::sync_initial_handler))
        .route(
            "/api/auto-sync/:symbol/start/:interval",
            post(handlers::auto_sync_start_handler),
        )
        .route("/api/auto-sync/:symbol/stop", post(handlers::auto_sync_stop_handler))
        .route("/api/events/prices", get(handlers::prices_sse_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web服务器启动在 http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::WebServerError(format!("绑定地址失败: {}", e)))?;

    match axum::serve(listener, app).await {
        Ok(_) => info!("Web服务器已关闭"),
        Err(e) => {
            error!("Web服务器错误: {}", e);
            return Err(AppError::WebServerError(format!("Web服务器错误: {}", e)));
        }
    }

    Ok(())
}
