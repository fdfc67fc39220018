use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kline_warn::klcommon::{config, Database, ExchangeApi, SymbolsConfig};
use kline_warn::kldata::{AutoSyncService, Scheduler, SyncEngine, SyncRecorder};
use kline_warn::klserver::web::{start_web_server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("启动K线同步与预警服务");

    // 配置缺失或解析失败在启动期直接失败
    let symbols_config = Arc::new(SymbolsConfig::load()?);
    info!(
        "已加载币种配置: 热门 {} 个, 小币种 {} 个",
        symbols_config.hot_symbols.len(),
        symbols_config.minor_symbols.len()
    );

    let db = Arc::new(Database::new(config::db_dsn())?);

    // 按配置预建K线表，失败退化为首次写入时创建
    let enabled: Vec<String> = symbols_config
        .all_enabled_symbols()
        .iter()
        .map(|s| s.symbol.clone())
        .collect();
    db.init_tables_from_config(&enabled);

    let api = ExchangeApi::new()?;
    let recorder = Arc::new(SyncRecorder::new());
    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        api,
        recorder,
        &symbols_config.sync_config,
    ));

    let scheduler = Arc::new(Scheduler::new(db.clone(), engine.clone(), symbols_config.clone()));
    scheduler.start();

    let auto_sync = AutoSyncService::new(engine.clone());

    let state = AppState {
        db,
        engine,
        scheduler: scheduler.clone(),
        auto_sync,
    };

    tokio::select! {
        result = start_web_server(state, 3000) => {
            if let Err(e) = result {
                error!("Web服务器异常退出: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到退出信号，正在关闭...");
        }
    }

    scheduler.stop();
    info!("服务已关闭");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
