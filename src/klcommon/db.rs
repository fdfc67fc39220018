//! K线存储与同步时间段台账
//!
//! 每个币种一张1分钟K线表，表在首次写入时自动创建。
//! `sync_time_ranges` 记录"已经向上游要过哪些时间段"，缺口计划以它为准，
//! 而不是以K线行是否存在为准：停牌/下架的分钟上游本来就没有数据，
//! 不能因此反复重拉。

use crate::klcommon::error::{AppError, Result};
use crate::klcommon::models::{Kline1m, SaveResult, SyncStatus, SyncTimeRange};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type DbPool = Pool<SqliteConnectionManager>;

/// 根据symbol获取对应的表名（每个币种一张表）
/// 表名格式：klines_1m_BTC_USDT, klines_1m_ETH_USDT 等
pub fn table_name_for(symbol: &str) -> String {
    let sanitized = symbol.replace('-', "_").replace('.', "_");
    format!("klines_1m_{}", sanitized)
}

/// 计算目标窗口内未被任何已同步时间段覆盖的部分。
///
/// `ranges` 必须按 start_time 升序。游标从 target_start 向后扫：
/// 每遇到一段已同步区间，先吐出游标到区间开始前的缺口，再把游标推过区间尾。
pub fn compute_missing_ranges(
    ranges: &[SyncTimeRange],
    target_start: i64,
    target_end: i64,
) -> Vec<SyncTimeRange> {
    if ranges.is_empty() {
        return vec![SyncTimeRange {
            start_time: target_start,
            end_time: target_end,
        }];
    }

    let mut missing = Vec::new();
    let mut cursor = target_start;

    for synced in ranges {
        if cursor < synced.start_time {
            missing.push(SyncTimeRange {
                start_time: cursor,
                end_time: (synced.start_time - 1).min(target_end),
            });
        }
        if synced.end_time >= cursor {
            cursor = synced.end_time + 1;
        }
        if cursor > target_end {
            break;
        }
    }

    if cursor <= target_end {
        missing.push(SyncTimeRange {
            start_time: cursor,
            end_time: target_end,
        });
    }

    // 游标可能在最后一段覆盖区间内越过 target_end，上面的 min 已截断
    missing.retain(|r| r.start_time <= r.end_time);
    missing
}

/// 合并相邻或重叠的时间段。输入须按 start_time 升序。
/// 相邻判定：next.start <= current.end + 1。
pub fn merge_time_ranges(ranges: &[SyncTimeRange]) -> Vec<SyncTimeRange> {
    if ranges.len() <= 1 {
        return ranges.to_vec();
    }

    let mut merged = Vec::new();
    let mut current = ranges[0];

    for next in &ranges[1..] {
        if next.start_time <= current.end_time + 1 {
            if next.end_time > current.end_time {
                current.end_time = next.end_time;
            }
        } else {
            merged.push(current);
            current = *next;
        }
    }
    merged.push(current);
    merged
}

/// K线数据库
#[derive(Debug)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// 打开数据库（WAL模式）并建立全局表结构
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Using SQLite database with WAL mode at {}", db_path.display());

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
            )
        });

        let pool = Pool::builder()
            .max_size(25)
            .min_idle(Some(5))
            .max_lifetime(Some(Duration::from_secs(300)))
            .build(manager)
            .map_err(|e| AppError::DatabaseError(format!("创建连接池失败: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// 初始化全局表结构（sync_status / sync_time_ranges）
    /// K线表不在这里创建，按币种在需要时动态创建。
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_status (
                symbol TEXT PRIMARY KEY,
                last_sync_time INTEGER NOT NULL DEFAULT 0,
                last_kline_time INTEGER NOT NULL DEFAULT 0,
                sync_count INTEGER NOT NULL DEFAULT 0,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_time_ranges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbol_start ON sync_time_ranges (symbol, start_time)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbol_end ON sync_time_ranges (symbol, end_time)",
            [],
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::DatabaseError(format!("获取数据库连接失败: {}", e)))
    }

    fn table_exists(conn: &rusqlite::Connection, table_name: &str) -> bool {
        conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?",
            params![table_name],
            |row| row.get::<_, i64>(0).map(|count| count > 0),
        )
        .unwrap_or(false)
    }

    /// 为指定币种创建K线表（幂等）
    pub fn create_table_for_symbol(&self, symbol: &str) -> Result<()> {
        let conn = self.conn()?;
        let table_name = table_name_for(symbol);

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                symbol TEXT NOT NULL,
                open_time INTEGER PRIMARY KEY,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                close_time INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            table_name
        );
        conn.execute(&create_sql, [])?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_close_time ON {} (close_time)",
                table_name, table_name
            ),
            [],
        )?;

        Ok(())
    }

    /// 按配置预建所有启用币种的K线表。
    /// 失败只记警告，表会在首次写入时再创建。
    pub fn init_tables_from_config(&self, symbols: &[String]) {
        for symbol in symbols {
            if let Err(e) = self.create_table_for_symbol(symbol) {
                warn!("预建K线表失败（将在首次写入时创建）: symbol={}, error={}", symbol, e);
            }
        }
    }

    /// 批量保存1分钟K线。
    ///
    /// 单个事务内逐行 INSERT OR IGNORE：open_time 已存在的行静默跳过，
    /// 单行失败只计数不中断整批。
    pub fn save_klines(&self, klines: &[Kline1m]) -> Result<SaveResult> {
        if klines.is_empty() {
            return Ok(SaveResult::default());
        }

        // 按表名（币种）分组
        let mut by_table: HashMap<String, Vec<&Kline1m>> = HashMap::new();
        for k in klines {
            by_table.entry(table_name_for(&k.symbol)).or_default().push(k);
        }

        let mut total = SaveResult::default();

        for (table_name, rows) in by_table {
            self.create_table_for_symbol(&rows[0].symbol)?;

            let mut batch = SaveResult::default();
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT OR IGNORE INTO {}
                     (symbol, open_time, open, high, low, close, volume, close_time)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    table_name
                ))?;

                for k in &rows {
                    match stmt.execute(params![
                        k.symbol,
                        k.open_time,
                        k.open,
                        k.high,
                        k.low,
                        k.close,
                        k.volume,
                        k.close_time,
                    ]) {
                        Ok(affected) => {
                            if affected > 0 {
                                batch.inserted += 1;
                            } else {
                                batch.skipped += 1;
                            }
                        }
                        Err(e) => {
                            batch.failed += 1;
                            warn!(
                                "插入K线失败 [{}]: open_time={}, error={}",
                                k.symbol, k.open_time, e
                            );
                        }
                    }
                }
            }
            tx.commit()
                .map_err(|e| AppError::DatabaseError(format!("提交事务失败: {}", e)))?;

            debug!(
                "表 {} 批次统计: 总数={}, 插入={}, 跳过={}, 失败={}",
                table_name,
                rows.len(),
                batch.inserted,
                batch.skipped,
                batch.failed
            );

            total.inserted += batch.inserted;
            total.skipped += batch.skipped;
            total.failed += batch.failed;
        }

        Ok(total)
    }

    /// 最新一条K线的收盘时间；表不存在或无数据时返回 0
    pub fn latest_close_time(&self, symbol: &str) -> Result<i64> {
        let conn = self.conn()?;
        let table_name = table_name_for(symbol);

        if !Self::table_exists(&conn, &table_name) {
            return Ok(0);
        }

        let latest: i64 = conn.query_row(
            &format!("SELECT COALESCE(MAX(close_time), 0) FROM {}", table_name),
            [],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    /// 按时间范围获取1分钟K线（升序）。表不存在返回空。
    pub fn klines_by_time(
        &self,
        symbol: &str,
        start_time: i64,
        end_time: i64,
        limit: usize,
    ) -> Result<Vec<Kline1m>> {
        let conn = self.conn()?;
        let table_name = table_name_for(symbol);

        if !Self::table_exists(&conn, &table_name) {
            return Ok(Vec::new());
        }

        let mut query = format!(
            "SELECT open_time, open, high, low, close, volume, close_time FROM {} WHERE 1=1",
            table_name
        );
        let mut args: Vec<i64> = Vec::new();

        if start_time > 0 {
            query.push_str(" AND open_time >= ?");
            args.push(start_time);
        }
        if end_time > 0 {
            query.push_str(" AND open_time <= ?");
            args.push(end_time);
        }
        query.push_str(" ORDER BY open_time ASC");
        if limit > 0 {
            query.push_str(" LIMIT ?");
            args.push(limit as i64);
        }

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(Kline1m {
                symbol: symbol.to_string(),
                open_time: row.get(0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                volume: row.get(5)?,
                close_time: row.get(6)?,
            })
        })?;

        let mut klines = Vec::new();
        for row in rows {
            klines.push(row?);
        }
        Ok(klines)
    }

    /// 获取最近N根1分钟K线，按时间升序返回。表不存在返回空。
    pub fn klines_by_count(&self, symbol: &str, count: usize) -> Result<Vec<Kline1m>> {
        let conn = self.conn()?;
        let table_name = table_name_for(symbol);

        if !Self::table_exists(&conn, &table_name) {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT open_time, open, high, low, close, volume, close_time
             FROM {} ORDER BY open_time DESC LIMIT ?",
            table_name
        ))?;
        let rows = stmt.query_map([count as i64], |row| {
            Ok(Kline1m {
                symbol: symbol.to_string(),
                open_time: row.get(0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                volume: row.get(5)?,
                close_time: row.get(6)?,
            })
        })?;

        let mut klines = Vec::new();
        for row in rows {
            klines.push(row?);
        }
        klines.reverse();
        Ok(klines)
    }

    /// 最新一条K线；表不存在或无数据返回 None
    pub fn latest_kline(&self, symbol: &str) -> Result<Option<Kline1m>> {
        Ok(self.klines_by_count(symbol, 1)?.into_iter().next())
    }

    /// 记录已同步时间段，并顺手合并相邻段。
    /// 合并是幂等的后台清理，调用方不依赖它立即发生。
    pub fn add_sync_time_range(&self, symbol: &str, start_time: i64, end_time: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_time_ranges (symbol, start_time, end_time) VALUES (?, ?, ?)",
            params![symbol, start_time, end_time],
        )?;
        drop(conn);

        if let Err(e) = self.merge_adjacent_ranges(symbol) {
            warn!("[{}] 合并时间段失败: {}", symbol, e);
        }
        Ok(())
    }

    /// 指定币种的所有已同步时间段（按开始时间升序）
    pub fn get_sync_time_ranges(&self, symbol: &str) -> Result<Vec<SyncTimeRange>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT start_time, end_time FROM sync_time_ranges
             WHERE symbol = ? ORDER BY start_time ASC",
        )?;
        let rows = stmt.query_map(params![symbol], |row| {
            Ok(SyncTimeRange {
                start_time: row.get(0)?,
                end_time: row.get(1)?,
            })
        })?;

        let mut ranges = Vec::new();
        for row in rows {
            ranges.push(row?);
        }
        Ok(ranges)
    }

    /// 找出目标窗口内尚未同步的时间段
    pub fn find_missing_ranges(
        &self,
        symbol: &str,
        target_start: i64,
        target_end: i64,
    ) -> Result<Vec<SyncTimeRange>> {
        let ranges = self.get_sync_time_ranges(symbol)?;
        Ok(compute_missing_ranges(&ranges, target_start, target_end))
    }

    /// 合并相邻时间段，仅当合并后条数严格减少时整体替换
    fn merge_adjacent_ranges(&self, symbol: &str) -> Result<()> {
        let ranges = self.get_sync_time_ranges(symbol)?;
        if ranges.len() <= 1 {
            return Ok(());
        }

        let merged = merge_time_ranges(&ranges);
        if merged.len() >= ranges.len() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sync_time_ranges WHERE symbol = ?", params![symbol])?;
        for r in &merged {
            tx.execute(
                "INSERT INTO sync_time_ranges (symbol, start_time, end_time) VALUES (?, ?, ?)",
                params![symbol, r.start_time, r.end_time],
            )?;
        }
        tx.commit()
            .map_err(|e| AppError::DatabaseError(format!("提交事务失败: {}", e)))?;

        debug!("[{}] 合并时间段: {} -> {}", symbol, ranges.len(), merged.len());
        Ok(())
    }

    /// 更新同步状态（每批成功拉取后调用）
    pub fn update_sync_status(
        &self,
        symbol: &str,
        last_sync_time: i64,
        last_kline_time: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_status (symbol, last_sync_time, last_kline_time, sync_count)
             VALUES (?, ?, ?, 1)
             ON CONFLICT(symbol) DO UPDATE SET
                 last_sync_time = excluded.last_sync_time,
                 last_kline_time = excluded.last_kline_time,
                 sync_count = sync_count + 1,
                 updated_at = CURRENT_TIMESTAMP",
            params![symbol, last_sync_time, last_kline_time],
        )?;
        Ok(())
    }

    /// 获取同步状态；没有记录时返回 None
    pub fn get_sync_status(&self, symbol: &str) -> Result<Option<SyncStatus>> {
        let conn = self.conn()?;
        let status = conn
            .query_row(
                "SELECT last_sync_time, last_kline_time, sync_count
                 FROM sync_status WHERE symbol = ?",
                params![symbol],
                |row| {
                    Ok(SyncStatus {
                        last_sync_time: row.get(0)?,
                        last_kline_time: row.get(1)?,
                        sync_count: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(status)
    }
}
