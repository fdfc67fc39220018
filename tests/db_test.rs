#[cfg(test)]
mod tests {
    use kline_warn::klcommon::{Database, Kline1m, SyncTimeRange};
    use std::path::PathBuf;

    // 对齐到分钟边界的起始时间
    const BASE_TIME: i64 = 1_672_531_200_000;

    fn setup_test_db(name: &str) -> Database {
        let db_path = PathBuf::from(format!("./target/test_db_{}.db", name));
        // 清掉上次运行留下的文件（连同WAL附属文件）
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));

        Database::new(&db_path).unwrap()
    }

    fn kline(symbol: &str, open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Kline1m {
        Kline1m {
            symbol: symbol.to_string(),
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time: open_time + 59_999,
        }
    }

    #[test]
    fn test_save_klines_is_idempotent() {
        let db = setup_test_db("idempotent");
        let batch = vec![kline("S_USDT", 60_000, 1.0, 2.0, 0.5, 1.5, 10.0)];

        let first = db.save_klines(&batch).unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(first.skipped, 0);
        assert_eq!(first.failed, 0);

        // 同一批再写一次：全部按已存在跳过
        let second = db.save_klines(&batch).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.failed, 0);

        let rows = db.klines_by_time("S_USDT", 0, 120_000, 10).unwrap();
        assert_eq!(rows.len(), 1, "重复写入不应产生第二行");
        assert_eq!(rows[0].open_time, 60_000);
        assert_eq!(rows[0].close_time, 119_999);
        assert_eq!(rows[0].volume, 10.0);
    }

    #[test]
    fn test_queries_on_missing_table_return_empty() {
        let db = setup_test_db("missing_table");

        // 从未写入过的币种：所有查询返回空而不是报错
        assert_eq!(db.latest_close_time("GHOST_USDT").unwrap(), 0);
        assert!(db.klines_by_time("GHOST_USDT", 0, i64::MAX, 100).unwrap().is_empty());
        assert!(db.klines_by_count("GHOST_USDT", 10).unwrap().is_empty());
        assert!(db.latest_kline("GHOST_USDT").unwrap().is_none());
    }

    #[test]
    fn test_klines_by_count_returns_oldest_first() {
        let db = setup_test_db("by_count");
        let batch: Vec<Kline1m> = (0..5)
            .map(|i| kline("BTC_USDT", BASE_TIME + i * 60_000, 10.0, 11.0, 9.0, 10.5, 1.0))
            .collect();
        db.save_klines(&batch).unwrap();

        // 取最近3根，应该按时间升序返回最后3根
        let rows = db.klines_by_count("BTC_USDT", 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].open_time, BASE_TIME + 2 * 60_000);
        assert_eq!(rows[2].open_time, BASE_TIME + 4 * 60_000);
        assert!(rows.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn test_latest_close_time() {
        let db = setup_test_db("latest_close");
        let batch: Vec<Kline1m> = (0..3)
            .map(|i| kline("ETH_USDT", BASE_TIME + i * 60_000, 10.0, 11.0, 9.0, 10.5, 1.0))
            .collect();
        db.save_klines(&batch).unwrap();

        assert_eq!(
            db.latest_close_time("ETH_USDT").unwrap(),
            BASE_TIME + 2 * 60_000 + 59_999
        );
    }

    #[test]
    fn test_sync_time_ranges_merge_on_insert() {
        let db = setup_test_db("ranges_merge");
        db.add_sync_time_range("BTC_USDT", 100, 200).unwrap();
        db.add_sync_time_range("BTC_USDT", 201, 300).unwrap();
        db.add_sync_time_range("BTC_USDT", 400, 500).unwrap();

        // 相邻段在插入后被合并，不相邻段保留
        let ranges = db.get_sync_time_ranges("BTC_USDT").unwrap();
        assert_eq!(
            ranges,
            vec![
                SyncTimeRange { start_time: 100, end_time: 300 },
                SyncTimeRange { start_time: 400, end_time: 500 },
            ]
        );
    }

    #[test]
    fn test_sync_time_ranges_are_per_symbol() {
        let db = setup_test_db("ranges_symbol");
        db.add_sync_time_range("BTC_USDT", 100, 200).unwrap();
        db.add_sync_time_range("ETH_USDT", 300, 400).unwrap();

        let btc = db.get_sync_time_ranges("BTC_USDT").unwrap();
        assert_eq!(btc, vec![SyncTimeRange { start_time: 100, end_time: 200 }]);
        let eth = db.get_sync_time_ranges("ETH_USDT").unwrap();
        assert_eq!(eth, vec![SyncTimeRange { start_time: 300, end_time: 400 }]);
    }

    #[test]
    fn test_find_missing_ranges_through_store() {
        let db = setup_test_db("find_missing");
        db.add_sync_time_range("BTC_USDT", 1200, 1500).unwrap();

        let missing = db.find_missing_ranges("BTC_USDT", 1000, 2000).unwrap();
        assert_eq!(
            missing,
            vec![
                SyncTimeRange { start_time: 1000, end_time: 1199 },
                SyncTimeRange { start_time: 1501, end_time: 2000 },
            ]
        );

        // 没有任何台账记录的币种：整个窗口都是缺口
        let missing = db.find_missing_ranges("X_USDT", 1000, 2000).unwrap();
        assert_eq!(missing, vec![SyncTimeRange { start_time: 1000, end_time: 2000 }]);
    }

    #[test]
    fn test_missing_ranges_not_derived_from_bars() {
        // 台账说问过了就不再是缺口，即使这段时间一根K线都没有
        let db = setup_test_db("ledger_authority");
        db.add_sync_time_range("HALT_USDT", 1000, 2000).unwrap();

        let bars = db.klines_by_time("HALT_USDT", 1000, 2000, 100).unwrap();
        assert!(bars.is_empty());

        let missing = db.find_missing_ranges("HALT_USDT", 1000, 2000).unwrap();
        assert!(missing.is_empty(), "已记录的空窗口不应重新出现: {:?}", missing);
    }

    #[test]
    fn test_sync_status_upsert() {
        let db = setup_test_db("sync_status");

        assert!(db.get_sync_status("BTC_USDT").unwrap().is_none());

        db.update_sync_status("BTC_USDT", 1_000, 2_000).unwrap();
        let status = db.get_sync_status("BTC_USDT").unwrap().unwrap();
        assert_eq!(status.last_sync_time, 1_000);
        assert_eq!(status.last_kline_time, 2_000);
        assert_eq!(status.sync_count, 1);

        db.update_sync_status("BTC_USDT", 3_000, 4_000).unwrap();
        let status = db.get_sync_status("BTC_USDT").unwrap().unwrap();
        assert_eq!(status.last_sync_time, 3_000);
        assert_eq!(status.last_kline_time, 4_000);
        assert_eq!(status.sync_count, 2, "再次同步应累加计数");
    }

    #[test]
    fn test_save_klines_multiple_symbols_in_one_batch() {
        let db = setup_test_db("multi_symbol");
        let batch = vec![
            kline("BTC_USDT", BASE_TIME, 10.0, 11.0, 9.0, 10.5, 1.0),
            kline("ETH_USDT", BASE_TIME, 20.0, 21.0, 19.0, 20.5, 2.0),
        ];

        let result = db.save_klines(&batch).unwrap();
        assert_eq!(result.inserted, 2);

        assert_eq!(db.klines_by_count("BTC_USDT", 10).unwrap().len(), 1);
        assert_eq!(db.klines_by_count("ETH_USDT", 10).unwrap().len(), 1);
    }
}
