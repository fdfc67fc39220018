#[cfg(test)]
mod tests {
    use kline_warn::kldata::sync::{today_utc_start_ms, year_start_ms, SyncRecorder};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    #[test]
    fn test_today_utc_start_is_day_aligned() {
        // 2023-06-15 13:47:21.345 UTC
        let now = 1_686_836_841_345i64;
        let start = today_utc_start_ms(now);

        assert_eq!(start % DAY_MS, 0, "当天起点必须对齐UTC零点");
        assert!(start <= now);
        assert!(now - start < DAY_MS);
    }

    #[test]
    fn test_today_utc_start_at_midnight() {
        // 正好零点时起点就是自身
        let midnight = 1_686_787_200_000i64; // 2023-06-15 00:00:00 UTC
        assert_eq!(today_utc_start_ms(midnight), midnight);
    }

    #[test]
    fn test_year_start_ms() {
        // 2020-01-01 00:00:00 UTC
        assert_eq!(year_start_ms(2020), 1_577_836_800_000);
        // 1970年是纪元起点
        assert_eq!(year_start_ms(1970), 0);
        // 年起点也是UTC天对齐的
        assert_eq!(year_start_ms(2024) % DAY_MS, 0);
    }

    #[test]
    fn test_sync_recorder_dedup_by_exact_window() {
        let recorder = SyncRecorder::new();

        assert!(!recorder.is_recorded("BTC_USDT", 1000, 2000));
        recorder.record("BTC_USDT", 1000, 2000);
        assert!(recorder.is_recorded("BTC_USDT", 1000, 2000));

        // 键是 (symbol, start, end) 三元组，改任何一项都不算命中
        assert!(!recorder.is_recorded("BTC_USDT", 1000, 2001));
        assert!(!recorder.is_recorded("BTC_USDT", 999, 2000));
        assert!(!recorder.is_recorded("ETH_USDT", 1000, 2000));
    }

    #[test]
    fn test_sync_recorder_multiple_windows_per_symbol() {
        let recorder = SyncRecorder::new();
        recorder.record("BTC_USDT", 0, 100);
        recorder.record("BTC_USDT", 200, 300);

        assert!(recorder.is_recorded("BTC_USDT", 0, 100));
        assert!(recorder.is_recorded("BTC_USDT", 200, 300));
        assert!(!recorder.is_recorded("BTC_USDT", 100, 200));
    }
}
