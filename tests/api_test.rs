#[cfg(test)]
mod tests {
    use kline_warn::klcommon::api::{
        clamp_to_horizon, interval_to_seconds, parse_candlesticks, value_to_f64,
        value_to_timestamp_ms, HORIZON_POINTS,
    };
    use serde_json::json;

    #[test]
    fn test_interval_to_seconds() {
        assert_eq!(interval_to_seconds("1m"), 60);
        assert_eq!(interval_to_seconds("5m"), 300);
        assert_eq!(interval_to_seconds("1h"), 3600);
        assert_eq!(interval_to_seconds("4h"), 14400);
        assert_eq!(interval_to_seconds("1d"), 86400);
        assert_eq!(interval_to_seconds("1w"), 604800);
    }

    #[test]
    fn test_clamp_to_horizon() {
        let now = 1_700_000_000_000i64;
        let horizon_ms = HORIZON_POINTS * 60 * 1000;

        // 超过回看上限1分钟：钳到上限
        let too_old = now - (HORIZON_POINTS + 1) * 60 * 1000;
        assert_eq!(clamp_to_horizon(too_old, now, 60), now - horizon_ms);

        // 在上限以内：原样返回
        let recent = now - 1_000 * 60 * 1000;
        assert_eq!(clamp_to_horizon(recent, now, 60), recent);
    }

    #[test]
    fn test_value_to_f64_accepts_number_or_string() {
        assert_eq!(value_to_f64(&json!(1.5)), Some(1.5));
        assert_eq!(value_to_f64(&json!("1.5")), Some(1.5));
        assert_eq!(value_to_f64(&json!("42")), Some(42.0));
        assert_eq!(value_to_f64(&json!(null)), None);
        assert_eq!(value_to_f64(&json!("abc")), None);
    }

    #[test]
    fn test_value_to_timestamp_seconds_promoted_to_millis() {
        // 秒级时间戳（<1e12）乘1000
        assert_eq!(value_to_timestamp_ms(&json!(1_700_000_000)), Some(1_700_000_000_000));
        assert_eq!(value_to_timestamp_ms(&json!("1700000000")), Some(1_700_000_000_000));
        // 毫秒级时间戳原样保留
        assert_eq!(
            value_to_timestamp_ms(&json!(1_700_000_000_000i64)),
            Some(1_700_000_000_000)
        );
        assert_eq!(value_to_timestamp_ms(&json!([])), None);
    }

    #[test]
    fn test_parse_candlesticks_positional_semantics() {
        // 上游7元组: [timestamp, volume, close, high, low, open, base_volume]
        // 成交量在第2个位置上，绝不能当成开盘价
        let body = r#"[["1700000000","123.45","105.0","110.0","95.0","100.0","12000.0"]]"#;
        let klines = parse_candlesticks("BTC_USDT", body).unwrap();

        assert_eq!(klines.len(), 1);
        let k = &klines[0];
        assert_eq!(k.symbol, "BTC_USDT");
        assert_eq!(k.open_time, 1_700_000_000_000);
        assert_eq!(k.close_time, 1_700_000_000_000 + 59_999);
        assert_eq!(k.volume, 123.45);
        assert_eq!(k.close, 105.0);
        assert_eq!(k.high, 110.0);
        assert_eq!(k.low, 95.0);
        assert_eq!(k.open, 100.0);
    }

    #[test]
    fn test_parse_candlesticks_mixed_scalar_types() {
        // 数字与数字字符串混用
        let body = r#"[[1700000060, 1.0, "2.0", 3.0, "0.5", 1.5, "100"]]"#;
        let klines = parse_candlesticks("ETH_USDT", body).unwrap();
        assert_eq!(klines.len(), 1);
        assert_eq!(klines[0].open_time, 1_700_000_060_000);
        assert_eq!(klines[0].open, 1.5);
        assert_eq!(klines[0].high, 3.0);
    }

    #[test]
    fn test_parse_candlesticks_drops_malformed_rows() {
        // 第二行长度不足，第三行时间戳不可解析：丢弃但不中断
        let body = r#"[
            ["1700000000","1","2","3","0.5","1.5","10"],
            ["1700000060","1","2"],
            ["not-a-ts","1","2","3","0.5","1.5","10"],
            ["1700000120","1","2","3","0.5","1.5","10"]
        ]"#;
        let klines = parse_candlesticks("BTC_USDT", body).unwrap();
        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].open_time, 1_700_000_000_000);
        assert_eq!(klines[1].open_time, 1_700_000_120_000);
    }

    #[test]
    fn test_parse_candlesticks_invalid_json_is_error() {
        assert!(parse_candlesticks("BTC_USDT", "{not json").is_err());
    }
}
