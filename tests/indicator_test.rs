#[cfg(test)]
mod tests {
    use kline_warn::klcommon::KlineData;
    use kline_warn::kldata::indicator::calculate_indicators;

    fn bar(i: usize, close: f64) -> KlineData {
        KlineData {
            time: 1_672_531_200_000 + i as i64 * 60_000,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
        }
    }

    fn series(closes: &[f64]) -> Vec<KlineData> {
        closes.iter().enumerate().map(|(i, c)| bar(i, *c)).collect()
    }

    #[test]
    fn test_empty_input() {
        let indicators = calculate_indicators(&[]);
        assert!(indicators.ma5.is_empty());
        assert!(indicators.bb_upper.is_empty());
    }

    #[test]
    fn test_sma_equals_mean_of_window() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let data = series(&closes);
        let indicators = calculate_indicators(&data);

        for i in 0..data.len() {
            if i >= 4 {
                let expected: f64 = closes[i - 4..=i].iter().sum::<f64>() / 5.0;
                assert!(
                    (indicators.ma5[i] - expected).abs() < 1e-9,
                    "MA5[{}] 应等于最近5根收盘价均值",
                    i
                );
            } else {
                assert_eq!(indicators.ma5[i], 0.0, "暖机期内MA5应为0");
            }

            if i >= 19 {
                let expected: f64 = closes[i - 19..=i].iter().sum::<f64>() / 20.0;
                assert!((indicators.ma20[i] - expected).abs() < 1e-9);
            } else {
                assert_eq!(indicators.ma20[i], 0.0);
            }
        }
    }

    #[test]
    fn test_macd_warmup_and_signal_seed() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let data = series(&closes);
        let indicators = calculate_indicators(&data);

        // i < 25 时MACD未定义（填0）
        for i in 0..25 {
            assert_eq!(indicators.macd[i], 0.0);
        }
        assert!(indicators.macd[25] != 0.0, "单调上涨序列在25处MACD应为正");

        // 信号线在26处以当日MACD为种子，柱体从27开始
        assert_eq!(indicators.signal[26], indicators.macd[26]);
        assert_eq!(indicators.hist[26], 0.0);
        for i in 27..data.len() {
            let expected_signal = indicators.signal[i - 1] * 0.8 + indicators.macd[i] * 0.2;
            assert!((indicators.signal[i] - expected_signal).abs() < 1e-9);
            assert!((indicators.hist[i] - (indicators.macd[i] - indicators.signal[i])).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bollinger_band_ordering() {
        // 有波动的序列：上轨 >= 中轨 >= 下轨，轨距非负
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + ((i % 5) as f64)).collect();
        let data = series(&closes);
        let indicators = calculate_indicators(&data);

        for i in 0..data.len() {
            if i < 19 {
                assert_eq!(indicators.bb_upper[i], 0.0, "i<19 布林带未定义");
                assert_eq!(indicators.bb_middle[i], 0.0);
                assert_eq!(indicators.bb_lower[i], 0.0);
            } else {
                assert!(indicators.bb_upper[i] >= indicators.bb_middle[i]);
                assert!(indicators.bb_middle[i] >= indicators.bb_lower[i]);
                assert!(indicators.bb_upper[i] - indicators.bb_lower[i] >= 0.0);
            }
        }
    }

    #[test]
    fn test_bollinger_middle_is_sma20() {
        let closes: Vec<f64> = (0..25).map(|i| 50.0 + i as f64).collect();
        let data = series(&closes);
        let indicators = calculate_indicators(&data);

        for i in 19..data.len() {
            assert!(
                (indicators.bb_middle[i] - indicators.ma20[i]).abs() < 1e-9,
                "布林带中轨就是MA20"
            );
        }
    }

    #[test]
    fn test_bollinger_flat_series_zero_width() {
        // 收盘价完全不动时标准差为0，上下轨重合于中轨
        let closes = vec![100.0; 25];
        let data = series(&closes);
        let indicators = calculate_indicators(&data);

        for i in 19..data.len() {
            assert!((indicators.bb_upper[i] - 100.0).abs() < 1e-9);
            assert!((indicators.bb_middle[i] - 100.0).abs() < 1e-9);
            assert!((indicators.bb_lower[i] - 100.0).abs() < 1e-9);
        }
    }
}
