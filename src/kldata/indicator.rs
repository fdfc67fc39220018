//! 技术指标计算
//!
//! 所有序列与输入K线按下标对齐，暖机期内填0。

use crate::klcommon::models::{Indicators, KlineData};

const BB_PERIOD: usize = 20;
const BB_MULTIPLIER: f64 = 2.0;

/// 计算整组技术指标（MA / MACD / 布林带）
pub fn calculate_indicators(data: &[KlineData]) -> Indicators {
    if data.is_empty() {
        return Indicators::default();
    }

    let mut indicators = Indicators {
        ma5: vec![0.0; data.len()],
        ma10: vec![0.0; data.len()],
        ma20: vec![0.0; data.len()],
        macd: vec![0.0; data.len()],
        signal: vec![0.0; data.len()],
        hist: vec![0.0; data.len()],
        bb_upper: vec![0.0; data.len()],
        bb_middle: vec![0.0; data.len()],
        bb_lower: vec![0.0; data.len()],
    };

    calculate_ma(data, &mut indicators);
    calculate_macd(data, &mut indicators);
    calculate_bollinger_bands(data, &mut indicators);

    indicators
}

/// 移动平均线 MA5 / MA10 / MA20
fn calculate_ma(data: &[KlineData], indicators: &mut Indicators) {
    for i in 0..data.len() {
        if i >= 4 {
            let sum: f64 = data[i - 4..=i].iter().map(|k| k.close).sum();
            indicators.ma5[i] = sum / 5.0;
        }
        if i >= 9 {
            let sum: f64 = data[i - 9..=i].iter().map(|k| k.close).sum();
            indicators.ma10[i] = sum / 10.0;
        }
        if i >= 19 {
            let sum: f64 = data[i - 19..=i].iter().map(|k| k.close).sum();
            indicators.ma20[i] = sum / 20.0;
        }
    }
}

/// MACD = EMA12 - EMA26（i >= 25 起有效）
/// 信号线为MACD的9周期EMA，在 i = 26 处以当日MACD为种子
fn calculate_macd(data: &[KlineData], indicators: &mut Indicators) {
    let mut ema12 = vec![0.0; data.len()];
    let mut ema26 = vec![0.0; data.len()];

    for i in 0..data.len() {
        if i == 0 {
            ema12[i] = data[i].close;
            ema26[i] = data[i].close;
        } else {
            // 平滑系数 α = 2/(k+1)
            ema12[i] = ema12[i - 1] * 11.0 / 13.0 + data[i].close * 2.0 / 13.0;
            ema26[i] = ema26[i - 1] * 25.0 / 27.0 + data[i].close * 2.0 / 27.0;
        }

        if i >= 25 {
            indicators.macd[i] = ema12[i] - ema26[i];
        }
    }

    for i in 0..indicators.macd.len() {
        if i == 26 {
            indicators.signal[i] = indicators.macd[i];
        } else if i > 26 {
            indicators.signal[i] =
                indicators.signal[i - 1] * 8.0 / 10.0 + indicators.macd[i] * 2.0 / 10.0;
            indicators.hist[i] = indicators.macd[i] - indicators.signal[i];
        }
    }
}

/// 布林带(20, 2.0)，σ取总体标准差，i < 19 未定义（填0）
fn calculate_bollinger_bands(data: &[KlineData], indicators: &mut Indicators) {
    for i in 0..data.len() {
        if i < BB_PERIOD - 1 {
            continue;
        }

        let window = &data[i + 1 - BB_PERIOD..=i];
        let sma: f64 = window.iter().map(|k| k.close).sum::<f64>() / BB_PERIOD as f64;

        let variance: f64 = window
            .iter()
            .map(|k| (k.close - sma).powi(2))
            .sum::<f64>()
            / BB_PERIOD as f64;
        let std_dev = variance.sqrt();

        indicators.bb_middle[i] = sma;
        indicators.bb_upper[i] = sma + BB_MULTIPLIER * std_dev;
        indicators.bb_lower[i] = sma - BB_MULTIPLIER * std_dev;
    }
}
