//! K线形态与预警信号检测
//!
//! 形态判定基于单根K线的实体/影线比例；复合信号再叠加布林带位置条件。
//! 轨道附近的判定统一用"价差不超过上下轨高度的10%"（且不越过轨道）。

use crate::klcommon::models::{AlertSignal, KlineData};

/// 十字星实体阈值（实体/开盘价）
pub const DOJI_THRESHOLD: f64 = 0.001;

/// 轨道附近容差：上下轨高度的10%
pub const BAND_TOLERANCE_RATIO: f64 = 0.1;

const BB_PERIOD: usize = 20;
const BB_MULTIPLIER: f64 = 2.0;

/// 布林带单点取值。周期未满时全0，检测函数以此跳过未定义区间。
#[derive(Debug, Clone, Copy, Default)]
pub struct BollingerBand {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// 计算布林带序列（总体标准差）
pub fn compute_bollinger_bands(
    data: &[KlineData],
    period: usize,
    multiplier: f64,
) -> Vec<BollingerBand> {
    let mut bands = vec![BollingerBand::default(); data.len()];

    for i in 0..data.len() {
        if i + 1 < period {
            continue;
        }

        let window = &data[i + 1 - period..=i];
        let sma: f64 = window.iter().map(|k| k.close).sum::<f64>() / period as f64;
        let variance: f64 =
            window.iter().map(|k| (k.close - sma).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();

        bands[i] = BollingerBand {
            upper: sma + multiplier * std_dev,
            middle: sma,
            lower: sma - multiplier * std_dev,
        };
    }

    bands
}

// ==================== K线形态判定 ====================

/// 十字星：实体相对开盘价极小，且波动范围明显大于实体
pub fn is_doji(candle: &KlineData, threshold: f64) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = (candle.close - candle.open).abs();
    let range = candle.high - candle.low;

    range > 0.0 && body / candle.open < threshold && range > body * 2.0
}

/// 锤子线：下影线至少是实体的2倍，上影线很小
pub fn is_hammer(candle: &KlineData) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = (candle.close - candle.open).abs();
    let range = candle.high - candle.low;
    let lower_shadow = candle.open.min(candle.close) - candle.low;
    let upper_shadow = candle.high - candle.open.max(candle.close);

    range > 0.0 && lower_shadow >= body * 2.0 && upper_shadow <= body * 0.3
}

/// 吊颈线：结构与锤子相同，靠出现位置（上轨附近）区分含义
pub fn is_hanging_man(candle: &KlineData) -> bool {
    is_hammer(candle)
}

/// 顶部针形：上影线至少是实体的2倍且占总波动的一半以上，下影线很小
pub fn is_top_pin(candle: &KlineData) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = (candle.close - candle.open).abs();
    let range = candle.high - candle.low;
    let lower_shadow = candle.open.min(candle.close) - candle.low;
    let upper_shadow = candle.high - candle.open.max(candle.close);

    range > 0.0
        && upper_shadow >= body * 2.0
        && lower_shadow <= body * 0.3
        && upper_shadow >= range * 0.5
}

/// 较长的顶部针形：上影线至少是实体的3倍且占总波动的60%以上
pub fn is_long_top_pin(candle: &KlineData) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = (candle.close - candle.open).abs();
    let range = candle.high - candle.low;
    let lower_shadow = candle.open.min(candle.close) - candle.low;
    let upper_shadow = candle.high - candle.open.max(candle.close);

    range > 0.0
        && upper_shadow >= body * 3.0
        && lower_shadow <= body * 0.2
        && upper_shadow >= range * 0.6
}

/// 吞没形态。返回 (是否吞没, 是否看涨)。
/// 当前实体必须严格大于前一根，且两根颜色相反、当前实体完全包住前一根。
pub fn is_engulfing(prev: &KlineData, curr: &KlineData) -> (bool, bool) {
    if prev.high == prev.low || curr.high == curr.low {
        return (false, false);
    }

    let prev_body = (prev.close - prev.open).abs();
    let curr_body = (curr.close - curr.open).abs();

    if curr_body <= prev_body {
        return (false, false);
    }

    let is_bullish = prev.close < prev.open
        && curr.close > curr.open
        && curr.open < prev.close
        && curr.close > prev.open;

    let is_bearish = prev.close > prev.open
        && curr.close < curr.open
        && curr.open > prev.close
        && curr.close < prev.open;

    if is_bullish {
        (true, true)
    } else if is_bearish {
        (true, false)
    } else {
        (false, false)
    }
}

/// 最近count根K线是否都是锤子
pub fn is_consecutive_hammers(data: &[KlineData], index: usize, count: usize) -> bool {
    if index + 1 < count {
        return false;
    }

    (index + 1 - count..=index).all(|i| i < data.len() && is_hammer(&data[i]))
}

// ==================== 轨道位置判定 ====================

/// K线最低价贴近下轨：0 <= low - lower <= 轨高 * 容差
fn at_lower_band(candle: &KlineData, band: &BollingerBand) -> bool {
    let band_height = band.upper - band.lower;
    let price_diff = candle.low - band.lower;
    price_diff >= 0.0 && price_diff <= band_height * BAND_TOLERANCE_RATIO
}

/// K线最高价贴近上轨：0 <= upper - high <= 轨高 * 容差
fn at_upper_band(candle: &KlineData, band: &BollingerBand) -> bool {
    let band_height = band.upper - band.lower;
    let price_diff = band.upper - candle.high;
    price_diff >= 0.0 && price_diff <= band_height * BAND_TOLERANCE_RATIO
}

fn band_defined(band: &BollingerBand) -> bool {
    band.lower != 0.0 && band.upper != 0.0
}

// ==================== 信号检测 ====================

/// 检测所有预警信号
pub fn detect_all_signals(data: &[KlineData]) -> Vec<AlertSignal> {
    if data.is_empty() {
        return Vec::new();
    }

    let bands = compute_bollinger_bands(data, BB_PERIOD, BB_MULTIPLIER);

    let mut signals = Vec::new();
    signals.extend(detect_bollinger_doji_bottom(data, &bands));
    signals.extend(detect_bollinger_hammer(data, &bands));
    signals.extend(detect_bollinger_consecutive_hammers(data, &bands));
    signals.extend(detect_bollinger_hanging_man(data, &bands));
    signals.extend(detect_bollinger_engulfing(data, &bands));
    signals.extend(detect_strong_pattern_group(data, &bands));
    signals
}

/// 布林带下轨 + 十字星
fn detect_bollinger_doji_bottom(data: &[KlineData], bands: &[BollingerBand]) -> Vec<AlertSignal> {
    let mut signals = Vec::new();

    for i in 0..data.len() {
        if i < BB_PERIOD - 1 || !band_defined(&bands[i]) {
            continue;
        }

        let candle = &data[i];
        if !is_doji(candle, DOJI_THRESHOLD) {
            continue;
        }

        if at_lower_band(candle, &bands[i]) {
            signals.push(AlertSignal {
                index: i,
                time: candle.time,
                price: candle.low,
                close: candle.close,
                lower_band: Some(bands[i].lower),
                upper_band: None,
                signal_type: "bollinger_doji_bottom".to_string(),
                strength: 0.8,
            });
        }
    }

    signals
}

/// 布林带下轨 + 锤子
fn detect_bollinger_hammer(data: &[KlineData], bands: &[BollingerBand]) -> Vec<AlertSignal> {
    let mut signals = Vec::new();

    for i in 0..data.len() {
        if i < BB_PERIOD - 1 || !band_defined(&bands[i]) {
            continue;
        }

        let candle = &data[i];
        if !is_hammer(candle) {
            continue;
        }

        if at_lower_band(candle, &bands[i]) {
            signals.push(AlertSignal {
                index: i,
                time: candle.time,
                price: candle.low,
                close: candle.close,
                lower_band: Some(bands[i].lower),
                upper_band: None,
                signal_type: "bollinger_hammer_bottom".to_string(),
                strength: 0.85,
            });
        }
    }

    signals
}

/// 布林带下轨 + 连续锤子（2根）
fn detect_bollinger_consecutive_hammers(
    data: &[KlineData],
    bands: &[BollingerBand],
) -> Vec<AlertSignal> {
    let mut signals = Vec::new();
    let consecutive_count = 2;

    for i in 0..data.len() {
        if i < BB_PERIOD - 1 || !band_defined(&bands[i]) {
            continue;
        }

        if !is_consecutive_hammers(data, i, consecutive_count) {
            continue;
        }

        let candle = &data[i];
        if at_lower_band(candle, &bands[i]) {
            signals.push(AlertSignal {
                index: i,
                time: candle.time,
                price: candle.low,
                close: candle.close,
                lower_band: Some(bands[i].lower),
                upper_band: None,
                signal_type: "bollinger_consecutive_hammers".to_string(),
                strength: 0.9,
            });
        }
    }

    signals
}

/// 布林带上轨 + 吊颈
fn detect_bollinger_hanging_man(data: &[KlineData], bands: &[BollingerBand]) -> Vec<AlertSignal> {
    let mut signals = Vec::new();

    for i in 0..data.len() {
        if i < BB_PERIOD - 1 || !band_defined(&bands[i]) {
            continue;
        }

        let candle = &data[i];
        if !is_hanging_man(candle) {
            continue;
        }

        if at_upper_band(candle, &bands[i]) {
            signals.push(AlertSignal {
                index: i,
                time: candle.time,
                price: candle.high,
                close: candle.close,
                lower_band: None,
                upper_band: Some(bands[i].upper),
                signal_type: "bollinger_hanging_man_top".to_string(),
                strength: 0.75,
            });
        }
    }

    signals
}

/// 布林带附近的吞没形态。
/// 看涨吞没看下轨（当前或前一根贴近均可），看跌吞没看上轨。
fn detect_bollinger_engulfing(data: &[KlineData], bands: &[BollingerBand]) -> Vec<AlertSignal> {
    let mut signals = Vec::new();

    for i in 1..data.len() {
        if i < BB_PERIOD - 1 || !band_defined(&bands[i]) {
            continue;
        }

        let prev = &data[i - 1];
        let curr = &data[i];

        let (engulfing, bullish) = is_engulfing(prev, curr);
        if !engulfing {
            continue;
        }

        if bullish {
            if at_lower_band(curr, &bands[i]) || at_lower_band(prev, &bands[i]) {
                signals.push(AlertSignal {
                    index: i,
                    time: curr.time,
                    price: curr.low,
                    close: curr.close,
                    lower_band: Some(bands[i].lower),
                    upper_band: None,
                    signal_type: "bollinger_bullish_engulfing".to_string(),
                    strength: 0.88,
                });
            }
        } else if at_upper_band(curr, &bands[i]) || at_upper_band(prev, &bands[i]) {
            signals.push(AlertSignal {
                index: i,
                time: curr.time,
                price: curr.high,
                close: curr.close,
                lower_band: None,
                upper_band: Some(bands[i].upper),
                signal_type: "bollinger_bearish_engulfing".to_string(),
                strength: 0.88,
            });
        }
    }

    signals
}

/// 组合强信号：3-5根K线的滑动窗口里出现≥2个锤子或较长顶部针形。
/// 优先取最小窗口，同一终点只出一个信号。
fn detect_strong_pattern_group(data: &[KlineData], bands: &[BollingerBand]) -> Vec<AlertSignal> {
    let mut signals = Vec::new();
    const MIN_WINDOW: usize = 3;
    const MAX_WINDOW: usize = 5;
    const MIN_PATTERN_COUNT: usize = 2;

    if data.len() < MAX_WINDOW {
        return signals;
    }

    for i in (MAX_WINDOW - 1)..data.len() {
        if i < BB_PERIOD - 1 || !band_defined(&bands[i]) {
            continue;
        }

        for window_size in MIN_WINDOW..=MAX_WINDOW {
            if i + 1 < window_size {
                continue;
            }

            let mut hammer_count = 0usize;
            let mut long_top_pin_count = 0usize;

            for j in i + 1 - window_size..=i {
                let candle = &data[j];
                if is_hammer(candle) {
                    hammer_count += 1;
                } else if is_long_top_pin(candle) {
                    long_top_pin_count += 1;
                }
            }

            let total = hammer_count + long_top_pin_count;
            if total < MIN_PATTERN_COUNT {
                continue;
            }

            let last_candle = &data[i];
            let (signal_type, strength, price) = if hammer_count >= 2 {
                // 多个锤子线：看涨
                let s = (0.92 + (hammer_count - 2) as f64 * 0.02).min(0.98);
                ("strong_hammer_group", s, last_candle.low)
            } else if long_top_pin_count >= 2 {
                // 多个顶部针形：看跌
                let s = (0.90 + (long_top_pin_count - 2) as f64 * 0.02).min(0.96);
                ("strong_top_pin_group", s, last_candle.high)
            } else {
                // 混合形态
                let s = (0.88 + (total - 2) as f64 * 0.02).min(0.94);
                let p = if hammer_count > long_top_pin_count {
                    last_candle.low
                } else {
                    last_candle.high
                };
                ("strong_mixed_pattern_group", s, p)
            };

            signals.push(AlertSignal {
                index: i,
                time: last_candle.time,
                price,
                close: last_candle.close,
                lower_band: Some(bands[i].lower),
                upper_band: Some(bands[i].upper),
                signal_type: signal_type.to_string(),
                strength,
            });

            // 找到一个窗口后不再扩大，避免同一终点重复出信号
            break;
        }
    }

    signals
}
