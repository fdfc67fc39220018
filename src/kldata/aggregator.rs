//! 1分钟K线聚合为任意周期
//!
//! 纯函数，无IO。分桶规则：open_time 落在 ⌊t / (周期毫秒)⌋ 的桶里，
//! 所有边界都是UTC时钟对齐。

use crate::klcommon::models::{AggKline, Kline1m};

/// 将周期字符串转换为分钟数
///
/// 月线按30天=43200分钟简化处理（实际月份天数不同，保持与既有数据口径一致）。
pub fn parse_interval_to_minutes(interval: &str) -> i64 {
    match interval {
        "1m" => 1,
        "5m" => 5,
        "15m" => 15,
        "30m" => 30,
        "1h" => 60,
        "2h" => 120,
        "3h" => 180,
        "4h" => 240,
        "1d" => 1440,
        "1w" => 10080,
        "1M" => 43200,
        _ => 1,
    }
}

/// 生成 target_count 根目标周期K线需要的1分钟K线数量
pub fn needed_1m_count(target_count: usize, target_interval_min: i64) -> usize {
    target_count * target_interval_min as usize
}

/// 将1分钟K线聚合为指定周期
///
/// 输入须按 open_time 升序。桶内：open取第一根，close取最后一根，
/// high/low 取极值，volume 累加，close_time = open_time + 周期 - 1。
/// 周期为1时逐根直通。
pub fn aggregate_klines(klines_1m: &[Kline1m], target_interval_min: i64) -> Vec<AggKline> {
    if klines_1m.is_empty() {
        return Vec::new();
    }

    if target_interval_min == 1 {
        return klines_1m
            .iter()
            .map(|k| AggKline {
                open_time: k.open_time,
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                volume: k.volume,
                close_time: k.close_time,
            })
            .collect();
    }

    let interval_ms = target_interval_min * 60 * 1000;
    let mut result = Vec::new();
    let mut group: Vec<&Kline1m> = Vec::new();
    let mut group_bucket = klines_1m[0].open_time / interval_ms;

    for k in klines_1m {
        let bucket = k.open_time / interval_ms;
        if bucket != group_bucket {
            if !group.is_empty() {
                result.push(merge_group(&group, interval_ms));
                group.clear();
            }
            group_bucket = bucket;
        }
        group.push(k);
    }

    if !group.is_empty() {
        result.push(merge_group(&group, interval_ms));
    }

    result
}

/// 合并一组同桶K线（如5根1m -> 1根5m）
fn merge_group(group: &[&Kline1m], interval_ms: i64) -> AggKline {
    let first = group[0];
    let last = group[group.len() - 1];

    let mut high = first.high;
    let mut low = first.low;
    let mut volume = 0.0;

    for k in group {
        if k.high > high {
            high = k.high;
        }
        if k.low < low {
            low = k.low;
        }
        volume += k.volume;
    }

    AggKline {
        open_time: first.open_time,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
        close_time: first.open_time + interval_ms - 1,
    }
}
