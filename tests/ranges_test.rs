#[cfg(test)]
mod tests {
    use kline_warn::klcommon::db::{compute_missing_ranges, merge_time_ranges};
    use kline_warn::klcommon::SyncTimeRange;

    fn range(start: i64, end: i64) -> SyncTimeRange {
        SyncTimeRange {
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn test_missing_ranges_empty_ledger() {
        // 没有任何已同步记录时，整个目标窗口都是缺口
        let missing = compute_missing_ranges(&[], 1000, 2000);
        assert_eq!(missing, vec![range(1000, 2000)]);
    }

    #[test]
    fn test_missing_ranges_interior_coverage() {
        // 中间有一段覆盖，缺口应该是两头
        let ledger = vec![range(1200, 1500)];
        let missing = compute_missing_ranges(&ledger, 1000, 2000);
        assert_eq!(missing, vec![range(1000, 1199), range(1501, 2000)]);
    }

    #[test]
    fn test_missing_ranges_fully_covered() {
        let ledger = vec![range(500, 2500)];
        let missing = compute_missing_ranges(&ledger, 1000, 2000);
        assert!(missing.is_empty(), "完全覆盖时不应有缺口: {:?}", missing);
    }

    #[test]
    fn test_missing_ranges_ledger_beyond_target() {
        // 台账记录完全在目标窗口之后，缺口截断到目标结束
        let ledger = vec![range(2500, 3000)];
        let missing = compute_missing_ranges(&ledger, 1000, 2000);
        assert_eq!(missing, vec![range(1000, 2000)]);
    }

    #[test]
    fn test_missing_ranges_multiple_gaps() {
        let ledger = vec![range(1100, 1200), range(1400, 1500), range(1800, 1900)];
        let missing = compute_missing_ranges(&ledger, 1000, 2000);
        assert_eq!(
            missing,
            vec![
                range(1000, 1099),
                range(1201, 1399),
                range(1501, 1799),
                range(1901, 2000)
            ]
        );
    }

    #[test]
    fn test_merge_adjacent_ranges() {
        // 相邻（end+1 == next.start）与不相邻的组合
        let input = vec![range(100, 200), range(201, 300), range(400, 500)];
        let merged = merge_time_ranges(&input);
        assert_eq!(merged, vec![range(100, 300), range(400, 500)]);
    }

    #[test]
    fn test_merge_overlapping_ranges() {
        let input = vec![range(100, 250), range(200, 300)];
        let merged = merge_time_ranges(&input);
        assert_eq!(merged, vec![range(100, 300)]);
    }

    #[test]
    fn test_merge_contained_range() {
        // 被完全包含的段不应扩大结果
        let input = vec![range(100, 500), range(200, 300)];
        let merged = merge_time_ranges(&input);
        assert_eq!(merged, vec![range(100, 500)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = vec![range(100, 200), range(150, 300), range(301, 400), range(600, 700)];
        let once = merge_time_ranges(&input);
        let twice = merge_time_ranges(&once);
        assert_eq!(once, twice, "合并应该是幂等的");
    }

    #[test]
    fn test_merge_preserves_coverage() {
        // 合并前后，同一目标窗口算出的缺口必须一致
        let raw = vec![range(100, 250), range(200, 300), range(301, 320), range(500, 600)];
        let merged = merge_time_ranges(&raw);

        let missing_raw = compute_missing_ranges(&raw, 0, 1000);
        let missing_merged = compute_missing_ranges(&merged, 0, 1000);
        assert_eq!(missing_raw, missing_merged);
    }

    #[test]
    fn test_missing_is_complement_of_union() {
        // 缺口与已覆盖区间在目标窗口内应该不重叠且拼起来正好是整个窗口
        let ledger = vec![range(120, 180), range(181, 260), range(400, 450)];
        let target_start = 100;
        let target_end = 500;
        let missing = compute_missing_ranges(&ledger, target_start, target_end);

        let merged = merge_time_ranges(&ledger);
        let covered_len: i64 = merged
            .iter()
            .map(|r| {
                let s = r.start_time.max(target_start);
                let e = r.end_time.min(target_end);
                (e - s + 1).max(0)
            })
            .sum();
        let missing_len: i64 = missing.iter().map(|r| r.end_time - r.start_time + 1).sum();

        assert_eq!(covered_len + missing_len, target_end - target_start + 1);
    }
}
