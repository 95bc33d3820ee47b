// ==========================================
// RTB 绩效报表导入系统 - 异常检测器
// ==========================================
// 职责: 对已规范化的行逐条执行欺诈/质量启发式
// 结构: (名称, 判定函数) 注册表 —— 新增启发式不触碰导入控制流
// 红线: 检测结果只作标记,绝不改变行是否写入、如何写入
// ==========================================

use crate::domain::report::{AnomalySignal, PerfRecord};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

// ==========================================
// AnomalyThresholds - 启发式阈值配置
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct AnomalyThresholds {
    /// 点击/展示比阈值(超过即标记 extremely_high_ctr)
    pub ctr_threshold: f64,
    /// CTR 启发式的最小展示量门槛(小样本免检,避免误报)
    pub ctr_min_impressions: i64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            ctr_threshold: 0.5,
            ctr_min_impressions: 100,
        }
    }
}

/// 单条启发式: 命中则返回证据载荷,未命中返回 None
type AnomalyCheckFn = fn(&PerfRecord, &AnomalyThresholds) -> Option<serde_json::Value>;

pub struct AnomalyCheck {
    pub name: &'static str,
    pub check: AnomalyCheckFn,
}

// ==========================================
// 内置启发式
// ==========================================

/// 点击数超过展示数(可能为点击注入,也可能是跨午夜计数错位)
fn clicks_exceed_impressions(
    record: &PerfRecord,
    _thresholds: &AnomalyThresholds,
) -> Option<serde_json::Value> {
    let clicks = record.clicks?;
    if clicks > record.impressions {
        Some(json!({
            "clicks": clicks,
            "impressions": record.impressions,
        }))
    } else {
        None
    }
}

/// 点击率异常偏高(高 CTR 本身不是欺诈证据,仅供人工复核)
fn extremely_high_ctr(
    record: &PerfRecord,
    thresholds: &AnomalyThresholds,
) -> Option<serde_json::Value> {
    let clicks = record.clicks?;
    if record.impressions <= thresholds.ctr_min_impressions || record.impressions <= 0 {
        return None;
    }
    let ctr = clicks as f64 / record.impressions as f64;
    if ctr > thresholds.ctr_threshold {
        Some(json!({
            "ctr": (ctr * 10_000.0).round() / 10_000.0,
            "clicks": clicks,
            "impressions": record.impressions,
            "threshold": thresholds.ctr_threshold,
        }))
    } else {
        None
    }
}

/// 零展示却产生花费
fn zero_impressions_with_spend(
    record: &PerfRecord,
    _thresholds: &AnomalyThresholds,
) -> Option<serde_json::Value> {
    let spend_micros = record.spend_micros?;
    if record.impressions == 0 && spend_micros > 0 {
        Some(json!({ "spend_micros": spend_micros }))
    } else {
        None
    }
}

// ==========================================
// AnomalyDetector - 启发式注册表
// ==========================================
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
    checks: Vec<AnomalyCheck>,
}

impl AnomalyDetector {
    /// 创建携带内置启发式的检测器
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self {
            thresholds,
            checks: vec![
                AnomalyCheck {
                    name: "clicks_exceed_impressions",
                    check: clicks_exceed_impressions,
                },
                AnomalyCheck {
                    name: "extremely_high_ctr",
                    check: extremely_high_ctr,
                },
                AnomalyCheck {
                    name: "zero_impressions_with_spend",
                    check: zero_impressions_with_spend,
                },
            ],
        }
    }

    /// 注册额外启发式(导入控制流无需任何改动)
    pub fn with_check(mut self, check: AnomalyCheck) -> Self {
        self.checks.push(check);
        self
    }

    /// 对单条规范化行执行全部启发式,多条命中产生多条标记
    pub fn detect(&self, record: &PerfRecord, batch_id: &str) -> Vec<AnomalySignal> {
        let mut signals = Vec::new();

        for check in &self.checks {
            if let Some(evidence) = (check.check)(record, &self.thresholds) {
                signals.push(AnomalySignal {
                    signal_id: Uuid::new_v4().to_string(),
                    batch_id: batch_id.to_string(),
                    signal_type: check.name.to_string(),
                    creative_id: record.creative_id.clone(),
                    app_id: record.app_id.clone(),
                    evidence,
                    detected_at: Utc::now(),
                });
            }
        }

        signals
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_record(impressions: i64, clicks: Option<i64>, spend_micros: Option<i64>) -> PerfRecord {
        PerfRecord {
            metric_date: NaiveDate::from_ymd_opt(2025, 11, 29).unwrap(),
            creative_id: "144634".to_string(),
            billing_id: "abc123".to_string(),
            creative_size: "300x250".to_string(),
            reached_queries: 50_000,
            impressions,
            creative_format: None,
            country: None,
            platform: None,
            environment: None,
            app_id: Some("com.example.app".to_string()),
            app_name: None,
            publisher_id: None,
            publisher_name: None,
            publisher_domain: None,
            deal_id: None,
            deal_name: None,
            transaction_type: None,
            advertiser: None,
            buyer_account_id: None,
            buyer_account_name: None,
            clicks,
            spend_micros,
            video_starts: None,
            video_first_quartile: None,
            video_midpoint: None,
            video_third_quartile: None,
            video_completions: None,
            vast_errors: None,
            engaged_views: None,
            active_view_measurable: None,
            active_view_viewable: None,
            gma_sdk: false,
            buyer_sdk: false,
            row_key: "test".to_string(),
            row_number: 2,
        }
    }

    #[test]
    fn test_clicks_exceed_impressions_flagged() {
        let detector = AnomalyDetector::default();
        let signals = detector.detect(&test_record(100, Some(150), None), "b1");

        // 展示量未超过 CTR 门槛(100),仅命中 clicks_exceed_impressions
        assert_eq!(signals.len(), 1);
        let exceed = &signals[0];
        assert_eq!(exceed.signal_type, "clicks_exceed_impressions");
        assert_eq!(exceed.evidence["clicks"], 150);
        assert_eq!(exceed.evidence["impressions"], 100);
        assert_eq!(exceed.creative_id, "144634");
    }

    #[test]
    fn test_multiple_predicates_same_row() {
        let detector = AnomalyDetector::default();
        let signals = detector.detect(&test_record(200, Some(300), None), "b1");

        // clicks=300 > impressions=200,且 CTR=1.5 > 0.5 且展示量过门槛 → 两条标记
        let types: Vec<&str> = signals.iter().map(|s| s.signal_type.as_str()).collect();
        assert!(types.contains(&"clicks_exceed_impressions"));
        assert!(types.contains(&"extremely_high_ctr"));
        assert_eq!(signals.len(), 2);
    }

    #[test]
    fn test_high_ctr_gated_by_min_impressions() {
        let detector = AnomalyDetector::default();

        // 展示量低于门槛:即使比例极高也不标记 CTR
        let signals = detector.detect(&test_record(10, Some(9), None), "b1");
        assert!(signals
            .iter()
            .all(|s| s.signal_type != "extremely_high_ctr"));

        // 展示量达到门槛后才参与判定
        let signals = detector.detect(&test_record(1_000, Some(600), None), "b1");
        assert!(signals
            .iter()
            .any(|s| s.signal_type == "extremely_high_ctr"));
    }

    #[test]
    fn test_zero_impressions_with_spend() {
        let detector = AnomalyDetector::default();

        let signals = detector.detect(&test_record(0, None, Some(5_000_000)), "b1");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, "zero_impressions_with_spend");
        assert_eq!(signals[0].evidence["spend_micros"], 5_000_000);

        // 零展示零花费:不标记
        let signals = detector.detect(&test_record(0, None, Some(0)), "b1");
        assert!(signals.is_empty());

        // 花费缺失(None)与花费为零同样不标记
        let signals = detector.detect(&test_record(0, None, None), "b1");
        assert!(signals.is_empty());
    }

    #[test]
    fn test_clean_row_produces_no_signal() {
        let detector = AnomalyDetector::default();
        let signals = detector.detect(&test_record(48_000, Some(750), Some(187_500_000)), "b1");
        assert!(signals.is_empty());
    }

    #[test]
    fn test_registry_extension() {
        fn reached_below_impressions(
            record: &PerfRecord,
            _t: &AnomalyThresholds,
        ) -> Option<serde_json::Value> {
            if record.impressions > record.reached_queries {
                Some(json!({
                    "impressions": record.impressions,
                    "reached_queries": record.reached_queries,
                }))
            } else {
                None
            }
        }

        let detector = AnomalyDetector::default().with_check(AnomalyCheck {
            name: "impressions_exceed_reached",
            check: reached_below_impressions,
        });

        let mut record = test_record(60_000, None, None);
        record.reached_queries = 50_000;
        let signals = detector.detect(&record, "b1");
        assert!(signals
            .iter()
            .any(|s| s.signal_type == "impressions_exceed_reached"));
    }
}
