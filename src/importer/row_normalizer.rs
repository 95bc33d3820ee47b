// ==========================================
// RTB 绩效报表导入系统 - 行规范化器
// ==========================================
// 职责: RawRow → PerfRecord(类型化) + 维度指纹计算
// 约定: 必填字段为空或不可解析 → 行级跳过(RowSkip),
//       属非致命结果,与文件级拒绝严格区分
// ==========================================

use crate::domain::report::{PerfRecord, RowSkip};
use crate::importer::field_mapper::ColumnMap;
use crate::importer::value_parser::{parse_bool, parse_date, parse_int, parse_money_micros};
use sha2::{Digest, Sha256};

// ==========================================
// 维度指纹(RowKey)配置
// ==========================================
// 指纹只包含维度字段,绝不包含指标字段:被排除的字段在重复
// 判定中被隐式聚合 —— 仅该字段不同的两行会命中同一指纹,
// 后到者覆盖先到者的指标。
//
// 该列表是显式可审阅的口径配置:是否把某字段视为身份维度
// (而非描述性字段)的调整只改这里,勿在他处散落判断。
pub const ROW_KEY_DIMENSIONS: [&str; 12] = [
    "metric_date",
    "creative_id",
    "billing_id",
    "creative_size",
    "country",
    "platform",
    "environment",
    "app_id",
    "publisher_id",
    "deal_id",
    "advertiser",
    "buyer_account_id",
];

const ROW_KEY_SEPARATOR: &str = "|";
const ROW_KEY_PLACEHOLDER: &str = "-"; // 可选维度缺失时的占位符

/// 计算维度指纹:固定顺序拼接 + SHA-256,十六进制输出
pub fn compute_row_key(record: &PerfRecord) -> String {
    let metric_date = record.metric_date.format("%Y-%m-%d").to_string();

    let mut input = String::new();
    for (i, name) in ROW_KEY_DIMENSIONS.iter().enumerate() {
        if i > 0 {
            input.push_str(ROW_KEY_SEPARATOR);
        }
        let value: Option<&str> = match *name {
            "metric_date" => Some(metric_date.as_str()),
            "creative_id" => Some(record.creative_id.as_str()),
            "billing_id" => Some(record.billing_id.as_str()),
            "creative_size" => Some(record.creative_size.as_str()),
            "country" => record.country.as_deref(),
            "platform" => record.platform.as_deref(),
            "environment" => record.environment.as_deref(),
            "app_id" => record.app_id.as_deref(),
            "publisher_id" => record.publisher_id.as_deref(),
            "deal_id" => record.deal_id.as_deref(),
            "advertiser" => record.advertiser.as_deref(),
            "buyer_account_id" => record.buyer_account_id.as_deref(),
            _ => None,
        };
        input.push_str(value.unwrap_or(ROW_KEY_PLACEHOLDER));
    }

    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

// ==========================================
// RowNormalizer - 行规范化器
// ==========================================
pub struct RowNormalizer;

impl RowNormalizer {
    /// 将一条原始行记录规范化为 PerfRecord
    ///
    /// # 参数
    /// - record: CSV 原始行
    /// - columns: 文件级解析得到的字段映射(只读)
    /// - row_number: 原始文件行号(表头为第 1 行)
    ///
    /// # 返回
    /// - Ok(PerfRecord): 规范化成功,指纹已计算
    /// - Err(RowSkip): 必填字段为空/不可解析(行级跳过)
    pub fn normalize(
        &self,
        record: &csv::StringRecord,
        columns: &ColumnMap,
        row_number: usize,
    ) -> Result<PerfRecord, RowSkip> {
        let metric_date = {
            let raw = self.required_value(record, columns, "day", row_number)?;
            parse_date(raw).ok_or_else(|| RowSkip {
                row_number,
                reason: format!("day 不可解析: {}", raw),
            })?
        };

        let creative_id = self
            .required_value(record, columns, "creative_id", row_number)?
            .to_string();
        let billing_id = self
            .required_value(record, columns, "billing_id", row_number)?
            .to_string();
        let creative_size = self
            .required_value(record, columns, "creative_size", row_number)?
            .to_string();

        let reached_queries = self.required_int(record, columns, "reached_queries", row_number)?;
        let impressions = self.required_int(record, columns, "impressions", row_number)?;

        // 可选维度:源端哨兵值归一为 None
        let deal_id = self
            .opt_string(record, columns, "deal_id")
            .filter(|v| v != "0");
        let deal_name = self
            .opt_string(record, columns, "deal_name")
            .filter(|v| v != "(none)");

        let mut normalized = PerfRecord {
            metric_date,
            creative_id,
            billing_id,
            creative_size,
            reached_queries,
            impressions,
            creative_format: self.opt_string(record, columns, "creative_format"),
            country: self.opt_string(record, columns, "country"),
            platform: self.opt_string(record, columns, "platform"),
            environment: self.opt_string(record, columns, "environment"),
            app_id: self.opt_string(record, columns, "app_id"),
            app_name: self.opt_string(record, columns, "app_name"),
            publisher_id: self.opt_string(record, columns, "publisher_id"),
            publisher_name: self.opt_string(record, columns, "publisher_name"),
            publisher_domain: self.opt_string(record, columns, "publisher_domain"),
            deal_id,
            deal_name,
            transaction_type: self.opt_string(record, columns, "transaction_type"),
            advertiser: self.opt_string(record, columns, "advertiser"),
            buyer_account_id: self.opt_string(record, columns, "buyer_account_id"),
            buyer_account_name: self.opt_string(record, columns, "buyer_account_name"),
            clicks: self.opt_int(record, columns, "clicks"),
            spend_micros: columns
                .get(record, "spend")
                .and_then(parse_money_micros),
            video_starts: self.opt_int(record, columns, "video_starts"),
            video_first_quartile: self.opt_int(record, columns, "video_first_quartile"),
            video_midpoint: self.opt_int(record, columns, "video_midpoint"),
            video_third_quartile: self.opt_int(record, columns, "video_third_quartile"),
            video_completions: self.opt_int(record, columns, "video_completions"),
            vast_errors: self.opt_int(record, columns, "vast_errors"),
            engaged_views: self.opt_int(record, columns, "engaged_views"),
            active_view_measurable: self.opt_int(record, columns, "active_view_measurable"),
            active_view_viewable: self.opt_int(record, columns, "active_view_viewable"),
            gma_sdk: columns
                .get(record, "gma_sdk")
                .map(parse_bool)
                .unwrap_or(false),
            buyer_sdk: columns
                .get(record, "buyer_sdk")
                .map(parse_bool)
                .unwrap_or(false),
            row_key: String::new(),
            row_number,
        };

        normalized.row_key = compute_row_key(&normalized);
        Ok(normalized)
    }

    /// 取必填字符串字段(空值即跳过)
    fn required_value<'a>(
        &self,
        record: &'a csv::StringRecord,
        columns: &ColumnMap,
        canonical: &'static str,
        row_number: usize,
    ) -> Result<&'a str, RowSkip> {
        columns.get(record, canonical).ok_or_else(|| RowSkip {
            row_number,
            reason: format!("必填字段 {} 为空", canonical),
        })
    }

    /// 取必填整数字段(空值或不可解析即跳过)
    fn required_int(
        &self,
        record: &csv::StringRecord,
        columns: &ColumnMap,
        canonical: &'static str,
        row_number: usize,
    ) -> Result<i64, RowSkip> {
        let raw = self.required_value(record, columns, canonical, row_number)?;
        parse_int(raw).ok_or_else(|| RowSkip {
            row_number,
            reason: format!("{} 不可解析: {}", canonical, raw),
        })
    }

    fn opt_string(
        &self,
        record: &csv::StringRecord,
        columns: &ColumnMap,
        canonical: &str,
    ) -> Option<String> {
        columns.get(record, canonical).map(|v| v.to_string())
    }

    fn opt_int(
        &self,
        record: &csv::StringRecord,
        columns: &ColumnMap,
        canonical: &str,
    ) -> Option<i64> {
        columns.get(record, canonical).and_then(parse_int)
    }
}
