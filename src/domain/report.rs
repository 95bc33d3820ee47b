// ==========================================
// RTB 绩效报表导入系统 - 报表领域模型
// ==========================================
// 职责: 定义导入管道各阶段的数据实体
// 红线: 必填字段在到达写入层的行中恒为非空;
//       缺失的可选数值保持 None,绝不折算为 0
// ==========================================

use crate::domain::types::ImportStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// PerfRecord - 规范化绩效行
// ==========================================
// 用途: 行规范化产物,导入管道内唯一写入实体
// 对齐: rtb_daily 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfRecord {
    // ===== 必填维度 =====
    pub metric_date: NaiveDate, // 统计日期(已归一为 ISO 格式)
    pub creative_id: String,    // 创意标识
    pub billing_id: String,     // 计费标识
    pub creative_size: String,  // 创意尺寸(如 "300x250")

    // ===== 必填指标 =====
    pub reached_queries: i64, // 触达查询数
    pub impressions: i64,     // 展示数

    // ===== 可选维度 =====
    pub creative_format: Option<String>, // 创意格式(VIDEO/HTML 等)
    pub country: Option<String>,
    pub platform: Option<String>,
    pub environment: Option<String>,
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    pub publisher_id: Option<String>,
    pub publisher_name: Option<String>,
    pub publisher_domain: Option<String>,
    pub deal_id: Option<String>, // 源端以 "0" 表示无交易,归一为 None
    pub deal_name: Option<String>, // 源端以 "(none)" 表示无名称,归一为 None
    pub transaction_type: Option<String>,
    pub advertiser: Option<String>,
    pub buyer_account_id: Option<String>,
    pub buyer_account_name: Option<String>,

    // ===== 可选指标(缺失 = None,与 0 严格区分) =====
    pub clicks: Option<i64>,
    pub spend_micros: Option<i64>, // 花费,整数微元(美元 × 1_000_000)
    pub video_starts: Option<i64>,
    pub video_first_quartile: Option<i64>,
    pub video_midpoint: Option<i64>,
    pub video_third_quartile: Option<i64>,
    pub video_completions: Option<i64>,
    pub vast_errors: Option<i64>,
    pub engaged_views: Option<i64>,
    pub active_view_measurable: Option<i64>,
    pub active_view_viewable: Option<i64>,

    // ===== SDK 标志(布尔,缺失 = false) =====
    pub gma_sdk: bool,
    pub buyer_sdk: bool,

    // ===== 元信息 =====
    pub row_key: String,   // 维度指纹(upsert 键,见 row_normalizer)
    pub row_number: usize, // 原始文件行号(表头为第 1 行)
}

// ==========================================
// RowSkip - 行级跳过记录
// ==========================================
// 用途: 行级非致命失败(必填字段缺失/不可解析),不影响文件级状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSkip {
    pub row_number: usize, // 原始文件行号
    pub reason: String,    // 跳过原因(简短,供示例展示)
}

// ==========================================
// ValidationReport - 文件级校验结果
// ==========================================
// 用途: 导入前的整文件门禁结论,先于任何写入返回
// 注: 字段名引用静态别名表,故仅支持序列化输出
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub columns_found: Vec<String>, // 文件表头原文
    pub columns_mapped: HashMap<&'static str, String>, // 规范字段名 → 命中的字面表头
    pub required_missing: Vec<&'static str>, // 未命中的必填规范字段
    pub optional_missing: Vec<&'static str>, // 未命中的可选规范字段(仅提示)
    pub remediation: Option<String>, // 逐字段修复指引(仅 is_valid=false 时)
    pub row_count_estimate: usize,  // 数据行数估计
}

// ==========================================
// AnomalySignal - 行级异常标记
// ==========================================
// 用途: 欺诈/质量启发式命中记录,仅供人工复核
// 红线: 异常不是错误,绝不阻断所在行的写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub signal_id: String,       // 记录 ID(UUID)
    pub batch_id: String,        // 关联批次 ID
    pub signal_type: String,     // 启发式名称(如 clicks_exceed_impressions)
    pub creative_id: String,     // 命中行的创意标识
    pub app_id: Option<String>,  // 命中行的应用标识(如有)
    pub evidence: serde_json::Value, // 命中证据(涉事数值)
    pub detected_at: DateTime<Utc>,
}

// ==========================================
// ImportBatch - 导入批次台账
// ==========================================
// 用途: 每次通过文件级校验的调用恰好产生一条,独立于行表
// 对齐: import_history 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,  // 短随机批次 ID(UUID 前 8 位)
    pub file_name: String, // 源文件名

    // ===== 行计数 =====
    pub rows_read: i64,
    pub rows_imported: i64,
    pub rows_skipped: i64,
    pub rows_duplicate: i64, // 已存在 row_key 的覆盖更新计数

    // ===== 数据概要 =====
    pub date_range_start: Option<NaiveDate>, // 接受行的最小统计日期
    pub date_range_end: Option<NaiveDate>,   // 接受行的最大统计日期
    pub columns_imported: Vec<String>, // 全文件范围内实际出现过取值的规范字段
    pub columns_missing: Vec<String>,  // 全文件范围内完全缺失的可选字段

    // ===== 汇总指标 =====
    pub total_reached_queries: i64,
    pub total_impressions: i64,
    pub total_spend_micros: i64,

    // ===== 结果状态 =====
    pub status: ImportStatus,
    pub error_message: Option<String>, // 中途致命失败时的错误信息

    // ===== 元信息 =====
    pub file_size_bytes: i64,
    pub imported_at: DateTime<Utc>,
}

// ==========================================
// ImportSummary - 导入接口返回值
// ==========================================
// 用途: 调用方可见的导入结果(含跳过示例与异常计数)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub batch_id: String,
    pub rows_read: usize,
    pub rows_imported: usize,
    pub rows_skipped: usize,
    pub rows_duplicate: usize,
    pub date_range_start: Option<NaiveDate>,
    pub date_range_end: Option<NaiveDate>,
    pub unique_creative_count: usize,
    pub unique_billing_ids: Vec<String>,
    pub total_reached_queries: i64,
    pub total_impressions: i64,
    pub total_spend_micros: i64,
    pub columns_imported: Vec<String>,
    pub skip_examples: Vec<RowSkip>, // 跳过原因示例(上限由配置控制,默认 20)
    pub anomaly_count: usize,
    pub status: ImportStatus,
    pub error_message: Option<String>, // 中途致命失败时的错误信息
    pub elapsed_ms: i64,
}

// ==========================================
// BatchWriteOutcome - 单批写入结果
// ==========================================
// 用途: 仓储层一次批量 upsert 的计数反馈
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchWriteOutcome {
    pub inserted: usize, // 新 row_key 插入数
    pub updated: usize,  // 已有 row_key 指标覆盖数
    pub failed: usize,   // 单行写入失败数(已捕获,不中断批次)
}

// ==========================================
// DataSummary - 行表全量概要
// ==========================================
// 用途: 只读巡检(已导入数据的整体状况)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSummary {
    pub total_rows: i64,
    pub unique_dates: i64,
    pub unique_creatives: i64,
    pub unique_billing_ids: i64,
    pub unique_sizes: i64,
    pub unique_countries: i64,
    pub date_range_start: Option<NaiveDate>,
    pub date_range_end: Option<NaiveDate>,
    pub total_reached_queries: i64,
    pub total_impressions: i64,
    pub total_clicks: i64,
    pub total_spend_micros: i64,
}

// ==========================================
// DailyUploadSummary - 按日上传汇总
// ==========================================
// 用途: 按自然日聚合的上传统计,含行数量级突变标记
// 对齐: daily_upload_summary 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUploadSummary {
    pub upload_date: NaiveDate,
    pub total_uploads: i64,
    pub successful_uploads: i64,
    pub failed_uploads: i64,
    pub total_rows_written: i64,
    pub total_file_size_bytes: i64,
    pub avg_rows_per_upload: f64,
    pub min_rows: i64,
    pub max_rows: i64,
    pub has_anomaly: bool,           // 相对近 7 日均值的行数突变标记
    pub anomaly_reason: Option<String>,
}
