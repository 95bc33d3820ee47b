// ==========================================
// RTB 绩效报表导入系统 - 导入层
// ==========================================
// 职责: 外部报表导入,生成内部绩效数据
// 流程: 校验 → 解析 → 规范化 → 异常检测 → 批量写入 → 台账
// ==========================================

// 模块声明
pub mod anomaly_detector;
pub mod batch_writer;
pub mod error;
pub mod field_mapper;
pub mod file_validator;
pub mod report_importer_impl;
pub mod report_importer_trait;
pub mod row_normalizer;
pub mod value_parser;

// 重导出核心类型
pub use anomaly_detector::{AnomalyCheck, AnomalyDetector, AnomalyThresholds};
pub use batch_writer::BatchWriter;
pub use error::{ImportError, ImportResult};
pub use field_mapper::{ColumnMap, FieldAlias, OPTIONAL_FIELDS, REQUIRED_FIELDS};
pub use file_validator::FileValidator;
pub use report_importer_impl::ReportImporterImpl;
pub use row_normalizer::{compute_row_key, RowNormalizer, ROW_KEY_DIMENSIONS};

// 重导出 Trait 接口
pub use report_importer_trait::ReportImporter;
