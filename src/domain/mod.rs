// ==========================================
// RTB 绩效报表导入系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含管道流程逻辑
// ==========================================

pub mod report;
pub mod types;

// 重导出核心类型
pub use report::{
    AnomalySignal, BatchWriteOutcome, DailyUploadSummary, DataSummary, ImportBatch,
    ImportSummary, PerfRecord, RowSkip, ValidationReport,
};
pub use types::{ImportPhase, ImportStatus};
