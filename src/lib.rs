// ==========================================
// RTB 绩效报表导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 第三方报表控制台导出 → 本地分析库的导入管道
// 设计要点: 文件级严格校验、行级宽容跳过、按维度指纹幂等写入
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部报表数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施(连接初始化/PRAGMA 统一/schema 引导)
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ImportPhase, ImportStatus};

// 领域实体
pub use domain::{
    AnomalySignal, BatchWriteOutcome, DailyUploadSummary, DataSummary, ImportBatch,
    ImportSummary, PerfRecord, RowSkip, ValidationReport,
};

// 导入管道
pub use importer::{
    AnomalyDetector, AnomalyThresholds, BatchWriter, FileValidator, ImportError, ImportResult,
    ReportImporter, ReportImporterImpl, RowNormalizer,
};

// 仓储
pub use repository::{PerfImportRepository, PerfImportRepositoryImpl};

// 配置
pub use config::{ConfigManager, ImportConfigReader};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "RTB 绩效报表导入系统";
