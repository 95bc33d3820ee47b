// ==========================================
// RTB 绩效报表导入系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 文件级错误在此枚举;行级问题用 RowSkip 计数,不走错误通道
// ==========================================

use thiserror::Error;

/// 导入模块错误类型(均为文件级/致命)
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("表头为空或不可解析: {0}")]
    HeaderUnreadable(String),

    // ===== 文件级校验拒绝 =====
    #[error("必填列缺失: {}", .missing.join(", "))]
    ValidationRejected {
        missing: Vec<String>,
        remediation: String,
    },

    // ===== 数据库错误 =====
    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ===== 流程错误 =====
    #[error("导入已取消 (批次 {0})")]
    Cancelled(String),

    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::DatabaseQueryError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
