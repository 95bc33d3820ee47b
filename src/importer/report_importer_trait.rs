// ==========================================
// RTB 绩效报表导入系统 - 报表导入 Trait
// ==========================================
// 职责: 定义报表导入接口(不包含实现)
// ==========================================

use crate::domain::report::{ImportSummary, ValidationReport};
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use std::path::Path;

// ==========================================
// ReportImporter Trait
// ==========================================
// 用途: 报表导入主接口
// 实现者: ReportImporterImpl
#[async_trait]
pub trait ReportImporter: Send + Sync {
    /// 校验报表文件(文件级门禁,不触碰任何数据行)
    ///
    /// # 参数
    /// - file_path: 报表文件路径(.csv)
    ///
    /// # 返回
    /// - Ok(ValidationReport): 校验结论(is_valid=false 时附修复指引)
    /// - Err: 文件不存在/不可读/表头不可解析
    async fn validate<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> ImportResult<ValidationReport>;

    /// 导入报表文件
    ///
    /// # 参数
    /// - file_path: 报表文件路径(.csv)
    ///
    /// # 返回
    /// - Ok(ImportSummary): 导入结果(含跳过示例与异常计数)
    /// - Err(ValidationRejected): 必填列缺失,未写入任何行
    /// - Err: 其他文件级致命错误
    ///
    /// # 导入流程
    /// 1. 文件级校验(拒绝则无台账记录)
    /// 2. 逐行流式: 规范化 → 异常检测 → 批量缓冲
    /// 3. 定长批次 upsert(按 row_key 幂等)
    /// 4. 台账记录 + 按日上传汇总(通过校验后必写,无论成败)
    async fn import_file<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> ImportResult<ImportSummary>;

    /// 批量导入多个文件(并发执行)
    ///
    /// # 说明
    /// - 每个文件的导入彼此独立,单文件失败不影响其余文件
    /// - 并发安全性由按 row_key 的幂等写入保证,无需跨导入锁
    async fn batch_import<P: AsRef<Path> + Send + Sync>(
        &self,
        file_paths: Vec<P>,
    ) -> ImportResult<Vec<Result<ImportSummary, String>>>;
}
