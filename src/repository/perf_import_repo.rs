// ==========================================
// RTB 绩效报表导入系统 - 导入仓储 Trait
// ==========================================
// 职责: 定义导入相关数据访问接口(不包含实现)
// 红线: Repository 不含业务规则,只做数据 CRUD
// ==========================================

use crate::domain::report::{
    AnomalySignal, BatchWriteOutcome, DailyUploadSummary, DataSummary, ImportBatch, PerfRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::error::Error;

// ==========================================
// PerfImportRepository Trait
// ==========================================
// 用途: 绩效行/批次台账/异常标记的数据访问
// 实现者: PerfImportRepositoryImpl(使用 rusqlite)
#[async_trait]
pub trait PerfImportRepository: Send + Sync {
    // ===== 行写入(幂等 upsert)=====

    /// 批量 upsert 绩效行(事务化,按 row_key 幂等)
    ///
    /// # 语义
    /// - row_key 不存在 → 插入
    /// - row_key 已存在 → 覆盖指标字段并刷新 updated_at(指标替换,不累加)
    /// - 单行写入失败只计入 failed,不中断批内其余行
    ///
    /// # 返回
    /// - Ok(BatchWriteOutcome): 插入/覆盖/失败三类计数
    async fn upsert_batch(
        &self,
        rows: &[PerfRecord],
        batch_id: &str,
    ) -> Result<BatchWriteOutcome, Box<dyn Error>>;

    // ===== 批次台账 =====

    /// 插入导入批次台账记录(每次通过文件级校验的调用恰好一条)
    async fn insert_import_batch(&self, batch: ImportBatch) -> Result<(), Box<dyn Error>>;

    /// 查询最近的导入批次
    async fn get_recent_batches(&self, limit: usize)
        -> Result<Vec<ImportBatch>, Box<dyn Error>>;

    /// 按批次 ID 查询台账记录
    async fn get_batch_by_id(
        &self,
        batch_id: &str,
    ) -> Result<Option<ImportBatch>, Box<dyn Error>>;

    /// 删除超过保留期的台账记录
    ///
    /// # 参数
    /// - retention_days: 保留天数(超期批次清理)
    ///
    /// # 返回
    /// - Ok(usize): 删除的记录数
    async fn delete_batches_older_than(
        &self,
        retention_days: i64,
    ) -> Result<usize, Box<dyn Error>>;

    // ===== 异常标记 =====

    /// 批量插入异常标记
    async fn insert_anomalies(
        &self,
        signals: Vec<AnomalySignal>,
    ) -> Result<usize, Box<dyn Error>>;

    /// 查询指定批次的异常标记
    async fn get_anomalies_by_batch(
        &self,
        batch_id: &str,
    ) -> Result<Vec<AnomalySignal>, Box<dyn Error>>;

    /// 查询指定创意的异常标记
    async fn get_anomalies_by_creative(
        &self,
        creative_id: &str,
    ) -> Result<Vec<AnomalySignal>, Box<dyn Error>>;

    // ===== 巡检与汇总 =====

    /// 行表全量概要(总行数/维度基数/日期范围/指标合计)
    async fn get_data_summary(&self) -> Result<DataSummary, Box<dyn Error>>;

    /// 更新按日上传汇总(含相对近 7 日均值的行数突变检查)
    async fn update_daily_upload_summary(
        &self,
        upload_date: NaiveDate,
        batch: &ImportBatch,
    ) -> Result<(), Box<dyn Error>>;

    /// 查询指定日期的上传汇总
    async fn get_daily_upload_summary(
        &self,
        upload_date: NaiveDate,
    ) -> Result<Option<DailyUploadSummary>, Box<dyn Error>>;

    /// 统计 rtb_daily 表记录数
    async fn count_rows(&self) -> Result<i64, Box<dyn Error>>;
}
