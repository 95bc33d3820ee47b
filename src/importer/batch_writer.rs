// ==========================================
// RTB 绩效报表导入系统 - 批量写入器
// ==========================================
// 职责: 定长缓冲 + 按 row_key 幂等 upsert + 运行计数
// 约定: 内存上界 = 批大小;整个文件从不一次性驻留内存
// ==========================================

use crate::domain::report::PerfRecord;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::perf_import_repo::PerfImportRepository;
use tracing::debug;

// ==========================================
// BatchWriter - 批量写入器
// ==========================================
pub struct BatchWriter<'a, R: PerfImportRepository> {
    repo: &'a R,
    batch_id: &'a str,
    batch_size: usize,
    buffer: Vec<PerfRecord>,

    // ===== 运行计数(每次 flush 后更新) =====
    rows_imported: usize,  // 新 row_key 插入
    rows_duplicate: usize, // 已有 row_key 覆盖更新
    rows_failed: usize,    // 单行写入失败(已捕获)
}

impl<'a, R: PerfImportRepository> BatchWriter<'a, R> {
    pub fn new(repo: &'a R, batch_id: &'a str, batch_size: usize) -> Self {
        Self {
            repo,
            batch_id,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            rows_imported: 0,
            rows_duplicate: 0,
            rows_failed: 0,
        }
    }

    /// 追加一行,缓冲满时自动落库
    ///
    /// # 返回
    /// - Ok(true): 本次追加触发了 flush
    /// - Ok(false): 仅入缓冲
    pub async fn push(&mut self, record: PerfRecord) -> ImportResult<bool> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 将当前缓冲落库(空缓冲为无操作)
    pub async fn flush(&mut self) -> ImportResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let outcome = self
            .repo
            .upsert_batch(&self.buffer, self.batch_id)
            .await
            .map_err(|e| ImportError::DatabaseQueryError(e.to_string()))?;

        self.rows_imported += outcome.inserted;
        self.rows_duplicate += outcome.updated;
        self.rows_failed += outcome.failed;

        debug!(
            batch_id = %self.batch_id,
            flushed = self.buffer.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            failed = outcome.failed,
            "批量写入完成"
        );

        self.buffer.clear();
        Ok(())
    }

    pub fn rows_imported(&self) -> usize {
        self.rows_imported
    }

    pub fn rows_duplicate(&self) -> usize {
        self.rows_duplicate
    }

    pub fn rows_failed(&self) -> usize {
        self.rows_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::repository::PerfImportRepositoryImpl;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn in_memory_repo() -> PerfImportRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        PerfImportRepositoryImpl::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    fn record(creative_id: &str, impressions: i64) -> PerfRecord {
        let mut r = PerfRecord {
            metric_date: NaiveDate::from_ymd_opt(2025, 11, 29).unwrap(),
            creative_id: creative_id.to_string(),
            billing_id: "abc123".to_string(),
            creative_size: "300x250".to_string(),
            reached_queries: 1000,
            impressions,
            creative_format: None,
            country: None,
            platform: None,
            environment: None,
            app_id: None,
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
            clicks: None,
            spend_micros: None,
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
            row_key: String::new(),
            row_number: 2,
        };
        r.row_key = crate::importer::row_normalizer::compute_row_key(&r);
        r
    }

    #[tokio::test]
    async fn test_push_flushes_at_batch_size() {
        let repo = in_memory_repo();
        let mut writer = BatchWriter::new(&repo, "b1", 2);

        assert!(!writer.push(record("c1", 10)).await.unwrap());
        assert!(writer.push(record("c2", 20)).await.unwrap()); // 第 2 行触发 flush
        assert_eq!(writer.rows_imported(), 2);

        writer.push(record("c3", 30)).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(writer.rows_imported(), 3);
    }

    #[tokio::test]
    async fn test_same_key_counts_as_duplicate() {
        let repo = in_memory_repo();
        let mut writer = BatchWriter::new(&repo, "b1", 10);

        writer.push(record("c1", 10)).await.unwrap();
        writer.flush().await.unwrap();

        // 同维度重发:覆盖而非新增
        writer.push(record("c1", 99)).await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(writer.rows_imported(), 1);
        assert_eq!(writer.rows_duplicate(), 1);
        assert_eq!(repo.count_rows().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_is_noop() {
        let repo = in_memory_repo();
        let mut writer = BatchWriter::new(&repo, "b1", 10);
        writer.flush().await.unwrap();
        assert_eq!(writer.rows_imported(), 0);
    }
}
