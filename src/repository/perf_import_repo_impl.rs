// ==========================================
// RTB 绩效报表导入系统 - 导入仓储实现
// ==========================================
// 职责: 实现导入相关数据访问(使用 rusqlite)
// 红线: Repository 不含业务规则,只做数据 CRUD
// 约定: 批量写入事务化;单行失败捕获计数,不中断批次
// ==========================================

use crate::domain::report::{
    AnomalySignal, BatchWriteOutcome, DailyUploadSummary, DataSummary, ImportBatch, PerfRecord,
};
use crate::domain::types::ImportStatus;
use crate::repository::perf_import_repo::PerfImportRepository;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// PerfImportRepositoryImpl
// ==========================================
pub struct PerfImportRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl PerfImportRepositoryImpl {
    /// 创建新的 Repository 实例(附带 schema 引导)
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建(幂等地再次应用统一 PRAGMA)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&guard)?;
            crate::db::init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 在事务中 upsert 单行
    ///
    /// # 返回
    /// - Ok(true): 新插入
    /// - Ok(false): 覆盖已有 row_key 的指标
    fn upsert_row_tx(
        tx: &Transaction,
        row: &PerfRecord,
        batch_id: &str,
        now: &str,
    ) -> Result<bool, rusqlite::Error> {
        let exists: bool = tx
            .prepare_cached("SELECT 1 FROM rtb_daily WHERE row_key = ?1")?
            .query_row(params![row.row_key], |_r| Ok(true))
            .optional()?
            .unwrap_or(false);

        if exists {
            // 指标替换,不累加: 同一维度切片的重发表示"这是当前权威值"
            tx.prepare_cached(
                r#"
                UPDATE rtb_daily SET
                    reached_queries = ?1,
                    impressions = ?2,
                    clicks = ?3,
                    spend_micros = ?4,
                    video_starts = ?5,
                    video_first_quartile = ?6,
                    video_midpoint = ?7,
                    video_third_quartile = ?8,
                    video_completions = ?9,
                    vast_errors = ?10,
                    engaged_views = ?11,
                    active_view_measurable = ?12,
                    active_view_viewable = ?13,
                    gma_sdk = ?14,
                    buyer_sdk = ?15,
                    import_batch_id = ?16,
                    updated_at = ?17
                WHERE row_key = ?18
                "#,
            )?
            .execute(params![
                    row.reached_queries,
                    row.impressions,
                    row.clicks,
                    row.spend_micros,
                    row.video_starts,
                    row.video_first_quartile,
                    row.video_midpoint,
                    row.video_third_quartile,
                    row.video_completions,
                    row.vast_errors,
                    row.engaged_views,
                    row.active_view_measurable,
                    row.active_view_viewable,
                    row.gma_sdk as i32,
                    row.buyer_sdk as i32,
                    batch_id,
                    now,
                    row.row_key,
                ])?;
            Ok(false)
        } else {
            tx.prepare_cached(
                r#"
                INSERT INTO rtb_daily (
                    metric_date, creative_id, billing_id, creative_size,
                    creative_format, country, platform, environment,
                    app_id, app_name, publisher_id, publisher_name, publisher_domain,
                    deal_id, deal_name, transaction_type,
                    advertiser, buyer_account_id, buyer_account_name,
                    reached_queries, impressions, clicks, spend_micros,
                    video_starts, video_first_quartile, video_midpoint,
                    video_third_quartile, video_completions, vast_errors, engaged_views,
                    active_view_measurable, active_view_viewable,
                    gma_sdk, buyer_sdk,
                    row_key, import_batch_id, created_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24,
                    ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34,
                    ?35, ?36, ?37, ?38
                )
                "#,
            )?
            .execute(params![
                    row.metric_date.to_string(),
                    row.creative_id,
                    row.billing_id,
                    row.creative_size,
                    row.creative_format,
                    row.country,
                    row.platform,
                    row.environment,
                    row.app_id,
                    row.app_name,
                    row.publisher_id,
                    row.publisher_name,
                    row.publisher_domain,
                    row.deal_id,
                    row.deal_name,
                    row.transaction_type,
                    row.advertiser,
                    row.buyer_account_id,
                    row.buyer_account_name,
                    row.reached_queries,
                    row.impressions,
                    row.clicks,
                    row.spend_micros,
                    row.video_starts,
                    row.video_first_quartile,
                    row.video_midpoint,
                    row.video_third_quartile,
                    row.video_completions,
                    row.vast_errors,
                    row.engaged_views,
                    row.active_view_measurable,
                    row.active_view_viewable,
                    row.gma_sdk as i32,
                    row.buyer_sdk as i32,
                    row.row_key,
                    batch_id,
                    now,
                    now,
                ])?;
            Ok(true)
        }
    }

    /// 从查询行映射 ImportBatch
    fn map_batch_row(row: &Row) -> rusqlite::Result<ImportBatch> {
        let split_columns = |raw: Option<String>| -> Vec<String> {
            raw.map(|joined| {
                joined
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default()
        };

        let parse_date = |raw: Option<String>| -> Option<NaiveDate> {
            raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
        };

        let imported_at_raw: String = row.get("imported_at")?;
        let status_raw: String = row.get("status")?;

        Ok(ImportBatch {
            batch_id: row.get("batch_id")?,
            file_name: row.get("file_name")?,
            rows_read: row.get("rows_read")?,
            rows_imported: row.get("rows_imported")?,
            rows_skipped: row.get("rows_skipped")?,
            rows_duplicate: row.get("rows_duplicate")?,
            date_range_start: parse_date(row.get("date_range_start")?),
            date_range_end: parse_date(row.get("date_range_end")?),
            columns_imported: split_columns(row.get("columns_imported")?),
            columns_missing: split_columns(row.get("columns_missing")?),
            total_reached_queries: row.get("total_reached_queries")?,
            total_impressions: row.get("total_impressions")?,
            total_spend_micros: row.get("total_spend_micros")?,
            status: ImportStatus::from_str(&status_raw),
            error_message: row.get("error_message")?,
            file_size_bytes: row.get("file_size_bytes")?,
            imported_at: DateTime::parse_from_rfc3339(&imported_at_raw)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// 从查询行映射 AnomalySignal
    fn map_signal_row(row: &Row) -> rusqlite::Result<AnomalySignal> {
        let evidence_raw: String = row.get("evidence")?;
        let detected_at_raw: String = row.get("detected_at")?;

        Ok(AnomalySignal {
            signal_id: row.get("signal_id")?,
            batch_id: row.get("batch_id")?,
            signal_type: row.get("signal_type")?,
            creative_id: row.get("creative_id")?,
            app_id: row.get("app_id")?,
            evidence: serde_json::from_str(&evidence_raw).unwrap_or(serde_json::Value::Null),
            detected_at: DateTime::parse_from_rfc3339(&detected_at_raw)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// 行数量级突变检查(相对此日期之前近 7 日均值,>200% 或 <50% 标记)
    fn check_upload_volume_tx(
        tx: &Transaction,
        upload_date: &str,
    ) -> Result<(), rusqlite::Error> {
        let mut stmt = tx.prepare(
            r#"
            SELECT total_rows_written FROM daily_upload_summary
            WHERE upload_date < ?1
            ORDER BY upload_date DESC
            LIMIT 7
            "#,
        )?;
        let recent: Vec<i64> = stmt
            .query_map(params![upload_date], |row| row.get::<_, i64>(0))?
            .filter_map(|r| r.ok())
            .filter(|rows| *rows > 0)
            .collect();

        // 样本不足,不做判定
        if recent.len() < 3 {
            return Ok(());
        }

        let avg = recent.iter().sum::<i64>() as f64 / recent.len() as f64;
        if avg <= 0.0 {
            return Ok(());
        }

        let current: Option<i64> = tx
            .query_row(
                "SELECT total_rows_written FROM daily_upload_summary WHERE upload_date = ?1",
                params![upload_date],
                |row| row.get(0),
            )
            .optional()?;
        let current = match current {
            Some(v) => v,
            None => return Ok(()),
        };

        let ratio = current as f64 / avg;
        let anomaly_reason = if ratio < 0.5 {
            Some(format!(
                "行数较近 7 日均值下降 {:.0}% ({} vs 均值 {:.0})",
                (1.0 - ratio) * 100.0,
                current,
                avg
            ))
        } else if ratio > 2.0 {
            Some(format!(
                "行数较近 7 日均值激增 {:.0}% ({} vs 均值 {:.0})",
                (ratio - 1.0) * 100.0,
                current,
                avg
            ))
        } else {
            None
        };

        tx.execute(
            r#"
            UPDATE daily_upload_summary
            SET has_anomaly = ?1, anomaly_reason = ?2
            WHERE upload_date = ?3
            "#,
            params![anomaly_reason.is_some() as i32, anomaly_reason, upload_date],
        )?;

        Ok(())
    }
}

#[async_trait]
impl PerfImportRepository for PerfImportRepositoryImpl {
    /// 批量 upsert 绩效行(事务化)
    async fn upsert_batch(
        &self,
        rows: &[PerfRecord],
        batch_id: &str,
    ) -> Result<BatchWriteOutcome, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        let mut outcome = BatchWriteOutcome::default();
        for row in rows {
            match Self::upsert_row_tx(&tx, row, batch_id, &now) {
                Ok(true) => outcome.inserted += 1,
                Ok(false) => outcome.updated += 1,
                Err(e) => {
                    // 单行失败不中断批次,计数后继续
                    warn!(row_number = row.row_number, error = %e, "行写入失败");
                    outcome.failed += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// 插入导入批次台账记录
    async fn insert_import_batch(&self, batch: ImportBatch) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO import_history (
                batch_id, file_name, rows_read, rows_imported, rows_skipped,
                rows_duplicate, date_range_start, date_range_end,
                columns_imported, columns_missing,
                total_reached_queries, total_impressions, total_spend_micros,
                status, error_message, file_size_bytes, imported_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                batch.batch_id,
                batch.file_name,
                batch.rows_read,
                batch.rows_imported,
                batch.rows_skipped,
                batch.rows_duplicate,
                batch.date_range_start.map(|d| d.to_string()),
                batch.date_range_end.map(|d| d.to_string()),
                batch.columns_imported.join(","),
                batch.columns_missing.join(","),
                batch.total_reached_queries,
                batch.total_impressions,
                batch.total_spend_micros,
                batch.status.as_str(),
                batch.error_message,
                batch.file_size_bytes,
                batch.imported_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// 查询最近的导入批次
    async fn get_recent_batches(
        &self,
        limit: usize,
    ) -> Result<Vec<ImportBatch>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT * FROM import_history ORDER BY imported_at DESC LIMIT ?1",
        )?;
        let batches = stmt
            .query_map(params![limit as i64], Self::map_batch_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(batches)
    }

    /// 按批次 ID 查询台账记录
    async fn get_batch_by_id(
        &self,
        batch_id: &str,
    ) -> Result<Option<ImportBatch>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let batch = conn
            .query_row(
                "SELECT * FROM import_history WHERE batch_id = ?1",
                params![batch_id],
                Self::map_batch_row,
            )
            .optional()?;

        Ok(batch)
    }

    /// 删除超过保留期的台账记录
    async fn delete_batches_older_than(
        &self,
        retention_days: i64,
    ) -> Result<usize, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let cutoff = format!("-{} days", retention_days);
        let deleted = conn.execute(
            "DELETE FROM import_history WHERE date(imported_at) < date('now', ?1)",
            params![cutoff],
        )?;

        Ok(deleted)
    }

    /// 批量插入异常标记(事务化)
    async fn insert_anomalies(
        &self,
        signals: Vec<AnomalySignal>,
    ) -> Result<usize, Box<dyn Error>> {
        if signals.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO anomaly_signal (
                    signal_id, batch_id, signal_type, creative_id, app_id,
                    evidence, detected_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;

            for signal in &signals {
                stmt.execute(params![
                    signal.signal_id,
                    signal.batch_id,
                    signal.signal_type,
                    signal.creative_id,
                    signal.app_id,
                    serde_json::to_string(&signal.evidence)?,
                    signal.detected_at.to_rfc3339(),
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    /// 查询指定批次的异常标记
    async fn get_anomalies_by_batch(
        &self,
        batch_id: &str,
    ) -> Result<Vec<AnomalySignal>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT * FROM anomaly_signal WHERE batch_id = ?1 ORDER BY detected_at",
        )?;
        let signals = stmt
            .query_map(params![batch_id], Self::map_signal_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(signals)
    }

    /// 查询指定创意的异常标记
    async fn get_anomalies_by_creative(
        &self,
        creative_id: &str,
    ) -> Result<Vec<AnomalySignal>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT * FROM anomaly_signal WHERE creative_id = ?1 ORDER BY detected_at",
        )?;
        let signals = stmt
            .query_map(params![creative_id], Self::map_signal_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(signals)
    }

    /// 行表全量概要
    async fn get_data_summary(&self) -> Result<DataSummary, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let summary = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COUNT(DISTINCT metric_date),
                COUNT(DISTINCT creative_id),
                COUNT(DISTINCT billing_id),
                COUNT(DISTINCT creative_size),
                COUNT(DISTINCT country),
                MIN(metric_date),
                MAX(metric_date),
                COALESCE(SUM(reached_queries), 0),
                COALESCE(SUM(impressions), 0),
                COALESCE(SUM(clicks), 0),
                COALESCE(SUM(spend_micros), 0)
            FROM rtb_daily
            "#,
            [],
            |row| {
                let parse_date = |raw: Option<String>| -> Option<NaiveDate> {
                    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
                };
                Ok(DataSummary {
                    total_rows: row.get(0)?,
                    unique_dates: row.get(1)?,
                    unique_creatives: row.get(2)?,
                    unique_billing_ids: row.get(3)?,
                    unique_sizes: row.get(4)?,
                    unique_countries: row.get(5)?,
                    date_range_start: parse_date(row.get(6)?),
                    date_range_end: parse_date(row.get(7)?),
                    total_reached_queries: row.get(8)?,
                    total_impressions: row.get(9)?,
                    total_clicks: row.get(10)?,
                    total_spend_micros: row.get(11)?,
                })
            },
        )?;

        Ok(summary)
    }

    /// 更新按日上传汇总(含行数突变检查)
    async fn update_daily_upload_summary(
        &self,
        upload_date: NaiveDate,
        batch: &ImportBatch,
    ) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let date_str = upload_date.to_string();
        let is_success = matches!(batch.status, ImportStatus::Complete) as i64;
        let is_failure = 1 - is_success;

        let existing: Option<(i64, i64, i64, i64, i64, Option<i64>, Option<i64>)> = tx
            .query_row(
                r#"
                SELECT total_uploads, successful_uploads, failed_uploads,
                       total_rows_written, total_file_size_bytes, min_rows, max_rows
                FROM daily_upload_summary WHERE upload_date = ?1
                "#,
                params![date_str],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;

        match existing {
            Some((total, success, failed, rows, size, min_rows, max_rows)) => {
                let new_total = total + 1;
                let new_rows = rows + batch.rows_imported;
                let new_avg = new_rows as f64 / new_total as f64;
                let new_min = min_rows
                    .map(|m| m.min(batch.rows_imported))
                    .unwrap_or(batch.rows_imported);
                let new_max = max_rows
                    .map(|m| m.max(batch.rows_imported))
                    .unwrap_or(batch.rows_imported);

                tx.execute(
                    r#"
                    UPDATE daily_upload_summary SET
                        total_uploads = ?1,
                        successful_uploads = ?2,
                        failed_uploads = ?3,
                        total_rows_written = ?4,
                        total_file_size_bytes = ?5,
                        avg_rows_per_upload = ?6,
                        min_rows = ?7,
                        max_rows = ?8,
                        updated_at = datetime('now')
                    WHERE upload_date = ?9
                    "#,
                    params![
                        new_total,
                        success + is_success,
                        failed + is_failure,
                        new_rows,
                        size + batch.file_size_bytes,
                        new_avg,
                        new_min,
                        new_max,
                        date_str,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO daily_upload_summary (
                        upload_date, total_uploads, successful_uploads, failed_uploads,
                        total_rows_written, total_file_size_bytes, avg_rows_per_upload,
                        min_rows, max_rows
                    ) VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    params![
                        date_str,
                        is_success,
                        is_failure,
                        batch.rows_imported,
                        batch.file_size_bytes,
                        batch.rows_imported as f64,
                        batch.rows_imported,
                        batch.rows_imported,
                    ],
                )?;
            }
        }

        Self::check_upload_volume_tx(&tx, &date_str)?;
        tx.commit()?;

        Ok(())
    }

    /// 查询指定日期的上传汇总
    async fn get_daily_upload_summary(
        &self,
        upload_date: NaiveDate,
    ) -> Result<Option<DailyUploadSummary>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let summary = conn
            .query_row(
                r#"
                SELECT upload_date, total_uploads, successful_uploads, failed_uploads,
                       total_rows_written, total_file_size_bytes, avg_rows_per_upload,
                       min_rows, max_rows, has_anomaly, anomaly_reason
                FROM daily_upload_summary WHERE upload_date = ?1
                "#,
                params![upload_date.to_string()],
                |row| {
                    let date_raw: String = row.get(0)?;
                    Ok(DailyUploadSummary {
                        upload_date: NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
                            .unwrap_or(upload_date),
                        total_uploads: row.get(1)?,
                        successful_uploads: row.get(2)?,
                        failed_uploads: row.get(3)?,
                        total_rows_written: row.get(4)?,
                        total_file_size_bytes: row.get(5)?,
                        avg_rows_per_upload: row.get(6)?,
                        min_rows: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
                        max_rows: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
                        has_anomaly: row.get::<_, i64>(9)? != 0,
                        anomaly_reason: row.get(10)?,
                    })
                },
            )
            .optional()?;

        Ok(summary)
    }

    /// 统计 rtb_daily 表记录数
    async fn count_rows(&self) -> Result<i64, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM rtb_daily", [], |row| row.get(0))?;
        Ok(count)
    }
}
