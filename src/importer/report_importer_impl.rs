// ==========================================
// RTB 绩效报表导入系统 - 报表导入器实现
// ==========================================
// 职责: 整合导入流程,从文件到数据库
// 流程: 校验(门禁) → 逐行[规范化 → 异常检测 → 批量缓冲] → 台账
// 约定: 单遍流式,内存上界为批缓冲;文件级严格、行级宽容
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::report::{ImportBatch, ImportSummary, RowSkip, ValidationReport};
use crate::domain::types::{ImportPhase, ImportStatus};
use crate::importer::anomaly_detector::{AnomalyDetector, AnomalyThresholds};
use crate::importer::batch_writer::BatchWriter;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{ColumnMap, OPTIONAL_FIELDS, REQUIRED_FIELDS};
use crate::importer::file_validator::FileValidator;
use crate::importer::row_normalizer::RowNormalizer;
use crate::repository::PerfImportRepository;
use chrono::{NaiveDate, Utc};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// ReportImporterImpl - 报表导入器实现
// ==========================================
pub struct ReportImporterImpl<R, C>
where
    R: PerfImportRepository,
    C: ImportConfigReader,
{
    // 数据访问层
    repo: R,

    // 配置读取器
    config: C,

    // 行规范化器
    normalizer: RowNormalizer,

    // 取消标志(批次 flush 之间检查;已提交批次保持生效)
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl<R, C> ReportImporterImpl<R, C>
where
    R: PerfImportRepository,
    C: ImportConfigReader,
{
    /// 创建新的 ReportImporter 实例
    ///
    /// # 参数
    /// - repo: 导入数据仓储
    /// - config: 配置读取器
    pub fn new(repo: R, config: C) -> Self {
        Self {
            repo,
            config,
            normalizer: RowNormalizer,
            cancel_flag: None,
        }
    }

    /// 挂接取消标志(置位后在下一次批次 flush 边界停止)
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl<R, C> crate::importer::report_importer_trait::ReportImporter for ReportImporterImpl<R, C>
where
    R: PerfImportRepository + Send + Sync,
    C: ImportConfigReader + Send + Sync,
{
    /// 校验报表文件(纯判定,无副作用)
    async fn validate<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> ImportResult<ValidationReport> {
        FileValidator::validate(file_path.as_ref())
    }

    /// 导入报表文件
    #[instrument(skip(self, file_path), fields(batch_id))]
    async fn import_file<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> ImportResult<ImportSummary> {
        use std::time::Instant;
        let start_time = Instant::now();
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mut phase = ImportPhase::Pending;
        debug!(?phase, file = %file_name, "导入调用已创建");

        // === 步骤 1: 文件级校验(门禁) ===
        phase = ImportPhase::Validating;
        debug!(?phase, file = %file_name, "文件级校验");
        let validation = FileValidator::validate(path)?;
        if !validation.is_valid {
            phase = ImportPhase::Rejected;
            warn!(
                ?phase,
                missing = ?validation.required_missing,
                "必填列缺失,整文件拒绝"
            );
            // 拒绝的文件不产生台账记录,调用方持有的校验结论即全部产物
            return Err(ImportError::ValidationRejected {
                missing: validation
                    .required_missing
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                remediation: validation.remediation.unwrap_or_default(),
            });
        }

        let batch_id = Uuid::new_v4().to_string()[..8].to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());
        phase = ImportPhase::Importing;
        info!(?phase, batch_id = %batch_id, file = %file_name, "开始导入报表数据");

        // === 步骤 2: 读取配置 ===
        let batch_size = self
            .config
            .get_batch_size()
            .await
            .map_err(|e| ImportError::InternalError(format!("配置读取失败: {}", e)))?;
        let progress_interval = self
            .config
            .get_progress_interval_rows()
            .await
            .map_err(|e| ImportError::InternalError(format!("配置读取失败: {}", e)))?
            .max(1);
        let max_skip_examples = self
            .config
            .get_max_skip_examples()
            .await
            .map_err(|e| ImportError::InternalError(format!("配置读取失败: {}", e)))?;
        let thresholds = AnomalyThresholds {
            ctr_threshold: self
                .config
                .get_ctr_threshold()
                .await
                .map_err(|e| ImportError::InternalError(format!("配置读取失败: {}", e)))?,
            ctr_min_impressions: self
                .config
                .get_ctr_min_impressions()
                .await
                .map_err(|e| ImportError::InternalError(format!("配置读取失败: {}", e)))?,
        };
        let detector = AnomalyDetector::new(thresholds);

        let file_size_bytes = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);

        // === 步骤 3: 逐行流式处理 ===
        let file = std::fs::File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let columns: ColumnMap = FileValidator::resolve_columns(reader.headers()?);

        let mut writer = BatchWriter::new(&self.repo, &batch_id, batch_size);

        let mut rows_read: usize = 0;
        let mut rows_skipped_normalize: usize = 0;
        let mut skip_examples: Vec<RowSkip> = Vec::new();
        let mut date_min: Option<NaiveDate> = None;
        let mut date_max: Option<NaiveDate> = None;
        let mut creative_ids: HashSet<String> = HashSet::new();
        let mut billing_ids: HashSet<String> = HashSet::new();
        let mut populated: HashSet<&'static str> = HashSet::new();
        let mut total_reached_queries: i64 = 0;
        let mut total_impressions: i64 = 0;
        let mut total_spend_micros: i64 = 0;
        let mut anomaly_buffer = Vec::new();
        let mut anomaly_total: usize = 0;
        let mut fatal: Option<ImportError> = None;

        for (idx, record_result) in reader.records().enumerate() {
            let row_number = idx + 2; // 表头为第 1 行
            rows_read += 1;

            let raw = match record_result {
                Ok(record) => record,
                Err(e) => {
                    // 单行读取失败按行级跳过处理,不中断文件
                    rows_skipped_normalize += 1;
                    if skip_examples.len() < max_skip_examples {
                        skip_examples.push(RowSkip {
                            row_number,
                            reason: format!("行读取失败: {}", e),
                        });
                    }
                    continue;
                }
            };

            let record = match self.normalizer.normalize(&raw, &columns, row_number) {
                Ok(record) => record,
                Err(skip) => {
                    rows_skipped_normalize += 1;
                    if skip_examples.len() < max_skip_examples {
                        skip_examples.push(skip);
                    }
                    continue;
                }
            };

            // 行级统计(仅接受行)
            date_min = Some(date_min.map_or(record.metric_date, |d| d.min(record.metric_date)));
            date_max = Some(date_max.map_or(record.metric_date, |d| d.max(record.metric_date)));
            creative_ids.insert(record.creative_id.clone());
            billing_ids.insert(record.billing_id.clone());
            track_populated(&record, &mut populated);
            total_reached_queries += record.reached_queries;
            total_impressions += record.impressions;
            total_spend_micros += record.spend_micros.unwrap_or(0);

            // 异常检测: 只作标记,不影响该行写入
            anomaly_buffer.extend(detector.detect(&record, &batch_id));

            match writer.push(record).await {
                Ok(true) => {
                    // 批次已落库: 随批写出异常标记,并检查取消请求
                    if !anomaly_buffer.is_empty() {
                        match self.repo.insert_anomalies(std::mem::take(&mut anomaly_buffer)).await
                        {
                            Ok(n) => anomaly_total += n,
                            Err(e) => warn!(error = %e, "异常标记写入失败"),
                        }
                    }
                    if self.is_cancelled() {
                        fatal = Some(ImportError::Cancelled(batch_id.clone()));
                        break;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }

            if rows_read % progress_interval == 0 {
                info!(
                    rows_read,
                    imported = writer.rows_imported(),
                    duplicate = writer.rows_duplicate(),
                    skipped = rows_skipped_normalize,
                    "导入进度"
                );
            }
        }

        // === 步骤 4: 收尾 flush ===
        if fatal.is_none() {
            if let Err(e) = writer.flush().await {
                fatal = Some(e);
            }
        }
        if fatal.is_none() && !anomaly_buffer.is_empty() {
            match self.repo.insert_anomalies(std::mem::take(&mut anomaly_buffer)).await {
                Ok(n) => anomaly_total += n,
                Err(e) => warn!(error = %e, "异常标记写入失败"),
            }
        }

        let rows_imported = writer.rows_imported();
        let rows_duplicate = writer.rows_duplicate();
        let rows_skipped = rows_skipped_normalize + writer.rows_failed();

        let (status, error_message) = match &fatal {
            None => {
                phase = ImportPhase::Complete;
                (ImportStatus::Complete, None)
            }
            Some(e) => {
                phase = ImportPhase::Failed;
                error!(?phase, error = %e, "导入中途失败,已提交批次保持生效");
                (ImportStatus::Failed, Some(e.to_string()))
            }
        };

        // === 步骤 5: 台账记录(通过校验后必写,无论成败) ===
        let columns_imported = collect_columns_imported(&populated);
        let columns_missing = collect_columns_missing(&populated);

        let batch = ImportBatch {
            batch_id: batch_id.clone(),
            file_name: file_name.clone(),
            rows_read: rows_read as i64,
            rows_imported: rows_imported as i64,
            rows_skipped: rows_skipped as i64,
            rows_duplicate: rows_duplicate as i64,
            date_range_start: date_min,
            date_range_end: date_max,
            columns_imported: columns_imported.clone(),
            columns_missing,
            total_reached_queries,
            total_impressions,
            total_spend_micros,
            status,
            error_message: error_message.clone(),
            file_size_bytes,
            imported_at: Utc::now(),
        };

        self.repo
            .insert_import_batch(batch.clone())
            .await
            .map_err(|e| ImportError::DatabaseQueryError(format!("台账写入失败: {}", e)))?;

        // === 步骤 6: 按日上传汇总(失败仅告警,不影响导入结论) ===
        let today = chrono::Local::now().date_naive();
        if let Err(e) = self.repo.update_daily_upload_summary(today, &batch).await {
            warn!(error = %e, "按日上传汇总更新失败");
        }

        let elapsed = start_time.elapsed();
        let mut unique_billing_ids: Vec<String> = billing_ids.into_iter().collect();
        unique_billing_ids.sort();

        info!(
            ?phase,
            batch_id = %batch_id,
            rows_read,
            imported = rows_imported,
            duplicate = rows_duplicate,
            skipped = rows_skipped,
            anomalies = anomaly_total,
            elapsed_ms = elapsed.as_millis(),
            "报表数据导入结束"
        );

        Ok(ImportSummary {
            batch_id,
            rows_read,
            rows_imported,
            rows_skipped,
            rows_duplicate,
            date_range_start: date_min,
            date_range_end: date_max,
            unique_creative_count: creative_ids.len(),
            unique_billing_ids,
            total_reached_queries,
            total_impressions,
            total_spend_micros,
            columns_imported,
            skip_examples,
            anomaly_count: anomaly_total,
            status,
            error_message,
            elapsed_ms: elapsed.as_millis() as i64,
        })
    }

    /// 批量导入多个文件(并发执行)
    async fn batch_import<P: AsRef<Path> + Send + Sync>(
        &self,
        file_paths: Vec<P>,
    ) -> ImportResult<Vec<Result<ImportSummary, String>>> {
        use futures::future::join_all;
        use crate::importer::report_importer_trait::ReportImporter as _;

        info!(count = file_paths.len(), "开始批量导入文件");

        let import_tasks = file_paths.into_iter().map(|path| {
            let path_str = path.as_ref().to_str().unwrap_or("unknown").to_string();
            async move {
                match self.import_file(path).await {
                    Ok(summary) => {
                        info!(
                            file = %path_str,
                            imported = summary.rows_imported,
                            "文件导入成功"
                        );
                        Ok(summary)
                    }
                    Err(e) => {
                        error!(file = %path_str, error = %e, "文件导入失败");
                        Err(format!("文件 {} 导入失败: {}", path_str, e))
                    }
                }
            }
        });

        let results = join_all(import_tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );

        Ok(results)
    }
}

/// 记录该行实际出现取值的可选字段(全文件聚合)
fn track_populated(
    record: &crate::domain::report::PerfRecord,
    populated: &mut HashSet<&'static str>,
) {
    let optional_present: [(&'static str, bool); 28] = [
        ("creative_format", record.creative_format.is_some()),
        ("country", record.country.is_some()),
        ("platform", record.platform.is_some()),
        ("environment", record.environment.is_some()),
        ("app_id", record.app_id.is_some()),
        ("app_name", record.app_name.is_some()),
        ("publisher_id", record.publisher_id.is_some()),
        ("publisher_name", record.publisher_name.is_some()),
        ("publisher_domain", record.publisher_domain.is_some()),
        ("deal_id", record.deal_id.is_some()),
        ("deal_name", record.deal_name.is_some()),
        ("transaction_type", record.transaction_type.is_some()),
        ("advertiser", record.advertiser.is_some()),
        ("buyer_account_id", record.buyer_account_id.is_some()),
        ("buyer_account_name", record.buyer_account_name.is_some()),
        ("clicks", record.clicks.is_some()),
        ("spend", record.spend_micros.is_some()),
        ("video_starts", record.video_starts.is_some()),
        ("video_first_quartile", record.video_first_quartile.is_some()),
        ("video_midpoint", record.video_midpoint.is_some()),
        ("video_third_quartile", record.video_third_quartile.is_some()),
        ("video_completions", record.video_completions.is_some()),
        ("vast_errors", record.vast_errors.is_some()),
        ("engaged_views", record.engaged_views.is_some()),
        ("active_view_measurable", record.active_view_measurable.is_some()),
        ("active_view_viewable", record.active_view_viewable.is_some()),
        ("gma_sdk", record.gma_sdk),
        ("buyer_sdk", record.buyer_sdk),
    ];

    for (canonical, present) in optional_present {
        if present {
            populated.insert(canonical);
        }
    }
}

/// 实际导入的字段列表(必填字段 + 出现过取值的可选字段,按别名表顺序)
fn collect_columns_imported(populated: &HashSet<&'static str>) -> Vec<String> {
    REQUIRED_FIELDS
        .iter()
        .map(|f| f.canonical)
        .chain(
            OPTIONAL_FIELDS
                .iter()
                .map(|f| f.canonical)
                .filter(|c| populated.contains(c)),
        )
        .map(|c| c.to_string())
        .collect()
}

/// 全文件范围内完全缺失的可选字段
fn collect_columns_missing(populated: &HashSet<&'static str>) -> Vec<String> {
    OPTIONAL_FIELDS
        .iter()
        .map(|f| f.canonical)
        .filter(|c| !populated.contains(c))
        .map(|c| c.to_string())
        .collect()
}
