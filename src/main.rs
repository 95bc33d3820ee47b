// ==========================================
// RTB 绩效报表导入系统 - 命令行入口
// ==========================================
// 用法: rtb-report-importer <csv_file> [--db <db_path>]
// 流程: 校验 → (拒绝则输出修复指引) → 导入 → 输出结果概要
// ==========================================

use rtb_report_importer::config::ConfigManager;
use rtb_report_importer::importer::{ReportImporter, ReportImporterImpl};
use rtb_report_importer::logging;
use rtb_report_importer::repository::PerfImportRepositoryImpl;
use std::path::PathBuf;
use std::process::ExitCode;

/// 默认数据库路径: ~/.rtbcat/rtbcat.db
fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rtbcat")
        .join("rtbcat.db")
}

fn parse_args() -> Option<(PathBuf, PathBuf)> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut csv_path: Option<PathBuf> = None;
    let mut db_path = default_db_path();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => {
                db_path = PathBuf::from(iter.next()?);
            }
            _ => {
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    Some((csv_path?, db_path))
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", rtb_report_importer::APP_NAME);
    tracing::info!("系统版本: {}", rtb_report_importer::VERSION);
    tracing::info!("==================================================");

    let (csv_path, db_path) = match parse_args() {
        Some(parsed) => parsed,
        None => {
            eprintln!("用法: rtb-report-importer <csv_file> [--db <db_path>]");
            return ExitCode::FAILURE;
        }
    };

    if let Some(parent) = db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(error = %e, "数据库目录创建失败");
            return ExitCode::FAILURE;
        }
    }
    let db_path_str = db_path.display().to_string();
    tracing::info!("使用数据库: {}", db_path_str);

    let repo = match PerfImportRepositoryImpl::new(&db_path_str) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::error!(error = %e, "仓储初始化失败");
            return ExitCode::FAILURE;
        }
    };
    let config = match ConfigManager::new(&db_path_str) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "配置管理器初始化失败");
            return ExitCode::FAILURE;
        }
    };
    let importer = ReportImporterImpl::new(repo, config);

    // === 校验 ===
    tracing::info!("正在校验 {} ...", csv_path.display());
    let validation = match importer.validate(&csv_path).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "文件校验失败");
            return ExitCode::FAILURE;
        }
    };

    if !validation.is_valid {
        tracing::error!(
            missing = ?validation.required_missing,
            "校验未通过,文件被拒绝"
        );
        if let Some(remediation) = &validation.remediation {
            eprintln!("\n{}", remediation);
        }
        return ExitCode::FAILURE;
    }

    tracing::info!(
        rows_estimate = validation.row_count_estimate,
        columns_mapped = validation.columns_mapped.len(),
        "校验通过"
    );
    if !validation.optional_missing.is_empty() {
        tracing::info!(optional_missing = ?validation.optional_missing, "可选列未提供");
    }

    // === 导入 ===
    let summary = match importer.import_file(&csv_path).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "导入失败");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("批次 ID:       {}", summary.batch_id);
    tracing::info!("读取行数:      {}", summary.rows_read);
    tracing::info!("导入行数:      {}", summary.rows_imported);
    tracing::info!("覆盖更新行数:  {}", summary.rows_duplicate);
    tracing::info!("跳过行数:      {}", summary.rows_skipped);
    tracing::info!(
        "日期范围:      {} ~ {}",
        summary
            .date_range_start
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
        summary
            .date_range_end
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    tracing::info!("创意数:        {}", summary.unique_creative_count);
    tracing::info!("触达查询合计:  {}", summary.total_reached_queries);
    tracing::info!(
        "花费合计:      ${:.2}",
        summary.total_spend_micros as f64 / 1_000_000.0
    );
    if summary.anomaly_count > 0 {
        tracing::warn!(anomalies = summary.anomaly_count, "存在待复核的异常标记");
    }
    for skip in &summary.skip_examples {
        tracing::warn!(row = skip.row_number, reason = %skip.reason, "行级跳过示例");
    }

    match summary.status {
        rtb_report_importer::ImportStatus::Complete => ExitCode::SUCCESS,
        rtb_report_importer::ImportStatus::Failed => {
            tracing::error!(
                error = %summary.error_message.unwrap_or_default(),
                "导入未完整结束"
            );
            ExitCode::FAILURE
        }
    }
}
