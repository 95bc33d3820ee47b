// ==========================================
// ReportImporter 集成测试
// ==========================================
// 测试目标: 验证完整的报表导入流程
// ==========================================


use rtb_report_importer::importer::{ImportError, ReportImporter};
use rtb_report_importer::logging;
use rtb_report_importer::repository::PerfImportRepository;
use rtb_report_importer::ImportStatus;
use test_helpers::{create_test_db, create_test_importer, report_with_rows, write_report_csv};

#[tokio::test]
async fn test_import_concrete_scenario() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let csv = report_with_rows(&["144634,11/29/2025,abc123,300x250,50000,48000,750,187.50"]);

    // 校验通过
    let validation = importer.validate(csv.path()).await.unwrap();
    assert!(validation.is_valid);
    assert!(validation.required_missing.is_empty());

    // 导入成功
    let summary = importer.import_file(csv.path()).await.unwrap();
    assert_eq!(summary.status, ImportStatus::Complete);
    assert_eq!(summary.rows_read, 1);
    assert_eq!(summary.rows_imported, 1);
    assert_eq!(summary.rows_skipped, 0);
    assert_eq!(summary.rows_duplicate, 0);
    assert_eq!(summary.unique_creative_count, 1);
    assert_eq!(summary.unique_billing_ids, vec!["abc123".to_string()]);
    assert_eq!(summary.total_reached_queries, 50_000);
    assert_eq!(summary.total_impressions, 48_000);
    assert_eq!(summary.total_spend_micros, 187_500_000);
    // 750 / 48000 既非高 CTR 也非点击超展示,零展示花费条件也不成立
    assert_eq!(summary.anomaly_count, 0);

    // 落库数值核对
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let (metric_date, spend_micros, impressions, clicks): (String, i64, i64, i64) = conn
        .query_row(
            "SELECT metric_date, spend_micros, impressions, clicks FROM rtb_daily \
             WHERE creative_id = '144634'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(metric_date, "2025-11-29");
    assert_eq!(spend_micros, 187_500_000);
    assert_eq!(impressions, 48_000);
    assert_eq!(clicks, 750);
}

#[tokio::test]
async fn test_validation_gate_missing_billing_id() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let csv = write_report_csv(
        "Day,Creative ID,Creative size,Reached queries,Impressions\n\
         11/29/2025,144634,300x250,50000,48000\n",
    );

    let validation = importer.validate(csv.path()).await.unwrap();
    assert!(!validation.is_valid);
    assert!(validation.required_missing.contains(&"billing_id"));
    assert!(validation
        .remediation
        .as_ref()
        .unwrap()
        .contains("Billing ID"));

    // 导入尝试被拒绝,零行写入,且无台账记录
    let result = importer.import_file(csv.path()).await;
    assert!(matches!(
        result,
        Err(ImportError::ValidationRejected { .. })
    ));

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM rtb_daily", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    let ledger: i64 = conn
        .query_row("SELECT COUNT(*) FROM import_history", [], |row| row.get(0))
        .unwrap();
    assert_eq!(ledger, 0);
}

#[tokio::test]
async fn test_fraud_flag_never_blocks_import() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    // clicks=150 > impressions=100
    let csv = report_with_rows(&["144634,11/29/2025,abc123,300x250,50000,100,150,1.00"]);
    let summary = importer.import_file(csv.path()).await.unwrap();

    // 行照常导入,存储的就是 150
    assert_eq!(summary.rows_imported, 1);
    assert_eq!(summary.anomaly_count, 1);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let clicks: i64 = conn
        .query_row(
            "SELECT clicks FROM rtb_daily WHERE creative_id = '144634'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(clicks, 150);

    // 恰好一条 clicks_exceed_impressions 标记
    let signals = importer_repo(&db_path)
        .get_anomalies_by_batch(&summary.batch_id)
        .await
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type, "clicks_exceed_impressions");
    assert_eq!(signals[0].creative_id, "144634");
}

#[tokio::test]
async fn test_zero_impression_spend_flagged() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let csv = report_with_rows(&[
        "c-spend,11/29/2025,abc123,300x250,1000,0,,5.00",
        "c-clean,11/29/2025,abc123,320x50,1000,0,,0.00",
    ]);
    let summary = importer.import_file(csv.path()).await.unwrap();

    assert_eq!(summary.rows_imported, 2);
    assert_eq!(summary.anomaly_count, 1);

    let signals = importer_repo(&db_path)
        .get_anomalies_by_batch(&summary.batch_id)
        .await
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type, "zero_impressions_with_spend");
    assert_eq!(signals[0].creative_id, "c-spend");
    assert_eq!(signals[0].evidence["spend_micros"], 5_000_000);
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let first = report_with_rows(&["144634,11/29/2025,abc123,300x250,50000,48000,750,187.50"]);
    let summary = importer.import_file(first.path()).await.unwrap();
    assert_eq!(summary.rows_imported, 1);
    assert_eq!(summary.rows_duplicate, 0);

    // 同维度切片重发(指标已刷新): 覆盖更新,不新增行
    let second = report_with_rows(&["144634,11/29/2025,abc123,300x250,60000,51000,800,200.00"]);
    let summary = importer.import_file(second.path()).await.unwrap();
    assert_eq!(summary.rows_imported, 0);
    assert_eq!(summary.rows_duplicate, 1);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM rtb_daily", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);

    // 留存的指标等于最后一次导入的取值(替换,不累加)
    let (impressions, spend_micros): (i64, i64) = conn
        .query_row(
            "SELECT impressions, spend_micros FROM rtb_daily WHERE creative_id = '144634'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(impressions, 51_000);
    assert_eq!(spend_micros, 200_000_000);
}

#[tokio::test]
async fn test_partial_row_tolerance_at_scale() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    // 500 行中混入 30 行非法日期: 行级跳过,文件级照常完成
    let mut rows: Vec<String> = Vec::new();
    for i in 0..500 {
        let day = if i % 17 == 3 && rows.iter().filter(|r: &&String| r.contains("bad-date")).count() < 30
        {
            "bad-date".to_string()
        } else {
            format!("{:02}/{:02}/2025", 1 + i % 12, 1 + i % 28)
        };
        rows.push(format!("c{},{},abc123,300x250,1000,{},,", i, day, 100 + i));
    }
    let bad_rows = rows.iter().filter(|r| r.contains("bad-date")).count();
    let row_refs: Vec<&str> = rows.iter().map(|s| s.as_str()).collect();
    let csv = report_with_rows(&row_refs);

    let summary = importer.import_file(csv.path()).await.unwrap();

    assert_eq!(summary.status, ImportStatus::Complete);
    assert_eq!(summary.rows_read, 500);
    assert_eq!(summary.rows_skipped, bad_rows);
    assert_eq!(
        summary.rows_imported + summary.rows_duplicate,
        500 - bad_rows
    );
    // 跳过示例保留上限为 20
    assert_eq!(summary.skip_examples.len(), 20);
    assert!(summary.skip_examples[0].reason.contains("day"));

    // 台账日期范围仅反映接受行
    let batch = importer_repo(&db_path)
        .get_batch_by_id(&summary.batch_id)
        .await
        .unwrap()
        .expect("ledger entry must exist");
    assert_eq!(batch.rows_skipped as usize, bad_rows);
    assert!(batch.date_range_start.is_some());
    assert!(batch.date_range_end.is_some());
}

#[tokio::test]
async fn test_ledger_records_populated_and_missing_columns() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    // clicks/spend 列存在且有值;country 等列完全缺失
    let csv = report_with_rows(&["144634,11/29/2025,abc123,300x250,50000,48000,750,187.50"]);
    let summary = importer.import_file(csv.path()).await.unwrap();

    let batch = importer_repo(&db_path)
        .get_batch_by_id(&summary.batch_id)
        .await
        .unwrap()
        .unwrap();

    assert!(batch.columns_imported.contains(&"creative_id".to_string()));
    assert!(batch.columns_imported.contains(&"clicks".to_string()));
    assert!(batch.columns_imported.contains(&"spend".to_string()));
    assert!(!batch.columns_imported.contains(&"country".to_string()));
    assert!(batch.columns_missing.contains(&"country".to_string()));
    assert!(batch.columns_missing.contains(&"deal_id".to_string()));

    assert_eq!(batch.status, ImportStatus::Complete);
    assert_eq!(batch.rows_imported, 1);
    assert_eq!(batch.total_spend_micros, 187_500_000);
}

#[tokio::test]
async fn test_batch_import_independent_files() {
    logging::init_test();

    let (_temp_db, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let good = report_with_rows(&["c1,11/29/2025,abc123,300x250,1000,900,,"]);
    let rejected = write_report_csv("Day,Creative ID\n11/29/2025,c2\n");

    let results = importer
        .batch_import(vec![
            good.path().to_path_buf(),
            rejected.path().to_path_buf(),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());

    // 单文件被拒绝不影响其余文件
    let rows = importer_repo(&db_path).count_rows().await.unwrap();
    assert_eq!(rows, 1);
}

/// 打开与导入器同库的仓储,供断言查询使用
fn importer_repo(db_path: &str) -> rtb_report_importer::repository::PerfImportRepositoryImpl {
    rtb_report_importer::repository::PerfImportRepositoryImpl::new(db_path)
        .expect("Failed to open repository")
}
