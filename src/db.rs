// ==========================================
// RTB 绩效报表导入系统 - SQLite 基础设施
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout,减少并发导入时的偶发 busy 错误
// - 提供建表引导,库与测试共用同一份 schema
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout(毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化数据库 schema(幂等,CREATE TABLE IF NOT EXISTS)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- 绩效行表: row_key 为维度指纹,upsert 唯一键
        CREATE TABLE IF NOT EXISTS rtb_daily (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metric_date TEXT NOT NULL,
            creative_id TEXT NOT NULL,
            billing_id TEXT NOT NULL,
            creative_size TEXT NOT NULL,
            creative_format TEXT,
            country TEXT,
            platform TEXT,
            environment TEXT,
            app_id TEXT,
            app_name TEXT,
            publisher_id TEXT,
            publisher_name TEXT,
            publisher_domain TEXT,
            deal_id TEXT,
            deal_name TEXT,
            transaction_type TEXT,
            advertiser TEXT,
            buyer_account_id TEXT,
            buyer_account_name TEXT,
            reached_queries INTEGER NOT NULL,
            impressions INTEGER NOT NULL,
            clicks INTEGER,
            spend_micros INTEGER,
            video_starts INTEGER,
            video_first_quartile INTEGER,
            video_midpoint INTEGER,
            video_third_quartile INTEGER,
            video_completions INTEGER,
            vast_errors INTEGER,
            engaged_views INTEGER,
            active_view_measurable INTEGER,
            active_view_viewable INTEGER,
            gma_sdk INTEGER NOT NULL DEFAULT 0,
            buyer_sdk INTEGER NOT NULL DEFAULT 0,
            row_key TEXT NOT NULL UNIQUE,
            import_batch_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rtb_daily_metric_date
            ON rtb_daily (metric_date);
        CREATE INDEX IF NOT EXISTS idx_rtb_daily_creative
            ON rtb_daily (creative_id);
        CREATE INDEX IF NOT EXISTS idx_rtb_daily_billing
            ON rtb_daily (billing_id);

        -- 导入批次台账: 独立于行表,回答"这次上传发生了什么"
        CREATE TABLE IF NOT EXISTS import_history (
            batch_id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            rows_read INTEGER NOT NULL,
            rows_imported INTEGER NOT NULL,
            rows_skipped INTEGER NOT NULL,
            rows_duplicate INTEGER NOT NULL,
            date_range_start TEXT,
            date_range_end TEXT,
            columns_imported TEXT,
            columns_missing TEXT,
            total_reached_queries INTEGER NOT NULL DEFAULT 0,
            total_impressions INTEGER NOT NULL DEFAULT 0,
            total_spend_micros INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error_message TEXT,
            file_size_bytes INTEGER NOT NULL DEFAULT 0,
            imported_at TEXT NOT NULL
        );

        -- 异常标记: 仅供人工复核,不影响行表
        CREATE TABLE IF NOT EXISTS anomaly_signal (
            signal_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            signal_type TEXT NOT NULL,
            creative_id TEXT NOT NULL,
            app_id TEXT,
            evidence TEXT NOT NULL,
            detected_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_anomaly_signal_batch
            ON anomaly_signal (batch_id);
        CREATE INDEX IF NOT EXISTS idx_anomaly_signal_creative
            ON anomaly_signal (creative_id);

        -- 按日上传汇总
        CREATE TABLE IF NOT EXISTS daily_upload_summary (
            upload_date TEXT PRIMARY KEY,
            total_uploads INTEGER NOT NULL DEFAULT 0,
            successful_uploads INTEGER NOT NULL DEFAULT 0,
            failed_uploads INTEGER NOT NULL DEFAULT 0,
            total_rows_written INTEGER NOT NULL DEFAULT 0,
            total_file_size_bytes INTEGER NOT NULL DEFAULT 0,
            avg_rows_per_upload REAL NOT NULL DEFAULT 0,
            min_rows INTEGER,
            max_rows INTEGER,
            has_anomaly INTEGER NOT NULL DEFAULT 0,
            anomaly_reason TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- 配置表(key-value + scope)
        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )?;
    Ok(())
}

/// 读取 schema_version(若表不存在则返回 None)
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    use rusqlite::OptionalExtension;

    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // 幂等

        let version = read_schema_version(&conn).unwrap();
        assert_eq!(version, Some(CURRENT_SCHEMA_VERSION));
    }
}
