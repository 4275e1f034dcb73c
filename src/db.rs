// ==========================================
// 评审分配引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表（协作方存储的本地替身）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
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

/// 建表（幂等）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS paper (
            id TEXT PRIMARY KEY,
            number INTEGER NOT NULL,
            venue_id TEXT NOT NULL,
            invitation TEXT NOT NULL,
            author_ids TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_paper_invitation
          ON paper(invitation, number);

        CREATE TABLE IF NOT EXISTS profile (
            id TEXT PRIMARY KEY,
            profile_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_member (
            group_id TEXT NOT NULL,
            member_id TEXT NOT NULL,
            added_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (group_id, member_id)
        );

        CREATE TABLE IF NOT EXISTS review_ledger (
            paper_id TEXT NOT NULL,
            member_id TEXT NOT NULL,
            posted_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (paper_id, member_id)
        );

        CREATE TABLE IF NOT EXISTS assignment_config (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            match_group TEXT NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            config_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_config_status
          ON assignment_config(status);

        CREATE TABLE IF NOT EXISTS edge (
            id TEXT PRIMARY KEY,
            invitation_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            head TEXT NOT NULL,
            tail TEXT NOT NULL,
            weight REAL NOT NULL,
            label TEXT,
            config_id TEXT,
            signatures TEXT NOT NULL DEFAULT '[]',
            readers TEXT NOT NULL DEFAULT '[]',
            writers TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_edge_invitation_head
          ON edge(invitation_id, head);

        CREATE INDEX IF NOT EXISTS idx_edge_kind_head
          ON edge(kind, head);

        CREATE INDEX IF NOT EXISTS idx_edge_config
          ON edge(config_id, kind);

        CREATE TABLE IF NOT EXISTS run_queue (
            task_id TEXT PRIMARY KEY,
            config_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 0,
            settings_snapshot TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_run_queue_status
          ON run_queue(status, created_at);

        CREATE INDEX IF NOT EXISTS idx_run_queue_config
          ON run_queue(config_id, status);

        CREATE TABLE IF NOT EXISTS deployment_journal (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            config_id TEXT NOT NULL,
            action TEXT NOT NULL,
            group_id TEXT,
            member_id TEXT,
            edge_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_journal_config
          ON deployment_journal(config_id, seq);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
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

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
