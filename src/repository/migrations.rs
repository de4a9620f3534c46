//! Schema creation and legacy-schema migration.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

const COLLECTION_RUNS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS collection_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT NOT NULL,
        video_url TEXT NOT NULL,
        collected_at TEXT NOT NULL,
        order_mode TEXT NOT NULL,
        max_comments INTEGER NOT NULL
    );
"#;

const RAW_THREADS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS raw_comment_threads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER NOT NULL,
        video_id TEXT NOT NULL,
        thread_id TEXT NOT NULL,
        fetched_at TEXT NOT NULL,
        published_at TEXT,
        author TEXT,
        like_count INTEGER,
        reply_count INTEGER,
        text_original TEXT,
        item_json TEXT NOT NULL,
        FOREIGN KEY(run_id) REFERENCES collection_runs(id) ON DELETE CASCADE,
        UNIQUE(run_id, thread_id)
    );
"#;

const CLEAN_COMMENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS clean_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER NOT NULL,
        raw_thread_id INTEGER NOT NULL,
        video_id TEXT NOT NULL,
        comment_id TEXT NOT NULL,
        cleaned_at TEXT NOT NULL,
        published_at TEXT,
        author TEXT,
        like_count INTEGER,
        reply_count INTEGER,
        text TEXT NOT NULL,
        text_original TEXT,
        FOREIGN KEY(run_id) REFERENCES collection_runs(id) ON DELETE CASCADE,
        FOREIGN KEY(raw_thread_id) REFERENCES raw_comment_threads(id) ON DELETE CASCADE,
        UNIQUE(run_id, comment_id)
    );
"#;

const AI_PORTRAITS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS ai_portraits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        prompt_name TEXT,
        prompt_version INTEGER,
        input_json TEXT NOT NULL,
        portrait_json TEXT,
        portrait_raw TEXT,
        parse_ok INTEGER NOT NULL,
        error TEXT,
        FOREIGN KEY(run_id) REFERENCES collection_runs(id) ON DELETE CASCADE,
        UNIQUE(run_id)
    );
"#;

/// Create the schema, migrating a legacy store first. Safe to invoke on
/// every open.
pub fn init_schema(conn: &Connection) -> Result<()> {
    migrate_legacy_schema(conn)?;

    conn.execute_batch(COLLECTION_RUNS_TABLE)?;
    conn.execute_batch(RAW_THREADS_TABLE)?;
    conn.execute_batch(CLEAN_COMMENTS_TABLE)?;
    conn.execute_batch(AI_PORTRAITS_TABLE)?;

    ensure_run_metadata_columns(conn)?;
    Ok(())
}

/// Migrate a store whose uniqueness was keyed by video id alone to the
/// run-scoped schema.
///
/// The legacy layout used `UNIQUE(video_id, thread_id)` and
/// `UNIQUE(video_id, comment_id)`, which blocks storing a second run for the
/// same video. All rows are preserved; the run id of each migrated clean
/// comment is re-derived from its parent raw thread. No-op when the source
/// tables are absent or already run-scoped.
fn migrate_legacy_schema(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "raw_comment_threads")? {
        return Ok(());
    }

    let clean_exists = table_exists(conn, "clean_comments")?;
    let clean_cols = if clean_exists {
        table_columns(conn, "clean_comments")?
    } else {
        Vec::new()
    };
    if clean_cols.iter().any(|c| c == "run_id") {
        return Ok(());
    }

    info!("migrating legacy video-keyed store to run-scoped schema");

    conn.execute_batch("BEGIN")?;
    let migrated = (|| -> Result<()> {
        conn.execute(
            "ALTER TABLE raw_comment_threads RENAME TO raw_comment_threads_v1",
            [],
        )?;
        if clean_exists {
            conn.execute("ALTER TABLE clean_comments RENAME TO clean_comments_v1", [])?;
        }

        conn.execute_batch(RAW_THREADS_TABLE)?;
        conn.execute_batch(CLEAN_COMMENTS_TABLE)?;

        conn.execute(
            "INSERT INTO raw_comment_threads (
                id, run_id, video_id, thread_id, fetched_at,
                published_at, author, like_count, reply_count,
                text_original, item_json
            )
            SELECT id, run_id, video_id, thread_id, fetched_at,
                   published_at, author, like_count, reply_count,
                   text_original, item_json
            FROM raw_comment_threads_v1",
            [],
        )?;

        if clean_exists {
            conn.execute(
                "INSERT INTO clean_comments (
                    run_id, raw_thread_id, video_id, comment_id, cleaned_at,
                    published_at, author, like_count, reply_count,
                    text, text_original
                )
                SELECT r.run_id, c.raw_thread_id, c.video_id, c.comment_id, c.cleaned_at,
                       c.published_at, c.author, c.like_count, c.reply_count,
                       c.text, c.text_original
                FROM clean_comments_v1 c
                JOIN raw_comment_threads_v1 r ON r.id = c.raw_thread_id",
                [],
            )?;
        }

        conn.execute("DROP TABLE IF EXISTS clean_comments_v1", [])?;
        conn.execute("DROP TABLE IF EXISTS raw_comment_threads_v1", [])?;
        Ok(())
    })();

    match migrated {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Metadata columns were added after the first release; bring older stores
/// up to date.
fn ensure_run_metadata_columns(conn: &Connection) -> Result<()> {
    let cols = table_columns(conn, "collection_runs")?;
    for column in ["video_title", "channel_title", "channel_id"] {
        if !cols.iter().any(|c| c == column) {
            conn.execute(
                &format!("ALTER TABLE collection_runs ADD COLUMN {column} TEXT"),
                [],
            )?;
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name=? LIMIT 1")?;
    Ok(stmt.exists([name])?)
}

fn table_columns(conn: &Connection, name: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({name})"))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}
