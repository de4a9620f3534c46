//! Run-scoped store operations.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{migrations, utc_now_iso};
use crate::error::Result;
use crate::models::{
    CleanComment, CollectionRun, NewCleanComment, NewPortrait, OrderMode, PortraitDetail,
    PortraitRecord, PortraitSummary, RawThreadRow, VideoMetadata,
};

/// Handle over the run store.
///
/// Callers open one store per logical operation and drop it when done. Every
/// open enables write-ahead logging and foreign-key enforcement.
pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    /// Open the store, creating parent directories and the schema as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        migrations::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Create a collection run, returning its id. Run ids are strictly
    /// increasing.
    pub fn insert_collection_run(
        &self,
        video_id: &str,
        video_url: &str,
        order_mode: OrderMode,
        max_comments: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO collection_runs (video_id, video_url, collected_at, order_mode, max_comments)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                video_id,
                video_url,
                utc_now_iso(),
                order_mode.as_str(),
                max_comments
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Fill a run's video/channel metadata after collection.
    pub fn update_run_metadata(&self, run_id: i64, meta: &VideoMetadata) -> Result<()> {
        self.conn.execute(
            "UPDATE collection_runs SET video_title = ?2, channel_title = ?3, channel_id = ?4
             WHERE id = ?1",
            params![run_id, meta.video_title, meta.channel_title, meta.channel_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<CollectionRun>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, video_id, video_url, video_title, channel_title, channel_id,
                        collected_at, order_mode, max_comments
                 FROM collection_runs WHERE id = ?1",
                [run_id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// The highest run id, or `None` when no runs exist.
    pub fn latest_run_id(&self) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM collection_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Store one raw thread. Re-inserting an already-seen (run, thread) pair
    /// is a silent no-op; returns whether a row was written.
    pub fn insert_raw_thread(&self, run_id: i64, video_id: &str, item: &Value) -> Result<bool> {
        insert_raw_thread(&self.conn, run_id, video_id, item)
    }

    /// Store a fetched batch, committed once at the end. Returns the number
    /// of rows actually written.
    pub fn insert_raw_threads(
        &mut self,
        run_id: i64,
        video_id: &str,
        items: &[Value],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut stored = 0;
        for item in items {
            if insert_raw_thread(&tx, run_id, video_id, item)? {
                stored += 1;
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    /// Raw threads of a run in insertion order, as consumed by the cleaning
    /// stage.
    pub fn raw_threads(&self, run_id: i64) -> Result<Vec<RawThreadRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, video_id, thread_id, item_json
             FROM raw_comment_threads
             WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([run_id], |row| {
                Ok(RawThreadRow {
                    id: row.get(0)?,
                    video_id: row.get(1)?,
                    thread_id: row.get(2)?,
                    item_json: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn raw_thread_count(&self, run_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM raw_comment_threads WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Store one normalized comment. Re-cleaning the same (run, comment)
    /// pair is a silent no-op; returns whether a row was written.
    pub fn insert_clean_comment(&self, run_id: i64, comment: &NewCleanComment) -> Result<bool> {
        insert_clean_comment(&self.conn, run_id, comment)
    }

    /// Store a whole cleaning pass, committed once at the end. Returns the
    /// inserted-or-ignored count (one per candidate).
    pub fn insert_clean_comments(
        &mut self,
        run_id: i64,
        comments: &[NewCleanComment],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for comment in comments {
            insert_clean_comment(&tx, run_id, comment)?;
        }
        tx.commit()?;
        Ok(comments.len())
    }

    /// Normalized comments of a run in insertion order. This projection is
    /// the pipeline's external contract; raw JSON and internal ids are not
    /// exposed.
    pub fn clean_comments(&self, run_id: i64) -> Result<Vec<CleanComment>> {
        let mut stmt = self.conn.prepare(
            "SELECT video_id, comment_id, published_at, author, like_count, reply_count, text
             FROM clean_comments
             WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([run_id], |row| {
                Ok(CleanComment {
                    video_id: row.get(0)?,
                    comment_id: row.get(1)?,
                    published_at: row.get(2)?,
                    author: row.get(3)?,
                    like_count: row.get(4)?,
                    reply_count: row.get(5)?,
                    text: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert or fully replace the portrait for a run. One row per run id;
    /// every field is overwritten on conflict, nothing is merged.
    pub fn upsert_ai_portrait(&self, portrait: &NewPortrait) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ai_portraits (
                run_id, created_at, provider, model,
                prompt_name, prompt_version,
                input_json, portrait_json, portrait_raw,
                parse_ok, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(run_id) DO UPDATE SET
                created_at=excluded.created_at,
                provider=excluded.provider,
                model=excluded.model,
                prompt_name=excluded.prompt_name,
                prompt_version=excluded.prompt_version,
                input_json=excluded.input_json,
                portrait_json=excluded.portrait_json,
                portrait_raw=excluded.portrait_raw,
                parse_ok=excluded.parse_ok,
                error=excluded.error",
            params![
                portrait.run_id,
                utc_now_iso(),
                portrait.provider,
                portrait.model,
                portrait.prompt_name,
                portrait.prompt_version,
                portrait.input_json,
                portrait.portrait_json,
                portrait.portrait_raw,
                portrait.parse_ok as i64,
                portrait.error,
            ],
        )?;
        Ok(())
    }

    pub fn get_ai_portrait(&self, run_id: i64) -> Result<Option<PortraitRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT run_id, created_at, provider, model, prompt_name, prompt_version,
                        input_json, portrait_json, portrait_raw, parse_ok, error
                 FROM ai_portraits WHERE run_id = ?1 LIMIT 1",
                [run_id],
                row_to_portrait,
            )
            .optional()?;
        Ok(record)
    }

    /// A portrait joined with its owning run, for the query endpoint.
    pub fn portrait_detail(&self, run_id: i64) -> Result<Option<PortraitDetail>> {
        let detail = self
            .conn
            .query_row(
                "SELECT p.run_id, p.created_at, p.provider, p.model, p.prompt_name,
                        p.prompt_version, p.input_json, p.portrait_json, p.portrait_raw,
                        p.parse_ok, p.error,
                        r.video_id, r.video_url, r.video_title, r.channel_title, r.channel_id
                 FROM ai_portraits p
                 JOIN collection_runs r ON r.id = p.run_id
                 WHERE p.run_id = ?1 LIMIT 1",
                [run_id],
                |row| {
                    Ok(PortraitDetail {
                        portrait: row_to_portrait(row)?,
                        video_id: row.get(11)?,
                        video_url: row.get(12)?,
                        video_title: row.get(13)?,
                        channel_title: row.get(14)?,
                        channel_id: row.get(15)?,
                    })
                },
            )
            .optional()?;
        Ok(detail)
    }

    /// Delete the portrait for a run, returning the number of rows removed
    /// (0 when none existed).
    pub fn delete_ai_portrait(&self, run_id: i64) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM ai_portraits WHERE run_id = ?1", [run_id])?;
        Ok(deleted)
    }

    /// All portraits joined with their runs, newest portrait first.
    pub fn list_ai_portraits(&self) -> Result<Vec<PortraitSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.run_id, p.created_at, p.parse_ok, p.prompt_name, p.prompt_version,
                    p.provider, p.model,
                    r.video_id, r.video_url, r.video_title, r.channel_title, r.channel_id,
                    r.collected_at
             FROM ai_portraits p
             JOIN collection_runs r ON r.id = p.run_id
             ORDER BY p.created_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PortraitSummary {
                    run_id: row.get(0)?,
                    portrait_created_at: row.get(1)?,
                    parse_ok: row.get::<_, i64>(2)? != 0,
                    prompt_name: row.get(3)?,
                    prompt_version: row.get(4)?,
                    provider: row.get(5)?,
                    model: row.get(6)?,
                    video_id: row.get(7)?,
                    video_url: row.get(8)?,
                    video_title: row.get(9)?,
                    channel_title: row.get(10)?,
                    channel_id: row.get(11)?,
                    collected_at: row.get(12)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All collection runs, newest first.
    pub fn list_collection_runs(&self) -> Result<Vec<CollectionRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, video_id, video_url, video_title, channel_title, channel_id,
                    collected_at, order_mode, max_comments
             FROM collection_runs
             ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<CollectionRun> {
    Ok(CollectionRun {
        run_id: row.get(0)?,
        video_id: row.get(1)?,
        video_url: row.get(2)?,
        video_title: row.get(3)?,
        channel_title: row.get(4)?,
        channel_id: row.get(5)?,
        collected_at: row.get(6)?,
        order_mode: row.get(7)?,
        max_comments: row.get(8)?,
    })
}

fn row_to_portrait(row: &rusqlite::Row) -> rusqlite::Result<PortraitRecord> {
    Ok(PortraitRecord {
        run_id: row.get(0)?,
        created_at: row.get(1)?,
        provider: row.get(2)?,
        model: row.get(3)?,
        prompt_name: row.get(4)?,
        prompt_version: row.get(5)?,
        input_json: row.get(6)?,
        portrait_json: row.get(7)?,
        portrait_raw: row.get(8)?,
        parse_ok: row.get::<_, i64>(9)? != 0,
        error: row.get(10)?,
    })
}

/// Denormalized convenience fields are pulled out of the payload for
/// inspection; the full item is preserved verbatim in `item_json`.
fn insert_raw_thread(conn: &Connection, run_id: i64, video_id: &str, item: &Value) -> Result<bool> {
    let thread_id = item
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let snippet = item.get("snippet").and_then(Value::as_object);
    let top_snippet = snippet
        .and_then(|s| s.get("topLevelComment"))
        .and_then(Value::as_object)
        .and_then(|t| t.get("snippet"))
        .and_then(Value::as_object);

    let published_at = top_snippet.and_then(|s| s.get("publishedAt")).and_then(Value::as_str);
    let author = top_snippet
        .and_then(|s| s.get("authorDisplayName"))
        .and_then(Value::as_str);
    let text_original = top_snippet.and_then(|s| s.get("textDisplay")).and_then(Value::as_str);
    let like_count = top_snippet.and_then(|s| s.get("likeCount")).and_then(Value::as_i64);
    let reply_count = snippet.and_then(|s| s.get("totalReplyCount")).and_then(Value::as_i64);

    let affected = conn.execute(
        "INSERT OR IGNORE INTO raw_comment_threads (
            run_id, video_id, thread_id, fetched_at,
            published_at, author, like_count, reply_count,
            text_original, item_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run_id,
            video_id,
            thread_id,
            utc_now_iso(),
            published_at,
            author,
            like_count,
            reply_count,
            text_original,
            item.to_string(),
        ],
    )?;
    Ok(affected > 0)
}

fn insert_clean_comment(conn: &Connection, run_id: i64, comment: &NewCleanComment) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO clean_comments (
            run_id, raw_thread_id, video_id, comment_id, cleaned_at,
            published_at, author, like_count, reply_count,
            text, text_original
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            run_id,
            comment.raw_thread_id,
            comment.video_id,
            comment.comment_id,
            utc_now_iso(),
            comment.published_at,
            comment.author,
            comment.like_count,
            comment.reply_count,
            comment.text,
            comment.text_original,
        ],
    )?;
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn setup_store() -> (RunStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = RunStore::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn thread_item(thread_id: &str) -> Value {
        json!({
            "id": thread_id,
            "snippet": {
                "totalReplyCount": 1,
                "topLevelComment": {
                    "id": format!("c-{thread_id}"),
                    "snippet": {
                        "publishedAt": "2024-05-01T10:00:00Z",
                        "authorDisplayName": "viewer",
                        "likeCount": 3,
                        "textDisplay": "nice"
                    }
                }
            }
        })
    }

    #[test]
    fn test_run_ids_strictly_increase() {
        let (store, _dir) = setup_store();
        let a = store
            .insert_collection_run("vid-a", "https://youtu.be/vid-a", OrderMode::Relevance, 50)
            .unwrap();
        let b = store
            .insert_collection_run("vid-a", "https://youtu.be/vid-a", OrderMode::Time, 20)
            .unwrap();
        assert!(b > a);
        assert_eq!(store.latest_run_id().unwrap(), Some(b));
    }

    #[test]
    fn test_latest_run_id_empty_store() {
        let (store, _dir) = setup_store();
        assert_eq!(store.latest_run_id().unwrap(), None);
    }

    #[test]
    fn test_insert_raw_thread_idempotent_per_run() {
        let (store, _dir) = setup_store();
        let run = store
            .insert_collection_run("vid", "https://youtu.be/vid", OrderMode::Relevance, 50)
            .unwrap();

        assert!(store.insert_raw_thread(run, "vid", &thread_item("t-1")).unwrap());
        assert!(!store.insert_raw_thread(run, "vid", &thread_item("t-1")).unwrap());
        assert_eq!(store.raw_thread_count(run).unwrap(), 1);

        // The same thread under a different run is a distinct row.
        let other = store
            .insert_collection_run("vid", "https://youtu.be/vid", OrderMode::Relevance, 50)
            .unwrap();
        assert!(store.insert_raw_thread(other, "vid", &thread_item("t-1")).unwrap());
    }

    #[test]
    fn test_raw_threads_in_insertion_order() {
        let (mut store, _dir) = setup_store();
        let run = store
            .insert_collection_run("vid", "https://youtu.be/vid", OrderMode::Relevance, 50)
            .unwrap();
        let items: Vec<Value> = ["t-3", "t-1", "t-2"].iter().map(|t| thread_item(t)).collect();
        assert_eq!(store.insert_raw_threads(run, "vid", &items).unwrap(), 3);

        let rows = store.raw_threads(run).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["t-3", "t-1", "t-2"]);
    }

    fn sample_clean(comment_id: &str, raw_thread_id: i64) -> NewCleanComment {
        NewCleanComment {
            raw_thread_id,
            video_id: "vid".to_string(),
            comment_id: comment_id.to_string(),
            published_at: Some("2024-05-01T10:00:00Z".to_string()),
            author: Some("viewer".to_string()),
            like_count: Some(3),
            reply_count: Some(1),
            text: "nice".to_string(),
            text_original: "nice\n".to_string(),
        }
    }

    #[test]
    fn test_insert_clean_comment_idempotent() {
        let (store, _dir) = setup_store();
        let run = store
            .insert_collection_run("vid", "https://youtu.be/vid", OrderMode::Relevance, 50)
            .unwrap();
        store.insert_raw_thread(run, "vid", &thread_item("t-1")).unwrap();
        let raw_id = store.raw_threads(run).unwrap()[0].id;

        assert!(store.insert_clean_comment(run, &sample_clean("c-1", raw_id)).unwrap());
        assert!(!store.insert_clean_comment(run, &sample_clean("c-1", raw_id)).unwrap());
        assert_eq!(store.clean_comments(run).unwrap().len(), 1);
    }

    fn sample_portrait(run_id: i64, raw: &str, parse_ok: bool) -> NewPortrait {
        NewPortrait {
            run_id,
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            prompt_name: Some("audience_portrait".to_string()),
            prompt_version: Some(1),
            input_json: "{}".to_string(),
            portrait_json: parse_ok.then(|| raw.to_string()),
            portrait_raw: Some(raw.to_string()),
            parse_ok,
            error: (!parse_ok).then(|| "portrait JSON parse failed".to_string()),
        }
    }

    #[test]
    fn test_upsert_portrait_replaces_every_field() {
        let (store, _dir) = setup_store();
        let run = store
            .insert_collection_run("vid", "https://youtu.be/vid", OrderMode::Relevance, 50)
            .unwrap();

        store.upsert_ai_portrait(&sample_portrait(run, r#"{"summary":"v1"}"#, true)).unwrap();
        store.upsert_ai_portrait(&sample_portrait(run, "not json at all", false)).unwrap();

        let record = store.get_ai_portrait(run).unwrap().unwrap();
        assert!(!record.parse_ok);
        assert_eq!(record.portrait_json, None);
        assert_eq!(record.portrait_raw.as_deref(), Some("not json at all"));
        assert!(record.error.is_some());

        // Still exactly one row for the run.
        let all = store.list_ai_portraits().unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_delete_portrait_absent_returns_zero() {
        let (store, _dir) = setup_store();
        let run = store
            .insert_collection_run("vid", "https://youtu.be/vid", OrderMode::Relevance, 50)
            .unwrap();
        assert_eq!(store.delete_ai_portrait(run).unwrap(), 0);

        store.upsert_ai_portrait(&sample_portrait(run, "{}", true)).unwrap();
        assert_eq!(store.delete_ai_portrait(run).unwrap(), 1);
        assert_eq!(store.delete_ai_portrait(run).unwrap(), 0);
    }

    #[test]
    fn test_portrait_detail_joins_run_metadata() {
        let (store, _dir) = setup_store();
        let run = store
            .insert_collection_run("vid", "https://youtu.be/vid", OrderMode::Relevance, 50)
            .unwrap();
        store
            .update_run_metadata(
                run,
                &VideoMetadata {
                    video_title: Some("A Video".to_string()),
                    channel_title: Some("A Channel".to_string()),
                    channel_id: Some("UC123".to_string()),
                },
            )
            .unwrap();
        store.upsert_ai_portrait(&sample_portrait(run, "{}", true)).unwrap();

        let detail = store.portrait_detail(run).unwrap().unwrap();
        assert_eq!(detail.video_id, "vid");
        assert_eq!(detail.video_title.as_deref(), Some("A Video"));
        assert_eq!(detail.channel_id.as_deref(), Some("UC123"));
        assert!(store.portrait_detail(run + 1).unwrap().is_none());
    }

    #[test]
    fn test_list_collection_runs_newest_first() {
        let (store, _dir) = setup_store();
        let a = store
            .insert_collection_run("vid-a", "https://youtu.be/vid-a", OrderMode::Relevance, 50)
            .unwrap();
        let b = store
            .insert_collection_run("vid-b", "https://youtu.be/vid-b", OrderMode::Time, 20)
            .unwrap();

        let runs = store.list_collection_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, b);
        assert_eq!(runs[1].run_id, a);
        assert_eq!(runs[1].order_mode, "relevance");
    }
}
