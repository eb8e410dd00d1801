//! SQLite persistence for channels, posts, publications, blacklist rules,
//! and the audit log.
//!
//! Publication state is mutated through two doors only: `commit` (the
//! dispatch loop writing an attempt outcome) and `cancel_publication` (an
//! external actor, allowed only while pending). Each outcome is a single
//! UPDATE so readers never observe a half-written record.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};

use telepost_core::error::{Result, TelepostError};
use telepost_core::types::{
    BlacklistRule, Channel, ChannelRef, Post, PostStatus, Publication, PublicationStatus,
    RenderedPost, RuleKind,
};

/// Everything the dispatch loop needs for one delivery call, loaded in the
/// pre-dispatch re-check.
#[derive(Debug, Clone)]
pub struct DispatchItem {
    pub publication: Publication,
    pub rendered: RenderedPost,
    pub destination: ChannelRef,
}

/// Outcome of one delivery attempt, committed atomically.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Delivered {
        sent_at: DateTime<Utc>,
        message_id: Option<String>,
    },
    /// Stays pending; not due again until the new `ready_at`.
    Retry {
        attempt_count: u32,
        ready_at: DateTime<Utc>,
        error: String,
    },
    /// Terminal. No further attempts.
    Failed {
        attempt_count: u32,
        error: String,
    },
}

/// The publication ledger.
pub struct Ledger {
    conn: Connection,
}

fn db_err(e: rusqlite::Error) -> TelepostError {
    TelepostError::Ledger(e.to_string())
}

/// Fixed-width UTC timestamps so string comparison in SQL matches time order.
fn fmt_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl Ledger {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        let ledger = Self { conn };
        ledger.migrate()?;
        tracing::debug!(path = %path.display(), "ledger opened");
        Ok(ledger)
    }

    /// In-memory ledger, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let ledger = Self { conn };
        ledger.migrate()?;
        Ok(ledger)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                bot_token TEXT NOT NULL,
                utc_offset_minutes INTEGER NOT NULL DEFAULT 180,
                daily_time TEXT NOT NULL DEFAULT '10:00',
                window_start TEXT NOT NULL DEFAULT '08:00',
                window_end TEXT NOT NULL DEFAULT '22:00',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL REFERENCES channels(id),
                title TEXT NOT NULL,
                body_html TEXT NOT NULL DEFAULT '',
                media TEXT NOT NULL DEFAULT '[]',       -- JSON array
                buttons TEXT NOT NULL DEFAULT '[]',     -- JSON array
                options TEXT NOT NULL DEFAULT '{}',     -- JSON object
                status TEXT NOT NULL DEFAULT 'draft',
                created_at TEXT NOT NULL
            );

            -- One row per planned delivery. Never deleted.
            CREATE TABLE IF NOT EXISTS publications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id),
                channel_id INTEGER NOT NULL,            -- copied at creation
                planned_at TEXT NOT NULL,
                ready_at TEXT NOT NULL,
                sent_at TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                message_id TEXT,
                created_at TEXT NOT NULL
            );

            -- Due-set selection is an index-ordered range query.
            CREATE INDEX IF NOT EXISTS idx_publications_due
                ON publications (status, ready_at, planned_at, id);

            CREATE TABLE IF NOT EXISTS blacklist_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,                     -- 'word', 'domain', 'regex'
                pattern TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                entity_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                meta TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
         ",
            )
            .map_err(db_err)?;
        Ok(())
    }

    // ─── Channels ──────────────────────────────────────

    pub fn create_channel(&self, channel: &Channel) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO channels
                 (title, chat_id, bot_token, utc_offset_minutes, daily_time, window_start, window_end, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    channel.title,
                    channel.chat_id,
                    channel.bot_token,
                    channel.utc_offset_minutes,
                    channel.daily_time,
                    channel.window_start,
                    channel.window_end,
                    fmt_ts(&channel.created_at),
                ],
            )
            .map_err(db_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_channel(&self, id: i64) -> Result<Channel> {
        self.conn
            .query_row(
                "SELECT id, title, chat_id, bot_token, utc_offset_minutes, daily_time,
                        window_start, window_end, created_at
                 FROM channels WHERE id = ?1",
                params![id],
                channel_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    TelepostError::not_found(format!("channel {id}"))
                }
                other => db_err(other),
            })
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, chat_id, bot_token, utc_offset_minutes, daily_time,
                        window_start, window_end, created_at
                 FROM channels ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], channel_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ─── Posts ──────────────────────────────────────

    pub fn create_post(&self, post: &Post) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO posts (channel_id, title, body_html, media, buttons, options, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    post.channel_id,
                    post.title,
                    post.body_html,
                    serde_json::to_string(&post.media)?,
                    serde_json::to_string(&post.buttons)?,
                    serde_json::to_string(&post.options)?,
                    post.status.as_str(),
                    fmt_ts(&post.created_at),
                ],
            )
            .map_err(db_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_post(&self, id: i64) -> Result<Post> {
        self.conn
            .query_row(
                "SELECT id, channel_id, title, body_html, media, buttons, options, status, created_at
                 FROM posts WHERE id = ?1",
                params![id],
                post_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    TelepostError::not_found(format!("post {id}"))
                }
                other => db_err(other),
            })
    }

    pub fn set_post_status(&self, id: i64, status: PostStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE posts SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    // ─── Publications ──────────────────────────────────────

    /// Create a pending publication for a post. `ready_at` starts equal to
    /// `planned_at`; the channel reference is copied so later channel edits
    /// do not rewrite history. At most one pending publication per post.
    pub fn schedule(&self, post_id: i64, planned_at: DateTime<Utc>) -> Result<i64> {
        let post = self.get_post(post_id)?;
        let pending: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM publications WHERE post_id = ?1 AND status = 'pending'",
                params![post_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if pending > 0 {
            return Err(TelepostError::ledger(format!(
                "post {post_id} already has a pending publication"
            )));
        }

        self.conn
            .execute(
                "INSERT INTO publications
                 (post_id, channel_id, planned_at, ready_at, status, attempt_count, created_at)
                 VALUES (?1, ?2, ?3, ?3, 'pending', 0, ?4)",
                params![post_id, post.channel_id, fmt_ts(&planned_at), fmt_ts(&Utc::now())],
            )
            .map_err(db_err)?;
        let id = self.conn.last_insert_rowid();

        self.set_post_status(post_id, PostStatus::Scheduled)?;
        self.audit(
            "publication",
            id,
            "schedule",
            serde_json::json!({ "planned_at": fmt_ts(&planned_at) }),
        )?;
        Ok(id)
    }

    pub fn get_publication(&self, id: i64) -> Result<Publication> {
        self.conn
            .query_row(
                "SELECT id, post_id, channel_id, planned_at, ready_at, sent_at, status,
                        attempt_count, last_error, message_id, created_at
                 FROM publications WHERE id = ?1",
                params![id],
                publication_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    TelepostError::not_found(format!("publication {id}"))
                }
                other => db_err(other),
            })
    }

    /// Ids of every pending publication whose `ready_at` has passed, in the
    /// dispatch order: oldest `ready_at` first, ties by `planned_at`, then
    /// id. This comparison is also the catch-up mechanism — items missed
    /// during downtime are still pending with `ready_at` in the past.
    pub fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM publications
                 WHERE status = 'pending' AND ready_at <= ?1
                 ORDER BY ready_at ASC, planned_at ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![fmt_ts(&now)], |row| row.get::<_, i64>(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Pre-dispatch re-check and load. Returns `None` when the publication
    /// is no longer pending (cancelled between selection and dispatch).
    pub fn dispatch_item(&self, publication_id: i64) -> Result<Option<DispatchItem>> {
        let publication = self.get_publication(publication_id)?;
        if publication.status != PublicationStatus::Pending {
            return Ok(None);
        }
        let post = self.get_post(publication.post_id)?;
        let channel = self.get_channel(publication.channel_id)?;
        Ok(Some(DispatchItem {
            rendered: post.rendered(),
            destination: channel.destination(),
            publication,
        }))
    }

    /// Commit one attempt outcome. Status, attempt count, ready_at,
    /// sent_at, and last_error land in a single UPDATE.
    pub fn commit(&self, publication_id: i64, outcome: &CommitOutcome) -> Result<()> {
        let publication = self.get_publication(publication_id)?;
        match outcome {
            CommitOutcome::Delivered { sent_at, message_id } => {
                self.conn
                    .execute(
                        "UPDATE publications
                         SET status = 'delivered', sent_at = ?1, message_id = ?2, last_error = NULL
                         WHERE id = ?3",
                        params![fmt_ts(sent_at), message_id, publication_id],
                    )
                    .map_err(db_err)?;
                self.set_post_status(publication.post_id, PostStatus::Sent)?;
                self.audit(
                    "publication",
                    publication_id,
                    "send",
                    serde_json::json!({ "message_id": message_id }),
                )?;
            }
            CommitOutcome::Retry {
                attempt_count,
                ready_at,
                error,
            } => {
                self.conn
                    .execute(
                        "UPDATE publications
                         SET attempt_count = ?1, ready_at = ?2, last_error = ?3
                         WHERE id = ?4",
                        params![attempt_count, fmt_ts(ready_at), error, publication_id],
                    )
                    .map_err(db_err)?;
                self.audit(
                    "publication",
                    publication_id,
                    "retry",
                    serde_json::json!({ "error": error, "ready_at": fmt_ts(ready_at) }),
                )?;
            }
            CommitOutcome::Failed {
                attempt_count,
                error,
            } => {
                self.conn
                    .execute(
                        "UPDATE publications
                         SET status = 'failed', attempt_count = ?1, last_error = ?2
                         WHERE id = ?3",
                        params![attempt_count, error, publication_id],
                    )
                    .map_err(db_err)?;
                self.set_post_status(publication.post_id, PostStatus::Failed)?;
                self.audit(
                    "publication",
                    publication_id,
                    "fail",
                    serde_json::json!({ "error": error }),
                )?;
            }
        }
        Ok(())
    }

    /// Cancel a publication, allowed only while pending. Returns `false`
    /// when it was no longer pending (already delivered, failed, or
    /// cancelled) — the caller lost the race and nothing changed.
    pub fn cancel_publication(&self, publication_id: i64) -> Result<bool> {
        let publication = self.get_publication(publication_id)?;
        let changed = self
            .conn
            .execute(
                "UPDATE publications SET status = 'cancelled' WHERE id = ?1 AND status = 'pending'",
                params![publication_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Ok(false);
        }

        let remaining: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM publications WHERE post_id = ?1 AND status = 'pending'",
                params![publication.post_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if remaining == 0 {
            self.set_post_status(publication.post_id, PostStatus::Cancelled)?;
        }
        self.audit("publication", publication_id, "cancel", serde_json::json!({}))?;
        Ok(true)
    }

    /// Publications planned inside [start, end), for slot calculation.
    pub fn count_planned_between(
        &self,
        channel_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM publications
                 WHERE channel_id = ?1 AND planned_at >= ?2 AND planned_at < ?3",
                params![channel_id, fmt_ts(&start), fmt_ts(&end)],
                |row| row.get(0),
            )
            .map_err(db_err)
    }

    /// Publication counts by status, for the admin surface.
    pub fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM publications GROUP BY status ORDER BY status")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ─── Blacklist rules ──────────────────────────────────────

    pub fn add_blacklist_rule(&self, kind: RuleKind, pattern: &str) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO blacklist_rules (kind, pattern, enabled) VALUES (?1, ?2, 1)",
                params![kind.as_str(), pattern],
            )
            .map_err(db_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_rule_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE blacklist_rules SET enabled = ?1 WHERE id = ?2",
                params![enabled as i32, id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Enabled rules only — the policy snapshot handed to the validator.
    pub fn blacklist_rules(&self) -> Result<Vec<BlacklistRule>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, kind, pattern, enabled FROM blacklist_rules WHERE enabled = 1 ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BlacklistRule {
                    id: row.get(0)?,
                    kind: RuleKind::parse(&row.get::<_, String>(1)?),
                    pattern: row.get(2)?,
                    enabled: row.get::<_, i32>(3)? != 0,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ─── Audit log ──────────────────────────────────────

    pub fn audit(
        &self,
        entity_type: &str,
        entity_id: i64,
        action: &str,
        meta: serde_json::Value,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_log (entity_type, entity_id, action, meta, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entity_type, entity_id, action, meta.to_string(), fmt_ts(&Utc::now())],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Recorded actions for one entity, oldest first.
    pub fn audit_entries(&self, entity_type: &str, entity_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT action FROM audit_log
                 WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![entity_type, entity_id], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

// ─── Row mapping ──────────────────────────────────────

fn channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        title: row.get(1)?,
        chat_id: row.get(2)?,
        bot_token: row.get(3)?,
        utc_offset_minutes: row.get(4)?,
        daily_time: row.get(5)?,
        window_start: row.get(6)?,
        window_end: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?)?,
    })
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        title: row.get(2)?,
        body_html: row.get(3)?,
        media: serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        buttons: serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
        options: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        status: PostStatus::parse(&row.get::<_, String>(7)?),
        created_at: parse_ts(&row.get::<_, String>(8)?)?,
    })
}

fn publication_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Publication> {
    let sent_at = match row.get::<_, Option<String>>(5)? {
        Some(s) => Some(parse_ts(&s)?),
        None => None,
    };
    Ok(Publication {
        id: row.get(0)?,
        post_id: row.get(1)?,
        channel_id: row.get(2)?,
        planned_at: parse_ts(&row.get::<_, String>(3)?)?,
        ready_at: parse_ts(&row.get::<_, String>(4)?)?,
        sent_at,
        status: PublicationStatus::parse(&row.get::<_, String>(6)?),
        attempt_count: row.get(7)?,
        last_error: row.get(8)?,
        message_id: row.get(9)?,
        created_at: parse_ts(&row.get::<_, String>(10)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, h, m, 0).unwrap()
    }

    fn seed(ledger: &Ledger) -> (i64, i64) {
        let channel_id = ledger
            .create_channel(&Channel::new("News", "@news", "token"))
            .unwrap();
        let post_id = ledger
            .create_post(&Post::new(channel_id, "Post", "<b>hello</b>"))
            .unwrap();
        (channel_id, post_id)
    }

    #[test]
    fn test_schedule_creates_pending_publication() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();

        let publication = ledger.get_publication(pub_id).unwrap();
        assert_eq!(publication.status, PublicationStatus::Pending);
        assert_eq!(publication.planned_at, ts(9, 0));
        assert_eq!(publication.ready_at, ts(9, 0));
        assert_eq!(publication.attempt_count, 0);
        assert!(publication.sent_at.is_none());

        let post = ledger.get_post(post_id).unwrap();
        assert_eq!(post.status, PostStatus::Scheduled);
    }

    #[test]
    fn test_schedule_rejects_second_pending() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        ledger.schedule(post_id, ts(9, 0)).unwrap();
        assert!(ledger.schedule(post_id, ts(10, 0)).is_err());
    }

    #[test]
    fn test_select_due_ordering_by_ready_at() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (channel_id, _) = seed(&ledger);
        // insert out of order on purpose
        let mut ids = Vec::new();
        for (title, at) in [("c", ts(11, 0)), ("a", ts(9, 0)), ("b", ts(10, 0))] {
            let post_id = ledger.create_post(&Post::new(channel_id, title, "x")).unwrap();
            ids.push((at, ledger.schedule(post_id, at).unwrap()));
        }
        ids.sort_by_key(|(at, _)| *at);

        let due = ledger.select_due(ts(12, 0)).unwrap();
        let expected: Vec<i64> = ids.into_iter().map(|(_, id)| id).collect();
        assert_eq!(due, expected);
    }

    #[test]
    fn test_select_due_tie_broken_by_planned_at() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (channel_id, _) = seed(&ledger);
        let late_post = ledger.create_post(&Post::new(channel_id, "late", "x")).unwrap();
        let late_pub = ledger.schedule(late_post, ts(9, 5)).unwrap();
        let early_post = ledger.create_post(&Post::new(channel_id, "early", "x")).unwrap();
        let early_pub = ledger.schedule(early_post, ts(9, 0)).unwrap();

        // both retried to the same ready_at
        for id in [late_pub, early_pub] {
            ledger
                .commit(
                    id,
                    &CommitOutcome::Retry {
                        attempt_count: 1,
                        ready_at: ts(10, 0),
                        error: "flood".into(),
                    },
                )
                .unwrap();
        }

        let due = ledger.select_due(ts(10, 0)).unwrap();
        assert_eq!(due, vec![early_pub, late_pub]);
    }

    #[test]
    fn test_select_due_excludes_future_and_terminal() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (channel_id, post_id) = seed(&ledger);
        let due_pub = ledger.schedule(post_id, ts(9, 0)).unwrap();
        let future_post = ledger.create_post(&Post::new(channel_id, "later", "x")).unwrap();
        ledger.schedule(future_post, ts(18, 0)).unwrap();
        let failed_post = ledger.create_post(&Post::new(channel_id, "dead", "x")).unwrap();
        let failed_pub = ledger.schedule(failed_post, ts(8, 0)).unwrap();
        ledger
            .commit(
                failed_pub,
                &CommitOutcome::Failed {
                    attempt_count: 5,
                    error: "gone".into(),
                },
            )
            .unwrap();

        assert_eq!(ledger.select_due(ts(10, 0)).unwrap(), vec![due_pub]);
    }

    #[test]
    fn test_commit_delivered() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();
        ledger
            .commit(
                pub_id,
                &CommitOutcome::Delivered {
                    sent_at: ts(9, 1),
                    message_id: Some("42".into()),
                },
            )
            .unwrap();

        let publication = ledger.get_publication(pub_id).unwrap();
        assert_eq!(publication.status, PublicationStatus::Delivered);
        assert_eq!(publication.sent_at, Some(ts(9, 1)));
        assert_eq!(publication.message_id.as_deref(), Some("42"));
        assert!(publication.last_error.is_none());
        assert_eq!(ledger.get_post(post_id).unwrap().status, PostStatus::Sent);
        assert_eq!(ledger.audit_entries("publication", pub_id).unwrap(), vec!["schedule", "send"]);
    }

    #[test]
    fn test_commit_retry_keeps_pending_and_advances_ready_at() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();
        ledger
            .commit(
                pub_id,
                &CommitOutcome::Retry {
                    attempt_count: 1,
                    ready_at: ts(9, 30),
                    error: "network_error".into(),
                },
            )
            .unwrap();

        let publication = ledger.get_publication(pub_id).unwrap();
        assert_eq!(publication.status, PublicationStatus::Pending);
        assert_eq!(publication.attempt_count, 1);
        assert_eq!(publication.ready_at, ts(9, 30));
        assert!(publication.ready_at >= publication.planned_at);
        assert_eq!(publication.last_error.as_deref(), Some("network_error"));
        // not due until the new ready_at
        assert!(ledger.select_due(ts(9, 15)).unwrap().is_empty());
        assert_eq!(ledger.select_due(ts(9, 30)).unwrap(), vec![pub_id]);
    }

    #[test]
    fn test_commit_failed_terminal() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();
        ledger
            .commit(
                pub_id,
                &CommitOutcome::Failed {
                    attempt_count: 5,
                    error: "chat not found".into(),
                },
            )
            .unwrap();

        let publication = ledger.get_publication(pub_id).unwrap();
        assert_eq!(publication.status, PublicationStatus::Failed);
        assert_eq!(publication.attempt_count, 5);
        assert!(publication.sent_at.is_none());
        assert_eq!(ledger.get_post(post_id).unwrap().status, PostStatus::Failed);
    }

    #[test]
    fn test_cancel_only_while_pending() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();

        assert!(ledger.cancel_publication(pub_id).unwrap());
        assert_eq!(
            ledger.get_publication(pub_id).unwrap().status,
            PublicationStatus::Cancelled
        );
        assert_eq!(ledger.get_post(post_id).unwrap().status, PostStatus::Cancelled);
        // second cancel is a lost race, not an error
        assert!(!ledger.cancel_publication(pub_id).unwrap());
    }

    #[test]
    fn test_cancel_after_delivery_is_refused() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();
        ledger
            .commit(
                pub_id,
                &CommitOutcome::Delivered {
                    sent_at: ts(9, 1),
                    message_id: None,
                },
            )
            .unwrap();
        assert!(!ledger.cancel_publication(pub_id).unwrap());
        assert_eq!(
            ledger.get_publication(pub_id).unwrap().status,
            PublicationStatus::Delivered
        );
    }

    #[test]
    fn test_dispatch_item_skips_non_pending() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();

        assert!(ledger.dispatch_item(pub_id).unwrap().is_some());
        ledger.cancel_publication(pub_id).unwrap();
        assert!(ledger.dispatch_item(pub_id).unwrap().is_none());
    }

    #[test]
    fn test_dispatch_item_loads_destination() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (_, post_id) = seed(&ledger);
        let pub_id = ledger.schedule(post_id, ts(9, 0)).unwrap();
        let item = ledger.dispatch_item(pub_id).unwrap().unwrap();
        assert_eq!(item.destination.chat_id, "@news");
        assert_eq!(item.rendered.html, "<b>hello</b>");
    }

    #[test]
    fn test_count_planned_between() {
        let ledger = Ledger::open_in_memory().unwrap();
        let (channel_id, post_id) = seed(&ledger);
        ledger.schedule(post_id, ts(9, 0)).unwrap();
        let other = ledger.create_post(&Post::new(channel_id, "other", "x")).unwrap();
        ledger.schedule(other, ts(23, 30)).unwrap();

        let count = ledger
            .count_planned_between(channel_id, ts(0, 0), ts(12, 0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_blacklist_rules_enabled_only() {
        let ledger = Ledger::open_in_memory().unwrap();
        let keep = ledger.add_blacklist_rule(RuleKind::Word, "casino").unwrap();
        let off = ledger.add_blacklist_rule(RuleKind::Domain, "spam.example").unwrap();
        ledger.set_rule_enabled(off, false).unwrap();

        let rules = ledger.blacklist_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, keep);
        assert_eq!(rules[0].kind, RuleKind::Word);
    }
}
