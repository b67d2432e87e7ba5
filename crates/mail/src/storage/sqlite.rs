//! SQLite-based mail storage

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::codec::{BodyCodec, ZstdCodec};
use super::traits::MailStore;
use crate::models::{
    EmailAddress, EmailRecord, MessageId, MessageStub, STARRED_LABEL, SyncCursor, ThreadId,
    UNREAD_LABEL,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks
/// which migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Sync cursor per account
            CREATE TABLE sync_cursor (
                account_id TEXT PRIMARY KEY,
                token TEXT,
                last_sync_at TEXT NOT NULL,
                in_progress INTEGER NOT NULL DEFAULT 0
            );

            -- One stub per observed remote message id
            CREATE TABLE message_stubs (
                account_id TEXT NOT NULL,
                id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                PRIMARY KEY (account_id, id)
            );

            CREATE INDEX idx_stubs_thread ON message_stubs(account_id, thread_id);

            -- Full content; subject/snippet/bodies are sealed by the codec
            CREATE TABLE emails (
                account_id TEXT NOT NULL,
                id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                from_name TEXT,
                from_email TEXT NOT NULL,
                to_json TEXT NOT NULL DEFAULT '[]',
                subject BLOB NOT NULL,
                snippet BLOB NOT NULL,
                body_text BLOB,
                body_html BLOB,
                is_read INTEGER NOT NULL DEFAULT 1,
                is_starred INTEGER NOT NULL DEFAULT 0,
                internal_date INTEGER NOT NULL,
                received_at TEXT NOT NULL,
                PRIMARY KEY (account_id, id)
            );

            CREATE INDEX idx_emails_received ON emails(account_id, received_at DESC);

            -- Labels on messages (many-to-many)
            CREATE TABLE email_labels (
                account_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                label_id TEXT NOT NULL,
                PRIMARY KEY (account_id, message_id, label_id)
            );

            CREATE INDEX idx_email_labels_label ON email_labels(account_id, label_id);
            "#,
        ),
    ])
}

/// SQLite-based mail storage
///
/// Metadata lives in queryable columns; sensitive fields pass through the
/// configured [`BodyCodec`] on every read and write.
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
    codec: Box<dyn BodyCodec>,
}

impl SqliteMailStore {
    /// Open (or create) a store at the given path with the default codec
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_codec(db_path, Box::new(ZstdCodec::new()))
    }

    /// Open a store with an explicit codec for sensitive fields
    pub fn with_codec(db_path: impl AsRef<Path>, codec: Box<dyn BodyCodec>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL for concurrent readers during writes; NORMAL sync is safe
        // under WAL and avoids an fsync per transaction.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .context("Failed to configure SQLite pragmas")?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
            codec,
        })
    }

    fn seal(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.codec.seal(plaintext)
    }

    fn seal_opt(&self, plaintext: Option<&str>) -> Result<Option<Vec<u8>>> {
        plaintext.map(|p| self.codec.seal(p)).transpose()
    }

    fn open_sealed(&self, sealed: &[u8]) -> Result<String> {
        self.codec.open(sealed)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {}", raw))
}

impl MailStore for SqliteMailStore {
    fn insert_stubs(&self, stubs: &[MessageStub]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO message_stubs (account_id, id, thread_id, first_seen_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for stub in stubs {
                inserted += stmt.execute(params![
                    stub.account_id,
                    stub.id.as_str(),
                    stub.thread_id.as_str(),
                    stub.first_seen_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn existing_message_ids(
        &self,
        account_id: &str,
        ids: &[MessageId],
    ) -> Result<HashSet<MessageId>> {
        let conn = self.conn.lock().unwrap();
        let mut existing = HashSet::new();

        // SQLite caps bound parameters; stay well under it per query.
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT id FROM message_stubs WHERE account_id = ? AND id IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let params_iter = std::iter::once(account_id.to_string())
                .chain(chunk.iter().map(|id| id.as_str().to_string()));
            let rows = stmt.query_map(rusqlite::params_from_iter(params_iter), |row| {
                row.get::<_, String>(0)
            })?;
            for row in rows {
                existing.insert(MessageId::new(row?));
            }
        }

        Ok(existing)
    }

    fn existing_email_ids(
        &self,
        account_id: &str,
        ids: &[MessageId],
    ) -> Result<HashSet<MessageId>> {
        let conn = self.conn.lock().unwrap();
        let mut existing = HashSet::new();

        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT id FROM emails WHERE account_id = ? AND id IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let params_iter = std::iter::once(account_id.to_string())
                .chain(chunk.iter().map(|id| id.as_str().to_string()));
            let rows = stmt.query_map(rusqlite::params_from_iter(params_iter), |row| {
                row.get::<_, String>(0)
            })?;
            for row in rows {
                existing.insert(MessageId::new(row?));
            }
        }

        Ok(existing)
    }

    fn has_message(&self, account_id: &str, id: &MessageId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_stubs WHERE account_id = ?1 AND id = ?2",
            params![account_id, id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn count_stubs(&self, account_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_stubs WHERE account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert_email_if_absent(&self, record: EmailRecord) -> Result<bool> {
        let subject = self.seal(&record.subject)?;
        let snippet = self.seal(&record.snippet)?;
        let body_text = self.seal_opt(record.body_text.as_deref())?;
        let body_html = self.seal_opt(record.body_html.as_deref())?;
        let to_json = serde_json::to_string(&record.to)?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let created = tx.execute(
            "INSERT OR IGNORE INTO emails
             (account_id, id, thread_id, from_name, from_email, to_json,
              subject, snippet, body_text, body_html,
              is_read, is_starred, internal_date, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.account_id,
                record.id.as_str(),
                record.thread_id.as_str(),
                record.from.name,
                record.from.email,
                to_json,
                subject,
                snippet,
                body_text,
                body_html,
                record.is_read,
                record.is_starred,
                record.internal_date,
                record.received_at.to_rfc3339(),
            ],
        )? > 0;

        if created {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO email_labels (account_id, message_id, label_id)
                 VALUES (?1, ?2, ?3)",
            )?;
            for label in &record.label_ids {
                stmt.execute(params![record.account_id, record.id.as_str(), label])?;
            }
            drop(stmt);
        }

        tx.commit()?;
        Ok(created)
    }

    fn get_email(&self, account_id: &str, id: &MessageId) -> Result<Option<EmailRecord>> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT thread_id, from_name, from_email, to_json,
                        subject, snippet, body_text, body_html,
                        is_read, is_starred, internal_date, received_at
                 FROM emails WHERE account_id = ?1 AND id = ?2",
                params![account_id, id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, Option<Vec<u8>>>(6)?,
                        row.get::<_, Option<Vec<u8>>>(7)?,
                        row.get::<_, bool>(8)?,
                        row.get::<_, bool>(9)?,
                        row.get::<_, i64>(10)?,
                        row.get::<_, String>(11)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            thread_id,
            from_name,
            from_email,
            to_json,
            subject,
            snippet,
            body_text,
            body_html,
            is_read,
            is_starred,
            internal_date,
            received_at,
        )) = row
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare_cached(
            "SELECT label_id FROM email_labels WHERE account_id = ?1 AND message_id = ?2",
        )?;
        let labels = stmt
            .query_map(params![account_id, id.as_str()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let from = match from_name {
            Some(name) => EmailAddress::with_name(name, from_email),
            None => EmailAddress::new(from_email),
        };

        Ok(Some(EmailRecord {
            id: id.clone(),
            thread_id: ThreadId::new(thread_id),
            account_id: account_id.to_string(),
            from,
            to: serde_json::from_str(&to_json)?,
            subject: self.open_sealed(&subject)?,
            snippet: self.open_sealed(&snippet)?,
            body_text: body_text.as_deref().map(|b| self.open_sealed(b)).transpose()?,
            body_html: body_html.as_deref().map(|b| self.open_sealed(b)).transpose()?,
            is_read,
            is_starred,
            label_ids: labels.into_iter().collect(),
            internal_date,
            received_at: parse_timestamp(&received_at)?,
        }))
    }

    fn apply_label_delta(
        &self,
        account_id: &str,
        id: &MessageId,
        added: &[String],
        removed: &[String],
    ) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM emails WHERE account_id = ?1 AND id = ?2",
            params![account_id, id.as_str()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(false);
        }

        {
            let mut add_stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO email_labels (account_id, message_id, label_id)
                 VALUES (?1, ?2, ?3)",
            )?;
            for label in added {
                add_stmt.execute(params![account_id, id.as_str(), label])?;
            }
            let mut del_stmt = tx.prepare_cached(
                "DELETE FROM email_labels
                 WHERE account_id = ?1 AND message_id = ?2 AND label_id = ?3",
            )?;
            for label in removed {
                del_stmt.execute(params![account_id, id.as_str(), label])?;
            }
        }

        // Re-derive flags from the resulting label set
        tx.execute(
            "UPDATE emails SET
                is_read = NOT EXISTS (
                    SELECT 1 FROM email_labels
                    WHERE account_id = ?1 AND message_id = ?2 AND label_id = ?3),
                is_starred = EXISTS (
                    SELECT 1 FROM email_labels
                    WHERE account_id = ?1 AND message_id = ?2 AND label_id = ?4)
             WHERE account_id = ?1 AND id = ?2",
            params![account_id, id.as_str(), UNREAD_LABEL, STARRED_LABEL],
        )?;

        tx.commit()?;
        Ok(true)
    }

    fn delete_message(&self, account_id: &str, id: &MessageId) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM email_labels WHERE account_id = ?1 AND message_id = ?2",
            params![account_id, id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM emails WHERE account_id = ?1 AND id = ?2",
            params![account_id, id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM message_stubs WHERE account_id = ?1 AND id = ?2",
            params![account_id, id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT token, last_sync_at, in_progress
                 FROM sync_cursor WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((token, last_sync_at, in_progress)) => Ok(Some(SyncCursor {
                account_id: account_id.to_string(),
                token,
                last_sync_at: parse_timestamp(&last_sync_at)?,
                in_progress,
            })),
            None => Ok(None),
        }
    }

    fn save_cursor(&self, cursor: SyncCursor) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_cursor (account_id, token, last_sync_at, in_progress)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account_id) DO UPDATE SET
                token = excluded.token,
                last_sync_at = excluded.last_sync_at,
                in_progress = excluded.in_progress",
            params![
                cursor.account_id,
                cursor.token,
                cursor.last_sync_at.to_rfc3339(),
                cursor.in_progress,
            ],
        )?;
        Ok(())
    }

    fn set_sync_in_progress(&self, account_id: &str, in_progress: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_cursor (account_id, token, last_sync_at, in_progress)
             VALUES (?1, NULL, ?2, ?3)
             ON CONFLICT(account_id) DO UPDATE SET in_progress = excluded.in_progress",
            params![account_id, Utc::now().to_rfc3339(), in_progress],
        )?;
        Ok(())
    }

    fn delete_account_data(&self, account_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM email_labels WHERE account_id = ?1",
            params![account_id],
        )?;
        tx.execute("DELETE FROM emails WHERE account_id = ?1", params![account_id])?;
        tx.execute(
            "DELETE FROM message_stubs WHERE account_id = ?1",
            params![account_id],
        )?;
        tx.execute(
            "DELETE FROM sync_cursor WHERE account_id = ?1",
            params![account_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}
