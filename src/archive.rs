//! Read-only access to the source archive (a SQLite database).
//!
//! Expected schema:
//!
//! ```text
//! options(key, value)                 -- must hold 'database_version'
//! person(id, name, email)
//! discussion_group(id, name)
//! group_message(id, discussion_group, number, date, subject, content,
//!               person, topic_id, parent_id)   -- date: YYYY-MM-DD HH:MM:SS
//! attachment(id, message_id, filename, content)
//! ```

use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::model::record::{Attachment, Group, Message, Person, PersonIndex};

/// Storage format of `group_message.date`.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What a conversion needs to know before touching any group.
#[derive(Debug)]
pub struct ArchiveIndex {
    /// Value of the `database_version` option, for diagnostics only.
    pub version: String,
    pub persons: PersonIndex,
    pub groups: Vec<Group>,
}

/// An open source archive.
pub struct Archive {
    conn: Connection,
}

impl Archive {
    /// Open an archive read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ConvertError::FileNotFound(path));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!(path = %path.display(), "Opened archive");
        Ok(Self { conn })
    }

    /// Load the version, persons and groups, enforcing that none is missing.
    pub fn load_index(&self) -> Result<ArchiveIndex> {
        let version = self.database_version()?;
        debug!(version = %version, "Archive database version");

        let persons = self.persons()?;
        if persons.is_empty() {
            return Err(ConvertError::EmptyArchive("person"));
        }
        debug!(count = persons.len(), "Found persons");

        let groups = self.groups()?;
        if groups.is_empty() {
            return Err(ConvertError::EmptyArchive("discussion_group"));
        }
        debug!(count = groups.len(), "Found groups");

        Ok(ArchiveIndex {
            version,
            persons: PersonIndex::new(persons),
            groups,
        })
    }

    /// The `database_version` option.
    pub fn database_version(&self) -> Result<String> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM options WHERE key = 'database_version'",
                [],
                |row| column_bytes(row, 0),
            )
            .optional()?;
        match value {
            Some(bytes) => Ok(String::from_utf8_lossy(&bytes).trim().to_string()),
            None => Err(ConvertError::MissingOption("database_version".to_string())),
        }
    }

    /// All persons, ordered by id.
    pub fn persons(&self) -> Result<Vec<Person>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, email FROM person ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Person {
                id: row.get(0)?,
                name: column_bytes(row, 1)?,
                email: column_bytes(row, 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All groups, ordered by id.
    pub fn groups(&self) -> Result<Vec<Group>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM discussion_group ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Group {
                id: row.get(0)?,
                name: String::from_utf8_lossy(&column_bytes(row, 1)?).into_owned(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Row ids of a group's messages, ordered by thread then message number.
    pub fn message_ids(&self, group_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM group_message WHERE discussion_group = ?1 \
             ORDER BY topic_id, number, id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
    }

    /// Every row matching `(group_id, id)`.
    ///
    /// A consistent archive returns exactly one; the caller checks.
    pub fn message(&self, group_id: i64, id: i64) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, number, date, subject, content, person, topic_id, parent_id \
             FROM group_message WHERE discussion_group = ?1 AND id = ?2",
        )?;
        let rows = stmt.query_map(params![group_id, id], message_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Attachments of a message row, ordered by id.
    pub fn attachments(&self, message_id: i64) -> Result<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, message_id, filename, content FROM attachment \
             WHERE message_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![message_id], |row| {
            Ok(Attachment {
                id: row.get(0)?,
                message_id: row.get(1)?,
                filename: String::from_utf8_lossy(&column_bytes(row, 2)?).into_owned(),
                content: column_bytes(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let raw_date = column_bytes(row, 2)?;
    let date = parse_date(&raw_date).unwrap_or_else(|| {
        warn!(
            id,
            date = %String::from_utf8_lossy(&raw_date),
            "Unparseable message date, using Unix epoch"
        );
        DateTime::UNIX_EPOCH.naive_utc()
    });

    Ok(Message {
        id,
        number: row.get(1)?,
        date,
        subject: column_bytes(row, 3)?,
        content: column_bytes(row, 4)?,
        person: row.get(5)?,
        topic_id: row.get(6)?,
        parent_id: row.get(7)?,
    })
}

/// Parse a stored `YYYY-MM-DD HH:MM:SS` timestamp.
fn parse_date(raw: &[u8]) -> Option<NaiveDateTime> {
    let text = std::str::from_utf8(raw).ok()?;
    NaiveDateTime::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Read any column as bytes, whatever its storage class. NULL reads as empty.
fn column_bytes(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Vec::new(),
        ValueRef::Integer(i) => i.to_string().into_bytes(),
        ValueRef::Real(f) => f.to_string().into_bytes(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
    })
}
