//! Throw-away SQLite archives for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pgo2mbox::config::{ConvertOptions, DateMode, FlushPolicy, SizeLimit};
use rusqlite::{params, Connection};

const SCHEMA: &str = "
CREATE TABLE options (key TEXT PRIMARY KEY, value TEXT);
CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT, email TEXT);
CREATE TABLE discussion_group (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE group_message (
    id INTEGER PRIMARY KEY,
    discussion_group INTEGER,
    number INTEGER,
    date TEXT,
    subject TEXT,
    content TEXT,
    person INTEGER,
    topic_id INTEGER,
    parent_id INTEGER
);
CREATE TABLE attachment (id INTEGER PRIMARY KEY, message_id INTEGER, filename TEXT, content BLOB);
INSERT INTO options VALUES ('database_version', '3');
";

/// An archive file under construction.
pub struct ArchiveFixture {
    pub path: PathBuf,
    conn: Connection,
}

impl ArchiveFixture {
    /// Create `archive.pgo` with the full schema inside `dir`.
    pub fn create(dir: &Path) -> Self {
        let path = dir.join("archive.pgo");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self { path, conn }
    }

    pub fn person(&self, id: i64, name: &[u8], email: &[u8]) -> &Self {
        self.conn
            .execute(
                "INSERT INTO person VALUES (?1, ?2, ?3)",
                params![id, name, email],
            )
            .unwrap();
        self
    }

    pub fn group(&self, id: i64, name: &str) -> &Self {
        self.conn
            .execute("INSERT INTO discussion_group VALUES (?1, ?2)", params![id, name])
            .unwrap();
        self
    }

    /// Insert a message dated 2001-01-01 10:00:00 with subject `Message <number>`.
    #[allow(clippy::too_many_arguments)]
    pub fn message(
        &self,
        id: i64,
        group: i64,
        number: i64,
        topic_id: i64,
        parent_id: Option<i64>,
        person: i64,
        content: &[u8],
    ) -> &Self {
        let subject = format!("Message {number}");
        self.message_with_subject(
            id,
            group,
            number,
            topic_id,
            parent_id,
            person,
            subject.as_bytes(),
            content,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn message_with_subject(
        &self,
        id: i64,
        group: i64,
        number: i64,
        topic_id: i64,
        parent_id: Option<i64>,
        person: i64,
        subject: &[u8],
        content: &[u8],
    ) -> &Self {
        self.conn
            .execute(
                "INSERT INTO group_message VALUES (?1, ?2, ?3, '2001-01-01 10:00:00', ?4, ?5, ?6, ?7, ?8)",
                params![id, group, number, subject, content, person, topic_id, parent_id],
            )
            .unwrap();
        self
    }

    pub fn attachment(&self, id: i64, message_id: i64, filename: &str, content: &[u8]) -> &Self {
        self.conn
            .execute(
                "INSERT INTO attachment VALUES (?1, ?2, ?3, ?4)",
                params![id, message_id, filename, content],
            )
            .unwrap();
        self
    }

    pub fn execute(&self, sql: &str) -> &Self {
        self.conn.execute_batch(sql).unwrap();
        self
    }
}

/// Deterministic options writing into `out`, which is created.
pub fn options(out: &Path, flush: FlushPolicy, size_limit: SizeLimit) -> ConvertOptions {
    std::fs::create_dir_all(out).unwrap();
    ConvertOptions::new(out, "archive.pgo", flush, size_limit, DateMode::Utc).unwrap()
}

/// Raw messages of an MBOX file, separator lines excluded.
pub fn read_mbox(path: &Path) -> Vec<Vec<u8>> {
    let file = std::io::BufReader::new(std::fs::File::open(path).unwrap());
    mail_parser::mailbox::mbox::MessageIterator::new(file)
        .map(|m| m.unwrap().contents().to_vec())
        .collect()
}

/// Number of `From ` separator lines in a file.
pub fn count_envelopes(path: &Path) -> usize {
    std::fs::read(path)
        .unwrap()
        .split(|&b| b == b'\n')
        .filter(|line| line.starts_with(b"From "))
        .count()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
