//! Rows read from the source archive.
//!
//! Free-text columns are kept as raw bytes: archives exported from the web
//! regularly contain text that is not valid UTF-8, and message bodies must
//! reach the mailbox byte-for-byte.

use std::collections::HashMap;

use chrono::NaiveDateTime;

/// An archive member, referenced as the author of messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    /// Source-assigned identifier, unique within one archive.
    pub id: i64,
    /// Display name as stored (may be empty or not UTF-8).
    pub name: Vec<u8>,
    /// Email column as stored (often empty or not an address at all).
    pub email: Vec<u8>,
}

/// A discussion group. Each group becomes one mailbox sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    /// Group name, also used as the output filename stem.
    pub name: String,
}

/// One message of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Row identity.
    pub id: i64,
    /// Public sequence number within the group.
    pub number: i64,
    /// Naive timestamp, interpreted according to [`crate::config::DateMode`].
    pub date: NaiveDateTime,
    pub subject: Vec<u8>,
    /// HTML body, copied verbatim into the mailbox.
    pub content: Vec<u8>,
    /// Author, a [`Person::id`].
    pub person: i64,
    /// Number of the first message of the thread.
    pub topic_id: i64,
    /// Number of the message this one answers, if any.
    pub parent_id: Option<i64>,
}

impl Message {
    /// `true` when the message starts its own thread.
    pub fn is_thread_root(&self) -> bool {
        self.number == self.topic_id
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: i64,
    pub message_id: i64,
    pub filename: String,
    pub content: Vec<u8>,
}

/// Lookup table of every person in the archive, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct PersonIndex {
    persons: HashMap<i64, Person>,
}

impl PersonIndex {
    pub fn new(persons: Vec<Person>) -> Self {
        Self {
            persons: persons.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&Person> {
        self.persons.get(&id)
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }
}
