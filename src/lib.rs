//! `pgo2mbox`: convert offline discussion-group archives to MBOX.
//!
//! This crate reads an archive stored as a SQLite database (persons, groups,
//! messages, attachments) and writes one MBOX mailbox per group, optionally
//! split into numbered files once a size threshold is reached.

pub mod archive;
pub mod compose;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
