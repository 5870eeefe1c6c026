//! Mailbox output: locking, appending, flushing, and size-based rotation.

pub mod lock;
pub mod mbox;
