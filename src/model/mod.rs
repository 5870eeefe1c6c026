//! Core data model: archive records and synthetic addresses.

pub mod address;
pub mod record;
