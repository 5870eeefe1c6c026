//! Message composition: header encoding and MIME assembly.

pub mod header;
pub mod message;
