//! Write MBOX mailboxes with periodic flushing and size-based rotation.
//!
//! A group's output starts as `<stem>.mbox`. When a size limit is set, the
//! on-disk size is checked after every periodic flush; once it reaches the
//! limit the file is closed and the next message goes to `<stem>_1.mbox`,
//! then `<stem>_2.mbox`, and so on. Because the check only happens at flush
//! points, a file can exceed the limit by up to `flush_after - 1` messages.
//!
//! Every path opened during a run is recorded in [`ClaimedPaths`]. A rotated
//! name already taken by another group is skipped, so one group's output is
//! never truncated by another's.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::compose::message::BuiltMessage;
use crate::config::{FlushPolicy, SizeLimit};
use crate::error::{ConvertError, Result};
use crate::export::lock::DotLock;

/// Date format of the `From ` separator line (C `asctime`).
const ENVELOPE_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// What a writer produced, returned by [`MailboxWriter::finish`].
#[derive(Debug, Clone, Default)]
pub struct MailboxSummary {
    /// Every file written, in order.
    pub files: Vec<PathBuf>,
    /// Messages appended across all files.
    pub messages: u64,
    /// Total on-disk size of all files.
    pub bytes: u64,
}

/// Mailbox paths opened so far in one run.
#[derive(Debug, Default)]
pub struct ClaimedPaths {
    paths: HashSet<PathBuf>,
}

impl ClaimedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if a writer of this run already opened `path`.
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Record `path`; `false` if it was already taken.
    pub(crate) fn claim(&mut self, path: &Path) -> bool {
        self.paths.insert(path.to_path_buf())
    }
}

/// The currently open, locked mailbox file.
struct ActiveMailbox {
    path: PathBuf,
    out: BufWriter<File>,
    lock: DotLock,
}

/// Appends messages to a group's mailbox sequence.
///
/// The active file stays locked from the moment it is opened until it is
/// closed by rotation, [`finish`](Self::finish) or [`abandon`](Self::abandon).
pub struct MailboxWriter<'a> {
    claimed: &'a mut ClaimedPaths,
    dir: PathBuf,
    stem: String,
    flush: FlushPolicy,
    max_bytes: Option<u64>,
    active: Option<ActiveMailbox>,
    next_sequence: u32,
    since_flush: u64,
    messages: u64,
    files: Vec<PathBuf>,
}

impl<'a> MailboxWriter<'a> {
    /// Open and lock `<dir>/<stem>.mbox`, recording it in `claimed`.
    ///
    /// Fails with [`ConvertError::Locked`] if a lock file already exists, or
    /// with [`ConvertError::Io`] if the file cannot be created.
    pub fn create(
        dir: &Path,
        stem: &str,
        flush: FlushPolicy,
        size_limit: SizeLimit,
        claimed: &'a mut ClaimedPaths,
    ) -> Result<Self> {
        Self::with_byte_limit(dir, stem, flush, size_limit.bytes(), claimed)
    }

    fn with_byte_limit(
        dir: &Path,
        stem: &str,
        flush: FlushPolicy,
        max_bytes: Option<u64>,
        claimed: &'a mut ClaimedPaths,
    ) -> Result<Self> {
        let mut writer = Self {
            claimed,
            dir: dir.to_path_buf(),
            stem: stem.to_string(),
            flush,
            max_bytes,
            active: None,
            next_sequence: 0,
            since_flush: 0,
            messages: 0,
            files: Vec::new(),
        };
        writer.open_next()?;
        Ok(writer)
    }

    /// Append one message, flushing and rotating as configured.
    pub fn append(&mut self, message: &BuiltMessage) -> Result<()> {
        let active = match self.active {
            Some(ref mut active) => active,
            None => self.open_next()?,
        };

        write_message(&mut active.out, message).map_err(|e| ConvertError::io(&active.path, e))?;
        self.messages += 1;
        self.since_flush += 1;

        if let FlushPolicy::Every(n) = self.flush {
            if self.since_flush >= n {
                self.flush_active()?;
                self.since_flush = 0;
                self.check_rotation()?;
            }
        }
        Ok(())
    }

    /// Flush, unlock and close the active file.
    pub fn finish(mut self) -> Result<MailboxSummary> {
        if let Some(active) = self.active.take() {
            close(active)?;
        }

        let mut bytes = 0;
        for path in &self.files {
            let meta = std::fs::metadata(path).map_err(|e| ConvertError::OutputSize {
                path: path.clone(),
                source: e,
            })?;
            bytes += meta.len();
        }

        Ok(MailboxSummary {
            files: self.files,
            messages: self.messages,
            bytes,
        })
    }

    /// Close the active file after a failure, logging instead of returning
    /// errors. The lock is released either way.
    pub fn abandon(mut self) {
        if let Some(active) = self.active.take() {
            let path = active.path.clone();
            if let Err(e) = close(active) {
                warn!(path = %path.display(), error = %e, "Failed to close abandoned mailbox");
            }
        }
    }

    fn open_next(&mut self) -> Result<&mut ActiveMailbox> {
        let mut path = mailbox_path(&self.dir, &self.stem, self.next_sequence);
        while !self.claimed.claim(&path) {
            warn!(
                path = %path.display(),
                "Mailbox name already used by another group, skipping it"
            );
            self.next_sequence += 1;
            path = mailbox_path(&self.dir, &self.stem, self.next_sequence);
        }

        let lock = DotLock::acquire(&path)?;
        let file = File::create(&path).map_err(|e| ConvertError::io(&path, e))?;
        info!(path = %path.display(), "Opened mailbox");

        self.next_sequence += 1;
        self.files.push(path.clone());
        Ok(self.active.insert(ActiveMailbox {
            path,
            out: BufWriter::new(file),
            lock,
        }))
    }

    fn flush_active(&mut self) -> Result<()> {
        if let Some(active) = self.active.as_mut() {
            sync(active)?;
            debug!(path = %active.path.display(), messages = self.messages, "Flushed mailbox");
        }
        Ok(())
    }

    /// After a flush: close the active file if it reached the size limit.
    /// The next append opens the following file.
    fn check_rotation(&mut self) -> Result<()> {
        let (Some(limit), Some(active)) = (self.max_bytes, self.active.as_ref()) else {
            return Ok(());
        };

        let size = std::fs::metadata(&active.path)
            .map_err(|e| ConvertError::OutputSize {
                path: active.path.clone(),
                source: e,
            })?
            .len();

        if size >= limit {
            info!(
                path = %active.path.display(),
                size,
                limit,
                "Mailbox reached size limit, rotating"
            );
            if let Some(active) = self.active.take() {
                close(active)?;
            }
        }
        Ok(())
    }
}

fn sync(active: &mut ActiveMailbox) -> Result<()> {
    active
        .out
        .flush()
        .and_then(|()| active.out.get_ref().sync_data())
        .map_err(|e| ConvertError::io(&active.path, e))
}

fn close(mut active: ActiveMailbox) -> Result<()> {
    sync(&mut active)?;
    let ActiveMailbox { path, out, lock } = active;
    drop(out);
    lock.release()?;
    debug!(path = %path.display(), "Closed mailbox");
    Ok(())
}

/// Write one message in MBOX format: separator line, message with body
/// lines starting with `From ` quoted as `>From `, then a blank line.
fn write_message(out: &mut impl Write, message: &BuiltMessage) -> std::io::Result<()> {
    writeln!(
        out,
        "From {} {}",
        message.envelope_sender,
        message.envelope_date.format(ENVELOPE_DATE_FORMAT)
    )?;

    for line in message.bytes.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b"From ") {
            out.write_all(b">")?;
        }
        out.write_all(line)?;
    }
    if !message.bytes.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    out.write_all(b"\n")
}

/// `<dir>/<stem>.mbox` for sequence 0, `<dir>/<stem>_<n>.mbox` after that.
pub fn mailbox_path(dir: &Path, stem: &str, sequence: u32) -> PathBuf {
    if sequence == 0 {
        dir.join(format!("{stem}.mbox"))
    } else {
        dir.join(format!("{stem}_{sequence}.mbox"))
    }
}

/// Make a group name safe as a filename stem.
///
/// Replaces characters other than alphanumerics, `-`, `.`, `_` and `@` with
/// `_`, and strips leading dots.
pub fn mailbox_stem(group_name: &str) -> String {
    let sanitized: String = group_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized.to_string()
    }
}
