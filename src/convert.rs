//! Group conversion: stream a group's messages into its mailbox sequence.
//!
//! Failures are scoped: a per-message encoding problem is logged and worked
//! around, a per-group failure abandons that group only, and only startup
//! errors (unreadable archive, missing tables) abort the run.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::archive::Archive;
use crate::compose::message::MessageBuilder;
use crate::config::ConvertOptions;
use crate::error::{ConvertError, Result};
use crate::export::mbox::{self, ClaimedPaths, MailboxWriter};
use crate::model::record::{Group, PersonIndex};

/// Per-message progress callback: `(group_name, done, total)`.
pub type Progress<'a> = &'a dyn Fn(&str, usize, usize);

/// Result of converting one group.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub group: String,
    pub messages: u64,
    pub attachments: u64,
    pub files: Vec<PathBuf>,
    pub bytes: u64,
}

/// Outcome of one group within a run.
#[derive(Debug)]
pub struct GroupOutcome {
    pub group: String,
    pub result: std::result::Result<GroupReport, ConvertError>,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Value of the archive's `database_version` option.
    pub database_version: String,
    pub groups: Vec<GroupOutcome>,
}

impl RunReport {
    /// Groups that were abandoned.
    pub fn failed_count(&self) -> usize {
        self.groups.iter().filter(|g| g.result.is_err()).count()
    }

    /// Reports of the groups that converted successfully.
    pub fn converted(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups.iter().filter_map(|g| g.result.as_ref().ok())
    }

    /// Messages written across all successful groups.
    pub fn total_messages(&self) -> u64 {
        self.converted().map(|r| r.messages).sum()
    }
}

/// Converts groups of one archive, one at a time.
pub struct GroupConverter<'a> {
    archive: &'a Archive,
    persons: &'a PersonIndex,
    options: &'a ConvertOptions,
}

impl<'a> GroupConverter<'a> {
    pub fn new(
        archive: &'a Archive,
        persons: &'a PersonIndex,
        options: &'a ConvertOptions,
    ) -> Self {
        Self {
            archive,
            persons,
            options,
        }
    }

    /// Convert one group into `<stem>.mbox` (and rotated siblings).
    ///
    /// Paths opened are recorded in `claimed`, which is shared by every group
    /// of the run. On error the mailbox is closed and unlocked before
    /// returning; the messages already written stay on disk.
    pub fn convert(
        &self,
        group: &Group,
        stem: &str,
        claimed: &mut ClaimedPaths,
        progress: Option<Progress<'_>>,
    ) -> Result<GroupReport> {
        let ids = self.archive.message_ids(group.id)?;
        info!(group = %group.name, count = ids.len(), "Converting group");

        let mut writer = MailboxWriter::create(
            &self.options.output_dir,
            stem,
            self.options.flush,
            self.options.size_limit,
            claimed,
        )?;

        match self.write_messages(group, &ids, &mut writer, progress) {
            Ok(attachments) => {
                let summary = writer.finish()?;
                Ok(GroupReport {
                    group: group.name.clone(),
                    messages: summary.messages,
                    attachments,
                    files: summary.files,
                    bytes: summary.bytes,
                })
            }
            Err(e) => {
                writer.abandon();
                Err(e)
            }
        }
    }

    /// Returns the number of attachments written.
    fn write_messages(
        &self,
        group: &Group,
        ids: &[i64],
        writer: &mut MailboxWriter,
        progress: Option<Progress<'_>>,
    ) -> Result<u64> {
        let builder = MessageBuilder::new(
            group,
            self.persons,
            &self.options.source_name,
            self.options.dates,
        );
        let mut attachment_count = 0;

        for (done, &id) in ids.iter().enumerate() {
            if let Some(report) = progress {
                report(&group.name, done, ids.len());
            }

            // Re-fetch each row: the id list and the rows must agree.
            let mut rows = self.archive.message(group.id, id)?;
            if rows.len() != 1 {
                return Err(ConvertError::Inconsistent {
                    group: group.name.clone(),
                    message_id: id,
                    rows: rows.len(),
                });
            }
            let message = rows.remove(0);

            let attachments = self.archive.attachments(message.id)?;
            if attachments.is_empty() && message.number != message.id {
                // Some exports key attachments by message number instead.
                debug!(
                    group = %group.name,
                    number = message.number,
                    id = message.id,
                    "No attachments found by message row id"
                );
            }
            let built = builder.build(&message, &attachments)?;
            writer.append(&built)?;
            attachment_count += attachments.len() as u64;
        }

        if let Some(report) = progress {
            report(&group.name, ids.len(), ids.len());
        }
        Ok(attachment_count)
    }
}

/// Convert every group of an archive.
///
/// Returns `Err` only for startup errors. Group failures are logged and
/// recorded in the returned [`RunReport`].
pub fn convert_archive(
    archive: &Archive,
    options: &ConvertOptions,
    progress: Option<Progress<'_>>,
) -> Result<RunReport> {
    options.validate()?;
    let index = archive.load_index()?;
    info!(
        version = %index.version,
        persons = index.persons.len(),
        groups = index.groups.len(),
        "Loaded archive"
    );

    let converter = GroupConverter::new(archive, &index.persons, options);
    let mut claimed = ClaimedPaths::new();
    let mut report = RunReport {
        database_version: index.version.clone(),
        groups: Vec::with_capacity(index.groups.len()),
    };

    for group in &index.groups {
        let stem = unique_stem(&options.output_dir, group, &claimed);
        let result = converter.convert(group, &stem, &mut claimed, progress);
        match &result {
            Ok(r) => info!(
                group = %r.group,
                messages = r.messages,
                attachments = r.attachments,
                files = r.files.len(),
                "Group converted"
            ),
            Err(e) => error!(
                group = %group.name,
                error = %e,
                "Group conversion failed, continuing with next group"
            ),
        }
        report.groups.push(GroupOutcome {
            group: group.name.clone(),
            result,
        });
    }

    let failed = report.failed_count();
    if failed > 0 {
        warn!(
            failed,
            total = report.groups.len(),
            "Some groups could not be converted"
        );
    }
    Ok(report)
}

/// Filename stem for a group whose first mailbox no earlier group opened.
///
/// Falls back to `<stem>-<group id>` (then `-<group id>-<n>`) on a clash.
fn unique_stem(dir: &Path, group: &Group, claimed: &ClaimedPaths) -> String {
    let stem = mbox::mailbox_stem(&group.name);
    if !claimed.contains(&mbox::mailbox_path(dir, &stem, 0)) {
        return stem;
    }

    let mut unique = format!("{stem}-{}", group.id);
    let mut n = 1;
    while claimed.contains(&mbox::mailbox_path(dir, &unique, 0)) {
        unique = format!("{stem}-{}-{n}", group.id);
        n += 1;
    }
    warn!(
        group = %group.name,
        stem = %unique,
        "Another group already wrote this file name, using group id suffix"
    );
    unique
}
