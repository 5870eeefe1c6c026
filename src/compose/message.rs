//! Assemble one RFC 5322 message from an archive message and its attachments.
//!
//! Header values and attachment parts are serialized by `mail-builder`. The
//! HTML body is copied byte for byte and the multipart framing uses a
//! boundary derived from the content, so the same archive always yields the
//! same mailbox.

use std::io;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use mail_builder::headers::content_type::ContentType;
use mail_builder::headers::raw::Raw;
use mail_builder::headers::text::Text;
use mail_builder::mime::MimePart;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::compose::header::{self, write_header};
use crate::config::DateMode;
use crate::error::{ConvertError, Result};
use crate::model::address;
use crate::model::record::{Attachment, Group, Message, Person, PersonIndex};

/// `Date:` header format (RFC 2822).
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// A message ready to be appended to a mailbox.
#[derive(Debug, Clone)]
pub struct BuiltMessage {
    /// Message number within its group, for logging.
    pub number: i64,
    /// The `Message-ID` header value, angle brackets included.
    pub message_id: String,
    /// Sender for the mailbox `From ` separator line.
    pub envelope_sender: String,
    /// Date for the mailbox `From ` separator line.
    pub envelope_date: NaiveDateTime,
    /// Headers and body, LF line endings, without the separator line.
    pub bytes: Vec<u8>,
}

/// Builds messages for one group.
pub struct MessageBuilder<'a> {
    group: &'a Group,
    persons: &'a PersonIndex,
    source_name: &'a str,
    dates: DateMode,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(
        group: &'a Group,
        persons: &'a PersonIndex,
        source_name: &'a str,
        dates: DateMode,
    ) -> Self {
        Self {
            group,
            persons,
            source_name,
            dates,
        }
    }

    /// Build a message.
    ///
    /// Fails when the author cannot be resolved, which means the archive is
    /// inconsistent. Header-encoding problems are logged and replaced by
    /// deterministic fallbacks.
    pub fn build(&self, message: &Message, attachments: &[Attachment]) -> Result<BuiltMessage> {
        let group = self.group.name.as_str();
        let author = self
            .persons
            .get(message.person)
            .ok_or_else(|| ConvertError::UnknownAuthor {
                group: group.to_string(),
                number: message.number,
                person: message.person,
            })?;

        let sender = address::pseudo_address(&author.email, author.id);
        let message_id = address::message_id(group, message.number);

        debug!(
            group,
            number = message.number,
            from = %sender,
            date = %message.date,
            "Building message"
        );

        let mut bytes = Vec::with_capacity(message.content.len() + 1024);
        self.write_message(&mut bytes, message, attachments, author, &sender, &message_id)
            .map_err(|e| ConvertError::Compose {
                group: group.to_string(),
                number: message.number,
                source: e,
            })?;

        Ok(BuiltMessage {
            number: message.number,
            message_id,
            envelope_sender: sender,
            envelope_date: message.date,
            bytes,
        })
    }

    fn write_message(
        &self,
        out: &mut Vec<u8>,
        message: &Message,
        attachments: &[Attachment],
        author: &Person,
        sender: &str,
        message_id: &str,
    ) -> io::Result<()> {
        let group = self.group.name.as_str();

        let from = header::sender(&author.name, sender).unwrap_or_else(|e| {
            warn!(
                group,
                number = message.number,
                person = author.id,
                error = %e,
                "Sender name cannot be encoded, using address only"
            );
            header::sender_fallback(sender)
        });
        write_header(out, "From", &from)?;
        write_header(out, "To", &Raw::new(address::group_address(group)))?;

        match header::subject(&message.subject) {
            Ok(subject) => write_header(out, "Subject", &subject)?,
            Err(e) => {
                warn!(
                    group,
                    number = message.number,
                    id = message.id,
                    error = %e,
                    "Subject cannot be encoded, using synthetic subject"
                );
                write_header(out, "Subject", &header::subject_fallback(&message.subject))?;
            }
        }

        let date = self.header_date(message.date).format(DATE_FORMAT).to_string();
        write_header(out, "Date", &Raw::new(date))?;
        write_header(out, "Message-ID", &Raw::new(message_id))?;
        if !message.is_thread_root() {
            let parent = address::message_id(group, message.topic_id);
            write_header(out, "In-Reply-To", &Raw::new(parent))?;
        }
        write_header(out, "MIME-Version", &Raw::new("1.0"))?;
        self.write_provenance(out, message)?;

        if attachments.is_empty() {
            write_header(out, "Content-Type", &html_content_type())?;
            write_header(out, "Content-Transfer-Encoding", &Raw::new("8bit"))?;
            out.push(b'\n');
            out.extend_from_slice(&message.content);
            return Ok(());
        }

        debug!(
            group,
            number = message.number,
            count = attachments.len(),
            "Attaching files"
        );
        let boundary = boundary_for(group, message, attachments);
        write_header(
            out,
            "Content-Type",
            &ContentType::new("multipart/mixed").attribute("boundary", boundary.clone()),
        )?;
        out.push(b'\n');
        write_multipart(out, &boundary, &message.content, attachments)
    }

    /// Give the naive archive timestamp an offset.
    fn header_date(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        match self.dates {
            DateMode::Utc => Utc.from_utc_datetime(&naive).into(),
            // Times skipped by a DST change have no local equivalent.
            DateMode::Local => match Local.from_local_datetime(&naive).earliest() {
                Some(local) => local.into(),
                None => Utc.from_utc_datetime(&naive).into(),
            },
        }
    }

    fn write_provenance(&self, out: &mut Vec<u8>, message: &Message) -> io::Result<()> {
        let version = format!("pgo2mbox {}", env!("CARGO_PKG_VERSION"));
        write_header(out, "X-Converted-By", &Raw::new(version))?;
        if let Ok(source) = header::header_text(self.source_name.as_bytes()) {
            write_header(out, "X-Archive-Source", &Text::new(source))?;
        }
        if let Ok(group) = header::header_text(self.group.name.as_bytes()) {
            write_header(out, "X-Archive-Group", &Text::new(group))?;
        }
        write_header(out, "X-Archive-Number", &Raw::new(message.number.to_string()))?;
        write_header(out, "X-Archive-Topic", &Raw::new(message.topic_id.to_string()))
    }
}

fn html_content_type() -> ContentType<'static> {
    ContentType::new("text/html").attribute("charset", "utf-8")
}

/// `multipart/mixed` body: the HTML content verbatim as the first part, then
/// one `application/octet-stream` part per attachment.
fn write_multipart(
    out: &mut Vec<u8>,
    boundary: &str,
    content: &[u8],
    attachments: &[Attachment],
) -> io::Result<()> {
    out.extend_from_slice(format!("--{boundary}\n").as_bytes());
    write_header(out, "Content-Type", &html_content_type())?;
    write_header(out, "Content-Transfer-Encoding", &Raw::new("8bit"))?;
    out.push(b'\n');
    out.extend_from_slice(content);

    for attachment in attachments {
        out.extend_from_slice(format!("\n--{boundary}\n").as_bytes());
        let mut part = Vec::with_capacity(attachment.content.len() * 4 / 3 + 256);
        MimePart::new("application/octet-stream", attachment.content.as_slice())
            .attachment(attachment.filename.as_str())
            .write_part(&mut part)?;
        let part = header::crlf_to_lf(&part);
        out.extend_from_slice(part.strip_suffix(b"\n").unwrap_or(&part));
    }

    out.extend_from_slice(format!("\n--{boundary}--\n").as_bytes());
    Ok(())
}

/// Deterministic multipart boundary derived from the message's content.
///
/// Boundaries start with `=_`, which cannot occur in base64 data.
fn boundary_for(group: &str, message: &Message, attachments: &[Attachment]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(group.as_bytes());
    hasher.update(message.number.to_le_bytes());
    hasher.update(&message.content);
    for attachment in attachments {
        hasher.update(attachment.filename.as_bytes());
        hasher.update(&attachment.content);
    }
    let digest = hex::encode(hasher.finalize());
    format!("=_pgo2mbox_{}", &digest[..32])
}
