use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the data-store procedure returning notifications due for sending.
pub const RPC_EMAILS_TO_BE_SENT: &str = "get_emails_to_be_sent";
/// Table receiving per-record delivery status.
pub const TABLE_EMAIL_NOTIFICATIONS: &str = "email_notifications";
/// Destination every notification links to.
pub const DESTINATION_URL: &str = "https://21-days.mikacheng.com";

/// Notification content types the dispatcher knows how to render.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ProjectExpired,
    EntryMissed,
}

impl NotificationKind {
    /// Batch order: expired projects first, then missed entries.
    pub const ALL: [NotificationKind; 2] =
        [NotificationKind::ProjectExpired, NotificationKind::EntryMissed];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ProjectExpired => "project_expired",
            NotificationKind::EntryMissed => "entry_missed",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "project_expired" => Some(NotificationKind::ProjectExpired),
            "entry_missed" => Some(NotificationKind::EntryMissed),
            _ => None,
        }
    }
}

/// Content column of a notification row. Values outside [`NotificationKind`]
/// are kept verbatim so they can be written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationContent {
    Known(NotificationKind),
    Unrecognized(String),
}

impl NotificationContent {
    pub fn kind(&self) -> Option<NotificationKind> {
        match self {
            NotificationContent::Known(kind) => Some(*kind),
            NotificationContent::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationContent::Known(kind) => kind.as_str(),
            NotificationContent::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for NotificationContent {
    fn from(raw: String) -> Self {
        match NotificationKind::parse_kind(&raw) {
            Some(kind) => NotificationContent::Known(kind),
            None => NotificationContent::Unrecognized(raw),
        }
    }
}

impl From<NotificationContent> for String {
    fn from(content: NotificationContent) -> Self {
        match content {
            NotificationContent::Known(kind) => kind.as_str().to_string(),
            NotificationContent::Unrecognized(raw) => raw,
        }
    }
}

impl From<NotificationKind> for NotificationContent {
    fn from(kind: NotificationKind) -> Self {
        NotificationContent::Known(kind)
    }
}

/// Row identifier as handed out by the data store. Integer and string keys
/// are written back in the representation they arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(id) => write!(f, "{}", id),
            RowId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId::Int(id)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        RowId::Text(id.to_string())
    }
}

/// A notification eligible for sending at fetch time. The store may hand
/// out nulls for any of the optional columns; such records are still
/// reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: RowId,
    pub project_id: RowId,
    pub preferred_email: Option<String>,
    pub content: Option<NotificationContent>,
    pub title: Option<String>,
}

impl NotificationRecord {
    pub fn kind(&self) -> Option<NotificationKind> {
        self.content.as_ref().and_then(NotificationContent::kind)
    }
}

/// One blind-copy recipient of the batched send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub email: String,
    pub subject: String,
    pub html: String,
}

/// Outcome of the single batch send, applied to every record of a run.
/// The mailer gives no per-recipient confirmation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    EmailSent,
    EmailFailed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::EmailSent => "email_sent",
            DeliveryOutcome::EmailFailed => "email_failed",
        }
    }
}

/// Row written back for every fetched record, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: RowId,
    pub project_id: RowId,
    pub sent_to: Option<String>,
    pub content: Option<NotificationContent>,
    pub status: DeliveryOutcome,
    pub updated_at: DateTime<Utc>,
}
