//! Data model — posts, publications, channels, and blacklist rules.
//!
//! A `Post` is authored content with a lifecycle of its own; a `Publication`
//! is one planned-vs-actual delivery record for that post. Publications are
//! the audit trail and are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Post lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Sent,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Draft,
        }
    }
}

/// Publication delivery state.
///
/// A retried publication stays `Pending` — it simply is not due again until
/// its advanced `ready_at` passes. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Pending,
    Delivered,
    Failed,
    Cancelled,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "delivered" => Self::Delivered,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

/// A destination channel. The engine treats it as an opaque foreign key;
/// the ledger stores it so the Telegram port can resolve chat + token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub title: String,
    /// Telegram chat id, `@username`, or a `t.me/...` link.
    pub chat_id: String,
    pub bot_token: String,
    /// Fixed offset from UTC, in minutes. Used for daily slots and the
    /// allowed posting window.
    pub utc_offset_minutes: i32,
    /// Preferred daily send time, "HH:MM" in channel-local time.
    pub daily_time: String,
    /// Allowed posting window, "HH:MM" each, channel-local.
    pub window_start: String,
    pub window_end: String,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(title: &str, chat_id: &str, bot_token: &str) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            chat_id: chat_id.to_string(),
            bot_token: bot_token.to_string(),
            utc_offset_minutes: 180,
            daily_time: "10:00".to_string(),
            window_start: "08:00".to_string(),
            window_end: "22:00".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Destination handle handed to the delivery port.
    pub fn destination(&self) -> ChannelRef {
        ChannelRef {
            chat_id: self.chat_id.clone(),
            bot_token: self.bot_token.clone(),
        }
    }
}

/// Resolved destination for one delivery call.
#[derive(Debug, Clone)]
pub struct ChannelRef {
    pub chat_id: String,
    pub bot_token: String,
}

/// One attached media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    /// "photo", "video", or "document" (aliases are normalized by the port).
    #[serde(rename = "type", default)]
    pub kind: String,
    pub url: String,
}

/// One inline URL button under the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub url: String,
}

/// Per-post delivery options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostOptions {
    #[serde(default)]
    pub disable_notification: bool,
    #[serde(default)]
    pub protect_content: bool,
    #[serde(default)]
    pub disable_preview: bool,
    #[serde(default)]
    pub pin: bool,
}

/// Authored content awaiting or having been scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub channel_id: i64,
    pub title: String,
    pub body_html: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub buttons: Vec<InlineButton>,
    #[serde(default)]
    pub options: PostOptions,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(channel_id: i64, title: &str, body_html: &str) -> Self {
        Self {
            id: 0,
            channel_id,
            title: title.to_string(),
            body_html: body_html.to_string(),
            media: Vec::new(),
            buttons: Vec::new(),
            options: PostOptions::default(),
            status: PostStatus::Draft,
            created_at: Utc::now(),
        }
    }

    /// The content snapshot handed to the delivery port.
    pub fn rendered(&self) -> RenderedPost {
        RenderedPost {
            html: self.body_html.clone(),
            media: self.media.clone(),
            buttons: self.buttons.clone(),
            options: self.options.clone(),
        }
    }
}

/// Rendered content for one delivery call.
#[derive(Debug, Clone)]
pub struct RenderedPost {
    pub html: String,
    pub media: Vec<MediaItem>,
    pub buttons: Vec<InlineButton>,
    pub options: PostOptions,
}

/// One planned-vs-actual delivery record for a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: i64,
    pub post_id: i64,
    /// Copied from the post at creation time so later channel edits do not
    /// retroactively change history.
    pub channel_id: i64,
    /// The originally requested send time. Never changes.
    pub planned_at: DateTime<Utc>,
    /// When this attempt becomes eligible. Equals `planned_at` initially,
    /// advanced on retry, never moved backward.
    pub ready_at: DateTime<Utc>,
    /// Actual delivery time. Set if and only if status is `Delivered`.
    pub sent_at: Option<DateTime<Utc>>,
    pub status: PublicationStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Delivery receipt id returned by the channel, when delivered.
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Blacklist rule kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Word,
    Domain,
    Regex,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Domain => "domain",
            Self::Regex => "regex",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "domain" => Self::Domain,
            "regex" => Self::Regex,
            _ => Self::Word,
        }
    }
}

/// A content blacklist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistRule {
    pub id: i64,
    pub kind: RuleKind,
    pub pattern: String,
    pub enabled: bool,
}
