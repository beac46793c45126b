//! Event model for Parley.
//!
//! Every inbound chat message is normalized into an [`InboundEvent`] before it
//! reaches the engine:
//!
//! ```text
//! InboundEvent { bot, is_propagating, kind: MessageKind }
//! └── MessageKind
//!     ├── Group(GroupMessage { connection, group_id, user_id, role, text })
//!     └── Private(PrivateMessage { connection, user_id, text })
//! ```
//!
//! Dispatch branches on the [`MessageKind`] tag; there is no runtime type
//! inspection. Adapters that produce flat records can go through
//! [`NormalizedMessage`], whose conversion rejects unknown message types.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::bot::BoxedBot;
use crate::error::{ApiResult, EventError, EventResult};

// ============================================================================
// Identity types
// ============================================================================

/// Identifies the peer connection an event arrived on.
///
/// Cheap to clone; compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Creates a connection id from any string-like value.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Whether a command or event belongs to a group or a one-to-one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Group conversations.
    Group,
    /// One-to-one private conversations.
    Private,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => f.write_str("group"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Represents the role or permission level of a group member.
///
/// Ordered so that `Member < Admin < Owner`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Regular member with no special permissions.
    #[default]
    Member,
    /// Administrator with elevated permissions.
    Admin,
    /// Owner/creator of the group with full permissions.
    Owner,
}

impl MemberRole {
    /// Returns the lowercase name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl FromStr for MemberRole {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(EventError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who sent a message: the sender id plus the group it was sent in, if any.
///
/// Continuations are correlated on this identity together with the
/// connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSource {
    /// Sender's user id.
    pub user_id: i64,
    /// Group the message was sent in; `None` for private messages.
    pub group_id: Option<i64>,
}

impl MessageSource {
    /// A private-chat source.
    pub fn private(user_id: i64) -> Self {
        Self {
            user_id,
            group_id: None,
        }
    }

    /// A group-chat source.
    pub fn group(group_id: i64, user_id: i64) -> Self {
        Self {
            user_id,
            group_id: Some(group_id),
        }
    }
}

// ============================================================================
// Message payloads
// ============================================================================

/// A message posted in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    /// Connection the message arrived on.
    pub connection: ConnectionId,
    /// Group id.
    pub group_id: i64,
    /// Sender's user id.
    pub user_id: i64,
    /// Sender's role in the group, when the protocol reported it.
    pub role: Option<MemberRole>,
    /// Raw message text.
    pub text: String,
}

/// A one-to-one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    /// Connection the message arrived on.
    pub connection: ConnectionId,
    /// Sender's user id.
    pub user_id: i64,
    /// Raw message text.
    pub text: String,
}

/// The scope-specific payload of an [`InboundEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// A group message.
    Group(GroupMessage),
    /// A private message.
    Private(PrivateMessage),
}

// ============================================================================
// InboundEvent
// ============================================================================

/// A normalized inbound message together with its reply capability.
///
/// Events are shared as `Arc<InboundEvent>`: the engine, a handler and a
/// resumed continuation may all hold the same event. The only mutable part is
/// the propagation flag, which handlers clear through
/// [`stop_propagation`](Self::stop_propagation) to tell the caller not to
/// continue its generic event pipeline.
pub struct InboundEvent {
    kind: MessageKind,
    bot: BoxedBot,
    is_propagating: AtomicBool,
}

impl InboundEvent {
    /// Creates an event from a payload and the bot of the connection it
    /// arrived on.
    pub fn new(kind: MessageKind, bot: BoxedBot) -> Self {
        Self {
            kind,
            bot,
            is_propagating: AtomicBool::new(true),
        }
    }

    /// Creates a group-message event.
    pub fn group(message: GroupMessage, bot: BoxedBot) -> Self {
        Self::new(MessageKind::Group(message), bot)
    }

    /// Creates a private-message event.
    pub fn private(message: PrivateMessage, bot: BoxedBot) -> Self {
        Self::new(MessageKind::Private(message), bot)
    }

    /// Returns the scope-specific payload.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Returns whether this is a group or a private message.
    pub fn scope(&self) -> Scope {
        match &self.kind {
            MessageKind::Group(_) => Scope::Group,
            MessageKind::Private(_) => Scope::Private,
        }
    }

    /// Returns the connection the event arrived on.
    pub fn connection(&self) -> &ConnectionId {
        match &self.kind {
            MessageKind::Group(m) => &m.connection,
            MessageKind::Private(m) => &m.connection,
        }
    }

    /// Returns the raw message text.
    pub fn text(&self) -> &str {
        match &self.kind {
            MessageKind::Group(m) => &m.text,
            MessageKind::Private(m) => &m.text,
        }
    }

    /// Returns the sender's user id.
    pub fn user_id(&self) -> i64 {
        match &self.kind {
            MessageKind::Group(m) => m.user_id,
            MessageKind::Private(m) => m.user_id,
        }
    }

    /// Returns the group id for group messages.
    pub fn group_id(&self) -> Option<i64> {
        match &self.kind {
            MessageKind::Group(m) => Some(m.group_id),
            MessageKind::Private(_) => None,
        }
    }

    /// Returns the sender identity used for continuation correlation.
    pub fn source(&self) -> MessageSource {
        MessageSource {
            user_id: self.user_id(),
            group_id: self.group_id(),
        }
    }

    /// Returns the sender's group role.
    ///
    /// `None` for private messages. A group message without a reported role
    /// counts as an ordinary member.
    pub fn sender_role(&self) -> Option<MemberRole> {
        match &self.kind {
            MessageKind::Group(m) => Some(m.role.unwrap_or_default()),
            MessageKind::Private(_) => None,
        }
    }

    /// Returns the bot of the originating connection.
    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    /// Returns `true` while the caller should continue processing the event.
    pub fn is_propagating(&self) -> bool {
        self.is_propagating.load(Ordering::SeqCst)
    }

    /// Marks the event as fully handled.
    pub fn stop_propagation(&self) {
        self.is_propagating.store(false, Ordering::SeqCst);
    }

    /// Sends `text` back to the conversation this event came from.
    pub async fn reply(&self, text: &str) -> ApiResult<String> {
        self.bot.send(self, text).await
    }
}

impl fmt::Debug for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundEvent")
            .field("kind", &self.kind)
            .field("bot", &self.bot.id())
            .field("is_propagating", &self.is_propagating())
            .finish()
    }
}

// ============================================================================
// NormalizedMessage
// ============================================================================

/// A flat, serializable record adapters emit for every chat message.
///
/// `message_type` is `"group"` or `"private"`; anything else is rejected by
/// [`into_event`](Self::into_event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// `"group"` or `"private"`.
    pub message_type: String,
    /// Connection identifier.
    pub connection: String,
    /// Sender's user id.
    pub user_id: i64,
    /// Group id (group messages only).
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Sender role (group messages only).
    #[serde(default)]
    pub role: Option<MemberRole>,
    /// Raw text.
    #[serde(default)]
    pub text: String,
}

impl NormalizedMessage {
    /// Converts the record into an [`InboundEvent`] bound to `bot`.
    pub fn into_event(self, bot: BoxedBot) -> EventResult<InboundEvent> {
        let connection = ConnectionId::from(self.connection);
        match self.message_type.as_str() {
            "group" => {
                let group_id = self.group_id.ok_or(EventError::MissingGroupId {
                    user_id: self.user_id,
                })?;
                Ok(InboundEvent::group(
                    GroupMessage {
                        connection,
                        group_id,
                        user_id: self.user_id,
                        role: self.role,
                        text: self.text,
                    },
                    bot,
                ))
            }
            "private" => Ok(InboundEvent::private(
                PrivateMessage {
                    connection,
                    user_id: self.user_id,
                    text: self.text,
                },
                bot,
            )),
            other => Err(EventError::UnsupportedMessageType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Bot;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBot {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Bot for RecordingBot {
        fn id(&self) -> &str {
            "recording"
        }

        async fn send(&self, _event: &InboundEvent, message: &str) -> ApiResult<String> {
            self.sent.lock().unwrap().push(message.to_string());
            Ok("1".to_string())
        }
    }

    fn group_event(role: Option<MemberRole>) -> InboundEvent {
        InboundEvent::group(
            GroupMessage {
                connection: ConnectionId::new("conn-1"),
                group_id: 42,
                user_id: 7,
                role,
                text: "hello".into(),
            },
            Arc::new(RecordingBot::default()),
        )
    }

    #[test]
    fn test_role_ordering() {
        assert!(MemberRole::Member < MemberRole::Admin);
        assert!(MemberRole::Admin < MemberRole::Owner);
        assert_eq!("ADMIN".parse::<MemberRole>().unwrap(), MemberRole::Admin);
        assert!("moderator".parse::<MemberRole>().is_err());
    }

    #[test]
    fn test_group_accessors() {
        let event = group_event(Some(MemberRole::Owner));
        assert_eq!(event.scope(), Scope::Group);
        assert_eq!(event.connection().as_str(), "conn-1");
        assert_eq!(event.source(), MessageSource::group(42, 7));
        assert_eq!(event.sender_role(), Some(MemberRole::Owner));
        assert_eq!(event.text(), "hello");
    }

    #[test]
    fn test_missing_role_counts_as_member() {
        let event = group_event(None);
        assert_eq!(event.sender_role(), Some(MemberRole::Member));
    }

    #[test]
    fn test_stop_propagation() {
        let event = group_event(None);
        assert!(event.is_propagating());
        event.stop_propagation();
        assert!(!event.is_propagating());
    }

    #[tokio::test]
    async fn test_reply_goes_through_bot() {
        let bot = Arc::new(RecordingBot::default());
        let event = InboundEvent::private(
            PrivateMessage {
                connection: ConnectionId::new("c"),
                user_id: 1,
                text: "hi".into(),
            },
            bot.clone(),
        );
        event.reply("pong").await.unwrap();
        assert_eq!(*bot.sent.lock().unwrap(), vec!["pong".to_string()]);
    }

    struct OfflineBot;

    #[async_trait]
    impl Bot for OfflineBot {
        fn id(&self) -> &str {
            "offline"
        }

        async fn send(&self, _event: &InboundEvent, _message: &str) -> ApiResult<String> {
            Err(crate::error::ApiError::NotConnected)
        }
    }

    #[tokio::test]
    async fn test_reply_surfaces_bot_error() {
        let event = InboundEvent::private(
            PrivateMessage {
                connection: ConnectionId::new("c"),
                user_id: 1,
                text: "hi".into(),
            },
            Arc::new(OfflineBot),
        );
        let err = event.reply("pong").await.unwrap_err();
        assert!(matches!(err, crate::error::ApiError::NotConnected));
        assert_eq!(err.to_string(), "bot is not connected");
    }

    #[test]
    fn test_normalized_group_message() {
        let raw = r#"{"message_type":"group","connection":"c1","user_id":5,"group_id":9,"role":"admin","text":"/ping"}"#;
        let msg: NormalizedMessage = serde_json::from_str(raw).unwrap();
        let event = msg.into_event(Arc::new(RecordingBot::default())).unwrap();
        assert_eq!(event.scope(), Scope::Group);
        assert_eq!(event.group_id(), Some(9));
        assert_eq!(event.sender_role(), Some(MemberRole::Admin));
    }

    #[test]
    fn test_normalized_rejects_unknown_type() {
        let msg = NormalizedMessage {
            message_type: "channel".into(),
            connection: "c1".into(),
            user_id: 1,
            group_id: None,
            role: None,
            text: String::new(),
        };
        let err = msg.into_event(Arc::new(RecordingBot::default())).unwrap_err();
        assert!(matches!(err, EventError::UnsupportedMessageType(t) if t == "channel"));
    }

    #[test]
    fn test_normalized_group_without_group_id() {
        let msg = NormalizedMessage {
            message_type: "group".into(),
            connection: "c1".into(),
            user_id: 3,
            group_id: None,
            role: None,
            text: String::new(),
        };
        let err = msg.into_event(Arc::new(RecordingBot::default())).unwrap_err();
        assert!(matches!(err, EventError::MissingGroupId { user_id: 3 }));
    }
}
