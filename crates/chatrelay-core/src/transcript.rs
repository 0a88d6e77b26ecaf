//! Role-tagged conversation messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation message.  Immutable once appended to a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered, append-only conversation.
///
/// The first element is always the system message the transcript was created
/// with.  Insertion order is the conversation order and is replayed verbatim
/// as context on every completion call, so there is no way to remove or
/// reorder entries.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create a transcript seeded with its system message.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::system(system_prompt)] }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Owned copy of the full ordered sequence.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always `false`: a transcript holds at least its system message.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_transcript_starts_with_system_message() {
        let t = Transcript::new("be brief");
        assert_eq!(t.len(), 1);
        assert_eq!(t.snapshot()[0], Message::system("be brief"));
        assert!(!t.is_empty());
    }

    #[test]
    fn append_preserves_insertion_order() {
        let mut t = Transcript::new("sys");
        t.append(Message::user("one"));
        t.append(Message::assistant("two"));
        t.append(Message::user("three"));

        let roles: Vec<Role> = t.snapshot().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(t.snapshot()[3].content, "three");
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let mut t = Transcript::new("sys");
        let before = t.snapshot();
        t.append(Message::user("later"));
        assert_eq!(before.len(), 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);
    }
}
