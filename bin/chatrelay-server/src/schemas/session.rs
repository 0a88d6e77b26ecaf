use chatrelay_core::{Message, SessionId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    /// Position in the transcript; the system prompt is index 0.
    pub index: usize,
    pub role: String,
    pub content: String,
}

impl From<SessionId> for SessionResponse {
    fn from(id: SessionId) -> Self {
        Self { id: id.to_string() }
    }
}

impl MessageResponse {
    pub fn from_indexed(index: usize, message: Message) -> Self {
        Self { index, role: message.role.to_string(), content: message.content }
    }
}
